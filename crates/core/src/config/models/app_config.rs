use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use super::{
    database::DatabaseConfig, master::MasterConfig, observability::ObservabilityConfig,
    task_queue::TaskQueueConfig,
};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub task_queue: TaskQueueConfig,
    pub master: MasterConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: SCHEDULER_, nested separator: __)
    ///
    /// # Arguments
    ///
    /// * `config_path` - Config file path, if None use default paths
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = AppConfig::default();
        let mut builder = ConfigBuilder::builder()
            .set_default("database.url", defaults.database.url.clone())?
            .set_default("database.max_connections", defaults.database.max_connections)?
            .set_default("database.min_connections", defaults.database.min_connections)?
            .set_default(
                "database.connection_timeout_seconds",
                defaults.database.connection_timeout_seconds,
            )?
            .set_default(
                "database.idle_timeout_seconds",
                defaults.database.idle_timeout_seconds,
            )?
            .set_default("task_queue.backend", "redis")?
            .set_default("task_queue.url", defaults.task_queue.url.clone())?
            .set_default("task_queue.queue_key", defaults.task_queue.queue_key.clone())?
            .set_default("master.listen_host", defaults.master.listen_host.clone())?
            .set_default("master.exec_threads", defaults.master.exec_threads as u64)?
            .set_default("master.exec_task_num", defaults.master.exec_task_num as u64)?
            .set_default(
                "master.state_poll_interval_ms",
                defaults.master.state_poll_interval_ms,
            )?
            .set_default(
                "master.command_poll_interval_ms",
                defaults.master.command_poll_interval_ms,
            )?
            .set_default(
                "master.heartbeat_interval_seconds",
                defaults.master.heartbeat_interval_seconds,
            )?
            .set_default(
                "master.heartbeat_timeout_seconds",
                defaults.master.heartbeat_timeout_seconds,
            )?
            .set_default(
                "master.failover_check_interval_seconds",
                defaults.master.failover_check_interval_seconds,
            )?
            .set_default(
                "master.task_commit_retry_times",
                defaults.master.task_commit_retry_times,
            )?
            .set_default(
                "master.task_commit_interval_ms",
                defaults.master.task_commit_interval_ms,
            )?
            .set_default(
                "master.default_worker_group",
                defaults.master.default_worker_group.clone(),
            )?
            .set_default(
                "observability.metrics_enabled",
                defaults.observability.metrics_enabled,
            )?
            .set_default(
                "observability.metrics_bind_address",
                defaults.observability.metrics_bind_address.clone(),
            )?
            .set_default("observability.log_level", defaults.observability.log_level.clone())?
            .set_default(
                "observability.log_format",
                defaults.observability.log_format.clone(),
            )?;

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                info!("加载配置文件: {}", path);
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/scheduler.toml",
                "scheduler.toml",
                "/etc/scheduler/config.toml",
            ];
            match default_paths.iter().find(|p| Path::new(p).exists()) {
                Some(path) => {
                    info!("加载默认位置的配置文件: {}", path);
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                }
                None => debug!("未找到配置文件，使用默认值与环境变量"),
            }
        }

        // Environment variable overrides - highest priority
        builder = builder.add_source(
            Environment::with_prefix("SCHEDULER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;

        self.task_queue.validate().context("任务队列配置验证失败")?;

        self.master.validate().context("Master配置验证失败")?;

        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}
