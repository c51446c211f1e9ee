use scheduler_core::config::DatabaseConfig;
use scheduler_core::traits::{
    CommandRepository, ErrorCommandRepository, ProcessDefinitionRepository,
    ProcessInstanceMapRepository, ProcessInstanceRepository, ScheduleRepository, ServerRegistry,
    TaskInstanceRepository,
};
use scheduler_core::{SchedulerError, SchedulerResult};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::postgres::{
    PostgresCommandRepository, PostgresErrorCommandRepository,
    PostgresProcessDefinitionRepository, PostgresProcessInstanceMapRepository,
    PostgresProcessInstanceRepository, PostgresScheduleRepository, PostgresServerRegistry,
    PostgresTaskInstanceRepository,
};

const INITIAL_SCHEMA: &str = include_str!("../../../../migrations/001_initial_schema.sql");

/// 数据库连接池管理器
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    /// 创建新的数据库管理器
    pub async fn new(config: &DatabaseConfig) -> SchedulerResult<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&config.url)
            .await
            .map_err(SchedulerError::Database)?;

        info!("数据库连接池已创建, 最大连接数: {}", config.max_connections);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 执行建表脚本，脚本可重复执行
    pub async fn migrate(&self) -> SchedulerResult<()> {
        sqlx::raw_sql(INITIAL_SCHEMA).execute(&self.pool).await?;
        info!("数据库表结构已就绪");
        Ok(())
    }

    /// 检查数据库连接健康状态
    pub async fn health_check(&self) -> SchedulerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn command_repository(&self) -> Arc<dyn CommandRepository> {
        Arc::new(PostgresCommandRepository::new(self.pool.clone()))
    }

    pub fn error_command_repository(&self) -> Arc<dyn ErrorCommandRepository> {
        Arc::new(PostgresErrorCommandRepository::new(self.pool.clone()))
    }

    pub fn process_definition_repository(&self) -> Arc<dyn ProcessDefinitionRepository> {
        Arc::new(PostgresProcessDefinitionRepository::new(self.pool.clone()))
    }

    pub fn process_instance_repository(&self) -> Arc<dyn ProcessInstanceRepository> {
        Arc::new(PostgresProcessInstanceRepository::new(self.pool.clone()))
    }

    pub fn task_instance_repository(&self) -> Arc<dyn TaskInstanceRepository> {
        Arc::new(PostgresTaskInstanceRepository::new(self.pool.clone()))
    }

    pub fn process_instance_map_repository(&self) -> Arc<dyn ProcessInstanceMapRepository> {
        Arc::new(PostgresProcessInstanceMapRepository::new(self.pool.clone()))
    }

    pub fn schedule_repository(&self) -> Arc<dyn ScheduleRepository> {
        Arc::new(PostgresScheduleRepository::new(self.pool.clone()))
    }

    pub fn server_registry(&self) -> Arc<dyn ServerRegistry> {
        Arc::new(PostgresServerRegistry::new(self.pool.clone()))
    }
}
