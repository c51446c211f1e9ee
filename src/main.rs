use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use scheduler_core::config::AppConfig;
use scheduler_dispatcher::{
    EngineContext, FaultToleranceManager, HeartbeatMonitor, MasterSchedulerService,
    TaskProcessorRegistry,
};
use scheduler_infrastructure::{
    create_task_queue, init_metrics, DatabaseManager, InMemoryBackend, TracingAlertSender,
};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod shutdown;

use shutdown::ShutdownManager;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("workflow-scheduler")
        .version("1.0.0")
        .about("命令驱动的DAG工作流调度引擎")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，缺省时只使用默认值与环境变量"),
        )
        .arg(
            Arg::new("listen-host")
                .long("listen-host")
                .value_name("HOST:PORT")
                .help("覆盖配置中的Master主机标识"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");
    let mut config = AppConfig::load(config_path.map(String::as_str))
        .with_context(|| format!("加载配置失败: {config_path:?}"))?;

    if let Some(host) = matches.get_one::<String>("listen-host") {
        config.master.listen_host = host.clone();
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.clone();
    }
    config.validate().context("配置校验失败")?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    )?;

    info!("启动工作流调度Master: {}", config.master.listen_host);

    if config.observability.metrics_enabled {
        init_metrics(&config.observability.metrics_bind_address)?;
    }

    let task_queue = create_task_queue(&config.task_queue)
        .await
        .context("创建任务队列失败")?;
    let alert_sender = Arc::new(TracingAlertSender);

    let mut database = None;
    let ctx = if config.database.is_in_memory() {
        warn!("使用内存存储，进程退出后数据将丢失");
        EngineContext::in_memory(
            &InMemoryBackend::new(),
            task_queue,
            alert_sender,
            config.master.clone(),
        )
    } else {
        let manager = DatabaseManager::new(&config.database)
            .await
            .context("连接数据库失败")?;
        manager.migrate().await.context("执行数据库迁移失败")?;
        let ctx = EngineContext::from_database(
            &manager,
            task_queue,
            alert_sender,
            config.master.clone(),
        );
        database = Some(manager);
        ctx
    };

    let fault_tolerance = Arc::new(FaultToleranceManager::new(ctx.clone()));
    fault_tolerance
        .startup_failover()
        .await
        .context("启动容错失败")?;

    let monitor = Arc::new(HeartbeatMonitor::new(ctx.clone(), fault_tolerance));
    monitor.register_self().await.context("注册Master节点失败")?;

    let scheduler = Arc::new(MasterSchedulerService::new(
        ctx,
        Arc::new(TaskProcessorRegistry::with_defaults()),
    ));

    let shutdown_manager = ShutdownManager::new();
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    {
        let monitor = Arc::clone(&monitor);
        let shutdown_rx = shutdown_manager.subscribe().await;
        handles.push(tokio::spawn(async move {
            monitor.run_heartbeat(shutdown_rx).await
        }));
    }
    {
        let monitor = Arc::clone(&monitor);
        let shutdown_rx = shutdown_manager.subscribe().await;
        handles.push(tokio::spawn(async move {
            monitor.run_monitor(shutdown_rx).await
        }));
    }
    {
        let scheduler = Arc::clone(&scheduler);
        let shutdown_rx = shutdown_manager.subscribe().await;
        handles.push(tokio::spawn(async move { scheduler.run(shutdown_rx).await }));
    }

    wait_for_shutdown_signal().await;

    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    let join_all = async {
        for handle in handles {
            if let Err(e) = handle.await {
                error!("后台任务退出异常: {e}");
            }
        }
    };
    match tokio::time::timeout(Duration::from_secs(30), join_all).await {
        Ok(()) => info!("Master已优雅关闭"),
        Err(_) => warn!("关闭超时，强制退出"),
    }

    if let Some(database) = database {
        database.close().await;
    }

    info!("工作流调度Master已退出");
    Ok(())
}

/// 初始化日志系统，`RUST_LOG` 优先于配置中的级别
fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("安装Ctrl+C信号处理器失败: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("安装SIGTERM信号处理器失败: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
