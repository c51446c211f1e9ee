use scheduler_core::config::{AppConfig, TaskQueueBackend};

fn main() -> anyhow::Result<()> {
    println!("=== 工作流调度Master配置示例 ===\n");

    println!("1. 默认配置:");
    let defaults = AppConfig::default();
    println!("   数据库URL: {}", defaults.database.url);
    println!(
        "   任务队列: {:?} {}",
        defaults.task_queue.backend, defaults.task_queue.url
    );
    println!("   主机标识: {}", defaults.master.listen_host);
    println!("   协调器上限: {}\n", defaults.master.exec_threads);

    println!("2. 嵌入模式（内存存储与内存队列）:");
    let embedded = AppConfig::from_toml(
        r#"
[database]
url = "memory://"
max_connections = 1
min_connections = 1
connection_timeout_seconds = 30
idle_timeout_seconds = 600

[task_queue]
backend = "memory"
url = ""
queue_key = "demo:tasks_queue"

[master]
listen_host = "10.0.0.5:5678"
exec_threads = 4
exec_task_num = 8
state_poll_interval_ms = 200
command_poll_interval_ms = 500
heartbeat_interval_seconds = 5
heartbeat_timeout_seconds = 30
failover_check_interval_seconds = 10
task_commit_retry_times = 3
task_commit_interval_ms = 500
default_worker_group = "default"

[observability]
metrics_enabled = false
metrics_bind_address = "0.0.0.0:9090"
log_level = "debug"
log_format = "json"
"#,
    )?;
    println!("   内存存储: {}", embedded.database.is_in_memory());
    println!(
        "   内存队列: {}",
        embedded.task_queue.backend == TaskQueueBackend::Memory
    );
    println!("   主机标识: {}\n", embedded.master.listen_host);

    println!("3. 环境变量覆盖:");
    println!("   SCHEDULER_MASTER__EXEC_THREADS=50");
    println!("   SCHEDULER_DATABASE__URL=memory://\n");

    println!("4. 导出为TOML:");
    println!("{}", embedded.to_toml()?);

    Ok(())
}
