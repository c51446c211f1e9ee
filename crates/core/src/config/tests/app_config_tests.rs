use std::io::Write;

use crate::config::models::{AppConfig, TaskQueueBackend};

#[test]
fn test_default_config() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());

    assert_eq!(config.database.max_connections, 10);
    assert_eq!(config.master.exec_threads, 100);
    assert_eq!(config.master.default_worker_group, "default");
    assert_eq!(config.task_queue.backend, TaskQueueBackend::Redis);
}

#[test]
fn test_config_from_toml() {
    let toml_content = r#"
[database]
url = "memory://"
max_connections = 5
min_connections = 1
connection_timeout_seconds = 30
idle_timeout_seconds = 600

[task_queue]
backend = "memory"
url = ""
queue_key = "test_tasks"

[master]
listen_host = "10.0.0.5:5678"
exec_threads = 4
exec_task_num = 2
state_poll_interval_ms = 100
command_poll_interval_ms = 200
heartbeat_interval_seconds = 5
heartbeat_timeout_seconds = 30
failover_check_interval_seconds = 10
task_commit_retry_times = 3
task_commit_interval_ms = 50
default_worker_group = "default"

[observability]
metrics_enabled = false
metrics_bind_address = "0.0.0.0:9090"
log_level = "debug"
log_format = "json"
"#;

    let config = AppConfig::from_toml(toml_content).unwrap();
    assert!(config.database.is_in_memory());
    assert_eq!(config.task_queue.backend, TaskQueueBackend::Memory);
    assert_eq!(config.master.listen_host, "10.0.0.5:5678");
    assert_eq!(config.master.exec_task_num, 2);
    assert_eq!(config.observability.log_format, "json");
}

#[test]
fn test_toml_round_trip() {
    let config = AppConfig::default();
    let toml = config.to_toml().unwrap();
    let parsed = AppConfig::from_toml(&toml).unwrap();
    assert_eq!(parsed.master.exec_threads, config.master.exec_threads);
    assert_eq!(parsed.task_queue.queue_key, config.task_queue.queue_key);
}

#[test]
fn test_load_partial_file_uses_defaults() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[master]
exec_threads = 3

[database]
url = "memory://"
"#
    )
    .unwrap();

    let config = AppConfig::load(file.path().to_str()).unwrap();
    assert_eq!(config.master.exec_threads, 3);
    assert!(config.database.is_in_memory());
    assert_eq!(config.master.heartbeat_timeout_seconds, 60);
    assert_eq!(config.observability.log_level, "info");
}

#[test]
fn test_load_missing_file_fails() {
    let result = AppConfig::load(Some("/nonexistent/scheduler.toml"));
    assert!(result.is_err());
}

#[test]
fn test_environment_override() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[database]\nurl = \"memory://\"").unwrap();

    std::env::set_var("SCHEDULER_MASTER__TASK_COMMIT_RETRY_TIMES", "9");
    let config = AppConfig::load(file.path().to_str());
    std::env::remove_var("SCHEDULER_MASTER__TASK_COMMIT_RETRY_TIMES");

    assert_eq!(config.unwrap().master.task_commit_retry_times, 9);
}
