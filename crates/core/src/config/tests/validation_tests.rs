use crate::config::models::{
    AppConfig, DatabaseConfig, MasterConfig, ObservabilityConfig, TaskQueueBackend,
    TaskQueueConfig,
};

#[test]
fn test_database_url_validation() {
    let mut config = DatabaseConfig::default();
    assert!(config.validate().is_ok());

    config.url = "mysql://localhost/scheduler".to_string();
    assert!(config.validate().is_err());

    config.url = "memory://".to_string();
    config.max_connections = 0;
    assert!(config.validate().is_ok());

    config.url = "postgres://localhost/scheduler".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_task_queue_validation() {
    let mut config = TaskQueueConfig::default();
    assert!(config.validate().is_ok());

    config.url = "http://localhost".to_string();
    assert!(config.validate().is_err());

    config.backend = TaskQueueBackend::Memory;
    assert!(config.validate().is_ok());

    config.queue_key = String::new();
    assert!(config.validate().is_err());
}

#[test]
fn test_master_validation() {
    let mut config = MasterConfig::default();
    assert!(config.validate().is_ok());

    config.exec_threads = 0;
    assert!(config.validate().is_err());

    let mut config = MasterConfig::default();
    config.heartbeat_timeout_seconds = config.heartbeat_interval_seconds;
    assert!(config.validate().is_err());

    let mut config = MasterConfig::default();
    config.default_worker_group = " ".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_observability_validation() {
    let mut config = ObservabilityConfig::default();
    assert!(config.validate().is_ok());

    config.log_level = "verbose".to_string();
    assert!(config.validate().is_err());

    let mut config = ObservabilityConfig::default();
    config.log_format = "xml".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_app_config_reports_section() {
    let mut config = AppConfig::default();
    config.master.exec_task_num = 0;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("Master"));
}
