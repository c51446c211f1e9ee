pub mod app_config;
pub mod database;
pub mod master;
pub mod observability;
pub mod task_queue;

pub use app_config::AppConfig;
pub use database::{DatabaseConfig, IN_MEMORY_DATABASE_URL};
pub use master::MasterConfig;
pub use observability::ObservabilityConfig;
pub use task_queue::{TaskQueueBackend, TaskQueueConfig};
