//! # scheduler-infrastructure
//!
//! 核心接口的具体实现：PostgreSQL与内存仓储、Redis与内存任务队列、告警发送以及指标导出。

pub mod alert;
pub mod database;
pub mod observability;
pub mod task_queue;

pub use alert::{InMemoryAlertSender, SentAlert, TracingAlertSender};
pub use database::{DatabaseManager, InMemoryBackend};
pub use observability::{init_metrics, MetricsCollector};
pub use task_queue::{create_task_queue, InMemoryTaskQueue, RedisTaskQueue};
