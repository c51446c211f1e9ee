//! # scheduler-core
//!
//! 工作流引擎的核心库：数据模型、依赖图、任务队列键、仓储与外部组件接口、配置以及通用工具。

pub mod config;
pub mod dag;
pub mod errors;
pub mod models;
pub mod queue_key;
pub mod traits;
pub mod utils;

pub use dag::Dag;
pub use errors::*;
pub use queue_key::TaskPriorityKey;

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
