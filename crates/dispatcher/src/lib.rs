//! # scheduler-dispatcher
//!
//! Master端的工作流引擎：命令物化、工作流协调、任务提交、各类任务处理器、
//! 容错与心跳检测，以及串起这些组件的命令消费循环。

pub mod commands;
pub mod context;
pub mod coordinator;
pub mod cron_utils;
pub mod fault_tolerance;
pub mod heartbeat;
pub mod master_scheduler;
pub mod materializer;
pub mod processors;
pub mod submitter;

pub use context::EngineContext;
pub use coordinator::WorkflowCoordinator;
pub use cron_utils::CronScheduler;
pub use fault_tolerance::FaultToleranceManager;
pub use heartbeat::HeartbeatMonitor;
pub use master_scheduler::MasterSchedulerService;
pub use materializer::Materializer;
pub use processors::{FlowDirective, TaskProcessor, TaskProcessorRegistry};
pub use submitter::TaskSubmitter;
