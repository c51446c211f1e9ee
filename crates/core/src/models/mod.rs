//! # 数据模型
//!
//! 工作流引擎的核心数据结构：命令、工作流定义与实例、任务实例、
//! 父子实例关联、定时配置以及集群节点信息。
//!
//! 所有时间字段使用 `DateTime<Utc>`，状态字段使用枚举，
//! 需要存库的枚举以VARCHAR文本形式编解码。

#[macro_use]
mod enums;

pub mod command;
pub mod params;
pub mod process;
pub mod server;
pub mod task;

pub use command::*;
pub use enums::*;
pub use params::*;
pub use process::*;
pub use server::*;
pub use task::*;
