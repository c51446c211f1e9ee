//! 数据仓储层接口定义
//!
//! 此模块定义了工作流引擎持久化层的核心抽象接口：
//! - 命令仓储 (`CommandRepository`) 与错误命令仓储 (`ErrorCommandRepository`)
//! - 工作流定义仓储 (`ProcessDefinitionRepository`)
//! - 工作流实例仓储 (`ProcessInstanceRepository`)
//! - 任务实例仓储 (`TaskInstanceRepository`)
//! - 父子实例关联仓储 (`ProcessInstanceMapRepository`)
//! - 定时配置仓储 (`ScheduleRepository`)
//!
//! ## 设计原则
//!
//! 每个仓储接口职责单一，所有操作都是异步的并返回 `SchedulerResult<T>`，
//! 实现需要满足 `Send + Sync`，以 `Arc<dyn Trait>` 的形式在协调器之间共享。
//!
//! 接口与具体实现分离，基础设施层提供PostgreSQL实现与内存实现。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use scheduler_core::traits::CommandRepository;
//!
//! async fn next_command(repo: &dyn CommandRepository) -> SchedulerResult<()> {
//!     if let Some(command) = repo.find_one().await? {
//!         println!("待处理命令: {} {}", command.id, command.command_type);
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    Command, ErrorCommand, ExecutionStatus, ProcessDefinition, ProcessInstance,
    ProcessInstanceMap, Schedule, TaskInstance,
};
use crate::SchedulerResult;

/// 命令仓储接口
///
/// 命令是工作流运行的唯一入口。一条命令只能被实例化器消费一次：
/// 成功实例化后删除，失败时转存为错误命令后删除。
#[async_trait]
pub trait CommandRepository: Send + Sync {
    /// 插入命令，返回带有生成ID的命令
    async fn insert(&self, command: &Command) -> SchedulerResult<Command>;

    /// 原地更新命令
    async fn update(&self, command: &Command) -> SchedulerResult<()>;

    /// 删除命令
    ///
    /// # 返回值
    ///
    /// 命令存在并被删除时返回 `true`。
    async fn delete(&self, id: i64) -> SchedulerResult<bool>;

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Command>>;

    /// 取出下一条待处理命令
    ///
    /// 按工作流实例优先级（序号小者优先）再按ID升序选择。
    async fn find_one(&self) -> SchedulerResult<Option<Command>>;

    /// 列出全部待处理命令
    async fn list(&self) -> SchedulerResult<Vec<Command>>;
}

/// 错误命令仓储接口，仅支持插入与查询
#[async_trait]
pub trait ErrorCommandRepository: Send + Sync {
    async fn insert(&self, error_command: &ErrorCommand) -> SchedulerResult<()>;

    async fn list(&self) -> SchedulerResult<Vec<ErrorCommand>>;
}

/// 工作流定义仓储接口
///
/// 引擎只读取定义，定义的增删改属于外部管理端的职责。
#[async_trait]
pub trait ProcessDefinitionRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<ProcessDefinition>>;
}

/// 工作流实例仓储接口
#[async_trait]
pub trait ProcessInstanceRepository: Send + Sync {
    /// 保存实例
    ///
    /// ID为0时插入新行并回写生成的ID，否则整行覆盖。
    /// 实例化器与补数流程通过该方法落库。
    async fn save(&self, instance: &mut ProcessInstance) -> SchedulerResult<()>;

    /// 更新已有实例
    ///
    /// 执行协调器在状态流转时调用。
    ///
    /// # 错误
    ///
    /// * `ProcessInstanceNotFound` - 实例不存在
    async fn update(&self, instance: &ProcessInstance) -> SchedulerResult<()>;

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<ProcessInstance>>;

    /// 查询归属于指定主机且处于给定状态之一的实例
    async fn find_by_host_and_states(
        &self,
        host: &str,
        states: &[ExecutionStatus],
    ) -> SchedulerResult<Vec<ProcessInstance>>;

    async fn find_by_states(
        &self,
        states: &[ExecutionStatus],
    ) -> SchedulerResult<Vec<ProcessInstance>>;

    /// 查询指定定义在时间窗口内最近的一个实例
    ///
    /// 以调度时间为准，没有调度时间的实例以开始时间为准。
    async fn find_last_in_window(
        &self,
        process_definition_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SchedulerResult<Option<ProcessInstance>>;

    /// 仅当实例当前归属于 `host` 时清空其主机字段
    ///
    /// 用于容错接管时的“比较并交换”，返回是否清空成功。
    async fn clear_host_if_owned(&self, id: i64, host: &str) -> SchedulerResult<bool>;
}

/// 任务实例仓储接口
#[async_trait]
pub trait TaskInstanceRepository: Send + Sync {
    /// 保存任务实例，ID为0时插入并回写ID
    async fn save(&self, task: &mut TaskInstance) -> SchedulerResult<()>;

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<TaskInstance>>;

    /// 某工作流实例下所有有效（flag=YES）的任务实例
    async fn find_valid_by_process_instance(
        &self,
        process_instance_id: i64,
    ) -> SchedulerResult<Vec<TaskInstance>>;

    /// 某工作流实例下指定名称的有效任务实例
    async fn find_by_process_instance_and_name(
        &self,
        process_instance_id: i64,
        name: &str,
    ) -> SchedulerResult<Option<TaskInstance>>;

    /// 同名任务最近一次被置为无效的实例，用于重跑时找回旧的子工作流关联
    async fn find_previous_by_name(
        &self,
        process_instance_id: i64,
        name: &str,
    ) -> SchedulerResult<Option<TaskInstance>>;

    async fn find_by_host_and_states(
        &self,
        host: &str,
        states: &[ExecutionStatus],
    ) -> SchedulerResult<Vec<TaskInstance>>;

    async fn find_by_states(&self, states: &[ExecutionStatus]) -> SchedulerResult<Vec<TaskInstance>>;
}

/// 父子工作流实例关联仓储接口
#[async_trait]
pub trait ProcessInstanceMapRepository: Send + Sync {
    /// 按父实例和父任务查找关联
    async fn find(
        &self,
        parent_process_instance_id: i64,
        parent_task_instance_id: i64,
    ) -> SchedulerResult<Option<ProcessInstanceMap>>;

    /// 按子实例查找关联
    async fn find_by_child(
        &self,
        process_instance_id: i64,
    ) -> SchedulerResult<Option<ProcessInstanceMap>>;

    /// 保存关联，ID为0时插入
    async fn save(&self, map: &mut ProcessInstanceMap) -> SchedulerResult<()>;
}

/// 定时配置仓储接口
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// 指定工作流定义下已上线的定时配置
    async fn find_online_by_process_definition(
        &self,
        process_definition_id: i64,
    ) -> SchedulerResult<Vec<Schedule>>;
}
