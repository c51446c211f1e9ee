//! 任务处理器
//!
//! 每种任务类型对应一个处理器，负责提交、状态轮询与完成后的流向控制。
//! 未注册的任务类型都交给通用处理器，经任务队列由外部Worker执行。

mod blocking;
mod conditions;
mod dependency;
mod dependent;
mod generic;
mod sub_process;
mod switch;

pub use blocking::BlockingProcessor;
pub use conditions::ConditionsProcessor;
pub use dependency::{evaluate_dependence, result_by_state};
pub use dependent::DependentProcessor;
pub use generic::GenericProcessor;
pub use sub_process::SubProcessProcessor;
pub use switch::{evaluate_switch, SwitchProcessor};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use scheduler_core::models::{task_types, ExecutionStatus, ProcessInstance, TaskInstance, TaskNode};
use scheduler_core::SchedulerResult;

use crate::context::EngineContext;
use crate::submitter::TaskSubmitter;

/// 任务完成后对下游调度的影响
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowDirective {
    /// 按DAG正常推进
    Proceed,
    /// 跳过未选中分支上的后继节点
    Route { skip: Vec<String> },
    /// 阻断下游，`alert` 表示需要告警
    Block { alert: bool },
}

/// 处理器执行时可见的上下文
pub struct TaskRunContext<'a> {
    pub engine: &'a EngineContext,
    pub submitter: &'a TaskSubmitter,
    pub instance: &'a ProcessInstance,
    pub node: &'a TaskNode,
}

impl TaskRunContext<'_> {
    /// 实例的流程快照中是否包含该节点
    pub fn instance_has_node(&self, name: &str) -> bool {
        self.instance
            .process_data()
            .map(|data| data.tasks.iter().any(|t| t.name == name))
            .unwrap_or(false)
    }
}

#[async_trait]
pub trait TaskProcessor: Send + Sync {
    /// 提交任务，返回写库后的任务实例
    async fn submit(&self, ctx: &TaskRunContext<'_>, task: TaskInstance) -> SchedulerResult<TaskInstance>;

    /// 刷新任务状态
    async fn poll_state(&self, ctx: &TaskRunContext<'_>, task: &TaskInstance) -> SchedulerResult<TaskInstance>;

    /// 任务成功结束后的流向
    fn on_complete(&self, _node: &TaskNode, _task: &TaskInstance) -> FlowDirective {
        FlowDirective::Proceed
    }

    /// 响应实例的暂停或停止请求
    async fn cancel(
        &self,
        ctx: &TaskRunContext<'_>,
        task: &TaskInstance,
        target: ExecutionStatus,
    ) -> SchedulerResult<TaskInstance> {
        let mut task = task.clone();
        if task.state.is_finished() {
            return Ok(task);
        }
        task.state = target;
        task.end_time = Some(Utc::now());
        ctx.engine.task_instances.save(&mut task).await?;
        Ok(task)
    }
}

/// 任务类型到处理器的映射
pub struct TaskProcessorRegistry {
    processors: HashMap<String, Arc<dyn TaskProcessor>>,
    fallback: Arc<dyn TaskProcessor>,
}

impl TaskProcessorRegistry {
    pub fn new(fallback: Arc<dyn TaskProcessor>) -> Self {
        Self {
            processors: HashMap::new(),
            fallback,
        }
    }

    /// 内置全部控制类处理器，其余类型走通用处理器
    pub fn with_defaults() -> Self {
        let mut registry = Self::new(Arc::new(GenericProcessor));
        registry.register(task_types::SUB_PROCESS, Arc::new(SubProcessProcessor));
        registry.register(task_types::DEPENDENT, Arc::new(DependentProcessor));
        registry.register(task_types::CONDITIONS, Arc::new(ConditionsProcessor));
        registry.register(task_types::SWITCH, Arc::new(SwitchProcessor));
        registry.register(task_types::BLOCKING, Arc::new(BlockingProcessor));
        registry
    }

    pub fn register(&mut self, task_type: &str, processor: Arc<dyn TaskProcessor>) {
        self.processors.insert(task_type.to_string(), processor);
    }

    pub fn get(&self, task_type: &str) -> Arc<dyn TaskProcessor> {
        self.processors
            .get(task_type)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl Default for TaskProcessorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// 把判断结果写入任务的依赖字段
pub(crate) fn dependency_json(value: Value) -> Option<String> {
    Some(value.to_string())
}

/// 从依赖字段读取字符串值
pub(crate) fn dependency_field(task: &TaskInstance, key: &str) -> Option<String> {
    let raw = task.dependency.as_deref()?;
    let value: Value = serde_json::from_str(raw).ok()?;
    value.get(key)?.as_str().map(str::to_string)
}

/// 控制类任务提交后立即进入运行状态
pub(crate) async fn mark_running(
    ctx: &TaskRunContext<'_>,
    mut task: TaskInstance,
) -> SchedulerResult<TaskInstance> {
    if task.state.is_finished() {
        return Ok(task);
    }
    task.state = ExecutionStatus::RunningExecution;
    task.start_time = Some(Utc::now());
    task.host = Some(ctx.engine.host().to_string());
    ctx.engine.task_instances.save(&mut task).await?;
    Ok(task)
}

/// 控制类任务结束
pub(crate) async fn finish(
    ctx: &TaskRunContext<'_>,
    mut task: TaskInstance,
    state: ExecutionStatus,
    dependency: Value,
) -> SchedulerResult<TaskInstance> {
    task.state = state;
    task.end_time = Some(Utc::now());
    task.dependency = dependency_json(dependency);
    ctx.engine.task_instances.save(&mut task).await?;
    Ok(task)
}
