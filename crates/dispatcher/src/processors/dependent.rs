use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use scheduler_core::models::{parse_params, DependResult, DependentTaskParameters, ExecutionStatus, TaskInstance};
use scheduler_core::SchedulerResult;

use super::{evaluate_dependence, finish, mark_running, TaskProcessor, TaskRunContext};

/// 依赖任务：周期性检查依赖表达式，直到得出成功或失败
pub struct DependentProcessor;

#[async_trait]
impl TaskProcessor for DependentProcessor {
    async fn submit(&self, ctx: &TaskRunContext<'_>, task: TaskInstance) -> SchedulerResult<TaskInstance> {
        let task = ctx.submitter.submit(ctx.instance, task).await?;
        mark_running(ctx, task).await
    }

    async fn poll_state(&self, ctx: &TaskRunContext<'_>, task: &TaskInstance) -> SchedulerResult<TaskInstance> {
        let task = ctx
            .engine
            .task_instances
            .find_by_id(task.id)
            .await?
            .unwrap_or_else(|| task.clone());
        if task.state.is_finished() {
            return Ok(task);
        }

        let params = parse_params::<DependentTaskParameters>(&task.task_params)?;
        let result = evaluate_dependence(ctx, &params.dependence).await?;
        let (state, label) = match result {
            DependResult::Waiting => return Ok(task),
            DependResult::Success => (ExecutionStatus::Success, "SUCCESS"),
            DependResult::Failed => (ExecutionStatus::Failure, "FAILED"),
        };
        info!("依赖任务 {} 判断完成: {}", task.name, label);
        finish(ctx, task, state, json!({ "result": label })).await
    }
}
