use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use scheduler_core::models::{ExecutionStatus, TaskInstance};
use scheduler_core::SchedulerResult;

use super::{TaskProcessor, TaskRunContext};

/// 通用任务：写库后放入任务队列，由外部Worker执行并回写状态
pub struct GenericProcessor;

#[async_trait]
impl TaskProcessor for GenericProcessor {
    async fn submit(&self, ctx: &TaskRunContext<'_>, task: TaskInstance) -> SchedulerResult<TaskInstance> {
        ctx.submitter.submit(ctx.instance, task).await
    }

    async fn poll_state(&self, ctx: &TaskRunContext<'_>, task: &TaskInstance) -> SchedulerResult<TaskInstance> {
        Ok(ctx
            .engine
            .task_instances
            .find_by_id(task.id)
            .await?
            .unwrap_or_else(|| task.clone()))
    }

    /// 只撤回仍在队列中的任务，已被Worker取走的任务自然结束
    async fn cancel(
        &self,
        ctx: &TaskRunContext<'_>,
        task: &TaskInstance,
        target: ExecutionStatus,
    ) -> SchedulerResult<TaskInstance> {
        let mut task = self.poll_state(ctx, task).await?;
        if task.state.is_finished() {
            return Ok(task);
        }
        let key = ctx.submitter.queue_key(ctx.instance, &task).await?;
        if ctx.engine.task_queue.remove(&key).await? {
            task.state = target;
            task.end_time = Some(Utc::now());
            ctx.engine.task_instances.save(&mut task).await?;
            info!("任务 {} 已从队列撤回，状态: {}", task.name, task.state);
        }
        Ok(task)
    }
}
