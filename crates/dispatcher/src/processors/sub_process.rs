use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use scheduler_core::models::{Direct, ExecutionStatus, TaskInstance};
use scheduler_core::SchedulerResult;

use super::{mark_running, TaskProcessor, TaskRunContext};

/// 子工作流任务：提交时写入子工作流命令，子实例结束后同步状态
pub struct SubProcessProcessor;

impl SubProcessProcessor {
    async fn child_instance(
        &self,
        ctx: &TaskRunContext<'_>,
        task: &TaskInstance,
    ) -> SchedulerResult<Option<scheduler_core::models::ProcessInstance>> {
        let Some(map) = ctx
            .engine
            .process_instance_maps
            .find(ctx.instance.id, task.id)
            .await?
        else {
            return Ok(None);
        };
        if map.process_instance_id == 0 {
            return Ok(None);
        }
        ctx.engine.process_instances.find_by_id(map.process_instance_id).await
    }
}

#[async_trait]
impl TaskProcessor for SubProcessProcessor {
    async fn submit(&self, ctx: &TaskRunContext<'_>, task: TaskInstance) -> SchedulerResult<TaskInstance> {
        let task = ctx.submitter.submit(ctx.instance, task).await?;
        mark_running(ctx, task).await
    }

    async fn poll_state(&self, ctx: &TaskRunContext<'_>, task: &TaskInstance) -> SchedulerResult<TaskInstance> {
        let mut task = ctx
            .engine
            .task_instances
            .find_by_id(task.id)
            .await?
            .unwrap_or_else(|| task.clone());
        if task.state.is_finished() {
            return Ok(task);
        }

        let Some(child) = self.child_instance(ctx, &task).await? else {
            debug!("子工作流任务 {} 的子实例尚未创建", task.name);
            return Ok(task);
        };
        if !child.state.is_finished() {
            return Ok(task);
        }

        task.state = child.state;
        task.end_time = Some(child.end_time.unwrap_or_else(Utc::now));
        task.var_pool = child
            .var_pool
            .iter()
            .filter(|p| p.direct == Direct::Out)
            .cloned()
            .collect();
        ctx.engine.task_instances.save(&mut task).await?;
        info!(
            "子工作流任务 {} 结束，子实例 {} 状态: {}",
            task.name, child.id, child.state
        );
        Ok(task)
    }

    /// 将暂停或停止请求转给子实例
    async fn cancel(
        &self,
        ctx: &TaskRunContext<'_>,
        task: &TaskInstance,
        target: ExecutionStatus,
    ) -> SchedulerResult<TaskInstance> {
        if let Some(mut child) = self.child_instance(ctx, task).await? {
            if !child.state.is_finished() {
                child.state = if target.is_pause() {
                    ExecutionStatus::ReadyPause
                } else {
                    ExecutionStatus::ReadyStop
                };
                ctx.engine.process_instances.update(&child).await?;
                info!("子实例 {} 收到请求: {}", child.id, child.state);
            }
        }
        Ok(task.clone())
    }
}
