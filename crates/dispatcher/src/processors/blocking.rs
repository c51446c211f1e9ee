use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use scheduler_core::models::{parse_params, BlockingParameters, ExecutionStatus, TaskInstance, TaskNode};
use scheduler_core::SchedulerResult;

use super::{evaluate_dependence, finish, FlowDirective, TaskProcessor, TaskRunContext};

/// 阻断任务：依赖结果命中阻断条件时暂停整个实例
pub struct BlockingProcessor;

fn is_blocked(task: &TaskInstance) -> bool {
    task.dependency
        .as_deref()
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        .and_then(|v| v.get("blocked").and_then(Value::as_bool))
        .unwrap_or(false)
}

#[async_trait]
impl TaskProcessor for BlockingProcessor {
    async fn submit(&self, ctx: &TaskRunContext<'_>, task: TaskInstance) -> SchedulerResult<TaskInstance> {
        let task = ctx.submitter.submit(ctx.instance, task).await?;
        if task.state.is_finished() {
            return Ok(task);
        }

        let params = parse_params::<BlockingParameters>(&task.task_params)?;
        let result = evaluate_dependence(ctx, &params.dependence).await?;
        let blocked = params.is_blocked(result);
        if blocked {
            info!("阻断任务 {} 触发阻断，依赖结果: {:?}", task.name, result);
        }
        finish(
            ctx,
            task,
            ExecutionStatus::Success,
            json!({ "result": result, "blocked": blocked }),
        )
        .await
    }

    async fn poll_state(&self, ctx: &TaskRunContext<'_>, task: &TaskInstance) -> SchedulerResult<TaskInstance> {
        Ok(ctx
            .engine
            .task_instances
            .find_by_id(task.id)
            .await?
            .unwrap_or_else(|| task.clone()))
    }

    fn on_complete(&self, node: &TaskNode, task: &TaskInstance) -> FlowDirective {
        if !is_blocked(task) {
            return FlowDirective::Proceed;
        }
        let alert = match parse_params::<BlockingParameters>(&node.params) {
            Ok(params) => params.alert_when_blocking,
            Err(e) => {
                warn!("阻断任务 {} 参数无效: {}", node.name, e);
                false
            }
        };
        FlowDirective::Block { alert }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_task_blocks_with_alert() {
        let mut node = TaskNode::new("gate", "BLOCKING");
        node.params = json!({ "blockingCondition": "BlockingOnFailed", "alertWhenBlocking": true });
        let mut task = TaskInstance::from_node(&node, 1, 1);
        task.dependency = Some(r#"{"result":"FAILED","blocked":true}"#.to_string());
        assert_eq!(
            BlockingProcessor.on_complete(&node, &task),
            FlowDirective::Block { alert: true }
        );

        task.dependency = Some(r#"{"result":"SUCCESS","blocked":false}"#.to_string());
        assert_eq!(BlockingProcessor.on_complete(&node, &task), FlowDirective::Proceed);
    }
}
