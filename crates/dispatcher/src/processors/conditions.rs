use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use scheduler_core::models::{
    parse_params, ConditionsParameters, DependResult, ExecutionStatus, TaskInstance, TaskNode,
};
use scheduler_core::SchedulerResult;

use super::{dependency_field, evaluate_dependence, finish, FlowDirective, TaskProcessor, TaskRunContext};

/// 条件任务：按依赖结果选择成功或失败分支
///
/// 任务本身总是成功结束，判断结果记录在依赖字段中。
pub struct ConditionsProcessor;

#[async_trait]
impl TaskProcessor for ConditionsProcessor {
    async fn submit(&self, ctx: &TaskRunContext<'_>, task: TaskInstance) -> SchedulerResult<TaskInstance> {
        let task = ctx.submitter.submit(ctx.instance, task).await?;
        if task.state.is_finished() {
            return Ok(task);
        }

        let params = parse_params::<ConditionsParameters>(&task.task_params)?;
        let result = evaluate_dependence(ctx, &params.dependence).await?;
        let label = if result == DependResult::Success {
            "SUCCESS"
        } else {
            "FAILED"
        };
        info!("条件任务 {} 判断结果: {}", task.name, label);
        finish(ctx, task, ExecutionStatus::Success, json!({ "result": label })).await
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
        let params = match parse_params::<ConditionsParameters>(&node.params) {
            Ok(params) => params,
            Err(e) => {
                warn!("条件任务 {} 参数无效: {}", node.name, e);
                return FlowDirective::Proceed;
            }
        };
        let branches = params.condition_result;
        let skip = if dependency_field(task, "result").as_deref() == Some("SUCCESS") {
            branches.failed_node
        } else {
            branches.success_node
        };
        FlowDirective::Route { skip }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_core::models::ConditionResult;

    fn conditions_node() -> TaskNode {
        let mut node = TaskNode::new("cond", "CONDITIONS");
        node.params = serde_json::to_value(ConditionsParameters {
            condition_result: ConditionResult {
                success_node: vec!["ok".to_string()],
                failed_node: vec!["fix".to_string()],
            },
            ..Default::default()
        })
        .unwrap();
        node
    }

    #[test]
    fn test_success_skips_failed_branch() {
        let node = conditions_node();
        let mut task = TaskInstance::from_node(&node, 1, 1);
        task.dependency = Some(r#"{"result":"SUCCESS"}"#.to_string());
        assert_eq!(
            ConditionsProcessor.on_complete(&node, &task),
            FlowDirective::Route { skip: vec!["fix".to_string()] }
        );
    }

    #[test]
    fn test_failure_skips_success_branch() {
        let node = conditions_node();
        let mut task = TaskInstance::from_node(&node, 1, 1);
        task.dependency = Some(r#"{"result":"FAILED"}"#.to_string());
        assert_eq!(
            ConditionsProcessor.on_complete(&node, &task),
            FlowDirective::Route { skip: vec!["ok".to_string()] }
        );
    }
}
