use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use scheduler_core::models::{parse_params, ExecutionStatus, SwitchParameters, SwitchResult, TaskInstance, TaskNode};
use scheduler_core::utils::params::replace_variables;
use scheduler_core::SchedulerResult;

use super::{dependency_field, finish, FlowDirective, TaskProcessor, TaskRunContext};

/// 按顺序计算分支条件，返回第一个命中的节点，均未命中时返回默认节点
///
/// 条件中的 `${name}` 先替换为变量值，非数值的变量按字符串字面量代入。
/// 表达式求值出错或结果不是布尔值都视为不命中。
pub fn evaluate_switch(params: &SwitchResult, vars: &HashMap<String, String>) -> Option<String> {
    let quoted: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| {
            let value = if v.trim().parse::<f64>().is_ok() {
                v.trim().to_string()
            } else {
                format!("{:?}", v)
            };
            (k.clone(), value)
        })
        .collect();

    let engine = rhai::Engine::new();
    for branch in &params.depend_task_list {
        if branch.condition.trim().is_empty() {
            continue;
        }
        let expression = replace_variables(&branch.condition, &quoted);
        let mut scope = rhai::Scope::new();
        match engine.eval_with_scope::<bool>(&mut scope, &expression) {
            Ok(true) => return Some(branch.next_node.clone()),
            Ok(false) => {}
            Err(e) => debug!("分支条件 {} 求值失败: {}", expression, e),
        }
    }
    params.next_node.clone().filter(|n| !n.is_empty())
}

/// Switch任务：按条件选择一个后续节点，其余分支被跳过
pub struct SwitchProcessor;

#[async_trait]
impl TaskProcessor for SwitchProcessor {
    async fn submit(&self, ctx: &TaskRunContext<'_>, task: TaskInstance) -> SchedulerResult<TaskInstance> {
        let task = ctx.submitter.submit(ctx.instance, task).await?;
        if task.state.is_finished() {
            return Ok(task);
        }

        let params = parse_params::<SwitchParameters>(&task.task_params)?;
        let mut vars: HashMap<String, String> = ctx
            .instance
            .global_params
            .iter()
            .map(|p| (p.prop.clone(), p.value.clone()))
            .collect();
        for property in &task.var_pool {
            vars.insert(property.prop.clone(), property.value.clone());
        }

        let next = evaluate_switch(&params.switch_result, &vars);
        let state = match next.as_deref() {
            Some(name) if ctx.instance_has_node(name) => ExecutionStatus::Success,
            _ => {
                warn!("Switch任务 {} 没有可用的后续节点: {:?}", task.name, next);
                ExecutionStatus::Failure
            }
        };
        info!("Switch任务 {} 选择分支: {:?}", task.name, next);
        finish(ctx, task, state, json!({ "nextNode": next })).await
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
        let params = match parse_params::<SwitchParameters>(&node.params) {
            Ok(params) => params,
            Err(e) => {
                warn!("Switch任务 {} 参数无效: {}", node.name, e);
                return FlowDirective::Proceed;
            }
        };
        let chosen = dependency_field(task, "nextNode");
        let skip = params
            .switch_result
            .all_next_nodes()
            .into_iter()
            .filter(|n| Some(n) != chosen.as_ref())
            .collect();
        FlowDirective::Route { skip }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_core::models::SwitchBranch;

    fn branch(condition: &str, next: &str) -> SwitchBranch {
        SwitchBranch {
            condition: condition.to_string(),
            next_node: next.to_string(),
        }
    }

    #[test]
    fn test_first_true_branch_wins() {
        let params = SwitchResult {
            depend_task_list: vec![branch("2==1", "t1"), branch("2==2", "t2"), branch("3==2", "t3")],
            next_node: Some("t4".to_string()),
        };
        assert_eq!(evaluate_switch(&params, &HashMap::new()).as_deref(), Some("t2"));
    }

    #[test]
    fn test_variables_and_default() {
        let params = SwitchResult {
            depend_task_list: vec![
                branch("${region} == \"cn\"", "china"),
                branch("${count} > 10", "big"),
                branch("not an expression", "broken"),
            ],
            next_node: Some("fallback".to_string()),
        };
        let mut vars = HashMap::new();
        vars.insert("region".to_string(), "us".to_string());
        vars.insert("count".to_string(), "42".to_string());
        assert_eq!(evaluate_switch(&params, &vars).as_deref(), Some("big"));

        vars.insert("count".to_string(), "3".to_string());
        assert_eq!(evaluate_switch(&params, &vars).as_deref(), Some("fallback"));
    }

    #[test]
    fn test_route_skips_unchosen_branches() {
        let mut node = TaskNode::new("switch", "SWITCH");
        node.params = json!({
            "switchResult": {
                "dependTaskList": [
                    { "condition": "1==1", "nextNode": "a" },
                    { "condition": "1==2", "nextNode": "b" }
                ],
                "nextNode": "c"
            }
        });
        let mut task = TaskInstance::from_node(&node, 1, 1);
        task.dependency = Some(r#"{"nextNode":"a"}"#.to_string());
        assert_eq!(
            SwitchProcessor.on_complete(&node, &task),
            FlowDirective::Route { skip: vec!["b".to_string(), "c".to_string()] }
        );
    }
}
