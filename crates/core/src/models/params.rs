//! 控制类任务的参数结构
//!
//! 这些结构存放在 `TaskNode::params` 中，提交时随任务实例一起快照。

use serde::{Deserialize, Serialize};

use super::enums::ExecutionStatus;

/// 依赖检查中表示“整个工作流”的任务名
pub const DEPENDENT_ALL: &str = "ALL";

/// 子工作流参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubProcessParameters {
    pub process_definition_id: i64,
}

/// 依赖关系
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum DependentRelation {
    #[default]
    And,
    Or,
}

/// 依赖判断结果
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum DependResult {
    Success,
    Waiting,
    Failed,
}

impl DependResult {
    /// 按关系合并一组结果
    pub fn combine(relation: DependentRelation, results: &[DependResult]) -> DependResult {
        if results.is_empty() {
            return DependResult::Success;
        }
        match relation {
            DependentRelation::And => {
                if results.contains(&DependResult::Failed) {
                    DependResult::Failed
                } else if results.contains(&DependResult::Waiting) {
                    DependResult::Waiting
                } else {
                    DependResult::Success
                }
            }
            DependentRelation::Or => {
                if results.contains(&DependResult::Success) {
                    DependResult::Success
                } else if results.contains(&DependResult::Waiting) {
                    DependResult::Waiting
                } else {
                    DependResult::Failed
                }
            }
        }
    }
}

/// 单个依赖项
///
/// 同一工作流内的依赖（条件、阻断任务）只使用 `dep_tasks` 与 `status`；
/// 跨工作流依赖需要 `definition_id`、`cycle` 和 `date_value`。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DependentItem {
    #[serde(default)]
    pub definition_id: Option<i64>,
    pub dep_tasks: String,
    #[serde(default)]
    pub cycle: Option<String>,
    #[serde(default)]
    pub date_value: Option<String>,
    #[serde(default)]
    pub status: Option<ExecutionStatus>,
}

impl DependentItem {
    /// 同一工作流内的状态依赖
    pub fn local(dep_tasks: impl Into<String>, status: ExecutionStatus) -> Self {
        Self {
            definition_id: None,
            dep_tasks: dep_tasks.into(),
            cycle: None,
            date_value: None,
            status: Some(status),
        }
    }
}

/// 一组依赖项
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DependentTaskModel {
    #[serde(default)]
    pub relation: DependentRelation,
    #[serde(default)]
    pub depend_item_list: Vec<DependentItem>,
}

/// 依赖表达式
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DependentParameters {
    #[serde(default)]
    pub relation: DependentRelation,
    #[serde(default)]
    pub depend_task_list: Vec<DependentTaskModel>,
}

/// 依赖任务参数
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DependentTaskParameters {
    #[serde(default)]
    pub dependence: DependentParameters,
}

/// 条件分支
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConditionResult {
    #[serde(default)]
    pub success_node: Vec<String>,
    #[serde(default)]
    pub failed_node: Vec<String>,
}

/// 条件任务参数
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConditionsParameters {
    #[serde(default)]
    pub dependence: DependentParameters,
    #[serde(default)]
    pub condition_result: ConditionResult,
}

/// Switch分支
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SwitchBranch {
    pub condition: String,
    pub next_node: String,
}

/// Switch结果定义
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SwitchResult {
    #[serde(default)]
    pub depend_task_list: Vec<SwitchBranch>,
    /// 无分支命中时的默认节点
    #[serde(default)]
    pub next_node: Option<String>,
}

impl SwitchResult {
    /// 所有可能的后续节点
    pub fn all_next_nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = Vec::new();
        let candidates = self
            .depend_task_list
            .iter()
            .map(|b| &b.next_node)
            .chain(self.next_node.iter());
        for node in candidates {
            if !node.is_empty() && !nodes.contains(node) {
                nodes.push(node.clone());
            }
        }
        nodes
    }
}

/// Switch任务参数
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SwitchParameters {
    #[serde(default)]
    pub switch_result: SwitchResult,
}

/// 阻断条件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum BlockingCondition {
    #[default]
    BlockingOnFailed,
    BlockingOnSuccess,
}

/// 阻断任务参数
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockingParameters {
    #[serde(default)]
    pub dependence: DependentParameters,
    #[serde(default)]
    pub blocking_condition: BlockingCondition,
    #[serde(default)]
    pub alert_when_blocking: bool,
}

impl BlockingParameters {
    /// 依赖结果是否触发阻断
    pub fn is_blocked(&self, result: DependResult) -> bool {
        match self.blocking_condition {
            BlockingCondition::BlockingOnFailed => result == DependResult::Failed,
            BlockingCondition::BlockingOnSuccess => result == DependResult::Success,
        }
    }
}
