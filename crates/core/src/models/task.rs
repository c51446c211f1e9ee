use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::enums::{ExecutionStatus, Flag, Priority, RunFlag, TimeoutStrategy};
use super::params::SubProcessParameters;
use super::process::{Property, DEFAULT_WORKER_GROUP};
use crate::{SchedulerError, SchedulerResult};

/// 引擎自行解释的控制类任务类型，其他类型都交给外部Worker执行
pub mod task_types {
    pub const SUB_PROCESS: &str = "SUB_PROCESS";
    pub const DEPENDENT: &str = "DEPENDENT";
    pub const CONDITIONS: &str = "CONDITIONS";
    pub const SWITCH: &str = "SWITCH";
    pub const BLOCKING: &str = "BLOCKING";
}

/// 任务超时配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskTimeout {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub strategy: TimeoutStrategy,
    /// 超时阈值（分钟）
    #[serde(default)]
    pub interval: i32,
}

/// DAG节点描述
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskNode {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub pre_tasks: Vec<String>,
    #[serde(default)]
    pub run_flag: RunFlag,
    #[serde(default)]
    pub max_retry_times: i32,
    /// 重试间隔（分钟）
    #[serde(default)]
    pub retry_interval: i32,
    #[serde(default)]
    pub task_instance_priority: Priority,
    #[serde(default)]
    pub worker_group: Option<String>,
    #[serde(default)]
    pub timeout: TaskTimeout,
}

impl TaskNode {
    pub fn new(name: impl Into<String>, task_type: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            desc: None,
            task_type: task_type.into(),
            params: serde_json::Value::Null,
            pre_tasks: Vec::new(),
            run_flag: RunFlag::Normal,
            max_retry_times: 0,
            retry_interval: 1,
            task_instance_priority: Priority::default(),
            worker_group: None,
            timeout: TaskTimeout::default(),
        }
    }

    pub fn is_forbidden(&self) -> bool {
        self.run_flag == RunFlag::Forbidden
    }

    pub fn is_sub_process(&self) -> bool {
        self.task_type == task_types::SUB_PROCESS
    }

    pub fn is_conditions(&self) -> bool {
        self.task_type == task_types::CONDITIONS
    }

    pub fn is_switch(&self) -> bool {
        self.task_type == task_types::SWITCH
    }

    pub fn sub_process_definition_id(&self) -> Option<i64> {
        if !self.is_sub_process() {
            return None;
        }
        parse_params::<SubProcessParameters>(&self.params)
            .ok()
            .map(|p| p.process_definition_id)
    }
}

/// 解析任务参数快照
pub fn parse_params<T: DeserializeOwned>(params: &serde_json::Value) -> SchedulerResult<T> {
    serde_json::from_value(params.clone())
        .map_err(|e| SchedulerError::InvalidTaskParams(e.to_string()))
}

/// 任务实例：某个DAG节点在工作流实例中的一次执行尝试
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskInstance {
    pub id: i64,
    pub name: String,
    pub task_type: String,
    pub process_definition_id: i64,
    pub process_instance_id: i64,
    /// 提交时的任务参数快照
    pub task_params: serde_json::Value,
    pub state: ExecutionStatus,
    pub submit_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub host: Option<String>,
    pub alert_flag: Flag,
    pub retry_times: i32,
    pub max_retry_times: i32,
    /// 重试间隔（分钟）
    pub retry_interval: i32,
    pub flag: Flag,
    pub task_instance_priority: Priority,
    pub process_instance_priority: Priority,
    /// 依赖判断结果等控制类任务的附加信息
    pub dependency: Option<String>,
    pub worker_group: String,
    pub executor_id: i64,
    pub var_pool: Vec<Property>,
    pub timeout: TaskTimeout,
    pub first_submit_time: Option<DateTime<Utc>>,
}

impl TaskInstance {
    /// 根据DAG节点创建新的任务实例
    pub fn from_node(node: &TaskNode, process_definition_id: i64, process_instance_id: i64) -> Self {
        Self {
            id: 0,
            name: node.name.clone(),
            task_type: node.task_type.clone(),
            process_definition_id,
            process_instance_id,
            task_params: node.params.clone(),
            state: ExecutionStatus::SubmittedSuccess,
            submit_time: None,
            start_time: None,
            end_time: None,
            host: None,
            alert_flag: Flag::No,
            retry_times: 0,
            max_retry_times: node.max_retry_times,
            retry_interval: node.retry_interval,
            flag: Flag::Yes,
            task_instance_priority: node.task_instance_priority,
            process_instance_priority: Priority::default(),
            dependency: None,
            worker_group: node
                .worker_group
                .clone()
                .filter(|g| !g.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_WORKER_GROUP.to_string()),
            executor_id: 0,
            var_pool: Vec::new(),
            timeout: node.timeout.clone(),
            first_submit_time: None,
        }
    }

    pub fn is_sub_process(&self) -> bool {
        self.task_type == task_types::SUB_PROCESS
    }

    pub fn is_conditions(&self) -> bool {
        self.task_type == task_types::CONDITIONS
    }

    pub fn is_valid(&self) -> bool {
        self.flag == Flag::Yes
    }

    /// 失败任务是否还能重试；容错任务总是可以重新提交
    pub fn can_retry(&self) -> bool {
        if self.is_sub_process() {
            return false;
        }
        match self.state {
            ExecutionStatus::NeedFaultTolerance => true,
            ExecutionStatus::Failure => self.retry_times < self.max_retry_times,
            _ => false,
        }
    }

    /// 已完成且不会再被调度
    pub fn is_complete(&self) -> bool {
        self.state.is_pause()
            || self.state.is_success()
            || self.state.is_cancel()
            || (self.state.is_failure() && !self.can_retry())
    }

    /// 重试间隔是否已过
    pub fn retry_interval_elapsed(&self, now: DateTime<Utc>) -> bool {
        if self.state != ExecutionStatus::Failure {
            return true;
        }
        match self.end_time {
            Some(end) => now >= end + chrono::Duration::minutes(i64::from(self.retry_interval)),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_json_shape() {
        let node: TaskNode = serde_json::from_str(
            r#"{"name":"sub","type":"SUB_PROCESS","params":{"processDefinitionId":9},"preTasks":["a"],"runFlag":"FORBIDDEN","taskInstancePriority":"HIGH","timeout":{"enable":true,"strategy":"WARNFAILED","interval":5}}"#,
        )
        .unwrap();
        assert!(node.is_forbidden());
        assert_eq!(node.pre_tasks, vec!["a".to_string()]);
        assert_eq!(node.sub_process_definition_id(), Some(9));
        assert_eq!(node.timeout.strategy, TimeoutStrategy::Warnfailed);
        assert_eq!(node.task_instance_priority, Priority::High);
    }

    #[test]
    fn test_retry_rules() {
        let node = TaskNode {
            max_retry_times: 2,
            ..TaskNode::new("a", "SHELL")
        };
        let mut task = TaskInstance::from_node(&node, 1, 1);
        task.state = ExecutionStatus::Failure;
        task.retry_times = 1;
        assert!(task.can_retry());
        assert!(!task.is_complete());
        task.retry_times = 2;
        assert!(!task.can_retry());
        assert!(task.is_complete());
        task.state = ExecutionStatus::NeedFaultTolerance;
        assert!(task.can_retry());
    }

    #[test]
    fn test_sub_process_never_retries() {
        let node = TaskNode {
            max_retry_times: 3,
            ..TaskNode::new("sub", task_types::SUB_PROCESS)
        };
        let mut task = TaskInstance::from_node(&node, 1, 1);
        task.state = ExecutionStatus::Failure;
        assert!(!task.can_retry());
    }

    #[test]
    fn test_retry_interval() {
        let mut task = TaskInstance::from_node(&TaskNode::new("a", "SHELL"), 1, 1);
        let now = Utc::now();
        task.state = ExecutionStatus::Failure;
        task.retry_interval = 1;
        task.end_time = Some(now);
        assert!(!task.retry_interval_elapsed(now));
        assert!(task.retry_interval_elapsed(now + chrono::Duration::minutes(1)));
    }

    #[test]
    fn test_default_worker_group() {
        let task = TaskInstance::from_node(&TaskNode::new("a", "SHELL"), 1, 1);
        assert_eq!(task.worker_group, DEFAULT_WORKER_GROUP);
    }
}
