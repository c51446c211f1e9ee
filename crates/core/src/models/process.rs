use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::command::CommandParams;
use super::enums::{
    CommandType, ExecutionStatus, FailureStrategy, Flag, Priority, TaskDependType, WarningType,
};
use super::task::TaskNode;
use crate::SchedulerResult;

/// 默认Worker分组
pub const DEFAULT_WORKER_GROUP: &str = "default";

/// 参数方向
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direct {
    #[default]
    In,
    Out,
}

/// 全局参数或任务输出变量
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Property {
    pub prop: String,
    #[serde(default)]
    pub direct: Direct,
    #[serde(rename = "type", default = "default_property_type")]
    pub data_type: String,
    #[serde(default)]
    pub value: String,
}

fn default_property_type() -> String {
    "VARCHAR".to_string()
}

impl Property {
    pub fn new(prop: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            prop: prop.into(),
            direct: Direct::In,
            data_type: default_property_type(),
            value: value.into(),
        }
    }

    pub fn output(prop: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            direct: Direct::Out,
            ..Self::new(prop, value)
        }
    }
}

/// 合并属性列表，`primary` 中的同名属性优先
pub fn join_properties(primary: &[Property], secondary: &[Property]) -> Vec<Property> {
    let mut joined = primary.to_vec();
    for property in secondary {
        if !joined.iter().any(|p| p.prop == property.prop) {
            joined.push(property.clone());
        }
    }
    joined
}

/// 工作流定义中的流程数据（任务图JSON）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessData {
    #[serde(default)]
    pub global_params: Vec<Property>,
    #[serde(default)]
    pub tasks: Vec<TaskNode>,
    /// 超时时间（分钟），0表示不限制
    #[serde(default)]
    pub timeout: i32,
    #[serde(default)]
    pub tenant_id: i64,
}

impl ProcessData {
    pub fn from_json(raw: &str) -> SchedulerResult<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> SchedulerResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// 工作流定义，引擎只读
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessDefinition {
    pub id: i64,
    pub name: String,
    pub version: i32,
    pub process_definition_json: String,
    pub timeout: i32,
    pub tenant_id: i64,
    pub receivers: Vec<String>,
    pub receivers_cc: Vec<String>,
    pub update_time: DateTime<Utc>,
}

impl ProcessDefinition {
    pub fn process_data(&self) -> SchedulerResult<ProcessData> {
        ProcessData::from_json(&self.process_definition_json)
    }

    pub fn global_params(&self) -> SchedulerResult<Vec<Property>> {
        Ok(self.process_data()?.global_params)
    }

    /// 定义中引用的子工作流定义ID
    pub fn sub_process_definition_ids(&self) -> SchedulerResult<Vec<i64>> {
        Ok(self
            .process_data()?
            .tasks
            .iter()
            .filter_map(|node| node.sub_process_definition_id())
            .collect())
    }
}

/// 工作流实例
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessInstance {
    pub id: i64,
    pub process_definition_id: i64,
    pub name: String,
    pub state: ExecutionStatus,
    pub recovery: Flag,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub run_times: i32,
    pub host: Option<String>,
    pub command_type: CommandType,
    pub command_param: CommandParams,
    pub task_depend_type: TaskDependType,
    pub max_try_times: i32,
    pub failure_strategy: FailureStrategy,
    pub warning_type: WarningType,
    pub warning_group_id: Option<i64>,
    pub schedule_time: Option<DateTime<Utc>>,
    pub command_start_time: Option<DateTime<Utc>>,
    pub global_params: Vec<Property>,
    pub var_pool: Vec<Property>,
    /// 实例创建时的流程数据快照
    pub process_instance_json: String,
    pub is_sub_process: Flag,
    pub executor_id: i64,
    /// 逗号分隔的历史命令类型
    pub history_cmd: String,
    pub process_instance_priority: Priority,
    pub worker_group: String,
    pub timeout: i32,
    pub tenant_id: i64,
    pub update_time: DateTime<Utc>,
}

impl ProcessInstance {
    /// 基于工作流定义创建新的实例骨架
    pub fn from_definition(definition: &ProcessDefinition) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            process_definition_id: definition.id,
            name: definition.name.clone(),
            state: ExecutionStatus::RunningExecution,
            recovery: Flag::No,
            start_time: Some(now),
            end_time: None,
            run_times: 1,
            host: None,
            command_type: CommandType::StartProcess,
            command_param: CommandParams::default(),
            task_depend_type: TaskDependType::default(),
            max_try_times: 0,
            failure_strategy: FailureStrategy::default(),
            warning_type: WarningType::default(),
            warning_group_id: None,
            schedule_time: None,
            command_start_time: None,
            global_params: Vec::new(),
            var_pool: Vec::new(),
            process_instance_json: definition.process_definition_json.clone(),
            is_sub_process: Flag::No,
            executor_id: 0,
            history_cmd: String::new(),
            process_instance_priority: Priority::default(),
            worker_group: DEFAULT_WORKER_GROUP.to_string(),
            timeout: definition.timeout,
            tenant_id: definition.tenant_id,
            update_time: now,
        }
    }

    pub fn add_history_cmd(&mut self, command_type: CommandType) {
        if self.history_cmd.is_empty() {
            self.history_cmd = command_type.as_str().to_string();
        } else {
            self.history_cmd = format!("{},{}", self.history_cmd, command_type.as_str());
        }
    }

    pub fn history_cmds(&self) -> Vec<CommandType> {
        self.history_cmd
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect()
    }

    /// 补数实例：当前命令为补数，或首条历史命令为补数
    pub fn is_complement_data(&self) -> bool {
        self.command_type == CommandType::ComplementData
            || self.history_cmds().first() == Some(&CommandType::ComplementData)
    }

    pub fn is_sub_process(&self) -> bool {
        self.is_sub_process == Flag::Yes
    }

    pub fn process_data(&self) -> SchedulerResult<ProcessData> {
        ProcessData::from_json(&self.process_instance_json)
    }
}

/// 父子工作流实例关联
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessInstanceMap {
    pub id: i64,
    pub parent_process_instance_id: i64,
    pub parent_task_instance_id: i64,
    /// 子工作流实例ID，0表示子实例尚未创建
    pub process_instance_id: i64,
}

/// 定时配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub id: i64,
    pub process_definition_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub crontab: String,
    /// 已上线
    pub online: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> ProcessDefinition {
        ProcessDefinition {
            id: 1,
            name: "daily".to_string(),
            version: 1,
            process_definition_json: r#"{"globalParams":[{"prop":"dt","value":"$[yyyyMMdd]"}],"tasks":[],"timeout":30}"#.to_string(),
            timeout: 30,
            tenant_id: 0,
            receivers: vec![],
            receivers_cc: vec![],
            update_time: Utc::now(),
        }
    }

    #[test]
    fn test_history_cmd_trail() {
        let mut instance = ProcessInstance::from_definition(&definition());
        instance.add_history_cmd(CommandType::ComplementData);
        instance.add_history_cmd(CommandType::RepeatRunning);
        assert_eq!(instance.history_cmd, "COMPLEMENT_DATA,REPEAT_RUNNING");
        instance.command_type = CommandType::RepeatRunning;
        assert!(instance.is_complement_data());
    }

    #[test]
    fn test_definition_global_params() {
        let params = definition().global_params().unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].direct, Direct::In);
        assert_eq!(params[0].data_type, "VARCHAR");
    }

    #[test]
    fn test_join_properties_prefers_primary() {
        let child = vec![Property::new("a", "child")];
        let parent = vec![Property::new("a", "parent"), Property::new("b", "parent")];
        let joined = join_properties(&child, &parent);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].value, "child");
        assert_eq!(joined[1].prop, "b");
    }
}
