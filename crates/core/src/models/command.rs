use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::enums::{CommandType, FailureStrategy, Priority, TaskDependType, WarningType};
use crate::utils::date::{format_datetime, parse_datetime};
use crate::SchedulerResult;

/// 待处理命令
///
/// 由外部触发（手动运行、定时触发、重跑按钮）写入，由实例化器消费且仅消费一次。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Command {
    pub id: i64,
    pub command_type: CommandType,
    pub process_definition_id: i64,
    /// 原始JSON命令参数
    pub command_param: Option<String>,
    pub task_depend_type: TaskDependType,
    pub failure_strategy: FailureStrategy,
    pub warning_type: WarningType,
    pub warning_group_id: Option<i64>,
    pub schedule_time: Option<DateTime<Utc>>,
    pub start_time: DateTime<Utc>,
    pub executor_id: i64,
    pub process_instance_priority: Priority,
    pub worker_group: Option<String>,
    pub update_time: DateTime<Utc>,
}

impl Command {
    pub fn new(command_type: CommandType, process_definition_id: i64) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            command_type,
            process_definition_id,
            command_param: None,
            task_depend_type: TaskDependType::default(),
            failure_strategy: FailureStrategy::default(),
            warning_type: WarningType::default(),
            warning_group_id: None,
            schedule_time: None,
            start_time: now,
            executor_id: 0,
            process_instance_priority: Priority::default(),
            worker_group: None,
            update_time: now,
        }
    }

    /// 解析命令参数，空参数视为空对象
    pub fn params(&self) -> SchedulerResult<CommandParams> {
        match self.command_param.as_deref() {
            Some(raw) if !raw.trim().is_empty() => CommandParams::from_json(raw),
            _ => Ok(CommandParams::default()),
        }
    }

    pub fn set_params(&mut self, params: &CommandParams) -> SchedulerResult<()> {
        self.command_param = Some(params.to_json()?);
        Ok(())
    }
}

/// 无法处理的命令记录，仅插入
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorCommand {
    pub id: i64,
    pub command: Command,
    pub message: String,
}

impl ErrorCommand {
    pub fn from_command(command: &Command, message: impl Into<String>) -> Self {
        Self {
            id: command.id,
            command: command.clone(),
            message: message.into(),
        }
    }
}

/// 命令参数
///
/// 与命令一同持久化的JSON对象。已知键映射为字段，其余键原样保留。
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommandParams {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "lenient_id"
    )]
    pub recover_process_instance_id: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "lenient_id"
    )]
    pub sub_process_instance_id: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "lenient_id"
    )]
    pub parent_process_instance_id: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "lenient_id"
    )]
    pub parent_task_instance_id: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "lenient_id"
    )]
    pub waiting_thread_instance_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_node_id_list: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_node_name_list: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complement_start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complement_end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_params: Option<HashMap<String, String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CommandParams {
    pub fn from_json(raw: &str) -> SchedulerResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> SchedulerResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// 启动节点名称列表
    pub fn start_node_names(&self) -> Vec<String> {
        split_list(self.start_node_name_list.as_deref())
    }

    /// 需要恢复的任务实例ID列表
    pub fn start_node_ids(&self) -> Vec<i64> {
        split_list(self.start_node_id_list.as_deref())
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect()
    }

    pub fn set_start_node_ids(&mut self, ids: &[i64]) {
        let joined = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.start_node_id_list = Some(joined);
    }

    pub fn complement_range(&self) -> SchedulerResult<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        match (&self.complement_start_date, &self.complement_end_date) {
            (Some(start), Some(end)) => Ok(Some((parse_datetime(start)?, parse_datetime(end)?))),
            _ => Ok(None),
        }
    }

    pub fn set_complement_range(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        self.complement_start_date = Some(format_datetime(&start));
        self.complement_end_date = Some(format_datetime(&end));
    }

    /// 合并参数，已有的键保持不变
    pub fn merge_missing(&mut self, other: &CommandParams) {
        macro_rules! fill {
            ($($field:ident),+) => {
                $(if self.$field.is_none() {
                    self.$field = other.$field.clone();
                })+
            };
        }
        fill!(
            recover_process_instance_id,
            sub_process_instance_id,
            parent_process_instance_id,
            parent_task_instance_id,
            waiting_thread_instance_id,
            start_node_id_list,
            start_node_name_list,
            complement_start_date,
            complement_end_date,
            start_params
        );
        for (key, value) in &other.extra {
            self.extra.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// 兼容数字与字符串两种写法的ID字段
mod lenient_id {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(id) => serializer.serialize_i64(*id),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid id: {n}"))),
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("invalid id: {s}"))),
            Some(other) => Err(serde::de::Error::custom(format!("invalid id: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_accept_string_ids() {
        let params =
            CommandParams::from_json(r#"{"recoverProcessInstanceId":"12","startNodeIdList":"3, 4"}"#)
                .unwrap();
        assert_eq!(params.recover_process_instance_id, Some(12));
        assert_eq!(params.start_node_ids(), vec![3, 4]);
    }

    #[test]
    fn test_params_keep_unknown_keys() {
        let params = CommandParams::from_json(r#"{"subProcessInstanceId":0,"custom":"x"}"#).unwrap();
        assert_eq!(params.sub_process_instance_id, Some(0));
        let json = params.to_json().unwrap();
        assert!(json.contains("\"custom\":\"x\""));
    }

    #[test]
    fn test_merge_missing_keeps_existing_values() {
        let mut current = CommandParams {
            start_node_name_list: Some("a".to_string()),
            ..Default::default()
        };
        let previous = CommandParams {
            start_node_name_list: Some("b".to_string()),
            complement_start_date: Some("2020-01-01 00:00:00".to_string()),
            ..Default::default()
        };
        current.merge_missing(&previous);
        assert_eq!(current.start_node_names(), vec!["a".to_string()]);
        assert_eq!(
            current.complement_start_date.as_deref(),
            Some("2020-01-01 00:00:00")
        );
    }

    #[test]
    fn test_command_without_params() {
        let command = Command::new(CommandType::StartProcess, 1);
        let params = command.params().unwrap();
        assert!(params.start_node_names().is_empty());
    }
}
