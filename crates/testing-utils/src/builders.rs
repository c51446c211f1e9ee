//! Test data builders for creating engine entities
//!
//! Every builder starts from sensible defaults so a test only spells out
//! the fields it actually asserts on.

use chrono::{DateTime, Utc};
use scheduler_core::models::{
    Command, CommandParams, CommandType, ExecutionStatus, FailureStrategy, Flag, Priority,
    ProcessData, ProcessDefinition, ProcessInstance, Property, RunFlag, TaskDependType, TaskInstance,
    TaskNode, TaskTimeout, TimeoutStrategy, WarningType,
};
use serde_json::Value;

/// Builder for DAG nodes
pub struct TaskNodeBuilder {
    node: TaskNode,
}

impl TaskNodeBuilder {
    pub fn new(name: &str, task_type: &str) -> Self {
        Self {
            node: TaskNode::new(name, task_type),
        }
    }

    pub fn shell(name: &str) -> Self {
        Self::new(name, "SHELL")
    }

    pub fn with_pre_tasks(mut self, pre_tasks: &[&str]) -> Self {
        self.node.pre_tasks = pre_tasks.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.node.params = params;
        self
    }

    pub fn forbidden(mut self) -> Self {
        self.node.run_flag = RunFlag::Forbidden;
        self
    }

    pub fn with_retries(mut self, max_retry_times: i32, retry_interval_minutes: i32) -> Self {
        self.node.max_retry_times = max_retry_times;
        self.node.retry_interval = retry_interval_minutes;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.node.task_instance_priority = priority;
        self
    }

    pub fn with_worker_group(mut self, worker_group: &str) -> Self {
        self.node.worker_group = Some(worker_group.to_string());
        self
    }

    pub fn with_timeout(mut self, strategy: TimeoutStrategy, interval_minutes: i32) -> Self {
        self.node.timeout = TaskTimeout {
            enable: true,
            strategy,
            interval: interval_minutes,
        };
        self
    }

    pub fn build(self) -> TaskNode {
        self.node
    }
}

/// Builder for process definitions
pub struct ProcessDefinitionBuilder {
    definition: ProcessDefinition,
    data: ProcessData,
}

impl Default for ProcessDefinitionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessDefinitionBuilder {
    pub fn new() -> Self {
        Self {
            definition: ProcessDefinition {
                id: 0,
                name: "test_process".to_string(),
                version: 1,
                process_definition_json: String::new(),
                timeout: 0,
                tenant_id: 0,
                receivers: vec![],
                receivers_cc: vec![],
                update_time: Utc::now(),
            },
            data: ProcessData::default(),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.definition.id = id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.definition.name = name.to_string();
        self
    }

    pub fn with_task(mut self, node: TaskNode) -> Self {
        self.data.tasks.push(node);
        self
    }

    pub fn with_tasks(mut self, nodes: Vec<TaskNode>) -> Self {
        self.data.tasks.extend(nodes);
        self
    }

    pub fn with_global_param(mut self, prop: &str, value: &str) -> Self {
        self.data.global_params.push(Property::new(prop, value));
        self
    }

    /// 超时时间（分钟）
    pub fn with_timeout(mut self, minutes: i32) -> Self {
        self.definition.timeout = minutes;
        self.data.timeout = minutes;
        self
    }

    pub fn with_receivers(mut self, receivers: &[&str]) -> Self {
        self.definition.receivers = receivers.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn build(mut self) -> ProcessDefinition {
        self.definition.process_definition_json =
            serde_json::to_string(&self.data).unwrap_or_default();
        self.definition
    }
}

/// Builder for commands
pub struct CommandBuilder {
    command: Command,
}

impl CommandBuilder {
    pub fn new(command_type: CommandType, process_definition_id: i64) -> Self {
        Self {
            command: Command::new(command_type, process_definition_id),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.command.id = id;
        self
    }

    pub fn with_params(mut self, params: CommandParams) -> Self {
        self.command.command_param = params.to_json().ok();
        self
    }

    pub fn with_raw_params(mut self, raw: &str) -> Self {
        self.command.command_param = Some(raw.to_string());
        self
    }

    pub fn with_depend_type(mut self, depend_type: TaskDependType) -> Self {
        self.command.task_depend_type = depend_type;
        self
    }

    pub fn with_failure_strategy(mut self, strategy: FailureStrategy) -> Self {
        self.command.failure_strategy = strategy;
        self
    }

    pub fn with_warning(mut self, warning_type: WarningType, group_id: Option<i64>) -> Self {
        self.command.warning_type = warning_type;
        self.command.warning_group_id = group_id;
        self
    }

    pub fn with_schedule_time(mut self, schedule_time: DateTime<Utc>) -> Self {
        self.command.schedule_time = Some(schedule_time);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.command.process_instance_priority = priority;
        self
    }

    pub fn with_worker_group(mut self, worker_group: &str) -> Self {
        self.command.worker_group = Some(worker_group.to_string());
        self
    }

    pub fn build(self) -> Command {
        self.command
    }
}

/// Builder for process instances
pub struct ProcessInstanceBuilder {
    instance: ProcessInstance,
}

impl ProcessInstanceBuilder {
    pub fn new(definition: &ProcessDefinition) -> Self {
        Self {
            instance: ProcessInstance::from_definition(definition),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.instance.id = id;
        self
    }

    pub fn with_state(mut self, state: ExecutionStatus) -> Self {
        self.instance.state = state;
        self
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.instance.host = Some(host.to_string());
        self
    }

    pub fn with_command_type(mut self, command_type: CommandType) -> Self {
        self.instance.command_type = command_type;
        self.instance.add_history_cmd(command_type);
        self
    }

    pub fn with_params(mut self, params: CommandParams) -> Self {
        self.instance.command_param = params;
        self
    }

    pub fn with_schedule_time(mut self, schedule_time: DateTime<Utc>) -> Self {
        self.instance.schedule_time = Some(schedule_time);
        self
    }

    pub fn with_failure_strategy(mut self, strategy: FailureStrategy) -> Self {
        self.instance.failure_strategy = strategy;
        self
    }

    pub fn with_depend_type(mut self, depend_type: TaskDependType) -> Self {
        self.instance.task_depend_type = depend_type;
        self
    }

    pub fn with_warning(mut self, warning_type: WarningType) -> Self {
        self.instance.warning_type = warning_type;
        self
    }

    pub fn sub_process(mut self) -> Self {
        self.instance.is_sub_process = Flag::Yes;
        self
    }

    pub fn build(self) -> ProcessInstance {
        self.instance
    }
}

/// Builder for task instances
pub struct TaskInstanceBuilder {
    task: TaskInstance,
}

impl TaskInstanceBuilder {
    pub fn new(name: &str, process_instance_id: i64) -> Self {
        let node = TaskNode::new(name, "SHELL");
        Self {
            task: TaskInstance::from_node(&node, 0, process_instance_id),
        }
    }

    pub fn from_node(node: &TaskNode, process_instance_id: i64) -> Self {
        Self {
            task: TaskInstance::from_node(node, 0, process_instance_id),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.task.id = id;
        self
    }

    pub fn with_task_type(mut self, task_type: &str) -> Self {
        self.task.task_type = task_type.to_string();
        self
    }

    pub fn with_state(mut self, state: ExecutionStatus) -> Self {
        self.task.state = state;
        self
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.task.host = Some(host.to_string());
        self
    }

    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.task.start_time = Some(start_time);
        self
    }

    pub fn with_retry(mut self, retry_times: i32, max_retry_times: i32) -> Self {
        self.task.retry_times = retry_times;
        self.task.max_retry_times = max_retry_times;
        self
    }

    pub fn invalid(mut self) -> Self {
        self.task.flag = Flag::No;
        self
    }

    pub fn build(self) -> TaskInstance {
        self.task
    }
}
