//! 命令物化
//!
//! 将一条命令转换为可运行的工作流实例：新建或恢复实例、按命令类型重置任务、
//! 检查线程预算，并维护父子工作流的关联。

use std::collections::HashSet;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use scheduler_core::models::{
    join_properties, Command, CommandParams, CommandType, ErrorCommand, ExecutionStatus, Flag,
    ProcessDefinition, ProcessInstance, TaskDependType, TaskInstance, DEFAULT_WORKER_GROUP,
};
use scheduler_core::utils::params::{apply_start_params, cure_global_params};
use scheduler_core::{SchedulerError, SchedulerResult};

use crate::commands::create_recovery_waiting_thread_command;
use crate::context::EngineContext;

pub struct Materializer {
    ctx: EngineContext,
}

impl Materializer {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// 处理一条命令
    ///
    /// 返回 `None` 表示命令已被消费但没有产生可运行的实例：参数错误时转入错误命令表，
    /// 线程不足时实例进入等待线程状态。
    #[instrument(skip(self, command), fields(command_id = command.id, command_type = %command.command_type))]
    pub async fn handle_command(
        &self,
        command: &Command,
        available_threads: usize,
    ) -> SchedulerResult<Option<ProcessInstance>> {
        let mut instance = match self.construct_process_instance(command).await {
            Ok(instance) => instance,
            Err(e) => {
                error!("命令 {} 无法构造工作流实例: {}", command.id, e);
                self.move_to_error_command(command, &e.to_string()).await?;
                return Ok(None);
            }
        };

        let required = self.required_threads(command.process_definition_id).await?;
        if required > available_threads {
            info!(
                "线程不足，命令 {} 需要 {} 个线程，当前可用 {}",
                command.id, required, available_threads
            );
            self.set_waiting_thread(command, &mut instance).await?;
            return Ok(None);
        }

        instance.command_type = command.command_type;
        instance.add_history_cmd(command.command_type);
        instance.command_start_time = Some(command.start_time);
        self.ctx.process_instances.save(&mut instance).await?;
        self.set_sub_process_param(&mut instance).await?;
        self.ctx.commands.delete(command.id).await?;
        self.ctx
            .metrics
            .record_command_handled(command.command_type.as_str());

        info!(
            "命令 {} 已物化为工作流实例 {} ({})",
            command.id, instance.id, instance.name
        );
        Ok(Some(instance))
    }

    /// 将命令转入错误命令表并删除原命令
    pub async fn move_to_error_command(&self, command: &Command, message: &str) -> SchedulerResult<()> {
        self.ctx
            .error_commands
            .insert(&ErrorCommand::from_command(command, message))
            .await?;
        self.ctx.commands.delete(command.id).await?;
        self.ctx.metrics.record_error_command(command.id, message);
        Ok(())
    }

    async fn construct_process_instance(&self, command: &Command) -> SchedulerResult<ProcessInstance> {
        let definition = self
            .ctx
            .process_definitions
            .find_by_id(command.process_definition_id)
            .await?
            .ok_or(SchedulerError::ProcessDefinitionNotFound {
                id: command.process_definition_id,
            })?;
        let mut params = command.params()?;

        let target_id = if let Some(id) = params.recover_process_instance_id {
            if id == 0 {
                return Err(SchedulerError::InvalidCommandParam(
                    "恢复命令的工作流实例ID为0".to_string(),
                ));
            }
            id
        } else if let Some(id) = params.sub_process_instance_id {
            id
        } else {
            params.waiting_thread_instance_id.unwrap_or(0)
        };

        let mut instance = if target_id == 0 {
            self.generate_new_instance(&definition, command, &params)?
        } else {
            let mut instance = self
                .ctx
                .process_instances
                .find_by_id(target_id)
                .await?
                .ok_or(SchedulerError::ProcessInstanceNotFound { id: target_id })?;
            let command_type = if instance.is_complement_data() {
                CommandType::ComplementData
            } else {
                command.command_type
            };
            let mut global_params = definition.global_params()?;
            if command_type == CommandType::RepeatRunning {
                if let Some(start_params) = &params.start_params {
                    apply_start_params(&mut global_params, start_params);
                }
            }
            instance.global_params =
                cure_global_params(&global_params, command_type, instance.schedule_time, Utc::now());
            instance
        };

        params.merge_missing(&instance.command_param);
        instance.command_param = params.clone();

        check_command_params(command, &params)?;

        if command.schedule_time.is_some() {
            instance.schedule_time = command.schedule_time;
        }
        instance.host = Some(self.ctx.host().to_string());

        let mut run_state = ExecutionStatus::RunningExecution;
        match command.command_type {
            CommandType::StartFailureTaskProcess => {
                let ids = self
                    .reset_tasks_in_states(
                        instance.id,
                        &[
                            ExecutionStatus::Failure,
                            ExecutionStatus::Kill,
                            ExecutionStatus::NeedFaultTolerance,
                        ],
                    )
                    .await?;
                instance.command_param.set_start_node_ids(&ids);
                instance.run_times += 1;
            }
            CommandType::RecoverSuspendedProcess => {
                let ids = self
                    .reset_tasks_in_states(
                        instance.id,
                        &[ExecutionStatus::Pause, ExecutionStatus::Kill],
                    )
                    .await?;
                instance.command_param.set_start_node_ids(&ids);
                instance.run_times += 1;
            }
            CommandType::RecoverToleranceFaultProcess => {
                instance.recovery = Flag::Yes;
                run_state = instance.state;
            }
            CommandType::ComplementData => {
                self.invalidate_valid_tasks(instance.id).await?;
                instance.start_time = Some(Utc::now());
                instance.end_time = None;
                instance.run_times += 1;
                init_complement_data_param(&definition, &mut instance)?;
            }
            CommandType::RepeatRunning => {
                instance.command_param.start_node_id_list = None;
                self.invalidate_valid_tasks(instance.id).await?;
                instance.start_time = Some(Utc::now());
                instance.end_time = None;
                instance.run_times += 1;
                init_complement_data_param(&definition, &mut instance)?;
            }
            CommandType::StartProcess
            | CommandType::StartCurrentTaskProcess
            | CommandType::RecoverWaitingThread
            | CommandType::Scheduler => {}
        }
        instance.state = run_state;
        Ok(instance)
    }

    fn generate_new_instance(
        &self,
        definition: &ProcessDefinition,
        command: &Command,
        params: &CommandParams,
    ) -> SchedulerResult<ProcessInstance> {
        let now = Utc::now();
        let mut instance = ProcessInstance::from_definition(definition);
        instance.name = format!(
            "{}-{}-{}",
            definition.name,
            instance.run_times,
            now.format("%Y%m%d%H%M%S%3f")
        );
        instance.state = ExecutionStatus::RunningExecution;
        instance.recovery = Flag::No;
        instance.start_time = Some(now);
        instance.command_param = params.clone();
        instance.command_type = command.command_type;
        instance.task_depend_type = command.task_depend_type;
        instance.failure_strategy = command.failure_strategy;
        instance.executor_id = command.executor_id;
        instance.warning_type = command.warning_type;
        instance.warning_group_id = command.warning_group_id;
        instance.command_start_time = Some(command.start_time);
        instance.process_instance_priority = command.process_instance_priority;
        instance.worker_group = command
            .worker_group
            .clone()
            .filter(|g| !g.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_WORKER_GROUP.to_string());
        if params.sub_process_instance_id.is_some() {
            instance.is_sub_process = Flag::Yes;
        }

        instance.schedule_time = match command.schedule_time {
            Some(time) => Some(time),
            None => params.complement_range()?.map(|(start, _)| start),
        };

        let mut global_params = definition.global_params()?;
        if let Some(start_params) = &params.start_params {
            apply_start_params(&mut global_params, start_params);
        }
        let command_type = if instance.is_complement_data() {
            CommandType::ComplementData
        } else {
            command.command_type
        };
        instance.global_params =
            cure_global_params(&global_params, command_type, instance.schedule_time, now);
        Ok(instance)
    }

    /// 将指定状态的任务重新初始化，返回这些任务的ID
    async fn reset_tasks_in_states(
        &self,
        process_instance_id: i64,
        states: &[ExecutionStatus],
    ) -> SchedulerResult<Vec<i64>> {
        let tasks: Vec<TaskInstance> = self
            .ctx
            .task_instances
            .find_valid_by_process_instance(process_instance_id)
            .await?
            .into_iter()
            .filter(|t| states.contains(&t.state))
            .collect();

        let mut ids = Vec::with_capacity(tasks.len());
        for mut task in tasks {
            ids.push(task.id);
            init_task_instance(&mut task);
            self.ctx.task_instances.save(&mut task).await?;
        }
        debug!("工作流实例 {} 重置了 {} 个任务", process_instance_id, ids.len());
        Ok(ids)
    }

    async fn invalidate_valid_tasks(&self, process_instance_id: i64) -> SchedulerResult<()> {
        let tasks = self
            .ctx
            .task_instances
            .find_valid_by_process_instance(process_instance_id)
            .await?;
        for mut task in tasks {
            task.flag = Flag::No;
            self.ctx.task_instances.save(&mut task).await?;
        }
        Ok(())
    }

    /// 工作流及其全部子工作流需要的线程数
    async fn required_threads(&self, process_definition_id: i64) -> SchedulerResult<usize> {
        let mut visited = HashSet::new();
        let mut pending = vec![process_definition_id];
        let mut count = 0usize;
        while let Some(definition_id) = pending.pop() {
            if !visited.insert(definition_id) {
                warn!("工作流定义 {} 的子工作流存在循环引用", definition_id);
                continue;
            }
            count += 1;
            if let Some(definition) = self.ctx.process_definitions.find_by_id(definition_id).await? {
                pending.extend(definition.sub_process_definition_ids()?);
            }
        }
        Ok(count)
    }

    async fn set_waiting_thread(
        &self,
        command: &Command,
        instance: &mut ProcessInstance,
    ) -> SchedulerResult<()> {
        instance.state = ExecutionStatus::WaitingThread;
        if command.command_type != CommandType::RecoverWaitingThread {
            instance.add_history_cmd(command.command_type);
        }
        self.ctx.process_instances.save(instance).await?;
        self.set_sub_process_param(instance).await?;
        create_recovery_waiting_thread_command(&self.ctx, Some(command), instance).await
    }

    /// 回写子工作流实例ID、继承父实例参数并更新父子关联
    async fn set_sub_process_param(&self, instance: &mut ProcessInstance) -> SchedulerResult<()> {
        if instance.command_param.sub_process_instance_id == Some(0) {
            instance.command_param.sub_process_instance_id = Some(instance.id);
            instance.is_sub_process = Flag::Yes;
            self.ctx.process_instances.save(instance).await?;
        }

        let Some(parent_id) = instance.command_param.parent_process_instance_id else {
            return Ok(());
        };
        match self.ctx.process_instances.find_by_id(parent_id).await? {
            Some(parent) => {
                instance.global_params = join_properties(&instance.global_params, &parent.global_params);
                self.ctx.process_instances.save(instance).await?;
            }
            None => error!("子工作流命令参数错误，找不到父实例: {}", parent_id),
        }

        let parent_task_id = instance.command_param.parent_task_instance_id.unwrap_or(0);
        if let Some(mut map) = self
            .ctx
            .process_instance_maps
            .find(parent_id, parent_task_id)
            .await?
        {
            map.process_instance_id = instance.id;
            self.ctx.process_instance_maps.save(&mut map).await?;
        }
        Ok(())
    }
}

/// 仅运行指定节点时必须给出节点列表
fn check_command_params(command: &Command, params: &CommandParams) -> SchedulerResult<()> {
    let partial = matches!(
        command.task_depend_type,
        TaskDependType::TaskOnly | TaskDependType::TaskPre
    );
    if partial && params.start_node_names().is_empty() {
        return Err(SchedulerError::InvalidCommandParam(format!(
            "依赖方式为 {} 时启动节点列表不能为空",
            command.task_depend_type
        )));
    }
    Ok(())
}

/// 重新初始化任务：非子工作流的失败或取消任务置为无效，其他任务回到已提交状态
fn init_task_instance(task: &mut TaskInstance) {
    if !task.is_sub_process() && (task.state.is_cancel() || task.state.is_failure()) {
        task.flag = Flag::No;
        return;
    }
    task.state = ExecutionStatus::SubmittedSuccess;
}

/// 补数实例以补数起始日为调度时间重新固化全局参数
fn init_complement_data_param(
    definition: &ProcessDefinition,
    instance: &mut ProcessInstance,
) -> SchedulerResult<()> {
    if !instance.is_complement_data() {
        return Ok(());
    }
    if !instance.is_sub_process() {
        if let Some((start, _)) = instance.command_param.complement_range()? {
            instance.schedule_time = Some(start);
        }
    }
    instance.global_params = cure_global_params(
        &definition.global_params()?,
        CommandType::ComplementData,
        instance.schedule_time,
        Utc::now(),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_task_instance() {
        let node = scheduler_core::models::TaskNode::new("a", "SHELL");
        let mut failed = TaskInstance::from_node(&node, 1, 1);
        failed.state = ExecutionStatus::Failure;
        init_task_instance(&mut failed);
        assert_eq!(failed.flag, Flag::No);
        assert_eq!(failed.state, ExecutionStatus::Failure);

        let mut paused = TaskInstance::from_node(&node, 1, 1);
        paused.state = ExecutionStatus::Pause;
        init_task_instance(&mut paused);
        assert_eq!(paused.flag, Flag::Yes);
        assert_eq!(paused.state, ExecutionStatus::SubmittedSuccess);

        let sub_node = scheduler_core::models::TaskNode::new("s", "SUB_PROCESS");
        let mut killed_sub = TaskInstance::from_node(&sub_node, 1, 1);
        killed_sub.state = ExecutionStatus::Kill;
        init_task_instance(&mut killed_sub);
        assert_eq!(killed_sub.flag, Flag::Yes);
        assert_eq!(killed_sub.state, ExecutionStatus::SubmittedSuccess);
    }

    #[test]
    fn test_task_only_requires_start_nodes() {
        let mut command = Command::new(CommandType::StartProcess, 1);
        command.task_depend_type = TaskDependType::TaskOnly;
        assert!(check_command_params(&command, &CommandParams::default()).is_err());

        let params = CommandParams {
            start_node_name_list: Some("a".to_string()),
            ..Default::default()
        };
        assert!(check_command_params(&command, &params).is_ok());
    }
}
