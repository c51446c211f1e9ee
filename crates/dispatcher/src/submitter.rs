//! 任务提交
//!
//! 先将任务实例写库，再把可由Worker执行的任务放入任务队列。两步各自带重试，
//! 已经成功的一步不会重复执行。

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use scheduler_core::models::{
    task_types, CommandParams, CommandType, ExecutionStatus, FailureStrategy, Flag,
    ProcessInstance, ProcessInstanceMap, SubProcessParameters, TaskInstance, parse_params,
};
use scheduler_core::{SchedulerError, SchedulerResult, TaskPriorityKey};

use crate::commands::sub_process_command;
use crate::context::EngineContext;

/// 由引擎自行解释、不进入任务队列的任务类型
pub fn is_engine_task(task_type: &str) -> bool {
    matches!(
        task_type,
        task_types::SUB_PROCESS
            | task_types::DEPENDENT
            | task_types::CONDITIONS
            | task_types::SWITCH
            | task_types::BLOCKING
    )
}

pub struct TaskSubmitter {
    ctx: EngineContext,
}

impl TaskSubmitter {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// 提交任务实例，返回写库后的任务
    #[instrument(skip(self, instance, task), fields(process_instance_id = instance.id, task_name = %task.name))]
    pub async fn submit(
        &self,
        instance: &ProcessInstance,
        task: TaskInstance,
    ) -> SchedulerResult<TaskInstance> {
        let attempts = self.ctx.config.task_commit_retry_times.max(1);
        let mut current = task;
        let mut saved = false;
        let mut commanded = false;
        let mut last_error = None;

        for attempt in 1..=attempts {
            if !saved {
                match self.submit_to_db(instance, current.clone()).await {
                    Ok(task) => {
                        commanded = !task.is_sub_process() || task.state.is_finished();
                        current = task;
                        saved = true;
                    }
                    Err(e) => {
                        warn!("任务 {} 第 {} 次写库失败: {}", current.name, attempt, e);
                        last_error = Some(e);
                    }
                }
            }
            // 子工作流命令单独重试，任务记录只写一次
            if saved && !commanded {
                match self.create_sub_process_command(instance, &current).await {
                    Ok(()) => commanded = true,
                    Err(e) => {
                        warn!("任务 {} 第 {} 次创建子工作流命令失败: {}", current.name, attempt, e);
                        last_error = Some(e);
                    }
                }
            }
            if saved && commanded {
                match self.dispatch(instance, &current).await {
                    Ok(()) => return Ok(current),
                    Err(e) => {
                        warn!("任务 {} 第 {} 次入队失败: {}", current.name, attempt, e);
                        last_error = Some(e);
                    }
                }
            }
            if attempt < attempts {
                sleep(self.ctx.config.task_commit_interval()).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            SchedulerError::Internal(format!("任务 {} 提交失败", current.name))
        }))
    }

    /// 任务在队列中的键
    ///
    /// 默认分组的任务可由任意Worker执行，其他分组限定为该分组下已注册的Worker。
    pub async fn queue_key(
        &self,
        instance: &ProcessInstance,
        task: &TaskInstance,
    ) -> SchedulerResult<TaskPriorityKey> {
        let group = task.worker_group.trim();
        let hosts = if group.is_empty() || group == self.ctx.config.default_worker_group {
            Vec::new()
        } else {
            self.ctx.registry.worker_group_hosts(group).await?
        };
        Ok(TaskPriorityKey::new(
            instance.process_instance_priority.ordinal(),
            instance.id,
            task.task_instance_priority.ordinal(),
            task.id,
            &hosts,
        ))
    }

    async fn submit_to_db(
        &self,
        instance: &ProcessInstance,
        mut task: TaskInstance,
    ) -> SchedulerResult<TaskInstance> {
        let instance = self
            .ctx
            .process_instances
            .find_by_id(instance.id)
            .await?
            .unwrap_or_else(|| instance.clone());
        let instance_state = instance.state;

        if task.state.is_failure() {
            if task.is_sub_process() {
                task.retry_times += 1;
            } else if !matches!(
                instance_state,
                ExecutionStatus::ReadyStop | ExecutionStatus::ReadyPause
            ) {
                // 失败的尝试保留为无效记录，重试使用新记录
                let mut previous = task.clone();
                previous.flag = Flag::No;
                self.ctx.task_instances.save(&mut previous).await?;

                if task.state != ExecutionStatus::NeedFaultTolerance {
                    task.retry_times += 1;
                }
                task.id = 0;
                task.submit_time = None;
                task.start_time = None;
                task.end_time = None;
                task.host = None;
                task.flag = Flag::Yes;
                task.alert_flag = Flag::No;
            }
        }

        task.executor_id = instance.executor_id;
        task.process_instance_priority = instance.process_instance_priority;
        task.state = self.submit_state(&instance, &task).await?;
        let now = Utc::now();
        task.submit_time = Some(now);
        if task.first_submit_time.is_none() {
            task.first_submit_time = Some(now);
        }
        self.ctx.task_instances.save(&mut task).await?;
        debug!("任务 {} 已写库，ID: {}，状态: {}", task.name, task.id, task.state);
        Ok(task)
    }

    async fn submit_state(
        &self,
        instance: &ProcessInstance,
        task: &TaskInstance,
    ) -> SchedulerResult<ExecutionStatus> {
        let state = task.state;
        if matches!(state, ExecutionStatus::RunningExecution | ExecutionStatus::Kill) {
            return Ok(state);
        }
        if task.id != 0 {
            let key = self.queue_key(instance, task).await?;
            if self.ctx.task_queue.contains(&key).await? {
                return Ok(state);
            }
        }

        let next = match instance.state {
            ExecutionStatus::ReadyPause => ExecutionStatus::Pause,
            ExecutionStatus::ReadyStop => ExecutionStatus::Kill,
            _ if !self.strategy_allows(instance).await? => ExecutionStatus::Kill,
            _ => ExecutionStatus::SubmittedSuccess,
        };
        Ok(next)
    }

    /// 失败即结束的实例中已有失败任务时不再提交新任务
    async fn strategy_allows(&self, instance: &ProcessInstance) -> SchedulerResult<bool> {
        if instance.failure_strategy == FailureStrategy::Continue {
            return Ok(true);
        }
        let tasks = self
            .ctx
            .task_instances
            .find_valid_by_process_instance(instance.id)
            .await?;
        Ok(!tasks.iter().any(|t| t.state == ExecutionStatus::Failure))
    }

    async fn dispatch(&self, instance: &ProcessInstance, task: &TaskInstance) -> SchedulerResult<()> {
        if is_engine_task(&task.task_type) || task.state != ExecutionStatus::SubmittedSuccess {
            return Ok(());
        }
        let key = self.queue_key(instance, task).await?;
        if self.ctx.task_queue.contains(&key).await? {
            debug!("任务 {} 已在队列中: {}", task.name, key);
            return Ok(());
        }
        self.ctx.task_queue.put(&key).await?;
        self.ctx.metrics.record_task_submitted();
        if let Ok(size) = self.ctx.task_queue.size().await {
            self.ctx.metrics.update_queue_depth(size as f64);
        }
        info!("任务 {} 已放入队列: {}", task.name, key);
        Ok(())
    }

    async fn set_process_instance_map(
        &self,
        parent: &ProcessInstance,
        task: &TaskInstance,
    ) -> SchedulerResult<ProcessInstanceMap> {
        if let Some(map) = self.ctx.process_instance_maps.find(parent.id, task.id).await? {
            return Ok(map);
        }

        if parent.command_type == CommandType::RepeatRunning || parent.is_complement_data() {
            // 重跑与补数复用旧的子工作流实例
            if let Some(previous) = self
                .ctx
                .task_instances
                .find_previous_by_name(parent.id, &task.name)
                .await?
            {
                if let Some(mut map) = self.ctx.process_instance_maps.find(parent.id, previous.id).await? {
                    map.parent_task_instance_id = task.id;
                    self.ctx.process_instance_maps.save(&mut map).await?;
                    return Ok(map);
                }
            }
        }

        let mut map = ProcessInstanceMap {
            id: 0,
            parent_process_instance_id: parent.id,
            parent_task_instance_id: task.id,
            process_instance_id: 0,
        };
        self.ctx.process_instance_maps.save(&mut map).await?;
        Ok(map)
    }

    async fn create_sub_process_command(
        &self,
        parent: &ProcessInstance,
        task: &TaskInstance,
    ) -> SchedulerResult<()> {
        let parent = &self
            .ctx
            .process_instances
            .find_by_id(parent.id)
            .await?
            .unwrap_or_else(|| parent.clone());
        let definition_id = parse_params::<SubProcessParameters>(&task.task_params)?.process_definition_id;
        let map = self.set_process_instance_map(parent, task).await?;

        let child = if map.process_instance_id > 0 {
            self.ctx.process_instances.find_by_id(map.process_instance_id).await?
        } else {
            None
        };

        let mut command_type = parent.command_type;
        if child.is_none() || command_type == CommandType::RepeatRunning {
            if let Some(first) = parent.history_cmds().first() {
                if matches!(first, CommandType::Scheduler | CommandType::ComplementData) {
                    command_type = *first;
                }
            }
        }

        let mut params = CommandParams {
            parent_process_instance_id: Some(parent.id),
            parent_task_instance_id: Some(task.id),
            sub_process_instance_id: Some(map.process_instance_id),
            ..Default::default()
        };

        let child_is_complement = child.as_ref().is_some_and(|c| c.is_complement_data());
        if command_type == CommandType::ComplementData || child_is_complement {
            params.complement_start_date = parent.command_param.complement_start_date.clone();
            params.complement_end_date = parent.command_param.complement_end_date.clone();
        }

        if let Some(mut child) = child {
            child.state = ExecutionStatus::SubmittedSuccess;
            self.ctx.process_instances.update(&child).await?;
        }

        let command = sub_process_command(parent, command_type, definition_id, &params)?;
        let saved = self.ctx.commands.insert(&command).await?;
        info!(
            "子工作流命令已创建: {}，父实例: {}，父任务: {}",
            saved.id, parent.id, task.id
        );
        Ok(())
    }
}
