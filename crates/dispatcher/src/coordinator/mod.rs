//! 工作流执行协调器
//!
//! 每个运行中的工作流实例由一个协调器驱动：按DAG计算就绪节点、经任务处理器提交、
//! 轮询任务状态并推进实例状态机，直到实例结束。补数实例按调度日期依次运行多个实例。

mod state;
mod timeout;

pub use state::DagRunState;
pub use timeout::{process_timed_out, task_timed_out};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use scheduler_core::models::{
    join_properties, CommandType, Direct, ExecutionStatus, FailureStrategy, Flag, ProcessDefinition,
    ProcessInstance, TaskInstance, TaskNode,
};
use scheduler_core::utils::params::cure_global_params;
use scheduler_core::{Dag, SchedulerResult};

use crate::commands::create_recovery_waiting_thread_command;
use crate::context::EngineContext;
use crate::cron_utils::merged_fire_dates;
use crate::processors::{FlowDirective, TaskProcessor, TaskProcessorRegistry, TaskRunContext};
use crate::submitter::TaskSubmitter;

pub struct WorkflowCoordinator {
    ctx: EngineContext,
    submitter: TaskSubmitter,
    processors: Arc<TaskProcessorRegistry>,
    instance: ProcessInstance,
    definition: Option<ProcessDefinition>,
    process_timeout_alerted: bool,
    /// 已发出暂停或停止请求的任务
    cancel_requested: HashSet<i64>,
}

impl WorkflowCoordinator {
    pub fn new(
        ctx: EngineContext,
        processors: Arc<TaskProcessorRegistry>,
        instance: ProcessInstance,
    ) -> Self {
        Self {
            submitter: TaskSubmitter::new(ctx.clone()),
            ctx,
            processors,
            instance,
            definition: None,
            process_timeout_alerted: false,
            cancel_requested: HashSet::new(),
        }
    }

    /// 运行实例直到结束，返回最终的实例
    #[instrument(skip(self), fields(process_instance_id = self.instance.id, name = %self.instance.name))]
    pub async fn run(mut self) -> SchedulerResult<ProcessInstance> {
        self.definition = self
            .ctx
            .process_definitions
            .find_by_id(self.instance.process_definition_id)
            .await?;
        self.ctx.metrics.record_process_started();

        if self.instance.is_complement_data() && !self.instance.is_sub_process() {
            self.execute_complement().await?;
        } else {
            self.execute_once().await?;
        }
        Ok(self.instance)
    }

    /// 补数：按定时配置的触发时间（没有定时配置时按天）依次运行
    async fn execute_complement(&mut self) -> SchedulerResult<()> {
        let Some((start, end)) = self.instance.command_param.complement_range()? else {
            warn!("补数实例 {} 缺少补数区间，按普通实例运行", self.instance.id);
            return self.execute_once().await;
        };
        self.ctx.process_instances.save(&mut self.instance).await?;

        let crontabs: Vec<String> = self
            .ctx
            .schedules
            .find_online_by_process_definition(self.instance.process_definition_id)
            .await?
            .into_iter()
            .map(|s| s.crontab)
            .collect();
        let fire_dates = if crontabs.is_empty() {
            Vec::new()
        } else {
            merged_fire_dates(&crontabs, start, end)?
        };

        let mut fire_iter = if fire_dates.is_empty() {
            None
        } else {
            Some(fire_dates.into_iter())
        };
        let mut schedule_date = match fire_iter.as_mut().and_then(|it| it.next()) {
            Some(first) => {
                self.instance.schedule_time = Some(first);
                self.ctx.process_instances.update(&self.instance).await?;
                first
            }
            None => self.instance.schedule_time.unwrap_or(start),
        };

        loop {
            self.execute_once().await?;
            if !self.instance.state.is_success() {
                info!("补数实例 {} 未成功，停止后续补数", self.instance.id);
                break;
            }

            schedule_date = match fire_iter.as_mut() {
                None => {
                    let next = schedule_date + Duration::days(1);
                    if next > end {
                        break;
                    }
                    next
                }
                Some(it) => match it.next() {
                    Some(next) => next,
                    None => break,
                },
            };

            // 下一个补数日期使用新的实例
            self.instance.schedule_time = Some(schedule_date);
            self.instance.command_param.start_node_id_list = None;
            self.instance.state = ExecutionStatus::RunningExecution;
            let global_params = match &self.definition {
                Some(definition) => definition.global_params()?,
                None => self.instance.global_params.clone(),
            };
            self.instance.global_params = cure_global_params(
                &global_params,
                CommandType::ComplementData,
                self.instance.schedule_time,
                Utc::now(),
            );
            self.instance.id = 0;
            self.instance.start_time = Some(Utc::now());
            self.instance.end_time = None;
            self.ctx.process_instances.save(&mut self.instance).await?;
            info!(
                "补数实例 {} 开始运行，调度时间: {}",
                self.instance.id, schedule_date
            );
        }
        Ok(())
    }

    async fn execute_once(&mut self) -> SchedulerResult<()> {
        self.process_timeout_alerted = false;
        self.cancel_requested.clear();

        match self.prepare().await {
            Ok(mut state) => self.run_process(&mut state).await,
            Err(e) => {
                error!("工作流实例 {} 无法构建DAG: {}", self.instance.id, e);
                self.instance.state = ExecutionStatus::Failure;
                self.ctx.process_instances.update(&self.instance).await?;
            }
        }
        self.end_process().await
    }

    async fn prepare(&mut self) -> SchedulerResult<DagRunState> {
        let data = self.instance.process_data()?;
        let full = Dag::build(data.tasks)?;
        let start_nodes = self.start_node_names(&full).await?;
        let dag = full.partial(&start_nodes, self.instance.task_depend_type)?;

        let mut state = DagRunState::new(dag);
        let tasks = self
            .ctx
            .task_instances
            .find_valid_by_process_instance(self.instance.id)
            .await?;
        state.preload(tasks);

        // 已成功的条件与Switch任务重新生效，阻断任务在恢复后不再阻断
        let completed: Vec<TaskInstance> = state
            .complete
            .values()
            .filter(|t| t.state.is_success())
            .cloned()
            .collect();
        for task in completed {
            let Some(node) = state.dag.node(&task.name).cloned() else {
                continue;
            };
            let directive = self.processors.get(&node.task_type).on_complete(&node, &task);
            if !matches!(directive, FlowDirective::Block { .. }) {
                state.apply_directive(&directive);
            }
        }

        debug!(
            "工作流实例 {} 准备完成，节点数: {}，已完成: {}",
            self.instance.id,
            state.dag.len(),
            state.complete.len()
        );
        Ok(state)
    }

    /// 启动节点：优先使用节点名列表，其次由恢复任务ID反查节点名
    async fn start_node_names(&self, dag: &Dag) -> SchedulerResult<Vec<String>> {
        let mut names = self.instance.command_param.start_node_names();
        if names.is_empty() {
            for id in self.instance.command_param.start_node_ids() {
                if let Some(task) = self.ctx.task_instances.find_by_id(id).await? {
                    if !names.contains(&task.name) {
                        names.push(task.name);
                    }
                }
            }
        }
        Ok(names
            .into_iter()
            .filter(|name| {
                let known = dag.contains(name);
                if !known {
                    warn!("启动节点 {} 不在工作流中，已忽略", name);
                }
                known
            })
            .collect())
    }

    async fn run_process(&mut self, state: &mut DagRunState) {
        loop {
            let started = Instant::now();
            if let Err(e) = self.tick(state).await {
                error!("工作流实例 {} 调度出错，下一轮重试: {}", self.instance.id, e);
            }
            self.ctx
                .metrics
                .record_coordinator_tick(started.elapsed().as_secs_f64());

            if self.instance.state.is_finished() {
                break;
            }
            sleep(self.ctx.config.state_poll_interval()).await;
        }
    }

    async fn tick(&mut self, state: &mut DagRunState) -> SchedulerResult<()> {
        self.refresh_instance().await?;

        self.poll_active(state).await?;
        self.check_task_timeouts(state).await?;
        self.handle_control_request(state).await?;
        self.alert_tolerance_faults(state).await;
        self.check_process_timeout().await;

        for node in state.resolve_ready() {
            let task = state.task_for_node(&node, &self.instance);
            state.standby.push(task);
        }
        if !matches!(
            self.instance.state,
            ExecutionStatus::ReadyPause | ExecutionStatus::ReadyStop
        ) {
            self.submit_standby(state).await?;
        }

        for mut task in state.convert_paused_to_killed() {
            self.ctx.task_instances.save(&mut task).await?;
        }

        self.update_state(state).await
    }

    /// 重新读取实例以感知外部的暂停和停止请求
    async fn refresh_instance(&mut self) -> SchedulerResult<()> {
        if let Some(latest) = self.ctx.process_instances.find_by_id(self.instance.id).await? {
            let var_pool = std::mem::take(&mut self.instance.var_pool);
            self.instance = latest;
            self.instance.var_pool = join_properties(&var_pool, &self.instance.var_pool);
        }
        Ok(())
    }

    fn run_ctx<'a>(&'a self, node: &'a TaskNode) -> TaskRunContext<'a> {
        TaskRunContext {
            engine: &self.ctx,
            submitter: &self.submitter,
            instance: &self.instance,
            node,
        }
    }

    async fn poll_active(&mut self, state: &mut DagRunState) -> SchedulerResult<()> {
        let names: Vec<String> = state.active.keys().cloned().collect();
        for name in names {
            let (Some(task), Some(node)) = (
                state.active.get(&name).cloned(),
                state.dag.node(&name).cloned(),
            ) else {
                continue;
            };
            let processor = self.processors.get(&node.task_type);
            let polled = processor.poll_state(&self.run_ctx(&node), &task).await?;
            if !polled.state.is_finished() {
                state.active.insert(name, polled);
                continue;
            }
            state.active.remove(&name);
            self.on_task_finished(state, &node, processor.as_ref(), polled)
                .await?;
        }
        Ok(())
    }

    async fn on_task_finished(
        &mut self,
        state: &mut DagRunState,
        node: &TaskNode,
        processor: &dyn TaskProcessor,
        task: TaskInstance,
    ) -> SchedulerResult<()> {
        info!(
            "任务 {} 结束，ID: {}，状态: {}",
            task.name, task.id, task.state
        );

        if task.state.is_success() {
            self.merge_var_pool(&task);
            let directive = processor.on_complete(node, &task);
            state.complete.insert(task.name.clone(), task);
            match directive {
                FlowDirective::Block { alert } => self.block(state, node, alert).await?,
                other => state.apply_directive(&other),
            }
            return Ok(());
        }

        if task.state.is_failure() {
            if task.state == ExecutionStatus::NeedFaultTolerance {
                state.tolerance_faults.push(task.clone());
            }
            if task.can_retry() {
                self.ctx
                    .metrics
                    .record_task_retry(&task.name, task.retry_times + 1);
                info!(
                    "任务 {} 将重试，已重试 {} 次，最多 {} 次",
                    task.name, task.retry_times, task.max_retry_times
                );
                state.standby.push(task);
                return Ok(());
            }

            self.ctx.metrics.record_task_failure(&task.name);
            let name = task.name.clone();
            state.complete.insert(name.clone(), task.clone());
            if task.is_conditions() || state.has_conditions_after(&name) {
                return Ok(());
            }
            state.errors.insert(name, task);
            if self.instance.failure_strategy == FailureStrategy::End {
                self.kill_other_tasks(state).await?;
            }
            return Ok(());
        }

        state.complete.insert(task.name.clone(), task);
        Ok(())
    }

    fn merge_var_pool(&mut self, task: &TaskInstance) {
        let outputs: Vec<_> = task
            .var_pool
            .iter()
            .filter(|p| p.direct == Direct::Out)
            .cloned()
            .collect();
        if !outputs.is_empty() {
            self.instance.var_pool = join_properties(&outputs, &self.instance.var_pool);
        }
    }

    /// 阻断任务触发：实例转为准备暂停，下游节点不再提交
    async fn block(&mut self, state: &mut DagRunState, node: &TaskNode, alert: bool) -> SchedulerResult<()> {
        state.blocked = true;
        if self.instance.state == ExecutionStatus::ReadyStop {
            info!("实例 {} 已请求停止，阻断任务 {} 不再告警", self.instance.id, node.name);
            return Ok(());
        }
        self.instance.state = ExecutionStatus::ReadyPause;
        self.ctx.process_instances.update(&self.instance).await?;
        warn!("工作流实例 {} 被阻断任务 {} 阻断", self.instance.id, node.name);

        if alert {
            let content = json!({
                "processInstanceId": self.instance.id,
                "processInstanceName": self.instance.name,
                "taskName": node.name,
            });
            self.send_alert("工作流被阻断", &content).await;
        }
        Ok(())
    }

    /// 失败即结束：撤回其他运行中的任务，不再提交新任务
    async fn kill_other_tasks(&mut self, state: &mut DagRunState) -> SchedulerResult<()> {
        state.standby.clear();
        let running: Vec<TaskInstance> = state.active.values().cloned().collect();
        for task in running {
            let Some(node) = state.dag.node(&task.name).cloned() else {
                continue;
            };
            let processor = self.processors.get(&node.task_type);
            let cancelled = processor
                .cancel(&self.run_ctx(&node), &task, ExecutionStatus::Kill)
                .await?;
            if cancelled.state.is_finished() {
                state.active.remove(&cancelled.name);
                state.complete.insert(cancelled.name.clone(), cancelled);
            }
        }
        Ok(())
    }

    /// 实例处于准备暂停或准备停止时，对每个运行中的任务发出一次请求
    async fn handle_control_request(&mut self, state: &mut DagRunState) -> SchedulerResult<()> {
        let target = match self.instance.state {
            ExecutionStatus::ReadyPause => ExecutionStatus::Pause,
            ExecutionStatus::ReadyStop => ExecutionStatus::Kill,
            _ => return Ok(()),
        };
        let running: Vec<TaskInstance> = state
            .active
            .values()
            .filter(|t| !self.cancel_requested.contains(&t.id))
            .cloned()
            .collect();
        for task in running {
            let Some(node) = state.dag.node(&task.name).cloned() else {
                continue;
            };
            self.cancel_requested.insert(task.id);
            let processor = self.processors.get(&node.task_type);
            let cancelled = processor.cancel(&self.run_ctx(&node), &task, target).await?;
            if cancelled.state.is_finished() {
                state.active.remove(&cancelled.name);
                state.complete.insert(cancelled.name.clone(), cancelled);
            } else {
                state.active.insert(cancelled.name.clone(), cancelled);
            }
        }
        Ok(())
    }

    async fn submit_standby(&mut self, state: &mut DagRunState) -> SchedulerResult<()> {
        let limit = self
            .ctx
            .config
            .exec_task_num
            .saturating_sub(state.active.len());
        if limit == 0 {
            return Ok(());
        }

        for task in state.take_submittable(limit, Utc::now()) {
            let Some(node) = state.dag.node(&task.name).cloned() else {
                continue;
            };
            let processor = self.processors.get(&node.task_type);
            match processor.submit(&self.run_ctx(&node), task.clone()).await {
                Ok(submitted) => {
                    debug!("任务 {} 已提交，ID: {}", submitted.name, submitted.id);
                    state.active.insert(submitted.name.clone(), submitted);
                }
                Err(e) => {
                    error!("任务 {} 提交失败: {}", task.name, e);
                    let mut failed = task;
                    failed.state = ExecutionStatus::Failure;
                    failed.end_time = Some(Utc::now());
                    state.task_failed_submit = true;
                    state.errors.insert(failed.name.clone(), failed.clone());
                    state.complete.insert(failed.name.clone(), failed);
                }
            }
        }
        Ok(())
    }

    async fn check_task_timeouts(&mut self, state: &mut DagRunState) -> SchedulerResult<()> {
        let now = Utc::now();
        let timed_out: Vec<TaskInstance> = state
            .active
            .values()
            .filter(|t| task_timed_out(t, now))
            .cloned()
            .collect();

        for mut task in timed_out {
            let strategy = task.timeout.strategy;
            self.ctx.metrics.record_task_timeout(&task.name);
            task.alert_flag = Flag::Yes;
            if strategy.should_alert() {
                let content = json!({
                    "processInstanceId": self.instance.id,
                    "processInstanceName": self.instance.name,
                    "taskInstanceId": task.id,
                    "taskName": task.name,
                    "timeoutMinutes": task.timeout.interval,
                    "host": task.host,
                });
                self.send_alert("任务超时", &content).await;
            }
            if strategy.should_fail() {
                warn!("任务 {} 超时，强制失败", task.name);
                task.state = ExecutionStatus::Failure;
                task.end_time = Some(now);
            }
            self.ctx.task_instances.save(&mut task).await?;
            state.active.insert(task.name.clone(), task);
        }
        Ok(())
    }

    async fn check_process_timeout(&mut self) {
        if self.process_timeout_alerted || !process_timed_out(&self.instance, Utc::now()) {
            return;
        }
        self.process_timeout_alerted = true;
        let content = json!({
            "processInstanceId": self.instance.id,
            "processInstanceName": self.instance.name,
            "timeoutMinutes": self.instance.timeout,
            "startTime": self.instance.start_time,
        });
        self.send_alert("工作流超时", &content).await;
    }

    async fn alert_tolerance_faults(&mut self, state: &mut DagRunState) {
        if state.tolerance_faults.is_empty() {
            return;
        }
        let tasks: Vec<Value> = state
            .tolerance_faults
            .drain(..)
            .map(|t| json!({ "taskInstanceId": t.id, "taskName": t.name, "host": t.host }))
            .collect();
        let content = json!({
            "processInstanceId": self.instance.id,
            "processInstanceName": self.instance.name,
            "tasks": tasks,
        });
        self.send_alert("Worker容错", &content).await;
    }

    async fn send_alert(&self, title: &str, content: &Value) {
        let receivers = self
            .definition
            .as_ref()
            .map(|d| d.receivers.clone())
            .unwrap_or_default();
        if let Err(e) = self
            .ctx
            .alert_sender
            .send_alert(self.instance.warning_group_id, title, content, &receivers)
            .await
        {
            warn!("告警发送失败: {}", e);
        }
    }

    async fn update_state(&mut self, state: &DagRunState) -> SchedulerResult<()> {
        let next = self.compute_state(state);
        if next == self.instance.state {
            return Ok(());
        }
        info!(
            "工作流实例 {} 状态变更: {} -> {}",
            self.instance.id, self.instance.state, next
        );
        self.instance.state = next;
        self.ctx.process_instances.update(&self.instance).await
    }

    fn compute_state(&self, state: &DagRunState) -> ExecutionStatus {
        let current = self.instance.state;
        if !state.active.is_empty() || state.has_retry_in_standby() {
            return match current {
                ExecutionStatus::ReadyStop
                | ExecutionStatus::ReadyPause
                | ExecutionStatus::WaitingThread => current,
                _ => ExecutionStatus::RunningExecution,
            };
        }

        if state.process_failed(self.instance.failure_strategy == FailureStrategy::End) {
            return ExecutionStatus::Failure;
        }
        if !state
            .complete_in_states(&[ExecutionStatus::WaitingThread])
            .is_empty()
        {
            return ExecutionStatus::WaitingThread;
        }

        match current {
            ExecutionStatus::ReadyPause => {
                let paused = !state.complete_in_states(&[ExecutionStatus::Pause]).is_empty();
                if paused || state.blocked || !state.standby.is_empty() || !self.complement_end() {
                    ExecutionStatus::Pause
                } else {
                    ExecutionStatus::Success
                }
            }
            ExecutionStatus::ReadyStop => {
                let stopped = !state
                    .complete_in_states(&[ExecutionStatus::Stop, ExecutionStatus::Kill])
                    .is_empty();
                if stopped || !state.standby.is_empty() || !self.complement_end() {
                    ExecutionStatus::Stop
                } else {
                    ExecutionStatus::Success
                }
            }
            _ => {
                if !state.standby.is_empty() {
                    ExecutionStatus::RunningExecution
                } else if !state.complete_in_states(&[ExecutionStatus::Kill]).is_empty() {
                    ExecutionStatus::Failure
                } else {
                    ExecutionStatus::Success
                }
            }
        }
    }

    /// 补数实例是否已运行到补数结束日期
    fn complement_end(&self) -> bool {
        if !self.instance.is_complement_data() {
            return true;
        }
        match self.instance.command_param.complement_range() {
            Ok(Some((_, end))) => self.instance.schedule_time == Some(end),
            _ => true,
        }
    }

    async fn end_process(&mut self) -> SchedulerResult<()> {
        self.instance.end_time = Some(Utc::now());
        self.ctx.process_instances.update(&self.instance).await?;

        if self.instance.state == ExecutionStatus::WaitingThread {
            create_recovery_waiting_thread_command(&self.ctx, None, &self.instance).await?;
        }

        if !self.instance.is_sub_process() && self.instance.warning_type.should_alert(self.instance.state) {
            let content = json!({
                "processInstanceId": self.instance.id,
                "processInstanceName": self.instance.name,
                "state": self.instance.state.as_str(),
                "startTime": self.instance.start_time,
                "endTime": self.instance.end_time,
                "host": self.instance.host,
            });
            self.send_alert("工作流结束", &content).await;
        }

        let duration = match self.instance.start_time {
            Some(start) => (Utc::now() - start).num_milliseconds() as f64 / 1000.0,
            None => 0.0,
        };
        self.ctx
            .metrics
            .record_process_finished(self.instance.state.as_str(), duration);
        info!(
            "工作流实例 {} 结束，状态: {}",
            self.instance.id, self.instance.state
        );
        Ok(())
    }
}
