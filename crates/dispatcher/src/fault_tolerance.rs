//! 容错
//!
//! Master失联时，其名下未结束的实例清空主机并写入容错恢复命令，由存活的Master接管；
//! Worker失联时，其名下未结束的任务标记为需要容错，由所属实例的协调器重新提交。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use scheduler_core::models::{ExecutionStatus, NodeType, ServerNode, TaskInstance};
use scheduler_core::SchedulerResult;

use crate::commands::create_tolerance_recovery_command;
use crate::context::EngineContext;

/// 需要容错接管的实例状态
pub const INSTANCE_FAILOVER_STATES: [ExecutionStatus; 6] = [
    ExecutionStatus::SubmittedSuccess,
    ExecutionStatus::RunningExecution,
    ExecutionStatus::DelayExecution,
    ExecutionStatus::ReadyPause,
    ExecutionStatus::ReadyStop,
    ExecutionStatus::NeedFaultTolerance,
];

/// 需要容错的任务状态
pub const TASK_FAILOVER_STATES: [ExecutionStatus; 3] = [
    ExecutionStatus::SubmittedSuccess,
    ExecutionStatus::RunningExecution,
    ExecutionStatus::DelayExecution,
];

pub struct FaultToleranceManager {
    ctx: EngineContext,
}

impl FaultToleranceManager {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// 接管失联Master的实例，返回写入的恢复命令数
    ///
    /// 清空主机使用条件更新，多个Master同时接管时只有一个会写入命令。
    #[instrument(skip(self))]
    pub async fn failover_master(&self, host: &str) -> SchedulerResult<u64> {
        let instances = self
            .ctx
            .process_instances
            .find_by_host_and_states(host, &INSTANCE_FAILOVER_STATES)
            .await?;

        let mut recovered = 0u64;
        for instance in instances {
            if !self
                .ctx
                .process_instances
                .clear_host_if_owned(instance.id, host)
                .await?
            {
                debug!("实例 {} 已被其他Master接管", instance.id);
                continue;
            }
            let command = create_tolerance_recovery_command(&self.ctx, &instance).await?;
            info!(
                "实例 {} 容错接管，恢复命令: {}",
                instance.id, command.id
            );
            recovered += 1;
        }

        self.ctx.metrics.record_failover(host, recovered);
        info!("Master {} 容错完成，接管实例 {} 个", host, recovered);
        Ok(recovered)
    }

    /// 将失联Worker上的任务标记为需要容错，返回处理的任务数
    ///
    /// `check_alive` 为真时，Worker仍然在线且任务在其本次启动之后开始的任务不做处理。
    #[instrument(skip(self))]
    pub async fn failover_worker(&self, host: &str, check_alive: bool) -> SchedulerResult<u64> {
        let tasks = self
            .ctx
            .task_instances
            .find_by_host_and_states(host, &TASK_FAILOVER_STATES)
            .await?;
        let workers = if check_alive {
            self.alive_workers().await?
        } else {
            HashMap::new()
        };

        let mut count = 0u64;
        for task in tasks {
            if check_alive && !need_failover(&task, &workers) {
                continue;
            }
            self.mark_need_fault_tolerance(task).await?;
            count += 1;
        }
        info!("Worker {} 容错完成，处理任务 {} 个", host, count);
        Ok(count)
    }

    /// Master启动时的容错
    ///
    /// 主机已不在线（或就是本机上一次运行）的未结束实例全部接管；
    /// 未结束的任务按所在Worker是否仍然在线判断。
    pub async fn startup_failover(&self) -> SchedulerResult<()> {
        let masters: Vec<String> = self
            .ctx
            .registry
            .list(NodeType::Master)
            .await?
            .into_iter()
            .map(|n| n.host)
            .collect();
        let self_host = self.ctx.host().to_string();

        let instances = self
            .ctx
            .process_instances
            .find_by_states(&INSTANCE_FAILOVER_STATES)
            .await?;
        let mut dead_masters: Vec<String> = Vec::new();
        for instance in instances {
            let Some(host) = instance.host else {
                continue;
            };
            let dead = host == self_host || !masters.contains(&host);
            if dead && !dead_masters.contains(&host) {
                dead_masters.push(host);
            }
        }
        for host in dead_masters {
            if let Err(e) = self.failover_master(&host).await {
                warn!("启动容错时接管Master {} 失败: {}", host, e);
            }
        }

        let workers = self.alive_workers().await?;
        let tasks = self
            .ctx
            .task_instances
            .find_by_states(&TASK_FAILOVER_STATES)
            .await?;
        let mut count = 0u64;
        for task in tasks {
            if need_failover(&task, &workers) {
                self.mark_need_fault_tolerance(task).await?;
                count += 1;
            }
        }
        info!("启动容错完成，处理任务 {} 个", count);
        Ok(())
    }

    async fn alive_workers(&self) -> SchedulerResult<HashMap<String, ServerNode>> {
        Ok(self
            .ctx
            .registry
            .list(NodeType::Worker)
            .await?
            .into_iter()
            .map(|n| (n.host.clone(), n))
            .collect())
    }

    async fn mark_need_fault_tolerance(&self, mut task: TaskInstance) -> SchedulerResult<()> {
        task.state = ExecutionStatus::NeedFaultTolerance;
        self.ctx.task_instances.save(&mut task).await?;
        info!(
            "任务 {} ({}) 标记为需要容错，原主机: {:?}",
            task.name, task.id, task.host
        );
        Ok(())
    }
}

/// 没有主机的任务尚未被Worker领取，不需要容错；所在Worker在线且任务晚于其启动时，
/// 任务属于Worker的本次运行。
fn need_failover(task: &TaskInstance, alive_workers: &HashMap<String, ServerNode>) -> bool {
    let Some(host) = task.host.as_deref() else {
        return false;
    };
    match alive_workers.get(host) {
        Some(worker) => !started_after(task.start_time, worker.start_time),
        None => true,
    }
}

fn started_after(task_start: Option<DateTime<Utc>>, worker_start: DateTime<Utc>) -> bool {
    task_start.is_some_and(|start| start > worker_start)
}
