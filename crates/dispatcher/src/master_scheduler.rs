//! Master命令消费循环
//!
//! 每轮取一条命令交给物化器，以剩余的协调器名额作为线程预算；
//! 物化出的实例交给新的协调器在后台运行。

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock, Semaphore};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use scheduler_core::models::ProcessInstance;
use scheduler_core::{SchedulerError, SchedulerResult};

use crate::context::EngineContext;
use crate::coordinator::WorkflowCoordinator;
use crate::materializer::Materializer;
use crate::processors::TaskProcessorRegistry;

pub struct MasterSchedulerService {
    ctx: EngineContext,
    materializer: Materializer,
    processors: Arc<TaskProcessorRegistry>,
    permits: Arc<Semaphore>,
    /// 正在运行协调器的实例ID
    running: Arc<RwLock<HashSet<i64>>>,
}

impl MasterSchedulerService {
    pub fn new(ctx: EngineContext, processors: Arc<TaskProcessorRegistry>) -> Self {
        Self {
            materializer: Materializer::new(ctx.clone()),
            permits: Arc::new(Semaphore::new(ctx.config.exec_threads)),
            ctx,
            processors,
            running: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// 当前运行中的协调器数量
    pub async fn active_count(&self) -> usize {
        self.running.read().await.len()
    }

    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            "命令消费循环启动，协调器上限: {}",
            self.ctx.config.exec_threads
        );
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("收到关闭信号，停止消费命令");
                    break;
                }
                _ = sleep(self.ctx.config.command_poll_interval()) => {
                    // 有命令时连续处理，直到没有命令或名额用完
                    loop {
                        match self.schedule_once().await {
                            Ok(true) => continue,
                            Ok(false) => break,
                            Err(e) => {
                                error!("处理命令时出错: {}", e);
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    /// 处理一条命令，返回是否取到了命令
    pub async fn schedule_once(&self) -> SchedulerResult<bool> {
        let available = self.permits.available_permits();
        if available == 0 {
            debug!("协调器名额已用完");
            return Ok(false);
        }
        let Some(command) = self.ctx.commands.find_one().await? else {
            return Ok(false);
        };

        match self.materializer.handle_command(&command, available).await {
            Ok(Some(instance)) => self.spawn_coordinator(instance).await?,
            Ok(None) => {}
            Err(e) => {
                error!("命令 {} 处理失败: {}", command.id, e);
                self.materializer
                    .move_to_error_command(&command, &e.to_string())
                    .await?;
            }
        }
        Ok(true)
    }

    async fn spawn_coordinator(&self, instance: ProcessInstance) -> SchedulerResult<()> {
        let id = instance.id;
        if !self.running.write().await.insert(id) {
            warn!("工作流实例 {} 已有协调器在运行", id);
            return Ok(());
        }
        let permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                self.running.write().await.remove(&id);
                return Err(SchedulerError::Internal(format!("获取协调器名额失败: {e}")));
            }
        };

        let coordinator = WorkflowCoordinator::new(self.ctx.clone(), self.processors.clone(), instance);
        let running = self.running.clone();
        tokio::spawn(async move {
            match coordinator.run().await {
                Ok(instance) => debug!("协调器退出，实例 {} 状态: {}", instance.id, instance.state),
                Err(e) => error!("工作流实例 {} 运行出错: {}", id, e),
            }
            running.write().await.remove(&id);
            drop(permit);
        });
        Ok(())
    }
}
