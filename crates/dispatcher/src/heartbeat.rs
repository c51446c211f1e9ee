//! Master心跳与节点失联检测

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use scheduler_core::models::{NodeType, ServerNode};
use scheduler_core::SchedulerResult;

use crate::context::EngineContext;
use crate::fault_tolerance::FaultToleranceManager;

pub struct HeartbeatMonitor {
    ctx: EngineContext,
    fault_tolerance: Arc<FaultToleranceManager>,
}

impl HeartbeatMonitor {
    pub fn new(ctx: EngineContext, fault_tolerance: Arc<FaultToleranceManager>) -> Self {
        Self {
            ctx,
            fault_tolerance,
        }
    }

    /// 将本机注册为Master
    pub async fn register_self(&self) -> SchedulerResult<()> {
        let node = ServerNode::new(self.ctx.host(), NodeType::Master);
        self.ctx.registry.register(&node).await?;
        info!("Master {} 已注册", node.host);
        Ok(())
    }

    /// 周期性上报心跳，收到关闭信号后注销本机
    pub async fn run_heartbeat(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.ctx.config.heartbeat_interval());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self
                        .ctx
                        .registry
                        .heartbeat(self.ctx.host(), NodeType::Master, Utc::now())
                        .await
                    {
                        warn!("心跳上报失败: {}", e);
                    }
                }
                _ = shutdown.recv() => {
                    info!("收到关闭信号，停止心跳");
                    break;
                }
            }
        }
        if let Err(e) = self.ctx.registry.remove(self.ctx.host(), NodeType::Master).await {
            warn!("注销Master失败: {}", e);
        }
    }

    /// 周期性检查失联节点并触发容错
    pub async fn run_monitor(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(self.ctx.config.failover_check_interval());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.check_expired().await {
                        error!("节点失联检测出错: {}", e);
                    }
                }
                _ = shutdown.recv() => {
                    info!("收到关闭信号，停止节点失联检测");
                    break;
                }
            }
        }
    }

    /// 处理心跳超时的节点，返回处理的节点数
    pub async fn check_expired(&self) -> SchedulerResult<usize> {
        let now = Utc::now();
        let timeout = self.ctx.config.heartbeat_timeout_seconds as i64;
        let mut handled = 0;

        for node_type in [NodeType::Master, NodeType::Worker] {
            for node in self.ctx.registry.list(node_type).await? {
                if node.host == self.ctx.host() || !node.is_expired(now, timeout) {
                    continue;
                }
                warn!("节点 {} ({}) 心跳超时", node.host, node_type.as_str());
                match node_type {
                    NodeType::Master => {
                        self.fault_tolerance.failover_master(&node.host).await?;
                    }
                    NodeType::Worker => {
                        self.fault_tolerance.failover_worker(&node.host, false).await?;
                    }
                }
                self.ctx.registry.remove(&node.host, node_type).await?;
                handled += 1;
            }
        }
        if handled > 0 {
            debug!("本轮处理失联节点 {} 个", handled);
        }
        Ok(handled)
    }
}
