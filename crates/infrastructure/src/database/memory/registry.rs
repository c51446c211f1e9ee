use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::models::{NodeType, ServerNode};
use scheduler_core::traits::ServerRegistry;
use scheduler_core::SchedulerResult;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// 内存注册中心
pub struct InMemoryServerRegistry {
    nodes: RwLock<HashMap<(String, NodeType), ServerNode>>,
}

impl InMemoryServerRegistry {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryServerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServerRegistry for InMemoryServerRegistry {
    async fn register(&self, node: &ServerNode) -> SchedulerResult<()> {
        debug!("注册节点: {} {}", node.host, node.node_type);
        self.nodes
            .write()
            .await
            .insert((node.host.clone(), node.node_type), node.clone());
        Ok(())
    }

    async fn heartbeat(
        &self,
        host: &str,
        node_type: NodeType,
        at: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        let mut nodes = self.nodes.write().await;
        match nodes.get_mut(&(host.to_string(), node_type)) {
            Some(node) => node.last_heartbeat = at,
            None => {
                let mut node = ServerNode::new(host, node_type);
                node.start_time = at;
                node.last_heartbeat = at;
                nodes.insert((host.to_string(), node_type), node);
            }
        }
        Ok(())
    }

    async fn list(&self, node_type: NodeType) -> SchedulerResult<Vec<ServerNode>> {
        let mut nodes: Vec<ServerNode> = self
            .nodes
            .read()
            .await
            .values()
            .filter(|n| n.node_type == node_type)
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.host.cmp(&b.host));
        Ok(nodes)
    }

    async fn remove(&self, host: &str, node_type: NodeType) -> SchedulerResult<bool> {
        Ok(self
            .nodes
            .write()
            .await
            .remove(&(host.to_string(), node_type))
            .is_some())
    }

    async fn worker_group_hosts(&self, worker_group: &str) -> SchedulerResult<Vec<String>> {
        let workers = self.list(NodeType::Worker).await?;
        Ok(workers
            .into_iter()
            .filter(|n| n.worker_group.as_deref() == Some(worker_group))
            .map(|n| n.host)
            .collect())
    }
}
