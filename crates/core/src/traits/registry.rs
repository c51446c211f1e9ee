use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{NodeType, ServerNode};
use crate::SchedulerResult;

/// 集群节点注册中心接口
///
/// Master与Worker启动时注册并周期性上报心跳；心跳超时的节点由容错管理器处理。
#[async_trait]
pub trait ServerRegistry: Send + Sync {
    /// 注册节点，已存在时覆盖
    async fn register(&self, node: &ServerNode) -> SchedulerResult<()>;

    /// 更新心跳时间
    async fn heartbeat(&self, host: &str, node_type: NodeType, at: DateTime<Utc>)
        -> SchedulerResult<()>;

    async fn list(&self, node_type: NodeType) -> SchedulerResult<Vec<ServerNode>>;

    /// 移除节点，返回节点是否存在
    async fn remove(&self, host: &str, node_type: NodeType) -> SchedulerResult<bool>;

    /// 指定Worker分组下的节点地址
    async fn worker_group_hosts(&self, worker_group: &str) -> SchedulerResult<Vec<String>>;
}
