use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 集群节点类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Master,
    Worker,
}

varchar_enum!(NodeType {
    Master => "MASTER",
    Worker => "WORKER",
});

/// 注册中心中的节点信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerNode {
    pub host: String,
    pub node_type: NodeType,
    /// Worker所属分组，Master为空
    pub worker_group: Option<String>,
    pub start_time: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

impl ServerNode {
    pub fn new(host: impl Into<String>, node_type: NodeType) -> Self {
        let now = Utc::now();
        Self {
            host: host.into(),
            node_type,
            worker_group: None,
            start_time: now,
            last_heartbeat: now,
        }
    }

    /// 心跳是否超时
    pub fn is_expired(&self, now: DateTime<Utc>, timeout_seconds: i64) -> bool {
        (now - self.last_heartbeat).num_seconds() > timeout_seconds
    }
}
