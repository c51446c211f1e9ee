use async_trait::async_trait;
use serde_json::Value;

use crate::SchedulerResult;

/// 告警发送接口
///
/// 告警内容为JSON对象，由调用方按场景组织字段。
#[async_trait]
pub trait AlertSender: Send + Sync {
    async fn send_alert(
        &self,
        alert_group_id: Option<i64>,
        title: &str,
        content: &Value,
        receivers: &[String],
    ) -> SchedulerResult<()>;
}
