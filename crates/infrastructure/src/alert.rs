use async_trait::async_trait;
use scheduler_core::traits::AlertSender;
use scheduler_core::SchedulerResult;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

/// 以日志形式输出告警，未接入告警平台时使用
#[derive(Debug, Default)]
pub struct TracingAlertSender;

#[async_trait]
impl AlertSender for TracingAlertSender {
    async fn send_alert(
        &self,
        alert_group_id: Option<i64>,
        title: &str,
        content: &Value,
        receivers: &[String],
    ) -> SchedulerResult<()> {
        warn!(
            alert_group_id = ?alert_group_id,
            receivers = ?receivers,
            content = %content,
            "告警: {}",
            title
        );
        Ok(())
    }
}

/// 已发送的告警记录
#[derive(Debug, Clone, PartialEq)]
pub struct SentAlert {
    pub alert_group_id: Option<i64>,
    pub title: String,
    pub content: Value,
    pub receivers: Vec<String>,
}

/// 保存告警记录的发送器
#[derive(Debug, Default)]
pub struct InMemoryAlertSender {
    alerts: Mutex<Vec<SentAlert>>,
}

impl InMemoryAlertSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn alerts(&self) -> Vec<SentAlert> {
        self.alerts.lock().await.clone()
    }
}

#[async_trait]
impl AlertSender for InMemoryAlertSender {
    async fn send_alert(
        &self,
        alert_group_id: Option<i64>,
        title: &str,
        content: &Value,
        receivers: &[String],
    ) -> SchedulerResult<()> {
        self.alerts.lock().await.push(SentAlert {
            alert_group_id,
            title: title.to_string(),
            content: content.clone(),
            receivers: receivers.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_in_memory_sender_records_alerts() {
        let sender = InMemoryAlertSender::new();
        sender
            .send_alert(Some(3), "工作流失败", &json!({"state": "FAILURE"}), &["ops".to_string()])
            .await
            .unwrap();
        let alerts = sender.alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].alert_group_id, Some(3));
        assert_eq!(alerts[0].content["state"], "FAILURE");
    }
}
