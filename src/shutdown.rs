use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

/// 优雅关闭管理器
///
/// 心跳、节点监控与命令消费循环各自订阅一次，收到信号后退出各自的循环。
#[derive(Clone)]
pub struct ShutdownManager {
    /// 关闭后置为 `None`，之后的订阅者立即收到信号
    shutdown_tx: Arc<Mutex<Option<broadcast::Sender<()>>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx: Arc::new(Mutex::new(Some(shutdown_tx))),
        }
    }

    /// 订阅关闭信号
    pub async fn subscribe(&self) -> broadcast::Receiver<()> {
        match self.shutdown_tx.lock().await.as_ref() {
            Some(tx) => tx.subscribe(),
            None => {
                let (tx, rx) = broadcast::channel(1);
                let _ = tx.send(());
                rx
            }
        }
    }

    /// 触发关闭，重复调用无副作用
    pub async fn shutdown(&self) {
        let Some(tx) = self.shutdown_tx.lock().await.take() else {
            debug!("关闭信号已发送过");
            return;
        };

        debug!("发送关闭信号给 {} 个订阅者", tx.receiver_count());
        // 没有订阅者时发送失败，忽略
        let _ = tx.send(());
        info!("关闭信号已发送");
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_all_subscribers_receive_signal() {
        let manager = ShutdownManager::new();
        let mut rx1 = manager.subscribe().await;
        let mut rx2 = manager.subscribe().await;

        manager.shutdown().await;

        assert!(timeout(Duration::from_millis(100), rx1.recv()).await.is_ok());
        assert!(timeout(Duration::from_millis(100), rx2.recv()).await.is_ok());
    }

    #[tokio::test]
    async fn test_subscribe_after_shutdown() {
        let manager = ShutdownManager::new();
        manager.shutdown().await;

        let mut rx = manager.subscribe().await;
        let result = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_double_shutdown() {
        let manager = ShutdownManager::new();
        let mut rx = manager.subscribe().await;

        manager.shutdown().await;
        manager.shutdown().await;

        assert!(matches!(rx.recv().await, Ok(())));
        // 发送端已释放，不会收到第二个信号
        assert!(rx.recv().await.is_err());
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let manager = ShutdownManager::new();
        let cloned = manager.clone();
        let mut rx = manager.subscribe().await;

        let waiter = tokio::spawn(async move { rx.recv().await.is_ok() });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cloned.shutdown().await;

        assert!(timeout(Duration::from_millis(100), waiter).await.unwrap().unwrap());
    }
}
