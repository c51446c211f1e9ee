use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;
use scheduler_core::traits::TaskQueue;
use scheduler_core::{SchedulerError, SchedulerResult, TaskPriorityKey};
use tracing::{debug, instrument, warn};

/// 基于Redis有序集合的任务优先级队列
///
/// 成员为键的文本形式。Redis按字典序排列同分成员，
/// 因此取出时在客户端按数值顺序重新排序，再以 `ZREM` 的返回值判断是否抢占成功。
pub struct RedisTaskQueue {
    connection: ConnectionManager,
    queue_key: String,
}

fn queue_error(context: &str, err: redis::RedisError) -> SchedulerError {
    SchedulerError::TaskQueue(format!("{context}: {err}"))
}

impl RedisTaskQueue {
    pub async fn new(url: &str, queue_key: impl Into<String>) -> SchedulerResult<Self> {
        let client = Client::open(url).map_err(|e| queue_error("创建Redis客户端失败", e))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| queue_error("连接Redis失败", e))?;
        let queue = Self {
            connection,
            queue_key: queue_key.into(),
        };
        queue.ping().await?;
        debug!("Redis任务队列已连接: {}", url);
        Ok(queue)
    }

    pub async fn ping(&self) -> SchedulerResult<()> {
        let mut conn = self.connection.clone();
        let response: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| queue_error("Redis PING失败", e))?;
        if response != "PONG" {
            return Err(SchedulerError::TaskQueue(format!(
                "Redis PING返回异常: {response}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    #[instrument(skip(self), fields(key = %key))]
    async fn put(&self, key: &TaskPriorityKey) -> SchedulerResult<()> {
        let mut conn = self.connection.clone();
        let _: i64 = redis::cmd("ZADD")
            .arg(&self.queue_key)
            .arg("NX")
            .arg(0)
            .arg(key.to_string())
            .query_async(&mut conn)
            .await
            .map_err(|e| queue_error("ZADD失败", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn poll(&self, limit: usize) -> SchedulerResult<Vec<TaskPriorityKey>> {
        let mut conn = self.connection.clone();
        let members: Vec<String> = redis::cmd("ZRANGE")
            .arg(&self.queue_key)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(|e| queue_error("ZRANGE失败", e))?;

        let mut keys: Vec<TaskPriorityKey> = members
            .iter()
            .filter_map(|member| match member.parse() {
                Ok(key) => Some(key),
                Err(e) => {
                    warn!("忽略无法解析的队列成员 {}: {}", member, e);
                    None
                }
            })
            .collect();
        keys.sort();

        let mut claimed = Vec::with_capacity(limit.min(keys.len()));
        for key in keys {
            if claimed.len() >= limit {
                break;
            }
            let removed: i64 = redis::cmd("ZREM")
                .arg(&self.queue_key)
                .arg(key.to_string())
                .query_async(&mut conn)
                .await
                .map_err(|e| queue_error("ZREM失败", e))?;
            if removed > 0 {
                claimed.push(key);
            }
        }
        Ok(claimed)
    }

    async fn contains(&self, key: &TaskPriorityKey) -> SchedulerResult<bool> {
        let mut conn = self.connection.clone();
        let score: Option<f64> = redis::cmd("ZSCORE")
            .arg(&self.queue_key)
            .arg(key.to_string())
            .query_async(&mut conn)
            .await
            .map_err(|e| queue_error("ZSCORE失败", e))?;
        Ok(score.is_some())
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn remove(&self, key: &TaskPriorityKey) -> SchedulerResult<bool> {
        let mut conn = self.connection.clone();
        let removed: i64 = redis::cmd("ZREM")
            .arg(&self.queue_key)
            .arg(key.to_string())
            .query_async(&mut conn)
            .await
            .map_err(|e| queue_error("ZREM失败", e))?;
        Ok(removed > 0)
    }

    async fn size(&self) -> SchedulerResult<usize> {
        let mut conn = self.connection.clone();
        let size: usize = redis::cmd("ZCARD")
            .arg(&self.queue_key)
            .query_async(&mut conn)
            .await
            .map_err(|e| queue_error("ZCARD失败", e))?;
        Ok(size)
    }
}
