use async_trait::async_trait;

use crate::queue_key::TaskPriorityKey;
use crate::SchedulerResult;

/// 任务优先级队列抽象接口
///
/// 协调器写入，Worker侧按键序取出。同一个键只会存在一份。
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// 放入任务键，已存在时不重复放入
    async fn put(&self, key: &TaskPriorityKey) -> SchedulerResult<()>;

    /// 按优先级取出至多 `limit` 个键
    async fn poll(&self, limit: usize) -> SchedulerResult<Vec<TaskPriorityKey>>;

    async fn contains(&self, key: &TaskPriorityKey) -> SchedulerResult<bool>;

    /// 移除任务键，返回键是否存在
    async fn remove(&self, key: &TaskPriorityKey) -> SchedulerResult<bool>;

    /// 队列中的键数量
    async fn size(&self) -> SchedulerResult<usize>;
}
