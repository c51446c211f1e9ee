use async_trait::async_trait;
use scheduler_core::models::{ExecutionStatus, Flag, TaskInstance};
use scheduler_core::traits::TaskInstanceRepository;
use scheduler_core::SchedulerResult;
use tracing::debug;

use super::MemoryTable;

pub struct InMemoryTaskInstanceRepository {
    table: MemoryTable<TaskInstance>,
}

impl InMemoryTaskInstanceRepository {
    pub fn new() -> Self {
        Self {
            table: MemoryTable::new(),
        }
    }

    /// 某工作流实例下的全部任务实例（含已失效的）
    pub async fn all_by_process_instance(&self, process_instance_id: i64) -> Vec<TaskInstance> {
        self.table
            .filter(|t| t.process_instance_id == process_instance_id)
            .await
    }
}

impl Default for InMemoryTaskInstanceRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskInstanceRepository for InMemoryTaskInstanceRepository {
    async fn save(&self, task: &mut TaskInstance) -> SchedulerResult<()> {
        let mut state = self.table.write().await;
        if task.id == 0 {
            task.id = state.allocate_id();
            debug!(
                "插入任务实例: {} {} (工作流实例 {})",
                task.id, task.name, task.process_instance_id
            );
        }
        state.insert(task.id, task.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<TaskInstance>> {
        Ok(self.table.get(id).await)
    }

    async fn find_valid_by_process_instance(
        &self,
        process_instance_id: i64,
    ) -> SchedulerResult<Vec<TaskInstance>> {
        Ok(self
            .table
            .filter(|t| t.process_instance_id == process_instance_id && t.flag == Flag::Yes)
            .await)
    }

    async fn find_by_process_instance_and_name(
        &self,
        process_instance_id: i64,
        name: &str,
    ) -> SchedulerResult<Option<TaskInstance>> {
        Ok(self
            .table
            .filter(|t| {
                t.process_instance_id == process_instance_id && t.name == name && t.flag == Flag::Yes
            })
            .await
            .into_iter()
            .max_by_key(|t| t.id))
    }

    async fn find_previous_by_name(
        &self,
        process_instance_id: i64,
        name: &str,
    ) -> SchedulerResult<Option<TaskInstance>> {
        Ok(self
            .table
            .filter(|t| {
                t.process_instance_id == process_instance_id && t.name == name && t.flag == Flag::No
            })
            .await
            .into_iter()
            .max_by_key(|t| t.id))
    }

    async fn find_by_host_and_states(
        &self,
        host: &str,
        states: &[ExecutionStatus],
    ) -> SchedulerResult<Vec<TaskInstance>> {
        Ok(self
            .table
            .filter(|t| t.host.as_deref() == Some(host) && states.contains(&t.state))
            .await)
    }

    async fn find_by_states(&self, states: &[ExecutionStatus]) -> SchedulerResult<Vec<TaskInstance>> {
        Ok(self.table.filter(|t| states.contains(&t.state)).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_core::models::TaskNode;

    #[tokio::test]
    async fn test_valid_and_previous_lookup() {
        let repo = InMemoryTaskInstanceRepository::new();
        let node = TaskNode::new("extract", "SHELL");

        let mut old = TaskInstance::from_node(&node, 1, 10);
        old.state = ExecutionStatus::Failure;
        repo.save(&mut old).await.unwrap();
        old.flag = Flag::No;
        repo.save(&mut old).await.unwrap();

        let mut retry = TaskInstance::from_node(&node, 1, 10);
        repo.save(&mut retry).await.unwrap();

        let valid = repo.find_valid_by_process_instance(10).await.unwrap();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].id, retry.id);

        let by_name = repo.find_by_process_instance_and_name(10, "extract").await.unwrap();
        assert_eq!(by_name.map(|t| t.id), Some(retry.id));
        let previous = repo.find_previous_by_name(10, "extract").await.unwrap();
        assert_eq!(previous.map(|t| t.id), Some(old.id));
        assert_eq!(repo.all_by_process_instance(10).await.len(), 2);
    }
}
