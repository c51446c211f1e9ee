use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::models::{
    ExecutionStatus, ProcessDefinition, ProcessInstance, ProcessInstanceMap, Schedule,
};
use scheduler_core::traits::{
    ProcessDefinitionRepository, ProcessInstanceMapRepository, ProcessInstanceRepository,
    ScheduleRepository,
};
use scheduler_core::{SchedulerError, SchedulerResult};
use tracing::debug;

use super::MemoryTable;

pub struct InMemoryProcessDefinitionRepository {
    table: MemoryTable<ProcessDefinition>,
}

impl InMemoryProcessDefinitionRepository {
    pub fn new() -> Self {
        Self {
            table: MemoryTable::new(),
        }
    }

    /// 写入工作流定义，ID为0时分配新ID
    pub async fn insert(&self, definition: ProcessDefinition) -> ProcessDefinition {
        let mut state = self.table.write().await;
        let mut definition = definition;
        if definition.id == 0 {
            definition.id = state.allocate_id();
        }
        state.insert(definition.id, definition.clone());
        definition
    }
}

impl Default for InMemoryProcessDefinitionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessDefinitionRepository for InMemoryProcessDefinitionRepository {
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<ProcessDefinition>> {
        Ok(self.table.get(id).await)
    }
}

pub struct InMemoryProcessInstanceRepository {
    table: MemoryTable<ProcessInstance>,
}

impl InMemoryProcessInstanceRepository {
    pub fn new() -> Self {
        Self {
            table: MemoryTable::new(),
        }
    }

    pub async fn count(&self) -> usize {
        self.table.len().await
    }

    pub async fn all(&self) -> Vec<ProcessInstance> {
        self.table.all().await
    }
}

impl Default for InMemoryProcessInstanceRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn instance_time(instance: &ProcessInstance) -> Option<DateTime<Utc>> {
    instance.schedule_time.or(instance.start_time)
}

#[async_trait]
impl ProcessInstanceRepository for InMemoryProcessInstanceRepository {
    async fn save(&self, instance: &mut ProcessInstance) -> SchedulerResult<()> {
        let mut state = self.table.write().await;
        if instance.id == 0 {
            instance.id = state.allocate_id();
            debug!("插入工作流实例: {} {}", instance.id, instance.name);
        }
        instance.update_time = Utc::now();
        state.insert(instance.id, instance.clone());
        Ok(())
    }

    async fn update(&self, instance: &ProcessInstance) -> SchedulerResult<()> {
        let mut state = self.table.write().await;
        if !state.rows.contains_key(&instance.id) {
            return Err(SchedulerError::ProcessInstanceNotFound { id: instance.id });
        }
        let mut updated = instance.clone();
        updated.update_time = Utc::now();
        state.insert(updated.id, updated);
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<ProcessInstance>> {
        Ok(self.table.get(id).await)
    }

    async fn find_by_host_and_states(
        &self,
        host: &str,
        states: &[ExecutionStatus],
    ) -> SchedulerResult<Vec<ProcessInstance>> {
        Ok(self
            .table
            .filter(|i| i.host.as_deref() == Some(host) && states.contains(&i.state))
            .await)
    }

    async fn find_by_states(
        &self,
        states: &[ExecutionStatus],
    ) -> SchedulerResult<Vec<ProcessInstance>> {
        Ok(self.table.filter(|i| states.contains(&i.state)).await)
    }

    async fn find_last_in_window(
        &self,
        process_definition_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SchedulerResult<Option<ProcessInstance>> {
        let candidates = self
            .table
            .filter(|i| {
                i.process_definition_id == process_definition_id
                    && instance_time(i).is_some_and(|t| t >= start && t <= end)
            })
            .await;
        Ok(candidates
            .into_iter()
            .max_by_key(|i| (instance_time(i), i.id)))
    }

    async fn clear_host_if_owned(&self, id: i64, host: &str) -> SchedulerResult<bool> {
        let mut state = self.table.write().await;
        match state.rows.get_mut(&id) {
            Some(instance) if instance.host.as_deref() == Some(host) => {
                instance.host = None;
                instance.update_time = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

pub struct InMemoryProcessInstanceMapRepository {
    table: MemoryTable<ProcessInstanceMap>,
}

impl InMemoryProcessInstanceMapRepository {
    pub fn new() -> Self {
        Self {
            table: MemoryTable::new(),
        }
    }
}

impl Default for InMemoryProcessInstanceMapRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessInstanceMapRepository for InMemoryProcessInstanceMapRepository {
    async fn find(
        &self,
        parent_process_instance_id: i64,
        parent_task_instance_id: i64,
    ) -> SchedulerResult<Option<ProcessInstanceMap>> {
        Ok(self
            .table
            .filter(|m| {
                m.parent_process_instance_id == parent_process_instance_id
                    && m.parent_task_instance_id == parent_task_instance_id
            })
            .await
            .into_iter()
            .next())
    }

    async fn find_by_child(
        &self,
        process_instance_id: i64,
    ) -> SchedulerResult<Option<ProcessInstanceMap>> {
        Ok(self
            .table
            .filter(|m| m.process_instance_id == process_instance_id)
            .await
            .into_iter()
            .next())
    }

    async fn save(&self, map: &mut ProcessInstanceMap) -> SchedulerResult<()> {
        let mut state = self.table.write().await;
        if map.id == 0 {
            map.id = state.allocate_id();
        }
        state.insert(map.id, map.clone());
        Ok(())
    }
}

pub struct InMemoryScheduleRepository {
    table: MemoryTable<Schedule>,
}

impl InMemoryScheduleRepository {
    pub fn new() -> Self {
        Self {
            table: MemoryTable::new(),
        }
    }

    pub async fn insert(&self, schedule: Schedule) -> Schedule {
        let mut state = self.table.write().await;
        let mut schedule = schedule;
        if schedule.id == 0 {
            schedule.id = state.allocate_id();
        }
        state.insert(schedule.id, schedule.clone());
        schedule
    }
}

impl Default for InMemoryScheduleRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryScheduleRepository {
    async fn find_online_by_process_definition(
        &self,
        process_definition_id: i64,
    ) -> SchedulerResult<Vec<Schedule>> {
        Ok(self
            .table
            .filter(|s| s.online && s.process_definition_id == process_definition_id)
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn definition() -> ProcessDefinition {
        ProcessDefinition {
            id: 0,
            name: "daily".to_string(),
            version: 1,
            process_definition_json: r#"{"tasks":[]}"#.to_string(),
            timeout: 0,
            tenant_id: 0,
            receivers: Vec::new(),
            receivers_cc: Vec::new(),
            update_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_assigns_id_then_overwrites() {
        let definitions = InMemoryProcessDefinitionRepository::new();
        let definition = definitions.insert(definition()).await;
        let repo = InMemoryProcessInstanceRepository::new();

        let mut instance = ProcessInstance::from_definition(&definition);
        repo.save(&mut instance).await.unwrap();
        assert_eq!(instance.id, 1);

        instance.state = ExecutionStatus::Success;
        repo.save(&mut instance).await.unwrap();
        assert_eq!(repo.count().await, 1);
        let stored = repo.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(stored.state, ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn test_update_missing_instance_fails() {
        let repo = InMemoryProcessInstanceRepository::new();
        let mut instance = ProcessInstance::from_definition(&definition());
        instance.id = 42;
        assert!(matches!(
            repo.update(&instance).await,
            Err(SchedulerError::ProcessInstanceNotFound { id: 42 })
        ));
    }

    #[tokio::test]
    async fn test_clear_host_only_when_owned() {
        let repo = InMemoryProcessInstanceRepository::new();
        let mut instance = ProcessInstance::from_definition(&definition());
        instance.host = Some("master-a".to_string());
        repo.save(&mut instance).await.unwrap();

        assert!(!repo.clear_host_if_owned(instance.id, "master-b").await.unwrap());
        assert!(repo.clear_host_if_owned(instance.id, "master-a").await.unwrap());
        assert!(!repo.clear_host_if_owned(instance.id, "master-a").await.unwrap());
    }

    #[tokio::test]
    async fn test_find_last_in_window() {
        let repo = InMemoryProcessInstanceRepository::new();
        let base = Utc::now();
        for offset in [1, 3, 10] {
            let mut instance = ProcessInstance::from_definition(&definition());
            instance.process_definition_id = 7;
            instance.schedule_time = Some(base - Duration::hours(offset));
            repo.save(&mut instance).await.unwrap();
        }

        let last = repo
            .find_last_in_window(7, base - Duration::hours(5), base)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(last.schedule_time, Some(base - Duration::hours(1)));
        assert!(repo
            .find_last_in_window(8, base - Duration::hours(5), base)
            .await
            .unwrap()
            .is_none());
    }
}
