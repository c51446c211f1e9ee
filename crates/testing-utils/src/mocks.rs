//! Test doubles wrapping the in-memory repositories

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::models::{Command, ExecutionStatus, ProcessInstance};
use scheduler_core::traits::{CommandRepository, ProcessInstanceRepository};
use scheduler_core::{SchedulerError, SchedulerResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Process instance repository that counts `save` and `update` calls
///
/// Complement runs are verified by the number of instances saved, so the
/// two write paths are tracked separately.
pub struct CountingProcessInstanceRepository {
    inner: Arc<dyn ProcessInstanceRepository>,
    saves: AtomicUsize,
    updates: AtomicUsize,
}

impl CountingProcessInstanceRepository {
    pub fn new(inner: Arc<dyn ProcessInstanceRepository>) -> Self {
        Self {
            inner,
            saves: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessInstanceRepository for CountingProcessInstanceRepository {
    async fn save(&self, instance: &mut ProcessInstance) -> SchedulerResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(instance).await
    }

    async fn update(&self, instance: &ProcessInstance) -> SchedulerResult<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.inner.update(instance).await
    }

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<ProcessInstance>> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_host_and_states(
        &self,
        host: &str,
        states: &[ExecutionStatus],
    ) -> SchedulerResult<Vec<ProcessInstance>> {
        self.inner.find_by_host_and_states(host, states).await
    }

    async fn find_by_states(
        &self,
        states: &[ExecutionStatus],
    ) -> SchedulerResult<Vec<ProcessInstance>> {
        self.inner.find_by_states(states).await
    }

    async fn find_last_in_window(
        &self,
        process_definition_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SchedulerResult<Option<ProcessInstance>> {
        self.inner
            .find_last_in_window(process_definition_id, start, end)
            .await
    }

    async fn clear_host_if_owned(&self, id: i64, host: &str) -> SchedulerResult<bool> {
        self.inner.clear_host_if_owned(id, host).await
    }
}

/// Command repository whose first `failures` inserts fail
pub struct FailingCommandRepository {
    inner: Arc<dyn CommandRepository>,
    remaining_failures: AtomicUsize,
    inserts: AtomicUsize,
}

impl FailingCommandRepository {
    pub fn new(inner: Arc<dyn CommandRepository>, failures: usize) -> Self {
        Self {
            inner,
            remaining_failures: AtomicUsize::new(failures),
            inserts: AtomicUsize::new(0),
        }
    }

    /// Number of insert attempts, failed ones included
    pub fn insert_attempts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRepository for FailingCommandRepository {
    async fn insert(&self, command: &Command) -> SchedulerResult<Command> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(SchedulerError::DatabaseOperation(
                "simulated command insert failure".to_string(),
            ));
        }
        self.inner.insert(command).await
    }

    async fn update(&self, command: &Command) -> SchedulerResult<()> {
        self.inner.update(command).await
    }

    async fn delete(&self, id: i64) -> SchedulerResult<bool> {
        self.inner.delete(id).await
    }

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Command>> {
        self.inner.find_by_id(id).await
    }

    async fn find_one(&self) -> SchedulerResult<Option<Command>> {
        self.inner.find_one().await
    }

    async fn list(&self) -> SchedulerResult<Vec<Command>> {
        self.inner.list().await
    }
}
