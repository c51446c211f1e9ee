use async_trait::async_trait;
use chrono::Utc;
use scheduler_core::models::{Command, ErrorCommand};
use scheduler_core::traits::{CommandRepository, ErrorCommandRepository};
use scheduler_core::SchedulerResult;
use tracing::debug;

use super::MemoryTable;

pub struct InMemoryCommandRepository {
    table: MemoryTable<Command>,
}

impl InMemoryCommandRepository {
    pub fn new() -> Self {
        Self {
            table: MemoryTable::new(),
        }
    }

    pub async fn count(&self) -> usize {
        self.table.len().await
    }
}

impl Default for InMemoryCommandRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRepository for InMemoryCommandRepository {
    async fn insert(&self, command: &Command) -> SchedulerResult<Command> {
        let mut state = self.table.write().await;
        let mut created = command.clone();
        created.id = state.allocate_id();
        created.update_time = Utc::now();
        state.insert(created.id, created.clone());
        debug!("插入命令: {} {}", created.id, created.command_type);
        Ok(created)
    }

    async fn update(&self, command: &Command) -> SchedulerResult<()> {
        let mut state = self.table.write().await;
        let mut updated = command.clone();
        updated.update_time = Utc::now();
        state.insert(updated.id, updated);
        Ok(())
    }

    async fn delete(&self, id: i64) -> SchedulerResult<bool> {
        Ok(self.table.write().await.rows.remove(&id).is_some())
    }

    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Command>> {
        Ok(self.table.get(id).await)
    }

    async fn find_one(&self) -> SchedulerResult<Option<Command>> {
        let commands = self.table.all().await;
        Ok(commands
            .into_iter()
            .min_by_key(|c| (c.process_instance_priority.ordinal(), c.id)))
    }

    async fn list(&self) -> SchedulerResult<Vec<Command>> {
        Ok(self.table.all().await)
    }
}

pub struct InMemoryErrorCommandRepository {
    table: MemoryTable<ErrorCommand>,
}

impl InMemoryErrorCommandRepository {
    pub fn new() -> Self {
        Self {
            table: MemoryTable::new(),
        }
    }
}

impl Default for InMemoryErrorCommandRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ErrorCommandRepository for InMemoryErrorCommandRepository {
    async fn insert(&self, error_command: &ErrorCommand) -> SchedulerResult<()> {
        let mut state = self.table.write().await;
        let id = if error_command.id > 0 {
            error_command.id
        } else {
            state.allocate_id()
        };
        let mut row = error_command.clone();
        row.id = id;
        state.insert(id, row);
        Ok(())
    }

    async fn list(&self) -> SchedulerResult<Vec<ErrorCommand>> {
        Ok(self.table.all().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scheduler_core::models::{CommandType, Priority};

    #[tokio::test]
    async fn test_find_one_orders_by_priority_then_id() {
        let repo = InMemoryCommandRepository::new();
        let mut low = Command::new(CommandType::StartProcess, 1);
        low.process_instance_priority = Priority::Low;
        repo.insert(&low).await.unwrap();
        let mut high = Command::new(CommandType::StartProcess, 2);
        high.process_instance_priority = Priority::High;
        let high = repo.insert(&high).await.unwrap();
        let mut high_later = Command::new(CommandType::StartProcess, 3);
        high_later.process_instance_priority = Priority::High;
        repo.insert(&high_later).await.unwrap();

        let next = repo.find_one().await.unwrap().unwrap();
        assert_eq!(next.id, high.id);
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let repo = InMemoryCommandRepository::new();
        let command = repo
            .insert(&Command::new(CommandType::StartProcess, 1))
            .await
            .unwrap();
        assert!(repo.delete(command.id).await.unwrap());
        assert!(!repo.delete(command.id).await.unwrap());
        assert!(repo.find_one().await.unwrap().is_none());
    }
}
