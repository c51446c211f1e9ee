//! 内存仓储实现
//!
//! 用于嵌入模式与测试。每张“表”是一个以ID为键的有序映射，
//! 自增ID从1开始，写操作在同一把锁内完成。

mod command_repository;
mod process_repository;
mod registry;
mod task_instance_repository;

pub use command_repository::*;
pub use process_repository::*;
pub use registry::*;
pub use task_instance_repository::*;

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 带自增主键的内存表
#[derive(Debug)]
pub(crate) struct MemoryTable<T> {
    rows: RwLock<TableState<T>>,
}

#[derive(Debug)]
pub(crate) struct TableState<T> {
    pub rows: BTreeMap<i64, T>,
    next_id: i64,
}

impl<T> TableState<T> {
    /// 分配新ID，并保证后续ID大于已有的最大ID
    pub fn allocate_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, id: i64, row: T) {
        if id >= self.next_id {
            self.next_id = id + 1;
        }
        self.rows.insert(id, row);
    }
}

impl<T: Clone> MemoryTable<T> {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(TableState {
                rows: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    pub async fn get(&self, id: i64) -> Option<T> {
        self.rows.read().await.rows.get(&id).cloned()
    }

    pub async fn filter(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        self.rows
            .read()
            .await
            .rows
            .values()
            .filter(|row| predicate(row))
            .cloned()
            .collect()
    }

    pub async fn all(&self) -> Vec<T> {
        self.filter(|_| true).await
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.rows.len()
    }

    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, TableState<T>> {
        self.rows.write().await
    }
}

/// 内存仓储集合
///
/// 所有仓储共享同一进程内的数据，适合嵌入模式与集成测试。
#[derive(Clone)]
pub struct InMemoryBackend {
    pub commands: Arc<InMemoryCommandRepository>,
    pub error_commands: Arc<InMemoryErrorCommandRepository>,
    pub process_definitions: Arc<InMemoryProcessDefinitionRepository>,
    pub process_instances: Arc<InMemoryProcessInstanceRepository>,
    pub task_instances: Arc<InMemoryTaskInstanceRepository>,
    pub process_instance_maps: Arc<InMemoryProcessInstanceMapRepository>,
    pub schedules: Arc<InMemoryScheduleRepository>,
    pub registry: Arc<InMemoryServerRegistry>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            commands: Arc::new(InMemoryCommandRepository::new()),
            error_commands: Arc::new(InMemoryErrorCommandRepository::new()),
            process_definitions: Arc::new(InMemoryProcessDefinitionRepository::new()),
            process_instances: Arc::new(InMemoryProcessInstanceRepository::new()),
            task_instances: Arc::new(InMemoryTaskInstanceRepository::new()),
            process_instance_maps: Arc::new(InMemoryProcessInstanceMapRepository::new()),
            schedules: Arc::new(InMemoryScheduleRepository::new()),
            registry: Arc::new(InMemoryServerRegistry::new()),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}
