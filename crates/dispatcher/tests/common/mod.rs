#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use scheduler_core::models::{
    Command, ExecutionStatus, Flag, ProcessDefinition, ProcessInstance, TaskInstance,
};
use scheduler_core::traits::TaskQueue;
use scheduler_dispatcher::{EngineContext, Materializer, TaskProcessorRegistry, WorkflowCoordinator};
use scheduler_infrastructure::{InMemoryAlertSender, InMemoryBackend, InMemoryTaskQueue};
use scheduler_testing_utils::TestEnv;

pub const WORKER_HOST: &str = "192.168.1.20:1234";

/// 内存引擎：共享同一个内存后端、任务队列与告警记录
pub struct Harness {
    pub backend: InMemoryBackend,
    pub queue: Arc<InMemoryTaskQueue>,
    pub alerts: Arc<InMemoryAlertSender>,
    pub ctx: EngineContext,
}

impl Harness {
    pub fn new() -> Self {
        let backend = InMemoryBackend::new();
        let queue = Arc::new(InMemoryTaskQueue::new());
        let alerts = Arc::new(InMemoryAlertSender::new());
        let ctx = EngineContext::in_memory(
            &backend,
            queue.clone(),
            alerts.clone(),
            TestEnv::fast_master_config(),
        );
        Self {
            backend,
            queue,
            alerts,
            ctx,
        }
    }

    pub async fn add_definition(&self, definition: ProcessDefinition) -> ProcessDefinition {
        self.backend.process_definitions.insert(definition).await
    }

    /// 物化命令，得到待运行的实例
    pub async fn materialize(&self, command: Command) -> Option<ProcessInstance> {
        let command = self.ctx.commands.insert(&command).await.unwrap();
        self.materialize_existing(command).await
    }

    /// 物化已在命令表中的命令
    pub async fn materialize_existing(&self, command: Command) -> Option<ProcessInstance> {
        Materializer::new(self.ctx.clone())
            .handle_command(&command, self.ctx.config.exec_threads)
            .await
            .unwrap()
    }

    /// 运行协调器直到实例结束
    pub async fn run(&self, instance: ProcessInstance) -> ProcessInstance {
        let coordinator = WorkflowCoordinator::new(
            self.ctx.clone(),
            Arc::new(TaskProcessorRegistry::with_defaults()),
            instance,
        );
        timeout(Duration::from_secs(10), coordinator.run())
            .await
            .expect("工作流实例未在限定时间内结束")
            .unwrap()
    }

    pub async fn tasks_of(&self, process_instance_id: i64) -> Vec<TaskInstance> {
        self.backend
            .task_instances
            .all_by_process_instance(process_instance_id)
            .await
    }

    pub async fn valid_task(&self, process_instance_id: i64, name: &str) -> Option<TaskInstance> {
        self.tasks_of(process_instance_id)
            .await
            .into_iter()
            .find(|t| t.name == name && t.flag == Flag::Yes)
    }

    /// 模拟Worker：从队列取出任务，按任务名给出的结果结束任务，未指定的任务成功
    pub fn spawn_worker(&self, outcomes: &[(&str, ExecutionStatus)]) -> WorkerGuard {
        let outcomes: HashMap<String, ExecutionStatus> = outcomes
            .iter()
            .map(|(name, state)| (name.to_string(), *state))
            .collect();
        self.spawn_worker_by(move |task| {
            outcomes
                .get(&task.name)
                .copied()
                .unwrap_or(ExecutionStatus::Success)
        })
    }

    /// 模拟Worker：任务结果由回调根据任务实例决定
    pub fn spawn_worker_by<F>(&self, outcome: F) -> WorkerGuard
    where
        F: Fn(&TaskInstance) -> ExecutionStatus + Send + Sync + 'static,
    {
        let queue = self.queue.clone();
        let ctx = self.ctx.clone();
        let handle = tokio::spawn(async move {
            loop {
                for key in queue.poll(10).await.unwrap_or_default() {
                    let Ok(Some(mut task)) = ctx.task_instances.find_by_id(key.task_instance_id).await else {
                        continue;
                    };
                    let now = Utc::now();
                    task.host = Some(WORKER_HOST.to_string());
                    task.start_time = Some(now);
                    task.end_time = Some(now);
                    task.state = outcome(&task);
                    let _ = ctx.task_instances.save(&mut task).await;
                }
                sleep(Duration::from_millis(5)).await;
            }
        });
        WorkerGuard(handle)
    }
}

/// 测试结束时停止模拟Worker
pub struct WorkerGuard(JoinHandle<()>);

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}
