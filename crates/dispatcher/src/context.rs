use std::sync::Arc;

use scheduler_core::config::MasterConfig;
use scheduler_core::traits::{
    AlertSender, CommandRepository, ErrorCommandRepository, ProcessDefinitionRepository,
    ProcessInstanceMapRepository, ProcessInstanceRepository, ScheduleRepository, ServerRegistry,
    TaskInstanceRepository, TaskQueue,
};
use scheduler_infrastructure::{DatabaseManager, InMemoryBackend, MetricsCollector};

/// Master运行所需的全部依赖
///
/// 物化器、协调器、提交器和容错管理器共享同一份上下文，克隆只复制引用。
#[derive(Clone)]
pub struct EngineContext {
    pub commands: Arc<dyn CommandRepository>,
    pub error_commands: Arc<dyn ErrorCommandRepository>,
    pub process_definitions: Arc<dyn ProcessDefinitionRepository>,
    pub process_instances: Arc<dyn ProcessInstanceRepository>,
    pub task_instances: Arc<dyn TaskInstanceRepository>,
    pub process_instance_maps: Arc<dyn ProcessInstanceMapRepository>,
    pub schedules: Arc<dyn ScheduleRepository>,
    pub registry: Arc<dyn ServerRegistry>,
    pub task_queue: Arc<dyn TaskQueue>,
    pub alert_sender: Arc<dyn AlertSender>,
    pub metrics: Arc<MetricsCollector>,
    pub config: MasterConfig,
}

impl EngineContext {
    /// 使用PostgreSQL仓储构建上下文
    pub fn from_database(
        database: &DatabaseManager,
        task_queue: Arc<dyn TaskQueue>,
        alert_sender: Arc<dyn AlertSender>,
        config: MasterConfig,
    ) -> Self {
        Self {
            commands: database.command_repository(),
            error_commands: database.error_command_repository(),
            process_definitions: database.process_definition_repository(),
            process_instances: database.process_instance_repository(),
            task_instances: database.task_instance_repository(),
            process_instance_maps: database.process_instance_map_repository(),
            schedules: database.schedule_repository(),
            registry: database.server_registry(),
            task_queue,
            alert_sender,
            metrics: Arc::new(MetricsCollector::new()),
            config,
        }
    }

    /// 使用内存仓储构建上下文，用于嵌入模式与测试
    pub fn in_memory(
        backend: &InMemoryBackend,
        task_queue: Arc<dyn TaskQueue>,
        alert_sender: Arc<dyn AlertSender>,
        config: MasterConfig,
    ) -> Self {
        Self {
            commands: backend.commands.clone(),
            error_commands: backend.error_commands.clone(),
            process_definitions: backend.process_definitions.clone(),
            process_instances: backend.process_instances.clone(),
            task_instances: backend.task_instances.clone(),
            process_instance_maps: backend.process_instance_maps.clone(),
            schedules: backend.schedules.clone(),
            registry: backend.registry.clone(),
            task_queue,
            alert_sender,
            metrics: Arc::new(MetricsCollector::new()),
            config,
        }
    }

    /// 当前Master的主机标识
    pub fn host(&self) -> &str {
        &self.config.listen_host
    }
}
