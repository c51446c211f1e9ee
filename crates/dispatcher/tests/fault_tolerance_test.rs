mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};

use common::{Harness, WORKER_HOST};
use scheduler_core::models::{CommandType, ExecutionStatus, NodeType, ServerNode};
use scheduler_dispatcher::{FaultToleranceManager, HeartbeatMonitor};
use scheduler_testing_utils::{
    ProcessDefinitionBuilder, ProcessInstanceBuilder, TaskInstanceBuilder, TaskNodeBuilder,
};

const DEAD_MASTER: &str = "192.168.1.9:5678";

async fn running_instance(harness: &Harness, host: &str) -> i64 {
    let definition = ProcessDefinitionBuilder::new().with_id(5).build();
    let mut instance = ProcessInstanceBuilder::new(&definition)
        .with_state(ExecutionStatus::RunningExecution)
        .with_host(host)
        .build();
    harness.ctx.process_instances.save(&mut instance).await.unwrap();
    instance.id
}

async fn running_task(harness: &Harness, process_instance_id: i64, name: &str, host: &str) -> i64 {
    let mut task = TaskInstanceBuilder::new(name, process_instance_id)
        .with_state(ExecutionStatus::RunningExecution)
        .with_host(host)
        .with_start_time(Utc::now() - Duration::minutes(5))
        .build();
    harness.ctx.task_instances.save(&mut task).await.unwrap();
    task.id
}

#[tokio::test]
async fn test_master_failover_creates_recovery_command() {
    let harness = Harness::new();
    let instance_id = running_instance(&harness, DEAD_MASTER).await;
    let manager = FaultToleranceManager::new(harness.ctx.clone());

    assert_eq!(manager.failover_master(DEAD_MASTER).await.unwrap(), 1);

    let commands = harness.ctx.commands.list().await.unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].command_type, CommandType::RecoverToleranceFaultProcess);
    assert_eq!(
        commands[0].params().unwrap().recover_process_instance_id,
        Some(instance_id)
    );
    let instance = harness
        .ctx
        .process_instances
        .find_by_id(instance_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(instance.host, None);

    // 再次接管时实例已无主机，不会重复写入命令
    assert_eq!(manager.failover_master(DEAD_MASTER).await.unwrap(), 0);
    assert_eq!(harness.ctx.commands.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_worker_failover_marks_tasks() {
    let harness = Harness::new();
    let instance_id = running_instance(&harness, "127.0.0.1:5678").await;
    let lost = running_task(&harness, instance_id, "lost", WORKER_HOST).await;
    let other = running_task(&harness, instance_id, "other", "192.168.1.21:1234").await;
    let manager = FaultToleranceManager::new(harness.ctx.clone());

    assert_eq!(manager.failover_worker(WORKER_HOST, false).await.unwrap(), 1);

    let lost = harness.ctx.task_instances.find_by_id(lost).await.unwrap().unwrap();
    assert_eq!(lost.state, ExecutionStatus::NeedFaultTolerance);
    let other = harness.ctx.task_instances.find_by_id(other).await.unwrap().unwrap();
    assert_eq!(other.state, ExecutionStatus::RunningExecution);
}

#[tokio::test]
async fn test_startup_failover() {
    let harness = Harness::new();
    let orphan = running_instance(&harness, DEAD_MASTER).await;
    let own = running_instance(&harness, harness.ctx.host()).await;
    let task = running_task(&harness, orphan, "lost", WORKER_HOST).await;

    let manager = FaultToleranceManager::new(harness.ctx.clone());
    manager.startup_failover().await.unwrap();

    let recovered: Vec<i64> = harness
        .ctx
        .commands
        .list()
        .await
        .unwrap()
        .iter()
        .filter_map(|c| c.params().ok()?.recover_process_instance_id)
        .collect();
    assert_eq!(recovered.len(), 2);
    assert!(recovered.contains(&orphan));
    assert!(recovered.contains(&own));

    let task = harness.ctx.task_instances.find_by_id(task).await.unwrap().unwrap();
    assert_eq!(task.state, ExecutionStatus::NeedFaultTolerance);
}

#[tokio::test]
async fn test_startup_failover_keeps_tasks_of_alive_worker() {
    let harness = Harness::new();
    let instance_id = running_instance(&harness, harness.ctx.host()).await;
    let task = running_task(&harness, instance_id, "fresh", WORKER_HOST).await;

    // Worker在任务开始之前启动，任务属于它的本次运行
    let mut worker = ServerNode::new(WORKER_HOST, NodeType::Worker);
    worker.start_time = Utc::now() - Duration::hours(1);
    harness.ctx.registry.register(&worker).await.unwrap();

    FaultToleranceManager::new(harness.ctx.clone())
        .startup_failover()
        .await
        .unwrap();

    let task = harness.ctx.task_instances.find_by_id(task).await.unwrap().unwrap();
    assert_eq!(task.state, ExecutionStatus::RunningExecution);
}

#[tokio::test]
async fn test_expired_nodes_are_failed_over_and_removed() {
    let harness = Harness::new();
    let instance_id = running_instance(&harness, DEAD_MASTER).await;
    let task = running_task(&harness, instance_id, "lost", WORKER_HOST).await;

    let stale = Utc::now() - Duration::minutes(10);
    let mut master = ServerNode::new(DEAD_MASTER, NodeType::Master);
    master.last_heartbeat = stale;
    let mut worker = ServerNode::new(WORKER_HOST, NodeType::Worker);
    worker.last_heartbeat = stale;
    harness.ctx.registry.register(&master).await.unwrap();
    harness.ctx.registry.register(&worker).await.unwrap();

    let monitor = HeartbeatMonitor::new(
        harness.ctx.clone(),
        Arc::new(FaultToleranceManager::new(harness.ctx.clone())),
    );
    monitor.register_self().await.unwrap();

    assert_eq!(monitor.check_expired().await.unwrap(), 2);

    let masters = harness.ctx.registry.list(NodeType::Master).await.unwrap();
    assert_eq!(masters.len(), 1);
    assert_eq!(masters[0].host, harness.ctx.host());
    assert!(harness.ctx.registry.list(NodeType::Worker).await.unwrap().is_empty());

    assert_eq!(harness.ctx.commands.list().await.unwrap().len(), 1);
    let task = harness.ctx.task_instances.find_by_id(task).await.unwrap().unwrap();
    assert_eq!(task.state, ExecutionStatus::NeedFaultTolerance);
}

#[tokio::test]
async fn test_tolerance_fault_task_is_resubmitted() {
    let harness = Harness::new();
    let definition = harness
        .add_definition(
            ProcessDefinitionBuilder::new()
                .with_task(TaskNodeBuilder::shell("lost").build())
                .build(),
        )
        .await;
    let mut instance = ProcessInstanceBuilder::new(&definition)
        .with_state(ExecutionStatus::RunningExecution)
        .with_host(DEAD_MASTER)
        .build();
    harness.ctx.process_instances.save(&mut instance).await.unwrap();
    let mut lost = TaskInstanceBuilder::new("lost", instance.id)
        .with_state(ExecutionStatus::NeedFaultTolerance)
        .with_host(WORKER_HOST)
        .build();
    lost.process_definition_id = definition.id;
    harness.ctx.task_instances.save(&mut lost).await.unwrap();

    FaultToleranceManager::new(harness.ctx.clone())
        .failover_master(DEAD_MASTER)
        .await
        .unwrap();
    let command = harness.ctx.commands.find_one().await.unwrap().unwrap();
    let _worker = harness.spawn_worker(&[]);
    let recovered = harness.materialize_existing(command).await.unwrap();
    assert_eq!(recovered.id, instance.id);

    let finished = harness.run(recovered).await;

    assert_eq!(finished.state, ExecutionStatus::Success);
    let tasks = harness.tasks_of(instance.id).await;
    assert_eq!(tasks.len(), 2);
    let retried = harness.valid_task(instance.id, "lost").await.unwrap();
    assert_ne!(retried.id, lost.id);
    assert_eq!(retried.state, ExecutionStatus::Success);
    // 容错重新提交不计入重试次数
    assert_eq!(retried.retry_times, 0);
}
