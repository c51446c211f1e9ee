mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use common::{Harness, WORKER_HOST};
use scheduler_core::models::{CommandParams, CommandType, ExecutionStatus, Flag, ProcessDefinition};
use scheduler_core::traits::TaskQueue;
use scheduler_dispatcher::{
    FaultToleranceManager, MasterSchedulerService, TaskProcessorRegistry,
};
use scheduler_testing_utils::{
    utc, CommandBuilder, ProcessDefinitionBuilder, ProcessInstanceBuilder, TaskInstanceBuilder,
    TaskNodeBuilder, TestEnv,
};

const DEAD_MASTER: &str = "192.168.1.9:5678";

fn recover_params(process_instance_id: i64) -> CommandParams {
    CommandParams {
        recover_process_instance_id: Some(process_instance_id),
        ..Default::default()
    }
}

async fn queued_then_next(harness: &Harness) -> ProcessDefinition {
    harness
        .add_definition(
            ProcessDefinitionBuilder::new()
                .with_tasks(vec![
                    TaskNodeBuilder::shell("queued").build(),
                    TaskNodeBuilder::shell("next").with_pre_tasks(&["queued"]).build(),
                ])
                .build(),
        )
        .await
}

/// 任务进入队列后把实例置为指定的请求状态
fn request_when_queued(
    harness: &Harness,
    process_instance_id: i64,
    request: ExecutionStatus,
) -> JoinHandle<bool> {
    let queue = harness.queue.clone();
    let repo = harness.ctx.process_instances.clone();
    tokio::spawn(async move {
        let queued = TestEnv::wait_for(
            || {
                let queue = queue.clone();
                async move { queue.size().await.unwrap_or(0) == 1 }
            },
            Duration::from_secs(5),
        )
        .await;
        let mut latest = repo.find_by_id(process_instance_id).await.unwrap().unwrap();
        latest.state = request;
        repo.update(&latest).await.unwrap();
        queued
    })
}

#[tokio::test]
async fn test_start_failure_task_process_reruns_failed_branch() {
    let harness = Harness::new();
    let definition = harness
        .add_definition(
            ProcessDefinitionBuilder::new()
                .with_tasks(vec![
                    TaskNodeBuilder::shell("a").build(),
                    TaskNodeBuilder::shell("b").with_pre_tasks(&["a"]).build(),
                    TaskNodeBuilder::shell("c").with_pre_tasks(&["b"]).build(),
                ])
                .build(),
        )
        .await;

    let first_worker = harness.spawn_worker(&[("b", ExecutionStatus::Failure)]);
    let instance = harness
        .materialize(CommandBuilder::new(CommandType::StartProcess, definition.id).build())
        .await
        .unwrap();
    let failed = harness.run(instance).await;
    drop(first_worker);
    assert_eq!(failed.state, ExecutionStatus::Failure);
    let a = harness.valid_task(failed.id, "a").await.unwrap();
    let failed_b = harness.valid_task(failed.id, "b").await.unwrap();
    assert!(harness.valid_task(failed.id, "c").await.is_none());

    let _worker = harness.spawn_worker(&[]);
    let recovered = harness
        .materialize(
            CommandBuilder::new(CommandType::StartFailureTaskProcess, definition.id)
                .with_params(recover_params(failed.id))
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(recovered.id, failed.id);
    assert_eq!(recovered.run_times, 2);
    assert_eq!(recovered.state, ExecutionStatus::RunningExecution);
    assert_eq!(recovered.command_param.start_node_ids(), vec![failed_b.id]);
    let old_b = harness
        .ctx
        .task_instances
        .find_by_id(failed_b.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(old_b.flag, Flag::No);

    let finished = harness.run(recovered).await;

    assert_eq!(finished.state, ExecutionStatus::Success);
    let tasks = harness.tasks_of(finished.id).await;
    // 只重跑失败节点及其下游
    let a_rows: Vec<_> = tasks.iter().filter(|t| t.name == "a").collect();
    assert_eq!(a_rows.len(), 1);
    assert_eq!(a_rows[0].id, a.id);
    assert_eq!(tasks.iter().filter(|t| t.name == "b").count(), 2);
    let b = harness.valid_task(finished.id, "b").await.unwrap();
    assert_ne!(b.id, failed_b.id);
    assert_eq!(b.state, ExecutionStatus::Success);
    let c = harness.valid_task(finished.id, "c").await.unwrap();
    assert_eq!(c.state, ExecutionStatus::Success);
}

#[tokio::test]
async fn test_recover_suspended_process_resumes_paused_task() {
    let harness = Harness::new();
    let definition = queued_then_next(&harness).await;
    let instance = harness
        .materialize(CommandBuilder::new(CommandType::StartProcess, definition.id).build())
        .await
        .unwrap();
    let pauser = request_when_queued(&harness, instance.id, ExecutionStatus::ReadyPause);
    let paused = harness.run(instance).await;
    assert!(pauser.await.unwrap());
    assert_eq!(paused.state, ExecutionStatus::Pause);
    let paused_task = harness.valid_task(paused.id, "queued").await.unwrap();
    assert_eq!(paused_task.state, ExecutionStatus::Pause);

    let recovered = harness
        .materialize(
            CommandBuilder::new(CommandType::RecoverSuspendedProcess, definition.id)
                .with_params(recover_params(paused.id))
                .build(),
        )
        .await
        .unwrap();
    assert_eq!(recovered.run_times, 2);
    assert_eq!(recovered.command_param.start_node_ids(), vec![paused_task.id]);
    let reset = harness
        .ctx
        .task_instances
        .find_by_id(paused_task.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reset.state, ExecutionStatus::SubmittedSuccess);
    assert_eq!(reset.flag, Flag::Yes);

    let _worker = harness.spawn_worker(&[]);
    let finished = harness.run(recovered).await;

    assert_eq!(finished.state, ExecutionStatus::Success);
    let tasks = harness.tasks_of(finished.id).await;
    // 暂停的任务复用原记录
    assert_eq!(tasks.iter().filter(|t| t.name == "queued").count(), 1);
    let queued = harness.valid_task(finished.id, "queued").await.unwrap();
    assert_eq!(queued.id, paused_task.id);
    assert_eq!(queued.state, ExecutionStatus::Success);
    let next = harness.valid_task(finished.id, "next").await.unwrap();
    assert_eq!(next.state, ExecutionStatus::Success);
}

#[tokio::test]
async fn test_stop_request_kills_queued_task() {
    let harness = Harness::new();
    let definition = queued_then_next(&harness).await;
    let instance = harness
        .materialize(CommandBuilder::new(CommandType::StartProcess, definition.id).build())
        .await
        .unwrap();

    let stopper = request_when_queued(&harness, instance.id, ExecutionStatus::ReadyStop);
    let finished = harness.run(instance).await;
    assert!(stopper.await.unwrap());

    assert_eq!(finished.state, ExecutionStatus::Stop);
    assert!(finished.end_time.is_some());
    assert_eq!(harness.queue.size().await.unwrap(), 0);
    let queued = harness.valid_task(finished.id, "queued").await.unwrap();
    assert_eq!(queued.state, ExecutionStatus::Kill);
    assert!(queued.end_time.is_some());
    assert!(harness.valid_task(finished.id, "next").await.is_none());
}

#[tokio::test]
async fn test_failed_task_is_retried_with_new_row() {
    let harness = Harness::new();
    let definition = harness
        .add_definition(
            ProcessDefinitionBuilder::new()
                .with_task(TaskNodeBuilder::shell("flaky").with_retries(1, 0).build())
                .build(),
        )
        .await;
    // 首次运行失败，重试成功
    let _worker = harness.spawn_worker_by(|task| {
        if task.retry_times == 0 {
            ExecutionStatus::Failure
        } else {
            ExecutionStatus::Success
        }
    });

    let instance = harness
        .materialize(CommandBuilder::new(CommandType::StartProcess, definition.id).build())
        .await
        .unwrap();
    let finished = harness.run(instance).await;

    assert_eq!(finished.state, ExecutionStatus::Success);
    let tasks = harness.tasks_of(finished.id).await;
    assert_eq!(tasks.len(), 2);
    let first = tasks.iter().find(|t| t.flag == Flag::No).unwrap();
    assert_eq!(first.state, ExecutionStatus::Failure);
    assert_eq!(first.retry_times, 0);
    let retried = harness.valid_task(finished.id, "flaky").await.unwrap();
    assert_ne!(retried.id, first.id);
    assert_eq!(retried.state, ExecutionStatus::Success);
    assert_eq!(retried.retry_times, 1);
    assert_eq!(retried.max_retry_times, 1);
}

#[tokio::test]
async fn test_tolerance_recovery_runs_through_master_loop_once() {
    let harness = Harness::new();
    let definition = harness
        .add_definition(
            ProcessDefinitionBuilder::new()
                .with_tasks(vec![
                    TaskNodeBuilder::shell("done").build(),
                    TaskNodeBuilder::shell("running").build(),
                    TaskNodeBuilder::shell("next")
                        .with_pre_tasks(&["done", "running"])
                        .build(),
                ])
                .build(),
        )
        .await;
    let mut instance = ProcessInstanceBuilder::new(&definition)
        .with_state(ExecutionStatus::RunningExecution)
        .with_host(DEAD_MASTER)
        .build();
    harness.ctx.process_instances.save(&mut instance).await.unwrap();

    let mut done = TaskInstanceBuilder::new("done", instance.id)
        .with_state(ExecutionStatus::Success)
        .with_host(WORKER_HOST)
        .build();
    done.end_time = Some(Utc::now());
    harness.ctx.task_instances.save(&mut done).await.unwrap();
    // Worker仍在执行该任务，接管后不能再次下发
    let mut running = TaskInstanceBuilder::new("running", instance.id)
        .with_state(ExecutionStatus::RunningExecution)
        .with_host(WORKER_HOST)
        .with_start_time(Utc::now())
        .build();
    running.submit_time = None;
    harness.ctx.task_instances.save(&mut running).await.unwrap();

    let recovered = FaultToleranceManager::new(harness.ctx.clone())
        .failover_master(DEAD_MASTER)
        .await
        .unwrap();
    assert_eq!(recovered, 1);

    // 新Master重新提交后，Worker报告任务完成
    let tasks = harness.ctx.task_instances.clone();
    let running_id = running.id;
    let finisher = tokio::spawn(async move {
        let resubmitted = TestEnv::wait_for(
            || {
                let tasks = tasks.clone();
                async move {
                    matches!(
                        tasks.find_by_id(running_id).await,
                        Ok(Some(task)) if task.submit_time.is_some()
                    )
                }
            },
            Duration::from_secs(5),
        )
        .await;
        let mut task = tasks.find_by_id(running_id).await.unwrap().unwrap();
        task.state = ExecutionStatus::Success;
        task.end_time = Some(Utc::now());
        tasks.save(&mut task).await.unwrap();
        resubmitted
    });
    let _worker = harness.spawn_worker(&[]);

    let service = MasterSchedulerService::new(
        harness.ctx.clone(),
        Arc::new(TaskProcessorRegistry::with_defaults()),
    );
    assert!(service.schedule_once().await.unwrap());
    assert!(harness.ctx.commands.list().await.unwrap().is_empty());

    let repo = harness.ctx.process_instances.clone();
    let instance_id = instance.id;
    let finished = TestEnv::wait_for(
        || {
            let repo = repo.clone();
            async move {
                matches!(
                    repo.find_by_id(instance_id).await,
                    Ok(Some(instance)) if instance.state.is_finished()
                )
            }
        },
        Duration::from_secs(10),
    )
    .await;
    assert!(finisher.await.unwrap());
    assert!(finished);

    let stored = harness
        .ctx
        .process_instances
        .find_by_id(instance.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.state, ExecutionStatus::Success);
    assert_eq!(stored.host.as_deref(), Some(harness.ctx.host()));
    assert!(stored
        .history_cmds()
        .contains(&CommandType::RecoverToleranceFaultProcess));

    // 每个节点只有一条记录，已完成与运行中的任务都没有被再次执行
    let tasks = harness.tasks_of(instance.id).await;
    assert_eq!(tasks.len(), 3);
    let done_after = harness.valid_task(instance.id, "done").await.unwrap();
    assert_eq!(done_after.id, done.id);
    let running_after = harness.valid_task(instance.id, "running").await.unwrap();
    assert_eq!(running_after.id, running.id);
    assert_eq!(running_after.state, ExecutionStatus::Success);
    let next = harness.valid_task(instance.id, "next").await.unwrap();
    assert_eq!(next.state, ExecutionStatus::Success);
}

#[tokio::test]
async fn test_complement_on_existing_instance_resets_run() {
    let harness = Harness::new();
    let definition = harness
        .add_definition(
            ProcessDefinitionBuilder::new()
                .with_task(TaskNodeBuilder::shell("a").build())
                .build(),
        )
        .await;
    let mut range = CommandParams::default();
    range.set_complement_range(utc(2019, 1, 1, 0, 0, 0), utc(2019, 1, 3, 0, 0, 0));

    let previous_start = Utc::now() - chrono::Duration::hours(2);
    let mut instance = ProcessInstanceBuilder::new(&definition)
        .with_state(ExecutionStatus::Success)
        .with_command_type(CommandType::ComplementData)
        .with_params(range.clone())
        .build();
    instance.start_time = Some(previous_start);
    instance.end_time = Some(previous_start + chrono::Duration::hours(1));
    harness.ctx.process_instances.save(&mut instance).await.unwrap();
    let mut old = TaskInstanceBuilder::new("a", instance.id)
        .with_state(ExecutionStatus::Success)
        .build();
    harness.ctx.task_instances.save(&mut old).await.unwrap();

    let mut params = range;
    params.recover_process_instance_id = Some(instance.id);
    let rerun = harness
        .materialize(
            CommandBuilder::new(CommandType::ComplementData, definition.id)
                .with_params(params)
                .build(),
        )
        .await
        .unwrap();

    assert_eq!(rerun.id, instance.id);
    assert_eq!(rerun.run_times, instance.run_times + 1);
    assert!(rerun.end_time.is_none());
    assert!(rerun.start_time.unwrap() > previous_start);
    assert_eq!(rerun.state, ExecutionStatus::RunningExecution);
    assert_eq!(rerun.schedule_time, Some(utc(2019, 1, 1, 0, 0, 0)));
    let old = harness
        .ctx
        .task_instances
        .find_by_id(old.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(old.flag, Flag::No);
}
