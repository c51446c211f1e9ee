//! 引擎内部生成的命令
//!
//! 等待线程恢复、容错恢复与子工作流启动都通过写入新命令完成，
//! 由物化器在下一轮统一处理。

use chrono::Utc;
use tracing::{debug, info};

use scheduler_core::models::{
    Command, CommandParams, CommandType, ProcessInstance, TaskDependType,
};
use scheduler_core::SchedulerResult;

use crate::context::EngineContext;

/// 为等待线程的实例写入恢复命令
///
/// 子工作流实例由父工作流重新拉起，只删除原命令。原命令已是恢复命令时原地刷新，
/// 否则删除原命令并以其为模板插入新的恢复命令。
pub async fn create_recovery_waiting_thread_command(
    ctx: &EngineContext,
    origin: Option<&Command>,
    instance: &ProcessInstance,
) -> SchedulerResult<()> {
    if instance.is_sub_process() {
        if let Some(command) = origin.filter(|c| c.id > 0) {
            ctx.commands.delete(command.id).await?;
        }
        return Ok(());
    }

    let params = CommandParams {
        waiting_thread_instance_id: Some(instance.id),
        ..Default::default()
    };

    let Some(origin) = origin else {
        let mut command = Command::new(CommandType::RecoverWaitingThread, instance.process_definition_id);
        command.command_param = Some(params.to_json()?);
        command.task_depend_type = instance.task_depend_type;
        command.failure_strategy = instance.failure_strategy;
        command.warning_type = instance.warning_type;
        command.warning_group_id = instance.warning_group_id;
        command.schedule_time = instance.schedule_time;
        command.executor_id = instance.executor_id;
        command.process_instance_priority = instance.process_instance_priority;
        command.worker_group = Some(instance.worker_group.clone());
        let saved = ctx.commands.insert(&command).await?;
        info!("工作流实例 {} 等待线程，已写入恢复命令 {}", instance.id, saved.id);
        return Ok(());
    };

    if origin.command_type == CommandType::RecoverWaitingThread {
        let mut command = origin.clone();
        command.update_time = Utc::now();
        ctx.commands.update(&command).await?;
        debug!("刷新等待线程恢复命令 {}", command.id);
        return Ok(());
    }

    ctx.commands.delete(origin.id).await?;
    let mut command = origin.clone();
    command.id = 0;
    command.command_type = CommandType::RecoverWaitingThread;
    command.command_param = Some(params.to_json()?);
    command.update_time = Utc::now();
    command.process_instance_priority = instance.process_instance_priority;
    let saved = ctx.commands.insert(&command).await?;
    info!(
        "命令 {} 转为等待线程恢复命令 {}，工作流实例: {}",
        origin.id, saved.id, instance.id
    );
    Ok(())
}

/// 为失去Master的实例写入容错恢复命令
pub async fn create_tolerance_recovery_command(
    ctx: &EngineContext,
    instance: &ProcessInstance,
) -> SchedulerResult<Command> {
    let params = CommandParams {
        recover_process_instance_id: Some(instance.id),
        ..Default::default()
    };
    let mut command = Command::new(
        CommandType::RecoverToleranceFaultProcess,
        instance.process_definition_id,
    );
    command.command_param = Some(params.to_json()?);
    command.executor_id = instance.executor_id;
    command.process_instance_priority = instance.process_instance_priority;
    ctx.commands.insert(&command).await
}

/// 子工作流启动命令
///
/// 继承父实例的失败策略、告警设置、调度时间与优先级，依赖方式固定为向后执行。
pub fn sub_process_command(
    parent: &ProcessInstance,
    command_type: CommandType,
    sub_process_definition_id: i64,
    params: &CommandParams,
) -> SchedulerResult<Command> {
    let mut command = Command::new(command_type, sub_process_definition_id);
    command.command_param = Some(params.to_json()?);
    command.task_depend_type = TaskDependType::TaskPost;
    command.failure_strategy = parent.failure_strategy;
    command.warning_type = parent.warning_type;
    command.warning_group_id = parent.warning_group_id;
    command.schedule_time = parent.schedule_time;
    command.executor_id = parent.executor_id;
    command.process_instance_priority = parent.process_instance_priority;
    command.worker_group = Some(parent.worker_group.clone());
    Ok(command)
}
