//! 依赖表达式求值
//!
//! 同一实例内的依赖项比较兄弟任务的状态；跨工作流依赖项查找被依赖定义在日期区间内的
//! 最后一个实例。

use tracing::{debug, warn};

use scheduler_core::models::{
    DependResult, DependentItem, DependentParameters, ExecutionStatus, DEPENDENT_ALL,
};
use scheduler_core::utils::dependent_date::date_intervals;
use scheduler_core::SchedulerResult;

use super::TaskRunContext;

/// 计算整个依赖表达式
pub async fn evaluate_dependence(
    ctx: &TaskRunContext<'_>,
    params: &DependentParameters,
) -> SchedulerResult<DependResult> {
    let mut model_results = Vec::with_capacity(params.depend_task_list.len());
    for model in &params.depend_task_list {
        let mut item_results = Vec::with_capacity(model.depend_item_list.len());
        for item in &model.depend_item_list {
            item_results.push(evaluate_item(ctx, item).await?);
        }
        model_results.push(DependResult::combine(model.relation, &item_results));
    }
    let result = DependResult::combine(params.relation, &model_results);
    debug!(
        "任务 {} 的依赖判断结果: {:?}",
        ctx.node.name, result
    );
    Ok(result)
}

async fn evaluate_item(ctx: &TaskRunContext<'_>, item: &DependentItem) -> SchedulerResult<DependResult> {
    match item.definition_id {
        None => evaluate_local(ctx, item).await,
        Some(definition_id) => evaluate_cross(ctx, item, definition_id).await,
    }
}

/// 同一实例内的依赖项：被依赖任务必须已结束且状态符合预期
async fn evaluate_local(ctx: &TaskRunContext<'_>, item: &DependentItem) -> SchedulerResult<DependResult> {
    let Some(task) = ctx
        .engine
        .task_instances
        .find_by_process_instance_and_name(ctx.instance.id, &item.dep_tasks)
        .await?
    else {
        debug!("依赖任务 {} 不存在", item.dep_tasks);
        return Ok(DependResult::Failed);
    };
    if !task.state.is_finished() {
        return Ok(DependResult::Waiting);
    }

    let expected = item.status.unwrap_or(ExecutionStatus::Success);
    let matched = if expected.is_success() {
        task.state.is_success()
    } else if expected.is_failure() {
        task.state.is_failure()
    } else {
        task.state == expected
    };
    Ok(if matched {
        DependResult::Success
    } else {
        DependResult::Failed
    })
}

/// 跨工作流依赖项：每个日期区间都要满足
async fn evaluate_cross(
    ctx: &TaskRunContext<'_>,
    item: &DependentItem,
    definition_id: i64,
) -> SchedulerResult<DependResult> {
    let anchor = ctx
        .instance
        .schedule_time
        .or(ctx.instance.start_time)
        .unwrap_or_else(chrono::Utc::now);
    let cycle = item.cycle.as_deref().unwrap_or("day");
    let date_value = item.date_value.as_deref().unwrap_or("today");
    let intervals = match date_intervals(anchor, cycle, date_value) {
        Ok(intervals) => intervals,
        Err(e) => {
            warn!("依赖项日期区间无效: {}", e);
            return Ok(DependResult::Failed);
        }
    };

    let mut result = DependResult::Failed;
    for interval in intervals {
        let Some(instance) = ctx
            .engine
            .process_instances
            .find_last_in_window(definition_id, interval.start, interval.end)
            .await?
        else {
            debug!(
                "工作流定义 {} 在 {} ~ {} 内没有实例",
                definition_id, interval.start, interval.end
            );
            return Ok(DependResult::Failed);
        };

        if item.dep_tasks == DEPENDENT_ALL {
            result = if instance.state.is_finished() {
                result_by_state(instance.state)
            } else {
                DependResult::Waiting
            };
        } else {
            let task = ctx
                .engine
                .task_instances
                .find_by_process_instance_and_name(instance.id, &item.dep_tasks)
                .await?;
            result = match task {
                Some(task) => result_by_state(task.state),
                None if instance.state.is_finished() => DependResult::Failed,
                None => return Ok(DependResult::Waiting),
            };
        }

        if result != DependResult::Success {
            break;
        }
    }
    Ok(result)
}

/// 按状态判断依赖结果，运行中与等待线程视为等待
pub fn result_by_state(state: ExecutionStatus) -> DependResult {
    if state.is_running() || state == ExecutionStatus::WaitingThread {
        DependResult::Waiting
    } else if state.is_success() {
        DependResult::Success
    } else {
        DependResult::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_by_state() {
        assert_eq!(result_by_state(ExecutionStatus::SubmittedSuccess), DependResult::Waiting);
        assert_eq!(result_by_state(ExecutionStatus::WaitingThread), DependResult::Waiting);
        assert_eq!(result_by_state(ExecutionStatus::ForcedSuccess), DependResult::Success);
        assert_eq!(result_by_state(ExecutionStatus::Kill), DependResult::Failed);
    }
}
