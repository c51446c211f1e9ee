use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::models::{CommandParams, ExecutionStatus, ProcessInstance, Property};
use scheduler_core::traits::ProcessInstanceRepository;
use scheduler_core::{SchedulerError, SchedulerResult};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

const INSTANCE_COLUMNS: &str = "id, process_definition_id, name, state, recovery, start_time, end_time, run_times, host, command_type, command_param, task_depend_type, max_try_times, failure_strategy, warning_type, warning_group_id, schedule_time, command_start_time, global_params, var_pool, process_instance_json, is_sub_process, executor_id, history_cmd, process_instance_priority, worker_group, timeout, tenant_id, update_time";

pub struct PostgresProcessInstanceRepository {
    pool: PgPool,
}

/// 状态列表转为文本数组，用于 `= ANY($n)` 查询
pub(crate) fn state_texts(states: &[ExecutionStatus]) -> Vec<String> {
    states.iter().map(|s| s.as_str().to_string()).collect()
}

impl PostgresProcessInstanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_instance(row: &sqlx::postgres::PgRow) -> SchedulerResult<ProcessInstance> {
        let command_param: Option<String> = row.try_get("command_param")?;
        let command_param = match command_param.as_deref() {
            Some(raw) if !raw.trim().is_empty() => CommandParams::from_json(raw)?,
            _ => CommandParams::default(),
        };
        let global_params: Json<Vec<Property>> = row.try_get("global_params")?;
        let var_pool: Json<Vec<Property>> = row.try_get("var_pool")?;

        Ok(ProcessInstance {
            id: row.try_get("id")?,
            process_definition_id: row.try_get("process_definition_id")?,
            name: row.try_get("name")?,
            state: row.try_get("state")?,
            recovery: row.try_get("recovery")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            run_times: row.try_get("run_times")?,
            host: row.try_get("host")?,
            command_type: row.try_get("command_type")?,
            command_param,
            task_depend_type: row.try_get("task_depend_type")?,
            max_try_times: row.try_get("max_try_times")?,
            failure_strategy: row.try_get("failure_strategy")?,
            warning_type: row.try_get("warning_type")?,
            warning_group_id: row.try_get("warning_group_id")?,
            schedule_time: row.try_get("schedule_time")?,
            command_start_time: row.try_get("command_start_time")?,
            global_params: global_params.0,
            var_pool: var_pool.0,
            process_instance_json: row.try_get("process_instance_json")?,
            is_sub_process: row.try_get("is_sub_process")?,
            executor_id: row.try_get("executor_id")?,
            history_cmd: row.try_get("history_cmd")?,
            process_instance_priority: row.try_get("process_instance_priority")?,
            worker_group: row.try_get("worker_group")?,
            timeout: row.try_get("timeout")?,
            tenant_id: row.try_get("tenant_id")?,
            update_time: row.try_get("update_time")?,
        })
    }

    async fn insert(&self, instance: &mut ProcessInstance) -> SchedulerResult<()> {
        let command_param = instance.command_param.to_json()?;
        let row = sqlx::query(
            r#"
            INSERT INTO process_instances (process_definition_id, name, state, recovery, start_time, end_time, run_times, host, command_type, command_param, task_depend_type, max_try_times, failure_strategy, warning_type, warning_group_id, schedule_time, command_start_time, global_params, var_pool, process_instance_json, is_sub_process, executor_id, history_cmd, process_instance_priority, worker_group, timeout, tenant_id, update_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, NOW())
            RETURNING id, update_time
            "#,
        )
        .bind(instance.process_definition_id)
        .bind(&instance.name)
        .bind(instance.state)
        .bind(instance.recovery)
        .bind(instance.start_time)
        .bind(instance.end_time)
        .bind(instance.run_times)
        .bind(&instance.host)
        .bind(instance.command_type)
        .bind(command_param)
        .bind(instance.task_depend_type)
        .bind(instance.max_try_times)
        .bind(instance.failure_strategy)
        .bind(instance.warning_type)
        .bind(instance.warning_group_id)
        .bind(instance.schedule_time)
        .bind(instance.command_start_time)
        .bind(Json(&instance.global_params))
        .bind(Json(&instance.var_pool))
        .bind(&instance.process_instance_json)
        .bind(instance.is_sub_process)
        .bind(instance.executor_id)
        .bind(&instance.history_cmd)
        .bind(instance.process_instance_priority)
        .bind(&instance.worker_group)
        .bind(instance.timeout)
        .bind(instance.tenant_id)
        .fetch_one(&self.pool)
        .await?;

        instance.id = row.try_get("id")?;
        instance.update_time = row.try_get("update_time")?;
        debug!("插入工作流实例成功: ID {}", instance.id);
        Ok(())
    }

    async fn update_row(&self, instance: &ProcessInstance) -> SchedulerResult<u64> {
        let command_param = instance.command_param.to_json()?;
        let result = sqlx::query(
            r#"
            UPDATE process_instances
            SET process_definition_id = $2, name = $3, state = $4, recovery = $5, start_time = $6,
                end_time = $7, run_times = $8, host = $9, command_type = $10, command_param = $11,
                task_depend_type = $12, max_try_times = $13, failure_strategy = $14, warning_type = $15,
                warning_group_id = $16, schedule_time = $17, command_start_time = $18,
                global_params = $19, var_pool = $20, process_instance_json = $21, is_sub_process = $22,
                executor_id = $23, history_cmd = $24, process_instance_priority = $25,
                worker_group = $26, timeout = $27, tenant_id = $28, update_time = NOW()
            WHERE id = $1
            "#,
        )
        .bind(instance.id)
        .bind(instance.process_definition_id)
        .bind(&instance.name)
        .bind(instance.state)
        .bind(instance.recovery)
        .bind(instance.start_time)
        .bind(instance.end_time)
        .bind(instance.run_times)
        .bind(&instance.host)
        .bind(instance.command_type)
        .bind(command_param)
        .bind(instance.task_depend_type)
        .bind(instance.max_try_times)
        .bind(instance.failure_strategy)
        .bind(instance.warning_type)
        .bind(instance.warning_group_id)
        .bind(instance.schedule_time)
        .bind(instance.command_start_time)
        .bind(Json(&instance.global_params))
        .bind(Json(&instance.var_pool))
        .bind(&instance.process_instance_json)
        .bind(instance.is_sub_process)
        .bind(instance.executor_id)
        .bind(&instance.history_cmd)
        .bind(instance.process_instance_priority)
        .bind(&instance.worker_group)
        .bind(instance.timeout)
        .bind(instance.tenant_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ProcessInstanceRepository for PostgresProcessInstanceRepository {
    #[instrument(skip(self, instance), fields(instance_id = %instance.id, state = %instance.state))]
    async fn save(&self, instance: &mut ProcessInstance) -> SchedulerResult<()> {
        if instance.id == 0 {
            return self.insert(instance).await;
        }
        self.update_row(instance).await?;
        Ok(())
    }

    #[instrument(skip(self, instance), fields(instance_id = %instance.id, state = %instance.state))]
    async fn update(&self, instance: &ProcessInstance) -> SchedulerResult<()> {
        if self.update_row(instance).await? == 0 {
            return Err(SchedulerError::ProcessInstanceNotFound { id: instance.id });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(instance_id = %id))]
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<ProcessInstance>> {
        let sql = format!("SELECT {INSTANCE_COLUMNS} FROM process_instances WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_instance).transpose()
    }

    #[instrument(skip(self, states), fields(host = %host))]
    async fn find_by_host_and_states(
        &self,
        host: &str,
        states: &[ExecutionStatus],
    ) -> SchedulerResult<Vec<ProcessInstance>> {
        let sql = format!(
            "SELECT {INSTANCE_COLUMNS} FROM process_instances WHERE host = $1 AND state = ANY($2) ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(host)
            .bind(state_texts(states))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_instance).collect()
    }

    #[instrument(skip(self, states))]
    async fn find_by_states(
        &self,
        states: &[ExecutionStatus],
    ) -> SchedulerResult<Vec<ProcessInstance>> {
        let sql = format!(
            "SELECT {INSTANCE_COLUMNS} FROM process_instances WHERE state = ANY($1) ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(state_texts(states))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_instance).collect()
    }

    #[instrument(skip(self), fields(process_definition_id = %process_definition_id))]
    async fn find_last_in_window(
        &self,
        process_definition_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> SchedulerResult<Option<ProcessInstance>> {
        let sql = format!(
            r#"
            SELECT {INSTANCE_COLUMNS} FROM process_instances
            WHERE process_definition_id = $1
              AND COALESCE(schedule_time, start_time) BETWEEN $2 AND $3
            ORDER BY COALESCE(schedule_time, start_time) DESC, id DESC
            LIMIT 1
            "#
        );
        let row = sqlx::query(&sql)
            .bind(process_definition_id)
            .bind(start)
            .bind(end)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_instance).transpose()
    }

    #[instrument(skip(self), fields(instance_id = %id, host = %host))]
    async fn clear_host_if_owned(&self, id: i64, host: &str) -> SchedulerResult<bool> {
        let result = sqlx::query(
            "UPDATE process_instances SET host = NULL, update_time = NOW() WHERE id = $1 AND host = $2",
        )
        .bind(id)
        .bind(host)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
