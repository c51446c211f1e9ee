use async_trait::async_trait;
use scheduler_core::models::{ExecutionStatus, Property, TaskInstance, TaskTimeout};
use scheduler_core::traits::TaskInstanceRepository;
use scheduler_core::SchedulerResult;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use super::process_instance_repository::state_texts;

const TASK_COLUMNS: &str = "id, name, task_type, process_definition_id, process_instance_id, task_params, state, submit_time, start_time, end_time, host, alert_flag, retry_times, max_retry_times, retry_interval, flag, task_instance_priority, process_instance_priority, dependency, worker_group, executor_id, var_pool, timeout, first_submit_time";

pub struct PostgresTaskInstanceRepository {
    pool: PgPool,
}

impl PostgresTaskInstanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &sqlx::postgres::PgRow) -> SchedulerResult<TaskInstance> {
        let var_pool: Json<Vec<Property>> = row.try_get("var_pool")?;
        let timeout: Json<TaskTimeout> = row.try_get("timeout")?;
        Ok(TaskInstance {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            task_type: row.try_get("task_type")?,
            process_definition_id: row.try_get("process_definition_id")?,
            process_instance_id: row.try_get("process_instance_id")?,
            task_params: row.try_get("task_params")?,
            state: row.try_get("state")?,
            submit_time: row.try_get("submit_time")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            host: row.try_get("host")?,
            alert_flag: row.try_get("alert_flag")?,
            retry_times: row.try_get("retry_times")?,
            max_retry_times: row.try_get("max_retry_times")?,
            retry_interval: row.try_get("retry_interval")?,
            flag: row.try_get("flag")?,
            task_instance_priority: row.try_get("task_instance_priority")?,
            process_instance_priority: row.try_get("process_instance_priority")?,
            dependency: row.try_get("dependency")?,
            worker_group: row.try_get("worker_group")?,
            executor_id: row.try_get("executor_id")?,
            var_pool: var_pool.0,
            timeout: timeout.0,
            first_submit_time: row.try_get("first_submit_time")?,
        })
    }

    async fn fetch_many(
        &self,
        condition: &str,
        bind: impl FnOnce(
            sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
        ) -> sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> SchedulerResult<Vec<TaskInstance>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM task_instances WHERE {condition}");
        let rows = bind(sqlx::query(&sql)).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_task).collect()
    }
}

#[async_trait]
impl TaskInstanceRepository for PostgresTaskInstanceRepository {
    #[instrument(skip(self, task), fields(task_id = %task.id, task_name = %task.name, state = %task.state))]
    async fn save(&self, task: &mut TaskInstance) -> SchedulerResult<()> {
        if task.id == 0 {
            let row = sqlx::query(
                r#"
                INSERT INTO task_instances (name, task_type, process_definition_id, process_instance_id, task_params, state, submit_time, start_time, end_time, host, alert_flag, retry_times, max_retry_times, retry_interval, flag, task_instance_priority, process_instance_priority, dependency, worker_group, executor_id, var_pool, timeout, first_submit_time)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
                RETURNING id
                "#,
            )
            .bind(&task.name)
            .bind(&task.task_type)
            .bind(task.process_definition_id)
            .bind(task.process_instance_id)
            .bind(&task.task_params)
            .bind(task.state)
            .bind(task.submit_time)
            .bind(task.start_time)
            .bind(task.end_time)
            .bind(&task.host)
            .bind(task.alert_flag)
            .bind(task.retry_times)
            .bind(task.max_retry_times)
            .bind(task.retry_interval)
            .bind(task.flag)
            .bind(task.task_instance_priority)
            .bind(task.process_instance_priority)
            .bind(&task.dependency)
            .bind(&task.worker_group)
            .bind(task.executor_id)
            .bind(Json(&task.var_pool))
            .bind(Json(&task.timeout))
            .bind(task.first_submit_time)
            .fetch_one(&self.pool)
            .await?;
            task.id = row.try_get("id")?;
            debug!("插入任务实例成功: ID {}", task.id);
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE task_instances
            SET name = $2, task_type = $3, process_definition_id = $4, process_instance_id = $5,
                task_params = $6, state = $7, submit_time = $8, start_time = $9, end_time = $10,
                host = $11, alert_flag = $12, retry_times = $13, max_retry_times = $14,
                retry_interval = $15, flag = $16, task_instance_priority = $17,
                process_instance_priority = $18, dependency = $19, worker_group = $20,
                executor_id = $21, var_pool = $22, timeout = $23, first_submit_time = $24
            WHERE id = $1
            "#,
        )
        .bind(task.id)
        .bind(&task.name)
        .bind(&task.task_type)
        .bind(task.process_definition_id)
        .bind(task.process_instance_id)
        .bind(&task.task_params)
        .bind(task.state)
        .bind(task.submit_time)
        .bind(task.start_time)
        .bind(task.end_time)
        .bind(&task.host)
        .bind(task.alert_flag)
        .bind(task.retry_times)
        .bind(task.max_retry_times)
        .bind(task.retry_interval)
        .bind(task.flag)
        .bind(task.task_instance_priority)
        .bind(task.process_instance_priority)
        .bind(&task.dependency)
        .bind(&task.worker_group)
        .bind(task.executor_id)
        .bind(Json(&task.var_pool))
        .bind(Json(&task.timeout))
        .bind(task.first_submit_time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(task_id = %id))]
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<TaskInstance>> {
        let tasks = self.fetch_many("id = $1", |q| q.bind(id)).await?;
        Ok(tasks.into_iter().next())
    }

    #[instrument(skip(self), fields(process_instance_id = %process_instance_id))]
    async fn find_valid_by_process_instance(
        &self,
        process_instance_id: i64,
    ) -> SchedulerResult<Vec<TaskInstance>> {
        self.fetch_many("process_instance_id = $1 AND flag = 'YES' ORDER BY id ASC", |q| {
            q.bind(process_instance_id)
        })
        .await
    }

    #[instrument(skip(self), fields(process_instance_id = %process_instance_id, task_name = %name))]
    async fn find_by_process_instance_and_name(
        &self,
        process_instance_id: i64,
        name: &str,
    ) -> SchedulerResult<Option<TaskInstance>> {
        let name = name.to_string();
        let tasks = self
            .fetch_many(
                "process_instance_id = $1 AND name = $2 AND flag = 'YES' ORDER BY id DESC LIMIT 1",
                |q| q.bind(process_instance_id).bind(name),
            )
            .await?;
        Ok(tasks.into_iter().next())
    }

    #[instrument(skip(self), fields(process_instance_id = %process_instance_id, task_name = %name))]
    async fn find_previous_by_name(
        &self,
        process_instance_id: i64,
        name: &str,
    ) -> SchedulerResult<Option<TaskInstance>> {
        let name = name.to_string();
        let tasks = self
            .fetch_many(
                "process_instance_id = $1 AND name = $2 AND flag = 'NO' ORDER BY id DESC LIMIT 1",
                |q| q.bind(process_instance_id).bind(name),
            )
            .await?;
        Ok(tasks.into_iter().next())
    }

    #[instrument(skip(self, states), fields(host = %host))]
    async fn find_by_host_and_states(
        &self,
        host: &str,
        states: &[ExecutionStatus],
    ) -> SchedulerResult<Vec<TaskInstance>> {
        let host = host.to_string();
        let states = state_texts(states);
        self.fetch_many("host = $1 AND state = ANY($2) ORDER BY id ASC", |q| {
            q.bind(host).bind(states)
        })
        .await
    }

    #[instrument(skip(self, states))]
    async fn find_by_states(&self, states: &[ExecutionStatus]) -> SchedulerResult<Vec<TaskInstance>> {
        let states = state_texts(states);
        self.fetch_many("state = ANY($1) ORDER BY id ASC", |q| q.bind(states))
            .await
    }
}
