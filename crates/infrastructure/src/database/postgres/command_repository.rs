use async_trait::async_trait;
use scheduler_core::models::{Command, ErrorCommand};
use scheduler_core::traits::{CommandRepository, ErrorCommandRepository};
use scheduler_core::SchedulerResult;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

const COMMAND_COLUMNS: &str = "id, command_type, process_definition_id, command_param, task_depend_type, failure_strategy, warning_type, warning_group_id, schedule_time, start_time, executor_id, process_instance_priority, worker_group, update_time";

pub struct PostgresCommandRepository {
    pool: PgPool,
}

impl PostgresCommandRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_command(row: &sqlx::postgres::PgRow) -> SchedulerResult<Command> {
        Ok(Command {
            id: row.try_get("id")?,
            command_type: row.try_get("command_type")?,
            process_definition_id: row.try_get("process_definition_id")?,
            command_param: row.try_get("command_param")?,
            task_depend_type: row.try_get("task_depend_type")?,
            failure_strategy: row.try_get("failure_strategy")?,
            warning_type: row.try_get("warning_type")?,
            warning_group_id: row.try_get("warning_group_id")?,
            schedule_time: row.try_get("schedule_time")?,
            start_time: row.try_get("start_time")?,
            executor_id: row.try_get("executor_id")?,
            process_instance_priority: row.try_get("process_instance_priority")?,
            worker_group: row.try_get("worker_group")?,
            update_time: row.try_get("update_time")?,
        })
    }
}

#[async_trait]
impl CommandRepository for PostgresCommandRepository {
    #[instrument(skip(self, command), fields(
        command_type = %command.command_type,
        process_definition_id = %command.process_definition_id,
    ))]
    async fn insert(&self, command: &Command) -> SchedulerResult<Command> {
        let sql = format!(
            r#"
            INSERT INTO commands (command_type, process_definition_id, command_param, task_depend_type, failure_strategy, warning_type, warning_group_id, schedule_time, start_time, executor_id, process_instance_priority, process_instance_priority_ordinal, worker_group, update_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW())
            RETURNING {COMMAND_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(command.command_type)
            .bind(command.process_definition_id)
            .bind(&command.command_param)
            .bind(command.task_depend_type)
            .bind(command.failure_strategy)
            .bind(command.warning_type)
            .bind(command.warning_group_id)
            .bind(command.schedule_time)
            .bind(command.start_time)
            .bind(command.executor_id)
            .bind(command.process_instance_priority)
            .bind(command.process_instance_priority.ordinal())
            .bind(&command.worker_group)
            .fetch_one(&self.pool)
            .await?;

        let created = Self::row_to_command(&row)?;
        debug!("插入命令成功: ID {}", created.id);
        Ok(created)
    }

    #[instrument(skip(self, command), fields(command_id = %command.id))]
    async fn update(&self, command: &Command) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            UPDATE commands
            SET command_type = $2, process_definition_id = $3, command_param = $4, task_depend_type = $5,
                failure_strategy = $6, warning_type = $7, warning_group_id = $8, schedule_time = $9,
                start_time = $10, executor_id = $11, process_instance_priority = $12,
                process_instance_priority_ordinal = $13, worker_group = $14, update_time = NOW()
            WHERE id = $1
            "#,
        )
        .bind(command.id)
        .bind(command.command_type)
        .bind(command.process_definition_id)
        .bind(&command.command_param)
        .bind(command.task_depend_type)
        .bind(command.failure_strategy)
        .bind(command.warning_type)
        .bind(command.warning_group_id)
        .bind(command.schedule_time)
        .bind(command.start_time)
        .bind(command.executor_id)
        .bind(command.process_instance_priority)
        .bind(command.process_instance_priority.ordinal())
        .bind(&command.worker_group)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(command_id = %id))]
    async fn delete(&self, id: i64) -> SchedulerResult<bool> {
        let result = sqlx::query("DELETE FROM commands WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(command_id = %id))]
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<Command>> {
        let sql = format!("SELECT {COMMAND_COLUMNS} FROM commands WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_command).transpose()
    }

    #[instrument(skip(self))]
    async fn find_one(&self) -> SchedulerResult<Option<Command>> {
        let sql = format!(
            "SELECT {COMMAND_COLUMNS} FROM commands ORDER BY process_instance_priority_ordinal ASC, id ASC LIMIT 1"
        );
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::row_to_command).transpose()
    }

    #[instrument(skip(self))]
    async fn list(&self) -> SchedulerResult<Vec<Command>> {
        let sql = format!("SELECT {COMMAND_COLUMNS} FROM commands ORDER BY id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_command).collect()
    }
}

pub struct PostgresErrorCommandRepository {
    pool: PgPool,
}

impl PostgresErrorCommandRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ErrorCommandRepository for PostgresErrorCommandRepository {
    #[instrument(skip(self, error_command), fields(command_id = %error_command.id))]
    async fn insert(&self, error_command: &ErrorCommand) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO error_commands (id, command, message)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET command = EXCLUDED.command, message = EXCLUDED.message
            "#,
        )
        .bind(error_command.id)
        .bind(Json(&error_command.command))
        .bind(&error_command.message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&self) -> SchedulerResult<Vec<ErrorCommand>> {
        let rows = sqlx::query("SELECT id, command, message FROM error_commands ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> SchedulerResult<ErrorCommand> {
                let command: Json<Command> = row.try_get("command")?;
                Ok(ErrorCommand {
                    id: row.try_get("id")?,
                    command: command.0,
                    message: row.try_get("message")?,
                })
            })
            .collect()
    }
}
