use async_trait::async_trait;
use scheduler_core::models::{ProcessDefinition, ProcessInstanceMap, Schedule};
use scheduler_core::traits::{
    ProcessDefinitionRepository, ProcessInstanceMapRepository, ScheduleRepository,
};
use scheduler_core::SchedulerResult;
use sqlx::{PgPool, Row};
use tracing::instrument;

pub struct PostgresProcessDefinitionRepository {
    pool: PgPool,
}

impl PostgresProcessDefinitionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessDefinitionRepository for PostgresProcessDefinitionRepository {
    #[instrument(skip(self), fields(process_definition_id = %id))]
    async fn find_by_id(&self, id: i64) -> SchedulerResult<Option<ProcessDefinition>> {
        let row = sqlx::query(
            "SELECT id, name, version, process_definition_json, timeout, tenant_id, receivers, receivers_cc, update_time FROM process_definitions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(ProcessDefinition {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                version: row.try_get("version")?,
                process_definition_json: row.try_get("process_definition_json")?,
                timeout: row.try_get("timeout")?,
                tenant_id: row.try_get("tenant_id")?,
                receivers: row.try_get("receivers")?,
                receivers_cc: row.try_get("receivers_cc")?,
                update_time: row.try_get("update_time")?,
            })),
            None => Ok(None),
        }
    }
}

pub struct PostgresProcessInstanceMapRepository {
    pool: PgPool,
}

impl PostgresProcessInstanceMapRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_map(row: &sqlx::postgres::PgRow) -> SchedulerResult<ProcessInstanceMap> {
        Ok(ProcessInstanceMap {
            id: row.try_get("id")?,
            parent_process_instance_id: row.try_get("parent_process_instance_id")?,
            parent_task_instance_id: row.try_get("parent_task_instance_id")?,
            process_instance_id: row.try_get("process_instance_id")?,
        })
    }
}

#[async_trait]
impl ProcessInstanceMapRepository for PostgresProcessInstanceMapRepository {
    #[instrument(skip(self))]
    async fn find(
        &self,
        parent_process_instance_id: i64,
        parent_task_instance_id: i64,
    ) -> SchedulerResult<Option<ProcessInstanceMap>> {
        let row = sqlx::query(
            "SELECT id, parent_process_instance_id, parent_task_instance_id, process_instance_id FROM process_instance_maps WHERE parent_process_instance_id = $1 AND parent_task_instance_id = $2 ORDER BY id DESC LIMIT 1",
        )
        .bind(parent_process_instance_id)
        .bind(parent_task_instance_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_map).transpose()
    }

    #[instrument(skip(self))]
    async fn find_by_child(
        &self,
        process_instance_id: i64,
    ) -> SchedulerResult<Option<ProcessInstanceMap>> {
        let row = sqlx::query(
            "SELECT id, parent_process_instance_id, parent_task_instance_id, process_instance_id FROM process_instance_maps WHERE process_instance_id = $1 ORDER BY id DESC LIMIT 1",
        )
        .bind(process_instance_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_map).transpose()
    }

    #[instrument(skip(self, map), fields(map_id = %map.id))]
    async fn save(&self, map: &mut ProcessInstanceMap) -> SchedulerResult<()> {
        if map.id == 0 {
            let row = sqlx::query(
                "INSERT INTO process_instance_maps (parent_process_instance_id, parent_task_instance_id, process_instance_id) VALUES ($1, $2, $3) RETURNING id",
            )
            .bind(map.parent_process_instance_id)
            .bind(map.parent_task_instance_id)
            .bind(map.process_instance_id)
            .fetch_one(&self.pool)
            .await?;
            map.id = row.try_get("id")?;
            return Ok(());
        }

        sqlx::query(
            "UPDATE process_instance_maps SET parent_process_instance_id = $2, parent_task_instance_id = $3, process_instance_id = $4 WHERE id = $1",
        )
        .bind(map.id)
        .bind(map.parent_process_instance_id)
        .bind(map.parent_task_instance_id)
        .bind(map.process_instance_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub struct PostgresScheduleRepository {
    pool: PgPool,
}

impl PostgresScheduleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleRepository for PostgresScheduleRepository {
    #[instrument(skip(self))]
    async fn find_online_by_process_definition(
        &self,
        process_definition_id: i64,
    ) -> SchedulerResult<Vec<Schedule>> {
        let rows = sqlx::query(
            "SELECT id, process_definition_id, start_time, end_time, crontab, online FROM schedules WHERE process_definition_id = $1 AND online = TRUE ORDER BY id ASC",
        )
        .bind(process_definition_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> SchedulerResult<Schedule> {
                Ok(Schedule {
                    id: row.try_get("id")?,
                    process_definition_id: row.try_get("process_definition_id")?,
                    start_time: row.try_get("start_time")?,
                    end_time: row.try_get("end_time")?,
                    crontab: row.try_get("crontab")?,
                    online: row.try_get("online")?,
                })
            })
            .collect()
    }
}
