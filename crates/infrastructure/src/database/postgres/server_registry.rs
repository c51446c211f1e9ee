use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::models::{NodeType, ServerNode};
use scheduler_core::traits::ServerRegistry;
use scheduler_core::SchedulerResult;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

/// 基于数据库表的注册中心
pub struct PostgresServerRegistry {
    pool: PgPool,
}

impl PostgresServerRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_node(row: &sqlx::postgres::PgRow) -> SchedulerResult<ServerNode> {
        Ok(ServerNode {
            host: row.try_get("host")?,
            node_type: row.try_get("node_type")?,
            worker_group: row.try_get("worker_group")?,
            start_time: row.try_get("start_time")?,
            last_heartbeat: row.try_get("last_heartbeat")?,
        })
    }
}

#[async_trait]
impl ServerRegistry for PostgresServerRegistry {
    #[instrument(skip(self, node), fields(host = %node.host, node_type = %node.node_type))]
    async fn register(&self, node: &ServerNode) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO server_nodes (host, node_type, worker_group, start_time, last_heartbeat)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (host, node_type) DO UPDATE
            SET worker_group = EXCLUDED.worker_group, start_time = EXCLUDED.start_time,
                last_heartbeat = EXCLUDED.last_heartbeat
            "#,
        )
        .bind(&node.host)
        .bind(node.node_type)
        .bind(&node.worker_group)
        .bind(node.start_time)
        .bind(node.last_heartbeat)
        .execute(&self.pool)
        .await?;
        debug!("节点注册成功: {}", node.host);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn heartbeat(
        &self,
        host: &str,
        node_type: NodeType,
        at: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO server_nodes (host, node_type, start_time, last_heartbeat)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (host, node_type) DO UPDATE SET last_heartbeat = EXCLUDED.last_heartbeat
            "#,
        )
        .bind(host)
        .bind(node_type)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&self, node_type: NodeType) -> SchedulerResult<Vec<ServerNode>> {
        let rows = sqlx::query(
            "SELECT host, node_type, worker_group, start_time, last_heartbeat FROM server_nodes WHERE node_type = $1 ORDER BY host ASC",
        )
        .bind(node_type)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_node).collect()
    }

    #[instrument(skip(self))]
    async fn remove(&self, host: &str, node_type: NodeType) -> SchedulerResult<bool> {
        let result = sqlx::query("DELETE FROM server_nodes WHERE host = $1 AND node_type = $2")
            .bind(host)
            .bind(node_type)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn worker_group_hosts(&self, worker_group: &str) -> SchedulerResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT host FROM server_nodes WHERE node_type = 'WORKER' AND worker_group = $1 ORDER BY host ASC",
        )
        .bind(worker_group)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("host").map_err(Into::into))
            .collect()
    }
}
