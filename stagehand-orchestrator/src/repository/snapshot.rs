//! Workflow request snapshots
//!
//! The request dispatched for a run is kept verbatim so the run can later be
//! re-executed with exactly the same inputs.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use sqlx::types::Json;
use stagehand_core::domain::workflow::StageType;
use stagehand_core::dto::workflow_request::WorkflowRequest;

#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Stores the request dispatched for `runner_id`, replacing any earlier one
    async fn save(
        &self,
        runner_id: i64,
        stage: StageType,
        request: &WorkflowRequest,
    ) -> Result<(), sqlx::Error>;

    async fn find(
        &self,
        runner_id: i64,
        stage: StageType,
    ) -> Result<Option<WorkflowRequest>, sqlx::Error>;
}

/// Postgres implementation of [`SnapshotRepository`]
#[derive(Clone)]
pub struct PgSnapshotRepository {
    pool: PgPool,
}

impl PgSnapshotRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotRepository for PgSnapshotRepository {
    async fn save(
        &self,
        runner_id: i64,
        stage: StageType,
        request: &WorkflowRequest,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO workflow_request_snapshots (cd_workflow_runner_id, workflow_type, request, created_on)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (cd_workflow_runner_id, workflow_type)
            DO UPDATE SET request = EXCLUDED.request, created_on = EXCLUDED.created_on
            "#,
        )
        .bind(runner_id)
        .bind(stage.as_str())
        .bind(Json(request))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(
        &self,
        runner_id: i64,
        stage: StageType,
    ) -> Result<Option<WorkflowRequest>, sqlx::Error> {
        let row: Option<(Json<WorkflowRequest>,)> = sqlx::query_as(
            r#"
            SELECT request
            FROM workflow_request_snapshots
            WHERE cd_workflow_runner_id = $1 AND workflow_type = $2
            "#,
        )
        .bind(runner_id)
        .bind(stage.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(Json(request),)| request))
    }
}
