//! Workflow Repository
//!
//! Persists CD workflows and their stage runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use stagehand_core::domain::workflow::{
    ExecutorType, NewWorkflowRun, RunStatus, StageType, Workflow, WorkflowRun,
};
use uuid::Uuid;

/// Storage for workflows and stage runs
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn create_workflow(
        &self,
        artifact_id: i64,
        pipeline_id: i64,
        created_on: DateTime<Utc>,
    ) -> Result<Workflow, sqlx::Error>;

    async fn find_workflow(&self, id: i64) -> Result<Option<Workflow>, sqlx::Error>;

    /// Inserts a run and returns its id
    async fn create_run(&self, run: &WorkflowRun) -> Result<i64, sqlx::Error>;

    /// Writes back status, message, pod status, finish time and reservations
    async fn update_run(&self, run: &WorkflowRun) -> Result<(), sqlx::Error>;

    async fn find_run(&self, id: i64) -> Result<Option<WorkflowRun>, sqlx::Error>;

    /// Latest run of `stage` within a workflow
    async fn find_run_by_workflow_and_stage(
        &self,
        workflow_id: i64,
        stage: StageType,
    ) -> Result<Option<WorkflowRun>, sqlx::Error>;

    /// Latest run of `stage` across all workflows of a pipeline
    async fn find_latest_run_by_pipeline_and_stage(
        &self,
        pipeline_id: i64,
        stage: StageType,
    ) -> Result<Option<WorkflowRun>, sqlx::Error>;
}

/// Postgres implementation of [`WorkflowRepository`]
#[derive(Clone)]
pub struct PgWorkflowRepository {
    pool: PgPool,
}

impl PgWorkflowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const RUN_COLUMNS: &str = r#"
    r.id, r.cd_workflow_id, r.name, r.workflow_type, r.status, r.message, r.pod_status,
    r.started_on, r.finished_on, r.triggered_by, r.namespace, r.executor_type,
    r.blob_storage_enabled, r.log_location, r.reference_id, r.ref_cd_workflow_runner_id,
    r.image_path_reservation_ids
"#;

#[async_trait]
impl WorkflowRepository for PgWorkflowRepository {
    async fn create_workflow(
        &self,
        artifact_id: i64,
        pipeline_id: i64,
        created_on: DateTime<Utc>,
    ) -> Result<Workflow, sqlx::Error> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO cd_workflows (ci_artifact_id, pipeline_id, created_on)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(artifact_id)
        .bind(pipeline_id)
        .bind(created_on)
        .fetch_one(&self.pool)
        .await?;

        Ok(Workflow {
            id,
            artifact_id,
            pipeline_id,
            created_on,
        })
    }

    async fn find_workflow(&self, id: i64) -> Result<Option<Workflow>, sqlx::Error> {
        let row = sqlx::query_as::<_, WorkflowRow>(
            r#"
            SELECT id, ci_artifact_id, pipeline_id, created_on
            FROM cd_workflows
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn create_run(&self, run: &WorkflowRun) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            INSERT INTO cd_workflow_runners (
                cd_workflow_id, name, workflow_type, status, message, pod_status,
                started_on, finished_on, triggered_by, namespace, executor_type,
                blob_storage_enabled, log_location, reference_id,
                ref_cd_workflow_runner_id, image_path_reservation_ids
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING id
            "#,
        )
        .bind(run.workflow_id)
        .bind(&run.name)
        .bind(run.stage_type.as_str())
        .bind(run.status().as_str())
        .bind(run.message())
        .bind(&run.pod_status)
        .bind(run.started_on)
        .bind(run.finished_on())
        .bind(run.triggered_by)
        .bind(&run.namespace)
        .bind(run.executor_type.as_str())
        .bind(run.blob_storage_enabled)
        .bind(&run.log_location)
        .bind(run.reference_id)
        .bind(run.ref_runner_id)
        .bind(&run.image_path_reservation_ids)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_run(&self, run: &WorkflowRun) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE cd_workflow_runners
            SET status = $1, message = $2, pod_status = $3, finished_on = $4,
                image_path_reservation_ids = $5
            WHERE id = $6
            "#,
        )
        .bind(run.status().as_str())
        .bind(run.message())
        .bind(&run.pod_status)
        .bind(run.finished_on())
        .bind(&run.image_path_reservation_ids)
        .bind(run.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_run(&self, id: i64) -> Result<Option<WorkflowRun>, sqlx::Error> {
        let query = format!("SELECT {RUN_COLUMNS} FROM cd_workflow_runners r WHERE r.id = $1");
        let row = sqlx::query_as::<_, WorkflowRunRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn find_run_by_workflow_and_stage(
        &self,
        workflow_id: i64,
        stage: StageType,
    ) -> Result<Option<WorkflowRun>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {RUN_COLUMNS}
            FROM cd_workflow_runners r
            WHERE r.cd_workflow_id = $1 AND r.workflow_type = $2
            ORDER BY r.id DESC
            LIMIT 1
            "#
        );
        let row = sqlx::query_as::<_, WorkflowRunRow>(&query)
            .bind(workflow_id)
            .bind(stage.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn find_latest_run_by_pipeline_and_stage(
        &self,
        pipeline_id: i64,
        stage: StageType,
    ) -> Result<Option<WorkflowRun>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT {RUN_COLUMNS}
            FROM cd_workflow_runners r
            INNER JOIN cd_workflows w ON w.id = r.cd_workflow_id
            WHERE w.pipeline_id = $1 AND r.workflow_type = $2
            ORDER BY r.id DESC
            LIMIT 1
            "#
        );
        let row = sqlx::query_as::<_, WorkflowRunRow>(&query)
            .bind(pipeline_id)
            .bind(stage.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.into()))
    }
}

// =============================================================================
// Helper Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct WorkflowRow {
    id: i64,
    ci_artifact_id: i64,
    pipeline_id: i64,
    created_on: DateTime<Utc>,
}

impl From<WorkflowRow> for Workflow {
    fn from(row: WorkflowRow) -> Self {
        Workflow {
            id: row.id,
            artifact_id: row.ci_artifact_id,
            pipeline_id: row.pipeline_id,
            created_on: row.created_on,
        }
    }
}

#[derive(sqlx::FromRow)]
struct WorkflowRunRow {
    id: i64,
    cd_workflow_id: i64,
    name: String,
    workflow_type: String,
    status: String,
    message: String,
    pod_status: String,
    started_on: DateTime<Utc>,
    finished_on: Option<DateTime<Utc>>,
    triggered_by: i32,
    namespace: String,
    executor_type: String,
    blob_storage_enabled: bool,
    log_location: String,
    reference_id: Option<Uuid>,
    ref_cd_workflow_runner_id: Option<i64>,
    image_path_reservation_ids: Vec<i64>,
}

impl From<WorkflowRunRow> for WorkflowRun {
    fn from(row: WorkflowRunRow) -> Self {
        let mut run = WorkflowRun::starting(NewWorkflowRun {
            workflow_id: row.cd_workflow_id,
            name: row.name,
            stage_type: string_to_stage(&row.workflow_type),
            started_on: row.started_on,
            triggered_by: row.triggered_by,
            namespace: row.namespace,
            executor_type: string_to_executor(&row.executor_type),
            blob_storage_enabled: row.blob_storage_enabled,
            log_location: row.log_location,
            reference_id: row.reference_id,
            ref_runner_id: row.ref_cd_workflow_runner_id,
        })
        .with_persisted_state(
            string_to_status(&row.status),
            row.message,
            row.finished_on,
        );
        run.id = row.id;
        run.pod_status = row.pod_status;
        run.image_path_reservation_ids = row.image_path_reservation_ids;
        run
    }
}

fn string_to_stage(s: &str) -> StageType {
    match s {
        "PRE" => StageType::Pre,
        "POST" => StageType::Post,
        _ => StageType::Deploy,
    }
}

fn string_to_status(s: &str) -> RunStatus {
    match s {
        "Starting" => RunStatus::Starting,
        "Running" => RunStatus::Running,
        "Succeeded" => RunStatus::Succeeded,
        "Cancelled" => RunStatus::Cancelled,
        _ => RunStatus::Failed,
    }
}

fn string_to_executor(s: &str) -> ExecutorType {
    match s {
        "SYSTEM" => ExecutorType::System,
        _ => ExecutorType::Awf,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_conversion_restores_state() {
        let now = Utc::now();
        let row = WorkflowRunRow {
            id: 42,
            cd_workflow_id: 7,
            name: "deploy-prod".to_string(),
            workflow_type: "POST".to_string(),
            status: "Failed".to_string(),
            message: "dispatch failed: timeout".to_string(),
            pod_status: "Pending".to_string(),
            started_on: now,
            finished_on: Some(now),
            triggered_by: 3,
            namespace: "devtron-cd".to_string(),
            executor_type: "SYSTEM".to_string(),
            blob_storage_enabled: true,
            log_location: "arsenal-v1/7POST-deploy-prod/main.log".to_string(),
            reference_id: None,
            ref_cd_workflow_runner_id: Some(40),
            image_path_reservation_ids: vec![5, 6],
        };

        let run: WorkflowRun = row.into();
        assert_eq!(run.id, 42);
        assert_eq!(run.stage_type, StageType::Post);
        assert_eq!(run.status(), RunStatus::Failed);
        assert_eq!(run.message(), "dispatch failed: timeout");
        assert_eq!(run.finished_on(), Some(now));
        assert_eq!(run.executor_type, ExecutorType::System);
        assert_eq!(run.ref_runner_id, Some(40));
        assert_eq!(run.image_path_reservation_ids, vec![5, 6]);
    }

    #[test]
    fn test_string_to_status() {
        for status in [
            RunStatus::Starting,
            RunStatus::Running,
            RunStatus::Succeeded,
            RunStatus::Failed,
            RunStatus::Cancelled,
        ] {
            assert_eq!(string_to_status(status.as_str()), status);
        }
    }
}
