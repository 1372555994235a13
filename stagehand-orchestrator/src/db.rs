use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create workflows table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cd_workflows (
            id BIGSERIAL PRIMARY KEY,
            ci_artifact_id BIGINT NOT NULL,
            pipeline_id BIGINT NOT NULL,
            created_on TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create workflow runners table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cd_workflow_runners (
            id BIGSERIAL PRIMARY KEY,
            cd_workflow_id BIGINT NOT NULL REFERENCES cd_workflows(id) ON DELETE CASCADE,
            name VARCHAR(255) NOT NULL,
            workflow_type VARCHAR(20) NOT NULL,
            status VARCHAR(50) NOT NULL,
            message TEXT NOT NULL DEFAULT '',
            pod_status VARCHAR(50) NOT NULL,
            started_on TIMESTAMPTZ NOT NULL,
            finished_on TIMESTAMPTZ,
            triggered_by INTEGER NOT NULL,
            namespace VARCHAR(255) NOT NULL,
            executor_type VARCHAR(20) NOT NULL,
            blob_storage_enabled BOOLEAN NOT NULL DEFAULT FALSE,
            log_location TEXT NOT NULL,
            reference_id UUID,
            ref_cd_workflow_runner_id BIGINT,
            image_path_reservation_ids BIGINT[] NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_cd_workflow_runners_workflow ON cd_workflow_runners(cd_workflow_id, workflow_type)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_cd_workflows_pipeline ON cd_workflows(pipeline_id)",
    )
    .execute(pool)
    .await?;

    // Create image path reservations table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS image_path_reservations (
            id BIGSERIAL PRIMARY KEY,
            image_path TEXT NOT NULL,
            custom_tag_id BIGINT NOT NULL,
            active BOOLEAN NOT NULL DEFAULT TRUE,
            created_on TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one active claim per destination image
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_image_path_reservations_active
        ON image_path_reservations(image_path) WHERE active
        "#,
    )
    .execute(pool)
    .await?;

    // Create workflow request snapshots table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workflow_request_snapshots (
            cd_workflow_runner_id BIGINT NOT NULL,
            workflow_type VARCHAR(20) NOT NULL,
            request JSONB NOT NULL,
            created_on TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (cd_workflow_runner_id, workflow_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
