//! Image Path Reservation Repository
//!
//! Claims on destination image paths produced by plugins. A path can be
//! claimed by at most one active reservation; the claim is enforced by the
//! store (a partial unique index in Postgres, a single lock in memory), never
//! by a separate check-then-insert.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use stagehand_core::domain::custom_tag::ImagePathReservation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("image path {image_path} is already reserved")]
    Conflict { image_path: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait ImagePathReservationRepository: Send + Sync {
    /// Reserves every path in `image_paths` or none of them
    async fn reserve_all(
        &self,
        image_paths: &[String],
        custom_tag_id: i64,
    ) -> Result<Vec<ImagePathReservation>, ReservationError>;

    /// Releases reservations so their paths can be claimed again
    async fn release(&self, reservation_ids: &[i64]) -> Result<(), sqlx::Error>;
}

// =============================================================================
// Postgres
// =============================================================================

/// Postgres implementation of [`ImagePathReservationRepository`]
#[derive(Clone)]
pub struct PgReservationRepository {
    pool: PgPool,
}

impl PgReservationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ImagePathReservationRepository for PgReservationRepository {
    async fn reserve_all(
        &self,
        image_paths: &[String],
        custom_tag_id: i64,
    ) -> Result<Vec<ImagePathReservation>, ReservationError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut reservations = Vec::with_capacity(image_paths.len());

        for image_path in image_paths {
            let id: Option<i64> = sqlx::query_scalar(
                r#"
                INSERT INTO image_path_reservations (image_path, custom_tag_id, active, created_on)
                VALUES ($1, $2, TRUE, $3)
                ON CONFLICT (image_path) WHERE active DO NOTHING
                RETURNING id
                "#,
            )
            .bind(image_path)
            .bind(custom_tag_id)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(id) = id else {
                tx.rollback().await?;
                return Err(ReservationError::Conflict {
                    image_path: image_path.clone(),
                });
            };

            reservations.push(ImagePathReservation {
                id,
                image_path: image_path.clone(),
                custom_tag_id,
                created_on: now,
            });
        }

        tx.commit().await?;
        Ok(reservations)
    }

    async fn release(&self, reservation_ids: &[i64]) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE image_path_reservations SET active = FALSE WHERE id = ANY($1)")
            .bind(reservation_ids)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

// =============================================================================
// In-memory
// =============================================================================

#[derive(Default)]
struct ReservationTable {
    next_id: i64,
    /// Active reservations keyed by image path
    active: HashMap<String, ImagePathReservation>,
}

/// Process-local implementation of [`ImagePathReservationRepository`]
///
/// Suitable for single-instance deployments and tests.
#[derive(Clone, Default)]
pub struct InMemoryReservationRepository {
    table: Arc<Mutex<ReservationTable>>,
}

impl InMemoryReservationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths currently claimed
    pub fn active_paths(&self) -> Vec<String> {
        let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        let mut paths: Vec<String> = table.active.keys().cloned().collect();
        paths.sort();
        paths
    }

    fn reserve_locked(
        table: &mut ReservationTable,
        image_paths: &[String],
        custom_tag_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<ImagePathReservation>, ReservationError> {
        for (i, image_path) in image_paths.iter().enumerate() {
            if table.active.contains_key(image_path) || image_paths[..i].contains(image_path) {
                return Err(ReservationError::Conflict {
                    image_path: image_path.clone(),
                });
            }
        }

        let mut reservations = Vec::with_capacity(image_paths.len());
        for image_path in image_paths {
            table.next_id += 1;
            let reservation = ImagePathReservation {
                id: table.next_id,
                image_path: image_path.clone(),
                custom_tag_id,
                created_on: now,
            };
            table.active.insert(image_path.clone(), reservation.clone());
            reservations.push(reservation);
        }
        Ok(reservations)
    }
}

#[async_trait]
impl ImagePathReservationRepository for InMemoryReservationRepository {
    async fn reserve_all(
        &self,
        image_paths: &[String],
        custom_tag_id: i64,
    ) -> Result<Vec<ImagePathReservation>, ReservationError> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        Self::reserve_locked(&mut table, image_paths, custom_tag_id, Utc::now())
    }

    async fn release(&self, reservation_ids: &[i64]) -> Result<(), sqlx::Error> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table
            .active
            .retain(|_, reservation| !reservation_ids.contains(&reservation.id));
        Ok(())
    }
}
