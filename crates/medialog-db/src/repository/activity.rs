//! # Activity Repository
//!
//! Database operations for the activity log.
//!
//! The `details` column is the "any" column family: a jsonb list of tagged
//! envelopes holding differently-typed detail records. Writes validate
//! every envelope against the registry (a type that cannot be read back
//! must not be written); reads hand envelopes back as-is, with
//! [`ActivityRepository::decode_details`] reconstructing concrete types.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use medialog_core::builder::{delete_from, insert_into, select};
use medialog_core::domain::{ActivityEntry, ActivityKind};
use medialog_core::dynamic::BoxedRecord;
use medialog_core::{from_row_map, CoreError, DbValue, DynamicDto, DynamicRegistry};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::executor::{execute_fragment, fetch_rows, QueryExecution};

const ACTIVITY_COLUMNS: [&str; 6] = [
    "id",
    "title_id",
    "kind",
    "occurred_at",
    "details",
    "created_at",
];

/// Repository for activity-log operations.
#[derive(Debug, Clone)]
pub struct ActivityRepository {
    pool: PgPool,
    dynamics: Arc<DynamicRegistry>,
}

impl ActivityRepository {
    /// Creates a new ActivityRepository.
    pub fn new(pool: PgPool, dynamics: Arc<DynamicRegistry>) -> Self {
        ActivityRepository { pool, dynamics }
    }

    /// The registry used to encode and decode detail envelopes.
    pub fn dynamics(&self) -> &DynamicRegistry {
        &self.dynamics
    }

    /// Records an activity entry; returns the generated id.
    ///
    /// Every detail envelope must name a registered type.
    pub async fn log(
        &self,
        title_id: Option<Uuid>,
        kind: ActivityKind,
        occurred_at: DateTime<Utc>,
        details: Vec<DynamicDto>,
    ) -> DbResult<Uuid> {
        for dto in &details {
            if !self.dynamics.is_registered(&dto.type_name) {
                return Err(DbError::Core(CoreError::UnknownDynamicType {
                    type_name: dto.type_name.clone(),
                }));
            }
        }

        debug!(kind = %kind.to_column_value(), details = details.len(), "Logging activity");

        let details_json = serde_json::to_value(&details)
            .map_err(|e| DbError::Core(CoreError::row_mapping("details", e.to_string(), "[]")))?;

        let fragment = insert_into("activity_log")
            // Explicit cast: a None must reach the server as a uuid null.
            .value("title_id", DbValue::typed(title_id, "uuid"))
            .value("kind", kind.to_column_value())
            .value("occurred_at", occurred_at)
            .value("details", details_json)
            .value("created_at", Utc::now())
            .returning(["id"])
            .build()?;

        match QueryExecution::new(&self.pool, fragment).to_field().await? {
            DbValue::Uuid(id) => Ok(id),
            other => Err(DbError::Core(CoreError::value_conversion(other, "Uuid"))),
        }
    }

    /// The most recent entries, newest first.
    pub async fn recent(&self, limit: u64) -> DbResult<Vec<ActivityEntry>> {
        let fragment = select(ACTIVITY_COLUMNS)
            .from("activity_log")
            .order_by("occurred_at DESC")
            .limit(limit)
            .build()?;
        self.fetch_entries(&fragment).await
    }

    /// All entries for one title, oldest first.
    pub async fn for_title(&self, title_id: Uuid) -> DbResult<Vec<ActivityEntry>> {
        let fragment = select(ACTIVITY_COLUMNS)
            .from("activity_log")
            .where_clause("title_id = :title_id")
            .order_by("occurred_at")
            .bind("title_id", title_id)
            .build()?;
        self.fetch_entries(&fragment).await
    }

    /// Entries of one kind within a time window, oldest first.
    pub async fn by_kind_between(
        &self,
        kind: ActivityKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<Vec<ActivityEntry>> {
        let fragment = select(ACTIVITY_COLUMNS)
            .from("activity_log")
            .where_clause("kind = :kind")
            .where_clause("occurred_at >= :from")
            .where_clause("occurred_at < :to")
            .order_by("occurred_at")
            .bind("kind", kind.to_column_value())
            .bind("from", from)
            .bind("to", to)
            .build()?;
        self.fetch_entries(&fragment).await
    }

    /// Deletes entries older than the cutoff; returns how many went.
    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let fragment = delete_from("activity_log")
            .where_clause("occurred_at < :cutoff")
            .bind("cutoff", cutoff)
            .build()?;
        execute_fragment(&self.pool, &fragment).await
    }

    /// Reconstructs the concrete detail records behind an entry's
    /// envelopes, in original order.
    pub fn decode_details(&self, entry: &ActivityEntry) -> DbResult<Vec<BoxedRecord>> {
        self.dynamics
            .decode_list(&entry.details)
            .map_err(DbError::Core)
    }

    async fn fetch_entries(
        &self,
        fragment: &medialog_core::QueryFragment,
    ) -> DbResult<Vec<ActivityEntry>> {
        let rows = fetch_rows(&self.pool, fragment).await?;
        rows.iter()
            .map(|row| from_row_map::<ActivityEntry>(row).map_err(DbError::Core))
            .collect()
    }
}
