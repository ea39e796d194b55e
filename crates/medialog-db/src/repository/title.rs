//! # Title Repository
//!
//! Database operations for titles and their publications.
//!
//! ## Create-With-Publication Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Browser extension posts JSON, or the UI submits a form         │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  TransactionPlan                                                │
//! │    step 0: INSERT INTO titles (..) RETURNING id                 │
//! │    step 1: INSERT INTO publications (title_id, ..)              │
//! │            └── title_id = step 0 handle.field()                 │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  One transaction: both rows land or neither does                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use medialog_core::builder::{delete_from, insert_into, select, update, OnConflict};
use medialog_core::domain::{MediaKind, Publication, Title, TitleStatus};
use medialog_core::{from_row_map, DbValue, TransactionPlan, TransactionStep};
use serde::Deserialize;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::executor::{execute_fragment, fetch_rows};
use crate::plan::execute_plan;

const TITLE_COLUMNS: [&str; 9] = [
    "id",
    "kind",
    "name",
    "sort_name",
    "status",
    "rating",
    "notes",
    "created_at",
    "updated_at",
];

const PUBLICATION_COLUMNS: [&str; 7] = [
    "id",
    "title_id",
    "publisher",
    "edition",
    "isbn",
    "released_year",
    "created_at",
];

/// Input for a new title.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTitle {
    pub kind: MediaKind,
    pub name: String,
    #[serde(default)]
    pub sort_name: Option<String>,
}

/// Input for a new publication.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPublication {
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub edition: Option<String>,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub released_year: Option<i32>,
}

/// The JSON payload the browser extension posts: a title plus one
/// publication, flattened.
#[derive(Debug, Clone, Deserialize)]
pub struct TitleSubmission {
    #[serde(flatten)]
    pub title: NewTitle,
    #[serde(flatten)]
    pub publication: NewPublication,
}

/// Repository for title and publication operations.
#[derive(Debug, Clone)]
pub struct TitleRepository {
    pool: PgPool,
}

impl TitleRepository {
    /// Creates a new TitleRepository.
    pub fn new(pool: PgPool) -> Self {
        TitleRepository { pool }
    }

    /// Gets a title by id.
    pub async fn get_by_id(&self, id: Uuid) -> DbResult<Option<Title>> {
        let fragment = select(TITLE_COLUMNS)
            .from("titles")
            .where_clause("id = :id")
            .bind("id", id)
            .build()?;

        let rows = fetch_rows(&self.pool, &fragment).await?;
        match rows.first() {
            Some(row) => Ok(Some(from_row_map::<Title>(row).map_err(DbError::Core)?)),
            None => Ok(None),
        }
    }

    /// Lists titles, optionally filtered by kind, newest first.
    ///
    /// `page` is 1-based.
    pub async fn list(
        &self,
        kind: Option<MediaKind>,
        page: u64,
        page_size: u64,
    ) -> DbResult<Vec<Title>> {
        let mut builder = select(TITLE_COLUMNS)
            .from("titles")
            .order_by("created_at DESC")
            .page(page, page_size);
        if let Some(kind) = kind {
            builder = builder
                .where_clause("kind = :kind")
                .bind("kind", kind.as_str());
        }

        let rows = fetch_rows(&self.pool, &builder.build()?).await?;
        rows.iter()
            .map(|row| from_row_map::<Title>(row).map_err(DbError::Core))
            .collect()
    }

    /// Searches titles by name substring (case-insensitive).
    pub async fn search(&self, query: &str, limit: u64) -> DbResult<Vec<Title>> {
        let fragment = select(TITLE_COLUMNS)
            .from("titles")
            .where_clause("name ILIKE :pattern")
            .order_by("name")
            .limit(limit)
            .bind("pattern", format!("%{query}%"))
            .build()?;

        let rows = fetch_rows(&self.pool, &fragment).await?;
        rows.iter()
            .map(|row| from_row_map::<Title>(row).map_err(DbError::Core))
            .collect()
    }

    /// Inserts a fully-formed title (id supplied by the caller).
    pub async fn insert(&self, title: &Title) -> DbResult<()> {
        debug!(id = %title.id, name = %title.name, "Inserting title");

        let fragment = insert_into("titles")
            .value("id", title.id)
            .value("kind", title.kind.as_str())
            .value("name", title.name.as_str())
            .value("sort_name", title.sort_name.clone())
            .value("status", title.status.as_str())
            // Explicit cast: a None here must reach the server as an int4
            // null, not a text null.
            .value("rating", DbValue::typed(title.rating, "int4"))
            .value("notes", title.notes.clone())
            .value("created_at", title.created_at)
            .value("updated_at", title.updated_at)
            .build()?;

        execute_fragment(&self.pool, &fragment).await?;
        Ok(())
    }

    /// Inserts a title, or refreshes its mutable fields if the id already
    /// exists (sync from another device replays inserts).
    pub async fn upsert(&self, title: &Title) -> DbResult<()> {
        debug!(id = %title.id, "Upserting title");

        let fragment = insert_into("titles")
            .value("id", title.id)
            .value("kind", title.kind.as_str())
            .value("name", title.name.as_str())
            .value("sort_name", title.sort_name.clone())
            .value("status", title.status.as_str())
            .value("rating", DbValue::typed(title.rating, "int4"))
            .value("notes", title.notes.clone())
            .value("created_at", title.created_at)
            .value("updated_at", title.updated_at)
            .on_conflict(
                OnConflict::columns(["id"])
                    .do_update_set("name", "excluded.name")
                    .do_update_set("sort_name", "excluded.sort_name")
                    .do_update_set("status", "excluded.status")
                    .do_update_set("rating", "excluded.rating")
                    .do_update_set("notes", "excluded.notes")
                    .do_update_set("updated_at", "excluded.updated_at"),
            )
            .build()?;

        execute_fragment(&self.pool, &fragment).await?;
        Ok(())
    }

    /// Moves a title to a new status.
    pub async fn update_status(&self, id: Uuid, status: TitleStatus) -> DbResult<()> {
        let fragment = update("titles")
            .set_value("status", status.as_str())
            .set_value("updated_at", Utc::now())
            .where_clause("id = :id")
            .bind("id", id)
            .build()?;

        let affected = execute_fragment(&self.pool, &fragment).await?;
        if affected == 0 {
            return Err(DbError::not_found("Title", id));
        }
        Ok(())
    }

    /// Rates a title (1-10), or clears the rating with `None`.
    pub async fn set_rating(&self, id: Uuid, rating: Option<i32>) -> DbResult<()> {
        let fragment = update("titles")
            .set_value("rating", DbValue::typed(rating, "int4"))
            .set_value("updated_at", Utc::now())
            .where_clause("id = :id")
            .bind("id", id)
            .build()?;

        let affected = execute_fragment(&self.pool, &fragment).await?;
        if affected == 0 {
            return Err(DbError::not_found("Title", id));
        }
        Ok(())
    }

    /// Deletes a title (publications cascade).
    pub async fn delete(&self, id: Uuid) -> DbResult<()> {
        let fragment = delete_from("titles")
            .where_clause("id = :id")
            .bind("id", id)
            .build()?;

        let affected = execute_fragment(&self.pool, &fragment).await?;
        if affected == 0 {
            return Err(DbError::not_found("Title", id));
        }
        Ok(())
    }

    /// Gets the publications of a title, oldest first.
    pub async fn publications(&self, title_id: Uuid) -> DbResult<Vec<Publication>> {
        let fragment = select(PUBLICATION_COLUMNS)
            .from("publications")
            .where_clause("title_id = :title_id")
            .order_by("created_at")
            .bind("title_id", title_id)
            .build()?;

        let rows = fetch_rows(&self.pool, &fragment).await?;
        rows.iter()
            .map(|row| from_row_map::<Publication>(row).map_err(DbError::Core))
            .collect()
    }

    /// Creates a title and its first publication in one transaction.
    ///
    /// The title's id is generated by the database; the publication step
    /// consumes it through a deferred step reference. Returns the new
    /// title id.
    pub async fn create_with_publication(
        &self,
        title: NewTitle,
        publication: NewPublication,
    ) -> DbResult<Uuid> {
        debug!(name = %title.name, "Creating title with publication");
        let now = Utc::now();

        let mut plan = TransactionPlan::new();

        let inserted = plan.add(TransactionStep::query_field(
            insert_into("titles")
                .value("kind", title.kind.as_str())
                .value("name", title.name)
                .value("sort_name", title.sort_name)
                .value("status", TitleStatus::Backlog.as_str())
                .value("created_at", now)
                .value("updated_at", now)
                .returning(["id"])
                .build()?,
        ));

        plan.add(
            TransactionStep::execute(
                insert_into("publications")
                    .value("title_id", DbValue::Null)
                    .value("publisher", publication.publisher)
                    .value("edition", publication.edition)
                    .value("isbn", publication.isbn)
                    .value("released_year", DbValue::typed(publication.released_year, "int4"))
                    .value("created_at", now)
                    .build()?,
            )
            .param("title_id", inserted.field()),
        );

        let results = execute_plan(&self.pool, plan).await?;
        match results.scalar(inserted) {
            Some(DbValue::Uuid(id)) => Ok(*id),
            Some(other) => Err(DbError::Core(medialog_core::CoreError::value_conversion(
                other, "Uuid",
            ))),
            None => Err(DbError::Internal(
                "plan committed without capturing the title id".to_string(),
            )),
        }
    }

    /// Turns a browser-extension JSON payload into the two-step plan above.
    pub async fn create_from_submission(
        &self,
        payload: serde_json::Value,
    ) -> DbResult<Uuid> {
        let submission: TitleSubmission = serde_json::from_value(payload.clone()).map_err(|e| {
            DbError::Core(medialog_core::CoreError::row_mapping(
                "TitleSubmission",
                e.to_string(),
                payload,
            ))
        })?;

        self.create_with_publication(submission.title, submission.publication)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_payload_parses_flattened_fields() {
        let payload = serde_json::json!({
            "kind": "book",
            "name": "A Wizard of Earthsea",
            "publisher": "Parnassus",
            "released_year": 1968
        });
        let submission: TitleSubmission = serde_json::from_value(payload).unwrap();
        assert_eq!(submission.title.kind, MediaKind::Book);
        assert_eq!(submission.title.name, "A Wizard of Earthsea");
        assert_eq!(submission.publication.publisher.as_deref(), Some("Parnassus"));
        assert_eq!(submission.publication.released_year, Some(1968));
        assert_eq!(submission.publication.isbn, None);
    }

    #[test]
    fn submission_without_name_is_rejected() {
        let payload = serde_json::json!({ "kind": "game" });
        assert!(serde_json::from_value::<TitleSubmission>(payload).is_err());
    }
}
