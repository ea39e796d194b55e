//! Integration tests against a live PostgreSQL instance.
//!
//! These are `#[ignore]`-gated: run them with
//! ```text
//! MEDIALOG_TEST_DB=postgres://medialog@localhost/medialog_test \
//!     cargo test -p medialog-db -- --ignored
//! ```
//! Each test uses its own rows (fresh UUIDs), so tests can share a
//! database.

use chrono::Utc;
use medialog_core::builder::{insert_into, select};
use medialog_core::domain::{
    ActivityKind, MediaKind, ProgressNote, ReadingSession, Title, TitleStatus,
};
use medialog_core::{DbValue, TransactionPlan, TransactionStep};
use medialog_db::{Database, DbConfig, DbError, NewPublication, NewTitle};
use uuid::Uuid;

async fn connect() -> Database {
    let url = std::env::var("MEDIALOG_TEST_DB")
        .expect("set MEDIALOG_TEST_DB to run live database tests");
    Database::new(DbConfig::new(url))
        .await
        .expect("failed to connect to test database")
}

fn sample_title() -> Title {
    let now = Utc::now();
    Title {
        id: Uuid::new_v4(),
        kind: MediaKind::Book,
        name: format!("Integration Test {}", Uuid::new_v4()),
        sort_name: None,
        status: TitleStatus::Backlog,
        rating: None,
        notes: None,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (MEDIALOG_TEST_DB)"]
async fn title_crud_round_trip() {
    let db = connect().await;
    let titles = db.titles();
    let title = sample_title();

    titles.insert(&title).await.unwrap();

    let loaded = titles.get_by_id(title.id).await.unwrap().unwrap();
    assert_eq!(loaded.name, title.name);
    assert_eq!(loaded.kind, MediaKind::Book);
    assert_eq!(loaded.rating, None);

    titles
        .update_status(title.id, TitleStatus::Active)
        .await
        .unwrap();
    let loaded = titles.get_by_id(title.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, TitleStatus::Active);

    titles.delete(title.id).await.unwrap();
    assert!(titles.get_by_id(title.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (MEDIALOG_TEST_DB)"]
async fn update_of_missing_title_is_not_found() {
    let db = connect().await;
    let err = db
        .titles()
        .update_status(Uuid::new_v4(), TitleStatus::Dropped)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound { .. }));
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (MEDIALOG_TEST_DB)"]
async fn plan_substitutes_generated_id_into_second_step() {
    let db = connect().await;
    let titles = db.titles();

    let title_id = titles
        .create_with_publication(
            NewTitle {
                kind: MediaKind::Novel,
                name: format!("Planned {}", Uuid::new_v4()),
                sort_name: None,
            },
            NewPublication {
                publisher: Some("Test Press".to_string()),
                ..NewPublication::default()
            },
        )
        .await
        .unwrap();

    let publications = titles.publications(title_id).await.unwrap();
    assert_eq!(publications.len(), 1);
    assert_eq!(publications[0].title_id, title_id);
    assert_eq!(publications[0].publisher.as_deref(), Some("Test Press"));

    titles.delete(title_id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (MEDIALOG_TEST_DB)"]
async fn failing_step_rolls_back_earlier_steps() {
    let db = connect().await;
    let marker = format!("Rollback {}", Uuid::new_v4());
    let now = Utc::now();

    let mut plan = TransactionPlan::new();
    plan.add(TransactionStep::query_field(
        insert_into("titles")
            .value("kind", "book")
            .value("name", marker.as_str())
            .value("created_at", now)
            .value("updated_at", now)
            .returning(["id"])
            .build()
            .unwrap(),
    ));
    // Step 1 violates the NOT NULL constraint on publications.title_id.
    plan.add(TransactionStep::execute(
        insert_into("publications")
            .value("title_id", DbValue::typed(DbValue::Null, "uuid"))
            .value("publisher", "nobody")
            .value("created_at", now)
            .build()
            .unwrap(),
    ));

    let err = db.execute_plan(plan).await.unwrap_err();
    match err {
        DbError::StepFailed { index, .. } => assert_eq!(index, 1),
        other => panic!("expected StepFailed, got {other:?}"),
    }

    // Step 0's insert must not be visible.
    let count = db
        .query(
            select(["count(*)"])
                .from("titles")
                .where_clause("name = :name")
                .bind("name", marker.as_str())
                .build()
                .unwrap(),
        )
        .to_field()
        .await
        .unwrap();
    assert_eq!(count, DbValue::Int(0));
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (MEDIALOG_TEST_DB)"]
async fn activity_details_round_trip_polymorphically() {
    let db = connect().await;
    let activities = db.activities();
    let registry = db.dynamics();

    let details = vec![
        registry
            .encode(&ReadingSession {
                pages: 24,
                minutes: 30,
                finished: false,
            })
            .unwrap(),
        registry
            .encode(&ProgressNote {
                text: "halfway through chapter two".to_string(),
            })
            .unwrap(),
    ];

    let id = activities
        .log(None, ActivityKind::ReadingSession, Utc::now(), details)
        .await
        .unwrap();

    let recent = activities.recent(10).await.unwrap();
    let entry = recent
        .iter()
        .find(|entry| entry.id == id)
        .expect("logged entry should be visible");
    assert_eq!(entry.kind, ActivityKind::ReadingSession);
    assert_eq!(entry.details.len(), 2);

    let decoded = activities.decode_details(entry).unwrap();
    let session = decoded[0]
        .downcast_ref::<ReadingSession>()
        .expect("first detail keeps its concrete type");
    assert_eq!(session.pages, 24);
    let note = decoded[1]
        .downcast_ref::<ProgressNote>()
        .expect("second detail keeps its concrete type");
    assert!(note.text.contains("chapter two"));
}

#[tokio::test]
#[ignore = "requires a running PostgreSQL (MEDIALOG_TEST_DB)"]
async fn duplicate_isbn_surfaces_unique_violation() {
    let db = connect().await;
    let titles = db.titles();
    let isbn = format!("test-{}", Uuid::new_v4());

    let first = titles
        .create_with_publication(
            NewTitle {
                kind: MediaKind::Book,
                name: format!("Unique A {}", Uuid::new_v4()),
                sort_name: None,
            },
            NewPublication {
                isbn: Some(isbn.clone()),
                ..NewPublication::default()
            },
        )
        .await
        .unwrap();

    let err = titles
        .create_with_publication(
            NewTitle {
                kind: MediaKind::Book,
                name: format!("Unique B {}", Uuid::new_v4()),
                sort_name: None,
            },
            NewPublication {
                isbn: Some(isbn),
                ..NewPublication::default()
            },
        )
        .await
        .unwrap_err();

    match err {
        DbError::StepFailed { index, source } => {
            assert_eq!(index, 1);
            assert!(matches!(*source, DbError::UniqueViolation { .. }));
        }
        other => panic!("expected StepFailed, got {other:?}"),
    }

    titles.delete(first).await.unwrap();
}
