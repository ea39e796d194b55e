//! # Database Migrations
//!
//! Embedded SQL migrations for Medialog.
//!
//! ## Adding New Migrations
//!
//! 1. Create a new file in `migrations/postgres/` with the next sequence
//!    number, named `NNNN_description.sql`
//! 2. Write idempotent SQL (`IF NOT EXISTS` where possible)
//! 3. Never modify an applied migration; always add a new one

use sqlx::PgPool;
use tracing::info;

use crate::error::DbResult;

/// Embedded migrations from the `migrations/postgres` directory.
///
/// The `sqlx::migrate!()` macro embeds the SQL files into the binary at
/// compile time; no runtime file access is needed.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/postgres");

/// Runs all pending database migrations.
///
/// Idempotent and ordered: applied migrations are tracked in
/// `_sqlx_migrations`, and each pending migration runs in its own
/// transaction.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    info!(
        migrations = MIGRATOR.migrations.len(),
        "Applying pending migrations"
    );
    MIGRATOR.run(pool).await?;
    Ok(())
}
