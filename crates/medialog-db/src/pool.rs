//! # Database Pool Management
//!
//! Connection pool creation and configuration for PostgreSQL.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   Database Connection Pool                      │
//! │                                                                 │
//! │  App startup                                                    │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  DbConfig::new(url) ← Configure pool settings, schemas          │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  Database::new(config).await ← Create pool + run migrations     │
//! │       │                                                         │
//! │  ┌────▼────────────────────────────────┐                        │
//! │  │              PgPool                  │                       │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐    │  (max_connections)    │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ …  │                       │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘    │                       │
//! │  └──────────────────────────────────────┘                      │
//! │       │                                                         │
//! │       │ One connection per query or per transaction plan        │
//! │       ▼                                                         │
//! │  UI request 1 ──► uses Conn1                                    │
//! │  UI request 2 ──► uses Conn2   (concurrent, independent)        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The pool is the only shared resource this crate holds; no cross-request
//! locks exist here. Consistency comes from PostgreSQL's transaction
//! isolation.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use medialog_core::domain::register_detail_types;
use medialog_core::{DynamicRegistry, QueryFragment, TransactionPlan};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::executor::QueryExecution;
use crate::migrations;
use crate::plan;
use crate::repository::activity::ActivityRepository;
use crate::repository::title::TitleRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// An immutable properties bundle supplied by the host application's
/// configuration loader.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("postgres://medialog@localhost/medialog")
///     .schemas(["medialog"])
///     .max_connections(5);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL connection URL (credentials included).
    pub url: String,

    /// Schema search path, in priority order. Empty keeps the server
    /// default.
    pub schemas: Vec<String>,

    /// Maximum number of connections in the pool.
    /// Default: 5 (sufficient for a desktop app plus its extension).
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection acquire timeout.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new configuration with the given connection URL.
    pub fn new(url: impl Into<String>) -> Self {
        DbConfig {
            url: url.into(),
            schemas: Vec::new(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    /// Sets the schema search path.
    pub fn schemas<I, S>(mut self, schemas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.schemas = schemas.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection acquire timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access.
///
/// Cloneable; clones share the pool and the dynamic-type registry. The
/// registry is carried here explicitly (no process-wide singleton) so
/// teardown order stays obvious.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
    dynamics: Arc<DynamicRegistry>,
}

impl Database {
    /// Creates a pool with the default dynamic-type registry (every
    /// activity detail type registered).
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        let mut registry = DynamicRegistry::new();
        register_detail_types(&mut registry)?;
        Self::with_registry(config, registry).await
    }

    /// Creates a pool with a caller-supplied dynamic-type registry.
    pub async fn with_registry(config: DbConfig, registry: DynamicRegistry) -> DbResult<Self> {
        info!(
            max_connections = config.max_connections,
            schemas = ?config.schemas,
            "Initializing database connection pool"
        );

        let mut connect_options = PgConnectOptions::from_str(&config.url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
        if !config.schemas.is_empty() {
            connect_options =
                connect_options.options([("search_path", config.schemas.join(","))]);
        }

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        debug!("Database pool created");

        let db = Database {
            pool,
            dynamics: Arc::new(registry),
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs pending database migrations (idempotent).
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    ///
    /// For advanced queries not covered by repositories; prefer repository
    /// methods when available.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The dynamic-type registry this handle carries.
    pub fn dynamics(&self) -> &Arc<DynamicRegistry> {
        &self.dynamics
    }

    /// Prepares a built fragment for execution:
    /// `db.query(fragment).to_list::<Title>().await`.
    pub fn query(&self, fragment: QueryFragment) -> QueryExecution<'_> {
        QueryExecution::new(&self.pool, fragment)
    }

    /// Executes a transaction plan; see [`plan::execute_plan`].
    pub async fn execute_plan(
        &self,
        plan: TransactionPlan,
    ) -> DbResult<medialog_core::PlanResults> {
        plan::execute_plan(&self.pool, plan).await
    }

    /// Returns the title repository.
    pub fn titles(&self) -> TitleRepository {
        TitleRepository::new(self.pool.clone())
    }

    /// Returns the activity repository.
    pub fn activities(&self) -> ActivityRepository {
        ActivityRepository::new(self.pool.clone(), Arc::clone(&self.dynamics))
    }

    /// Checks if the database is responsive.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    /// Closes the connection pool. Call on application shutdown.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder_defaults() {
        let config = DbConfig::new("postgres://localhost/medialog");
        assert_eq!(config.max_connections, 5);
        assert!(config.run_migrations);
        assert!(config.schemas.is_empty());
    }

    #[test]
    fn config_builder_overrides() {
        let config = DbConfig::new("postgres://localhost/medialog")
            .schemas(["medialog", "public"])
            .max_connections(10)
            .min_connections(2)
            .run_migrations(false);
        assert_eq!(config.schemas, vec!["medialog", "public"]);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert!(!config.run_migrations);
    }
}
