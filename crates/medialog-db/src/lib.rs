//! # medialog-db: Database Layer for Medialog
//!
//! Executes what `medialog-core` builds: owns the PostgreSQL connection
//! pool, renders and runs query fragments, drives transaction plans, and
//! exposes the feature-level repositories the UI and browser extension
//! call into.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Medialog Data Flow                          │
//! │                                                                 │
//! │  UI request / extension payload                                 │
//! │       │                                                         │
//! │  ┌────▼────────────────────────────────────────────────────┐   │
//! │  │                medialog-db (THIS CRATE)                 │   │
//! │  │                                                         │   │
//! │  │  ┌──────────┐  ┌──────────────┐  ┌──────────────────┐  │   │
//! │  │  │ Database │  │ Repositories │  │   Migrations     │  │   │
//! │  │  │ (pool)   │◄─│ title        │  │ 0001_initial...  │  │   │
//! │  │  │ executor │  │ activity     │  │                  │  │   │
//! │  │  │ plans    │  │              │  │                  │  │   │
//! │  │  └──────────┘  └──────────────┘  └──────────────────┘  │   │
//! │  └────────────────────────┬────────────────────────────────┘   │
//! │                           ▼                                     │
//! │                      PostgreSQL                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use medialog_db::{Database, DbConfig};
//!
//! let config = DbConfig::new("postgres://medialog@localhost/medialog");
//! let db = Database::new(config).await?;
//!
//! let titles = db.titles().search("earthsea", 20).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod executor;
pub mod migrations;
pub mod plan;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use executor::QueryExecution;
pub use plan::execute_plan;
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::activity::ActivityRepository;
pub use repository::title::{NewPublication, NewTitle, TitleRepository, TitleSubmission};
