//! # medialog-core: Data-Access Engine for Medialog
//!
//! This crate is the heart of Medialog's persistence layer. It builds
//! parameterized SQL, plans multi-step transactions with deferred
//! inter-step references, and converts between structured records and
//! relational rows, all as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Medialog Architecture                       │
//! │                                                                 │
//! │  Desktop UI / Browser Extension                                 │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  medialog-db (repositories, executor, pool)                     │
//! │       │                                                         │
//! │  ┌────▼────────────────────────────────────────────────────┐   │
//! │  │              ★ medialog-core (THIS CRATE) ★             │   │
//! │  │                                                         │   │
//! │  │  ┌─────────┐ ┌─────────┐ ┌────────┐ ┌───────────────┐  │   │
//! │  │  │ builder │ │  plan   │ │ record │ │    dynamic    │  │   │
//! │  │  │ SELECT  │ │ Steps   │ │ row <->│ │ tagged        │  │   │
//! │  │  │ INSERT  │ │ Handles │ │ record │ │ envelopes     │  │   │
//! │  │  │ UPDATE  │ │ TxValue │ │        │ │               │  │   │
//! │  │  │ DELETE  │ │         │ │        │ │               │  │   │
//! │  │  └─────────┘ └─────────┘ └────────┘ └───────────────┘  │   │
//! │  │                                                         │   │
//! │  │  NO I/O • NO DRIVER TYPES • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`value`] - The bindable/decoded value union ([`DbValue`])
//! - [`fragment`] - SQL text + named parameters ([`QueryFragment`])
//! - [`builder`] - Fluent SELECT/INSERT/UPDATE/DELETE construction
//! - [`plan`] - Transaction plans with deferred step references
//! - [`record`] - Record ↔ row-map conversion
//! - [`case`] - Identifier case conventions
//! - [`dynamic`] - Polymorphic payload envelopes and the type registry
//! - [`domain`] - Medialog domain types (titles, publications, activity)
//! - [`error`] - Error taxonomy
//!
//! ## Example
//!
//! ```rust
//! use medialog_core::builder::select;
//!
//! let fragment = select(["id", "name"])
//!     .from("titles")
//!     .where_clause("kind = :kind")
//!     .order_by("name")
//!     .limit(20)
//!     .bind("kind", "book")
//!     .build()
//!     .unwrap();
//!
//! let (sql, values) = fragment.to_positional().unwrap();
//! assert_eq!(
//!     sql,
//!     "SELECT id, name FROM titles WHERE kind = $1 ORDER BY name LIMIT 20"
//! );
//! assert_eq!(values.len(), 1);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod builder;
pub mod case;
pub mod domain;
pub mod dynamic;
pub mod error;
pub mod fragment;
pub mod plan;
pub mod record;
pub mod value;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use builder::{delete_from, insert_into, select, update, OnConflict};
pub use case::{snake_case, EnumCasing, IdentCase};
pub use dynamic::{DynamicDto, DynamicRegistry, PolymorphicRecord};
pub use error::{CoreError, CoreResult};
pub use fragment::QueryFragment;
pub use plan::{
    PlanExecution, PlanResults, PreparedStep, StepHandle, StepOutcome, StepShape,
    TransactionPlan, TransactionStep, TxValue,
};
pub use record::{from_row_map, to_row_map};
pub use value::{DbValue, RowMap};
