//! # Repository Module
//!
//! Feature-level data managers built on the engine in `medialog-core`.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  UI request / extension payload                                 │
//! │       │                                                         │
//! │       │  db.titles().create_with_publication(..)                │
//! │       ▼                                                         │
//! │  TitleRepository                                                │
//! │       │  builds fragments and transaction plans                 │
//! │       ▼                                                         │
//! │  executor / plan driver                                         │
//! │       │                                                         │
//! │       ▼                                                         │
//! │  PostgreSQL                                                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`title::TitleRepository`] - Titles and publications
//! - [`activity::ActivityRepository`] - Activity log with polymorphic details

pub mod activity;
pub mod title;
