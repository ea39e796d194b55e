//! # Domain Types
//!
//! Core domain types for the Medialog library: tracked titles, their
//! publications, and the activity log.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Types                             │
//! │                                                                 │
//! │  ┌───────────────┐   ┌────────────────┐   ┌─────────────────┐  │
//! │  │    Title      │   │  Publication   │   │  ActivityEntry  │  │
//! │  │  ───────────  │   │  ────────────  │   │  ─────────────  │  │
//! │  │  id (UUID)    │◄──│  title_id (FK) │   │  title_id (FK)  │  │
//! │  │  kind         │   │  publisher     │   │  kind           │  │
//! │  │  status       │   │  isbn          │   │  details (any)  │  │
//! │  └───────────────┘   └────────────────┘   └─────────────────┘  │
//! │                                                                 │
//! │  details is a polymorphic list: ReadingSession, PlaySession,    │
//! │  ProgressNote (tagged envelopes, see the dynamic module)        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::case::{EnumCasing, IdentCase};
use crate::dynamic::{DynamicDto, DynamicRegistry, PolymorphicRecord};
use crate::error::{CoreError, CoreResult};

// =============================================================================
// Media Kind
// =============================================================================

/// What kind of media a title is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Book,
    Game,
    Novel,
    Manga,
}

impl MediaKind {
    /// The stored column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Book => "book",
            MediaKind::Game => "game",
            MediaKind::Novel => "novel",
            MediaKind::Manga => "manga",
        }
    }

    pub fn parse(s: &str) -> CoreResult<Self> {
        match s {
            "book" => Ok(MediaKind::Book),
            "game" => Ok(MediaKind::Game),
            "novel" => Ok(MediaKind::Novel),
            "manga" => Ok(MediaKind::Manga),
            other => Err(CoreError::value_conversion(other, "MediaKind")),
        }
    }
}

// =============================================================================
// Title Status
// =============================================================================

/// Where a title sits in the user's backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleStatus {
    Backlog,
    Active,
    Completed,
    Dropped,
}

impl TitleStatus {
    /// The stored column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            TitleStatus::Backlog => "backlog",
            TitleStatus::Active => "active",
            TitleStatus::Completed => "completed",
            TitleStatus::Dropped => "dropped",
        }
    }
}

// =============================================================================
// Title
// =============================================================================

/// A tracked title: one book, game, novel, or manga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Title {
    /// Unique identifier (UUID v4).
    pub id: Uuid,

    pub kind: MediaKind,

    /// Display name.
    pub name: String,

    /// Optional sort key ("Dispossessed, The").
    pub sort_name: Option<String>,

    pub status: TitleStatus,

    /// 1-10, unset until the user rates it.
    pub rating: Option<i32>,

    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Publication
// =============================================================================

/// A concrete released edition of a title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub id: Uuid,
    pub title_id: Uuid,
    pub publisher: Option<String>,
    pub edition: Option<String>,
    pub isbn: Option<String>,
    pub released_year: Option<i32>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Activity Log
// =============================================================================

/// The category of an activity-log entry.
///
/// Stored UPPER_SNAKE in the database while variants stay PascalCase in
/// memory; [`ActivityKind::CASING`] declares the pair of conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityKind {
    ReadingSession,
    PlaySession,
    ProgressNote,
}

impl ActivityKind {
    pub const CASING: EnumCasing = EnumCasing::new(IdentCase::Pascal, IdentCase::UpperSnake);

    const VARIANTS: &'static [(ActivityKind, &'static str)] = &[
        (ActivityKind::ReadingSession, "ReadingSession"),
        (ActivityKind::PlaySession, "PlaySession"),
        (ActivityKind::ProgressNote, "ProgressNote"),
    ];

    fn variant_name(&self) -> &'static str {
        Self::VARIANTS
            .iter()
            .find(|(kind, _)| kind == self)
            .map(|(_, name)| *name)
            .unwrap_or("ProgressNote")
    }

    /// The stored column value, e.g. `READING_SESSION`.
    pub fn to_column_value(&self) -> String {
        Self::CASING.encode_variant(self.variant_name())
    }

    /// Parses a stored column value back into a variant.
    pub fn from_column_value(stored: &str) -> CoreResult<Self> {
        let name = Self::CASING.decode_variant(stored);
        Self::VARIANTS
            .iter()
            .find(|(_, variant)| *variant == name)
            .map(|(kind, _)| *kind)
            .ok_or_else(|| CoreError::value_conversion(stored, "ActivityKind"))
    }
}

/// One entry in the activity log.
///
/// `details` is a heterogeneous list of tagged envelopes; decode concrete
/// records through a [`DynamicRegistry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub title_id: Option<Uuid>,
    pub kind: ActivityKind,
    pub occurred_at: DateTime<Utc>,
    #[serde(default)]
    pub details: Vec<DynamicDto>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Activity Details (polymorphic)
// =============================================================================

/// One sitting with a book, novel, or manga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingSession {
    pub pages: i64,
    pub minutes: i64,
    pub finished: bool,
}

impl PolymorphicRecord for ReadingSession {
    const TYPE_NAME: &'static str = "reading_session";
}

/// One play session of a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaySession {
    pub minutes: i64,
    pub checkpoint: Option<String>,
}

impl PolymorphicRecord for PlaySession {
    const TYPE_NAME: &'static str = "play_session";
}

/// A free-form progress note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressNote {
    pub text: String,
}

impl PolymorphicRecord for ProgressNote {
    const TYPE_NAME: &'static str = "progress_note";
}

/// Registers every activity detail type.
///
/// Call once when building the registry the database handle carries.
pub fn register_detail_types(registry: &mut DynamicRegistry) -> CoreResult<()> {
    registry.register::<ReadingSession>()?;
    registry.register::<PlaySession>()?;
    registry.register::<ProgressNote>()?;
    Ok(())
}
