//! # Identifier Case Conventions
//!
//! Convention transforms for the two places the engine converts names:
//! record field names → column keys, and enum variant names → enum column
//! values. Each enum type declares its own pair of conventions via
//! [`EnumCasing`].

use convert_case::{Case, Casing};

/// A supported identifier convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentCase {
    /// `snake_case`
    Snake,
    /// `camelCase`
    Camel,
    /// `PascalCase`
    Pascal,
    /// `UPPER_SNAKE_CASE`
    UpperSnake,
}

impl IdentCase {
    const fn as_case(self) -> Case<'static> {
        match self {
            IdentCase::Snake => Case::Snake,
            IdentCase::Camel => Case::Camel,
            IdentCase::Pascal => Case::Pascal,
            IdentCase::UpperSnake => Case::UpperSnake,
        }
    }

    /// Converts an identifier to this convention.
    pub fn apply(self, ident: &str) -> String {
        ident.to_case(self.as_case())
    }
}

/// Shorthand for the column-key transform.
pub fn snake_case(ident: &str) -> String {
    IdentCase::Snake.apply(ident)
}

/// Declared conventions for one enum type: how variant names are written
/// in memory and how they are stored in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumCasing {
    pub in_memory: IdentCase,
    pub database: IdentCase,
}

impl EnumCasing {
    pub const fn new(in_memory: IdentCase, database: IdentCase) -> Self {
        EnumCasing {
            in_memory,
            database,
        }
    }

    /// In-memory variant name → stored column value.
    pub fn encode_variant(&self, variant: &str) -> String {
        self.database.apply(variant)
    }

    /// Stored column value → in-memory variant name.
    pub fn decode_variant(&self, stored: &str) -> String {
        self.in_memory.apply(stored)
    }
}
