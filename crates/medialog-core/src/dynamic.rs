//! # Polymorphic Payloads
//!
//! A heterogeneous list of differently-typed records stored in one "any"
//! column: each element is wrapped in a tagged envelope at write time and
//! reconstructed through a type-name registry at read time.
//!
//! ## Envelope Shape
//! ```text
//! details jsonb:
//! [
//!   { "type_name": "reading_session", "payload": { "pages": 40, ... } },
//!   { "type_name": "progress_note",   "payload": { "text": "...", ... } }
//! ]
//! ```
//!
//! The registry refuses ambiguous names (duplicate registration) and
//! unknown names (missing registration) rather than guessing.

use std::any::Any;
use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{CoreError, CoreResult};

/// The tagged envelope a polymorphic element is stored as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicDto {
    pub type_name: String,
    pub payload: JsonValue,
}

/// A record that can travel through the polymorphic envelope.
///
/// `TYPE_NAME` is the stable tag written to the database; renaming a Rust
/// type must not change it.
pub trait PolymorphicRecord: Serialize + DeserializeOwned + Any + Send + Sync {
    const TYPE_NAME: &'static str;
}

/// A decoded element, downcastable to its concrete type.
pub type BoxedRecord = Box<dyn Any + Send + Sync>;

type Decoder = fn(&JsonValue) -> CoreResult<BoxedRecord>;

fn decode_as<T: PolymorphicRecord>(payload: &JsonValue) -> CoreResult<BoxedRecord> {
    let record: T = serde_json::from_value(payload.clone())
        .map_err(|e| CoreError::row_mapping(T::TYPE_NAME, e.to_string(), payload))?;
    Ok(Box::new(record))
}

/// Type-name → decoder registry.
///
/// Built once at startup and passed to the components that need it; there
/// is no process-wide registry.
#[derive(Debug, Default)]
pub struct DynamicRegistry {
    decoders: HashMap<String, Decoder>,
}

impl DynamicRegistry {
    pub fn new() -> Self {
        DynamicRegistry {
            decoders: HashMap::new(),
        }
    }

    /// Registers a record type under its declared name.
    ///
    /// Registering the same name twice is an error, even for the same type.
    pub fn register<T: PolymorphicRecord>(&mut self) -> CoreResult<()> {
        if self.decoders.contains_key(T::TYPE_NAME) {
            return Err(CoreError::DuplicateDynamicType {
                type_name: T::TYPE_NAME.to_string(),
            });
        }
        self.decoders.insert(T::TYPE_NAME.to_string(), decode_as::<T>);
        Ok(())
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }

    /// Wraps a record in its envelope.
    ///
    /// Encoding requires a registration too: a type that cannot be read
    /// back must not be written.
    pub fn encode<T: PolymorphicRecord>(&self, record: &T) -> CoreResult<DynamicDto> {
        if !self.is_registered(T::TYPE_NAME) {
            return Err(CoreError::UnknownDynamicType {
                type_name: T::TYPE_NAME.to_string(),
            });
        }
        let payload = serde_json::to_value(record)
            .map_err(|e| CoreError::row_mapping(T::TYPE_NAME, e.to_string(), "<unserialized>"))?;
        Ok(DynamicDto {
            type_name: T::TYPE_NAME.to_string(),
            payload,
        })
    }

    /// Reconstructs the concrete record behind an envelope.
    pub fn decode(&self, dto: &DynamicDto) -> CoreResult<BoxedRecord> {
        let decoder = self.decoders.get(&dto.type_name).ok_or_else(|| {
            CoreError::UnknownDynamicType {
                type_name: dto.type_name.clone(),
            }
        })?;
        decoder(&dto.payload)
    }

    /// Decodes a whole envelope list, preserving order.
    pub fn decode_list(&self, dtos: &[DynamicDto]) -> CoreResult<Vec<BoxedRecord>> {
        dtos.iter().map(|dto| self.decode(dto)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct ReadingSession {
        pages: i64,
        minutes: i64,
    }

    impl PolymorphicRecord for ReadingSession {
        const TYPE_NAME: &'static str = "reading_session";
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct ProgressNote {
        text: String,
    }

    impl PolymorphicRecord for ProgressNote {
        const TYPE_NAME: &'static str = "progress_note";
    }

    fn registry() -> DynamicRegistry {
        let mut registry = DynamicRegistry::new();
        registry.register::<ReadingSession>().unwrap();
        registry.register::<ProgressNote>().unwrap();
        registry
    }

    #[test]
    fn heterogeneous_list_round_trips_in_order() {
        let registry = registry();
        let session = ReadingSession {
            pages: 42,
            minutes: 55,
        };
        let note = ProgressNote {
            text: "finished part one".to_string(),
        };

        let dtos = vec![
            registry.encode(&session).unwrap(),
            registry.encode(&note).unwrap(),
        ];

        // Simulate storage: envelopes go through JSON and come back.
        let stored = serde_json::to_value(&dtos).unwrap();
        let loaded: Vec<DynamicDto> = serde_json::from_value(stored).unwrap();

        let decoded = registry.decode_list(&loaded).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(
            decoded[0].downcast_ref::<ReadingSession>(),
            Some(&session)
        );
        assert_eq!(decoded[1].downcast_ref::<ProgressNote>(), Some(&note));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = registry();
        let err = registry.register::<ReadingSession>().unwrap_err();
        assert!(matches!(
            err,
            CoreError::DuplicateDynamicType { type_name } if type_name == "reading_session"
        ));
    }

    #[test]
    fn unknown_type_name_is_rejected_on_decode() {
        let registry = registry();
        let dto = DynamicDto {
            type_name: "vanished_type".to_string(),
            payload: serde_json::json!({}),
        };
        let err = registry.decode(&dto).unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnknownDynamicType { type_name } if type_name == "vanished_type"
        ));
    }

    #[test]
    fn unregistered_type_is_rejected_on_encode() {
        let registry = DynamicRegistry::new();
        let err = registry
            .encode(&ProgressNote {
                text: "x".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownDynamicType { .. }));
    }

    #[test]
    fn malformed_payload_preserves_context() {
        let registry = registry();
        let dto = DynamicDto {
            type_name: "reading_session".to_string(),
            payload: serde_json::json!({ "pages": "not a number" }),
        };
        let err = registry.decode(&dto).unwrap_err();
        match err {
            CoreError::RowMapping { target, row, .. } => {
                assert_eq!(target, "reading_session");
                assert!(row.contains("not a number"));
            }
            other => panic!("expected RowMapping, got {other:?}"),
        }
    }
}
