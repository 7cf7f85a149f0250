//! Schema checks for entity mentions coming out of generation
//!
//! Generated text is parsed upstream into loosely typed JSON. Nothing in the
//! registry touches that JSON directly: it is first converted into a tagged
//! [`EntityPayload`] or rejected with a [`PayloadError`].

use crate::entity::Role;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of story bible entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Character,
    Thread,
    Motif,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Character => "character",
            Self::Thread => "thread",
            Self::Motif => "motif",
        };
        f.write_str(label)
    }
}

/// Character mention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterPayload {
    pub name: String,
    pub role: Role,
    /// Explicitly requests a role change instead of flagging a conflict
    #[serde(default)]
    pub role_transition: bool,
    #[serde(default)]
    pub relationships: BTreeMap<String, String>,
}

/// Plot thread mention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadPayload {
    pub label: String,
    #[serde(default, alias = "resolves")]
    pub resolved: bool,
}

/// Motif manifestation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotifPayload {
    pub label: String,
    pub act: u8,
    pub manifestation: String,
}

/// Schema-checked entity mention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityPayload {
    Character(CharacterPayload),
    Thread(ThreadPayload),
    Motif(MotifPayload),
}

impl EntityPayload {
    /// Check `raw` against the schema for `kind`.
    ///
    /// # Errors
    /// - `PayloadError::Schema` when fields are missing or mistyped
    /// - `PayloadError::EmptyField` when a required string is blank
    pub fn parse(kind: EntityKind, raw: &serde_json::Value) -> Result<Self, PayloadError> {
        if !raw.is_object() {
            return Err(PayloadError::NotAnObject { kind });
        }

        let payload = match kind {
            EntityKind::Character => {
                let p: CharacterPayload = decode(kind, raw)?;
                require(kind, "name", &p.name)?;
                Self::Character(p)
            }
            EntityKind::Thread => {
                let p: ThreadPayload = decode(kind, raw)?;
                require(kind, "label", &p.label)?;
                Self::Thread(p)
            }
            EntityKind::Motif => {
                let p: MotifPayload = decode(kind, raw)?;
                require(kind, "label", &p.label)?;
                require(kind, "manifestation", &p.manifestation)?;
                Self::Motif(p)
            }
        };
        Ok(payload)
    }

    /// Kind tag of this payload
    #[inline]
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Character(_) => EntityKind::Character,
            Self::Thread(_) => EntityKind::Thread,
            Self::Motif(_) => EntityKind::Motif,
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    kind: EntityKind,
    raw: &serde_json::Value,
) -> Result<T, PayloadError> {
    T::deserialize(raw).map_err(|e| PayloadError::Schema {
        kind,
        reason: e.to_string(),
    })
}

fn require(kind: EntityKind, field: &'static str, value: &str) -> Result<(), PayloadError> {
    if value.trim().is_empty() {
        return Err(PayloadError::EmptyField { kind, field });
    }
    Ok(())
}

/// Reasons a mention fails its schema
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    /// Payload is not a JSON object
    #[error("{kind} payload is not an object")]
    NotAnObject { kind: EntityKind },

    /// Missing or mistyped field
    #[error("{kind} payload does not match schema: {reason}")]
    Schema { kind: EntityKind, reason: String },

    /// Required string is blank
    #[error("{kind} payload has empty '{field}'")]
    EmptyField {
        kind: EntityKind,
        field: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_character() {
        let raw = json!({"name": "Ilse", "role": "protagonist", "relationships": {"Tomas": "brother"}});
        let payload = EntityPayload::parse(EntityKind::Character, &raw).unwrap();
        match payload {
            EntityPayload::Character(c) => {
                assert_eq!(c.role, Role::Protagonist);
                assert!(!c.role_transition);
                assert_eq!(c.relationships["Tomas"], "brother");
            }
            other => panic!("expected character, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_role() {
        let raw = json!({"name": "Ilse", "role": "sidekick"});
        let err = EntityPayload::parse(EntityKind::Character, &raw).unwrap_err();
        assert!(matches!(err, PayloadError::Schema { kind: EntityKind::Character, .. }));
    }

    #[test]
    fn rejects_blank_label() {
        let raw = json!({"label": "  "});
        let err = EntityPayload::parse(EntityKind::Thread, &raw).unwrap_err();
        assert_eq!(
            err,
            PayloadError::EmptyField {
                kind: EntityKind::Thread,
                field: "label"
            }
        );
    }

    #[test]
    fn rejects_non_objects() {
        let err = EntityPayload::parse(EntityKind::Motif, &json!("veil")).unwrap_err();
        assert!(matches!(err, PayloadError::NotAnObject { .. }));
    }

    #[test]
    fn motif_requires_act() {
        let raw = json!({"label": "veil", "manifestation": "the veil hides her face"});
        assert!(EntityPayload::parse(EntityKind::Motif, &raw).is_err());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let raw = json!({"label": "heist", "resolved": true, "confidence": 0.4});
        let payload = EntityPayload::parse(EntityKind::Thread, &raw).unwrap();
        assert_eq!(payload.kind(), EntityKind::Thread);
    }
}
