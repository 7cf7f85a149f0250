//! Novella Story Bible
//!
//! Continuity ledger shared by every stage of the pipeline.
//!
//! # Core Concepts
//!
//! - [`EntityRegistry`]: Characters, plot threads and motifs of one project
//! - [`EntityPayload`]: Schema-checked entity mention from generated output
//! - [`ContinuityViolation`]: Recoverable continuity problem, scored downstream
//!
//! # Example
//!
//! ```rust
//! use novella_bible::{EntityKind, EntityRegistry};
//! use serde_json::json;
//!
//! let mut registry = EntityRegistry::new();
//! registry.register_or_validate(EntityKind::Character, &json!({"name": "Ilse", "role": "ally"}), 0);
//! let result = registry.register_or_validate(
//!     EntityKind::Character,
//!     &json!({"name": "Ilse", "role": "antagonist"}),
//!     4,
//! );
//! assert!(result.is_violation());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod entity;
mod payload;
mod registry;

pub use entity::{manifestation_distance, CharacterEntry, Motif, PlotThread, Role, RoleTransition};
pub use payload::{
    CharacterPayload, EntityKind, EntityPayload, MotifPayload, PayloadError, ThreadPayload,
};
pub use registry::{ContinuityKind, ContinuityViolation, EntityRegistry, ValidationResult};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
