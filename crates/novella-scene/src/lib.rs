//! Novella Scene Model
//!
//! Generated prose as revisioned, content-addressed scenes.
//!
//! # Core Concepts
//!
//! - [`Scene`]: Unit of generated content with retained revisions
//! - [`ContentHash`]: Blake3 hash of normalized revision text
//! - [`Fingerprint`]: Word-shingle set for near-duplicate detection
//! - [`text`]: Paragraph, sentence, word and dialogue segmentation
//!
//! # Example
//!
//! ```rust
//! use novella_scene::{PointOfView, Scene};
//!
//! let mut scene = Scene::new(0, 1, 1, PointOfView::Third, "draft", "She waited.");
//! scene.revise("polish", "She waited by the gate.");
//! assert_eq!(scene.revision_count(), 2);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod fingerprint;
mod hash;
mod scene;
pub mod text;

pub use fingerprint::{Fingerprint, DEFAULT_SHINGLE_SIZE};
pub use hash::{ContentHash, HashError};
pub use scene::{PointOfView, RevisionDiff, Scene, SceneError, SceneRevision, StructuralTags};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
