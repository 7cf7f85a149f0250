//! Novella Kernel
//!
//! Bookkeeping primitives the orchestrator drives:
//! 1. **State machine**: legal stage state changes and run status
//! 2. **Budget**: per-tier cost ledger with tier downgrade and hard stop
//! 3. **Journal**: sha256 hash-chained record of stage events
//!
//! # Quick Start
//!
//! ```rust
//! use novella_kernel::prelude::*;
//!
//! assert!(validate_transition(StageState::Pending, StageState::Running).is_ok());
//!
//! let mut budget = BudgetManager::new(BudgetConfig::default().with_ceiling(1.0));
//! let status = budget.charge(1_000, 1_000, ModelTier::Premium);
//! assert!(status.exhausted);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod budget;
pub mod error;
pub mod journal;
pub mod state_machine;

pub use error::*;

/// Common imports
pub mod prelude {
    pub use crate::budget::{BudgetConfig, BudgetManager, BudgetStatus, ModelTier, TierRate};
    pub use crate::error::{BudgetError, JournalError, StateMachineError};
    pub use crate::journal::{JournalEntry, JournalEvent, StageJournal};
    pub use crate::state_machine::{
        allowed_transitions, validate_transition, RunStatus, StageState,
    };
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Check if running with strict debugging enabled
#[must_use]
pub const fn strict_debug() -> bool {
    cfg!(feature = "strict-debug")
}
