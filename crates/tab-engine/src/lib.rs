//! Claim engine for TabSplit.
//!
//! The engine is the only component that mutates claims. Every mutation is
//! a read-decide-write against one item's [`ClaimSheet`](tab_store::ClaimSheet),
//! committed with a versioned compare-and-write. A writer that loses the
//! race re-reads and decides again, so two participants racing for the last
//! free unit resolve to exactly one winner and one blocked caller.
//!
//! - [`cycle_step`] — the pure 0 → 1 → … → max → 0 stepper
//! - [`equal_split`] — the pure remainder-distribution helper
//! - [`ClaimEngine`] — applies both against a [`LedgerStore`](tab_store::LedgerStore)

pub mod cycle;
pub mod engine;
pub mod error;
pub mod split;

pub use cycle::{cycle_step, CycleOutcome, CycleStep};
pub use engine::{AssignOutcome, ClaimEngine, EngineConfig, ItemSplit};
pub use error::{ClaimError, ClaimResult};
pub use split::equal_split;
