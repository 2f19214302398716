//! Ledger store for TabSplit.
//!
//! The store is the single source of truth for sessions, members, items
//! and claims. It performs no business logic; it only guards referential
//! invariants:
//!
//! - members are unique per `(session, participant)`
//! - invite tokens are unique across sessions
//! - an item's claims never sum past its quantity
//! - removing an item removes its claims
//! - a settled session is frozen: nothing about it changes again
//!
//! Claims are stored per item in a [`ClaimSheet`] carrying a version.
//! Writers use [`LedgerStore::write_claims`] as a compare-and-write on that
//! version, so two writers that read the same sheet cannot both commit.
//!
//! # Modules
//!
//! - [`error`] — [`StoreError`]
//! - [`traits`] — the [`LedgerStore`] boundary
//! - [`snapshot`] — read models ([`ClaimSheet`], [`LedgerSnapshot`]) and
//!   [`SessionPatch`]
//! - [`memory`] — [`InMemoryLedger`], process-scoped and non-durable

pub mod error;
pub mod memory;
pub mod snapshot;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryLedger;
pub use snapshot::{ClaimSheet, ClaimWrite, ItemSnapshot, LedgerSnapshot, SessionPatch};
pub use traits::LedgerStore;
