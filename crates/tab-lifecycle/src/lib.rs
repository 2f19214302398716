//! Session lifecycle for TabSplit.
//!
//! A session moves through
//! `created → ocr_done → voting ⇄ closed → settled`, driven only by its
//! owner. This crate owns the transition table and answers, for each
//! phase, whether claims, item edits and other member actions may proceed.
//!
//! What happens to claims once a session is `closed` is a deployment
//! choice, expressed as [`ClosedClaimPolicy`] in [`LifecycleConfig`].

pub mod config;
pub mod error;
pub mod machine;

pub use config::{ClosedClaimPolicy, LifecycleConfig};
pub use error::{LifecycleError, LifecycleResult};
pub use machine::{allowed_transitions, can_transition, ClaimGate, ItemEdit, SessionLifecycle};
