//! Event notification for TabSplit.
//!
//! The core publishes [`SessionEvent`]s through the [`Notifier`] boundary
//! and never waits on delivery: [`publish_best_effort`] logs and swallows
//! every failure.
//!
//! [`BroadcastNotifier`] fans events out to in-process subscribers keyed by
//! session. It is process-scoped and non-durable; a deployment running
//! several service instances needs an external pub/sub behind the same
//! trait instead.

pub mod broadcast;
pub mod error;
pub mod event;
pub mod notifier;

pub use broadcast::{BroadcastNotifier, EventStream};
pub use error::{NotifyError, NotifyResult};
pub use event::{EventKind, EventPayload, SessionEvent};
pub use notifier::{publish_best_effort, Notifier, NullNotifier, TracingNotifier};
