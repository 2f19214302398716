//! Foundation types for TabSplit.
//!
//! This crate provides the records and identifiers shared by every other
//! TabSplit crate. It carries no behaviour beyond construction, validation
//! and a few derived queries.
//!
//! # Key Types
//!
//! - [`Session`] — one bill-splitting round, owned by the participant who created it
//! - [`Member`] — a participant attached to a session, with tip override and confirmation
//! - [`Item`] — a priced, quantity-limited line of the bill
//! - [`ItemClaims`] — participant → claimed units for one item
//! - [`SessionStatus`] — the lifecycle phase of a session
//! - [`CurrencyCode`] / [`TipPercent`] — validated money tags

pub mod error;
pub mod ids;
pub mod item;
pub mod money;
pub mod session;

pub use error::TypeError;
pub use ids::{InviteToken, ItemId, ParticipantId, SessionId};
pub use item::{
    Item, ItemClaims, ItemDraft, MAX_ITEM_NAME_LEN, MAX_ITEM_PRICE, MAX_ITEM_QUANTITY,
};
pub use money::{CurrencyCode, TipPercent, DEFAULT_CURRENCY};
pub use session::{Member, Session, SessionStatus};

/// Exact decimal type used for every monetary amount.
pub use rust_decimal::Decimal;
