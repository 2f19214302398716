//! Settlement calculator for TabSplit.
//!
//! Pure functions over an immutable view of items and claims. Nothing here
//! locks, allocates ids or performs I/O; callers hand in a snapshot and get
//! amounts back.
//!
//! Every participant's total is rounded up to a whole currency unit on its
//! own, after the tip is added. Rounding is never applied to the bill as a
//! whole, so the sum of the rounded totals may exceed the item prices by a
//! few units; [`SettlementReport::rounding_surplus`] reports that gap.
//!
//! All amounts are [`Decimal`](rust_decimal::Decimal).

pub mod report;
pub mod rounding;
pub mod shares;

pub use report::{ParticipantShare, SettlementReport, UnclaimedLine};
pub use rounding::{round_up, SETTLEMENT_GUARD_SCALE};
pub use shares::{
    compute_all_shares, compute_participant_share, raw_totals, PricedItem, ShareBreakdown,
};
