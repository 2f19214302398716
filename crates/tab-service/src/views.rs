use rust_decimal::Decimal;
use serde::Serialize;
use tab_types::{CurrencyCode, Item, ItemClaims, ItemId, Member, Session, TipPercent};

/// An item with its current claims.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ItemView {
    #[serde(flatten)]
    pub item: Item,
    pub claims: ItemClaims,
    pub remaining: u32,
}

/// Everything a member sees about a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub session: Session,
    pub members: Vec<Member>,
    pub items: Vec<ItemView>,
}

/// Result of a claim change as shown to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ClaimUpdate {
    pub item: ItemId,
    pub quantity: u32,
    pub blocked: bool,
    /// The session was already closed; its totals must be recomputed.
    pub resettle_required: bool,
}

/// One item's contribution to a participant's share.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ShareLine {
    pub item: ItemId,
    pub name: String,
    pub units: u32,
    pub amount: Decimal,
}

/// A participant's live preview of what they owe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MyShare {
    pub currency: CurrencyCode,
    pub tip_percent: TipPercent,
    pub lines: Vec<ShareLine>,
    pub dishes_total: Decimal,
    pub tip_amount: Decimal,
    pub grand_total: Decimal,
}
