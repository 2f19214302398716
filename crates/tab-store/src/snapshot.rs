use chrono::{DateTime, Utc};
use serde::Serialize;
use tab_types::{
    CurrencyCode, Item, ItemClaims, ItemId, Member, Session, SessionStatus, TipPercent,
};

/// Versioned claims of a single item, read under the item's lock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClaimSheet {
    pub item_id: ItemId,
    /// The item's quantity at read time.
    pub capacity: u32,
    /// Bumped on every committed write.
    pub version: u64,
    pub claims: ItemClaims,
}

impl ClaimSheet {
    pub fn new(item_id: ItemId, capacity: u32) -> Self {
        Self {
            item_id,
            capacity,
            version: 0,
            claims: ItemClaims::new(),
        }
    }

    /// Units nobody has claimed yet.
    pub fn remaining(&self) -> u32 {
        u64::from(self.capacity)
            .saturating_sub(self.claims.total())
            .try_into()
            .unwrap_or(0)
    }
}

/// A targeted change to one session, applied by
/// [`LedgerStore::patch_session`](crate::LedgerStore::patch_session).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionPatch {
    Tip(TipPercent),
    Currency(CurrencyCode),
    /// A lifecycle step: the new status and its timestamps.
    Status {
        status: SessionStatus,
        closed_at: Option<DateTime<Utc>>,
        settled_at: Option<DateTime<Utc>>,
    },
}

impl SessionPatch {
    /// The status fields of an already-transitioned session.
    pub fn status_of(session: &Session) -> Self {
        Self::Status {
            status: session.status,
            closed_at: session.closed_at,
            settled_at: session.settled_at,
        }
    }

    pub(crate) fn apply(self, session: &mut Session) {
        match self {
            Self::Tip(tip) => session.tip_percent = tip,
            Self::Currency(currency) => session.currency = currency,
            Self::Status {
                status,
                closed_at,
                settled_at,
            } => {
                session.status = status;
                session.closed_at = closed_at;
                session.settled_at = settled_at;
            }
        }
    }
}

/// Outcome of a compare-and-write on a claim sheet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimWrite {
    /// The write landed; the sheet is now at `version`.
    Committed { version: u64 },
    /// Another writer got there first; re-read and decide again.
    Stale { current_version: u64 },
}

impl ClaimWrite {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

/// An item together with its claims, both read at the same instant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ItemSnapshot {
    pub item: Item,
    pub claims: ItemClaims,
}

/// Everything the settlement calculator needs about one session.
///
/// Each item's claims are internally consistent with that item; different
/// items may be read at slightly different instants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LedgerSnapshot {
    pub session: Session,
    /// Members in join order.
    pub members: Vec<Member>,
    /// Items in creation order.
    pub items: Vec<ItemSnapshot>,
}

impl LedgerSnapshot {
    pub fn member(&self, participant: &tab_types::ParticipantId) -> Option<&Member> {
        self.members.iter().find(|m| &m.participant == participant)
    }

    /// Items with no claims at all.
    pub fn unclaimed_items(&self) -> impl Iterator<Item = &Item> {
        self.items
            .iter()
            .filter(|snapshot| snapshot.claims.is_empty())
            .map(|snapshot| &snapshot.item)
    }
}
