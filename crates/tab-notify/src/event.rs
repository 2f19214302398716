use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tab_types::{ItemId, ParticipantId, SessionId, SessionStatus, TipPercent};

/// Classification of session events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    MemberJoined,
    ClaimUpdated,
    MemberConfirmed,
    MemberUnconfirmed,
    TipChanged,
    ItemsUpdated,
    StatusChanged,
    Settled,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MemberJoined => "member_joined",
            Self::ClaimUpdated => "claim_updated",
            Self::MemberConfirmed => "member_confirmed",
            Self::MemberUnconfirmed => "member_unconfirmed",
            Self::TipChanged => "tip_changed",
            Self::ItemsUpdated => "items_updated",
            Self::StatusChanged => "status_changed",
            Self::Settled => "settled",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data carried by a session event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    MemberJoined {
        participant: ParticipantId,
        display_name: String,
    },
    ClaimUpdated {
        item: ItemId,
        participant: ParticipantId,
        quantity: u32,
    },
    MemberConfirmed {
        participant: ParticipantId,
    },
    MemberUnconfirmed {
        participant: ParticipantId,
    },
    /// `participant` is `None` when the session's global tip changed.
    TipChanged {
        participant: Option<ParticipantId>,
        tip_percent: TipPercent,
    },
    ItemsUpdated {
        item_count: usize,
    },
    StatusChanged {
        from: SessionStatus,
        to: SessionStatus,
    },
    Settled {
        grand_total: Decimal,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MemberJoined { .. } => EventKind::MemberJoined,
            Self::ClaimUpdated { .. } => EventKind::ClaimUpdated,
            Self::MemberConfirmed { .. } => EventKind::MemberConfirmed,
            Self::MemberUnconfirmed { .. } => EventKind::MemberUnconfirmed,
            Self::TipChanged { .. } => EventKind::TipChanged,
            Self::ItemsUpdated { .. } => EventKind::ItemsUpdated,
            Self::StatusChanged { .. } => EventKind::StatusChanged,
            Self::Settled { .. } => EventKind::Settled,
        }
    }
}

/// An event scoped to one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session: SessionId,
    pub kind: EventKind,
    pub payload: EventPayload,
    pub at: DateTime<Utc>,
}

impl SessionEvent {
    pub fn new(session: SessionId, payload: EventPayload) -> Self {
        Self {
            session,
            kind: payload.kind(),
            payload,
            at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn kind_follows_payload() {
        let event = SessionEvent::new(
            SessionId::new(),
            EventPayload::Settled {
                grand_total: dec!(605),
            },
        );
        assert_eq!(event.kind, EventKind::Settled);
    }

    #[test]
    fn payload_is_tagged_by_type() {
        let payload = EventPayload::StatusChanged {
            from: SessionStatus::Voting,
            to: SessionStatus::Closed,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "status_changed");
        assert_eq!(json["to"], "closed");
        assert_eq!(payload.kind().to_string(), "status_changed");
    }
}
