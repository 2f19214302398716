use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::ids::{InviteToken, ParticipantId, SessionId};
use crate::money::{CurrencyCode, TipPercent};

/// Lifecycle phase of a session.
///
/// `Created` and `OcrDone` are pre-voting phases, `Voting` accepts claims,
/// `Closed` is a review snapshot and `Settled` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    OcrDone,
    Voting,
    Closed,
    Settled,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 5] = [
        Self::Created,
        Self::OcrDone,
        Self::Voting,
        Self::Closed,
        Self::Settled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::OcrDone => "ocr_done",
            Self::Voting => "voting",
            Self::Closed => "closed",
            Self::Settled => "settled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Settled)
    }

    /// `true` for the phases before voting opens.
    pub fn is_pre_voting(self) -> bool {
        matches!(self, Self::Created | Self::OcrDone)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| TypeError::InvalidStatus(s.to_string()))
    }
}

/// One bill-splitting round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub owner: ParticipantId,
    pub invite_token: InviteToken,
    pub status: SessionStatus,
    /// Global tip, used for members without an override.
    pub tip_percent: TipPercent,
    pub currency: CurrencyCode,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(owner: ParticipantId, invite_token: InviteToken, currency: CurrencyCode) -> Self {
        Self {
            id: SessionId::new(),
            owner,
            invite_token,
            status: SessionStatus::Created,
            tip_percent: TipPercent::ZERO,
            currency,
            created_at: Utc::now(),
            closed_at: None,
            settled_at: None,
        }
    }

    pub fn is_owner(&self, participant: &ParticipantId) -> bool {
        &self.owner == participant
    }
}

/// A participant attached to a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub session_id: SessionId,
    pub participant: ParticipantId,
    pub display_name: String,
    /// Per-member tip; `None` falls back to the session's global tip.
    pub tip_percent: Option<TipPercent>,
    /// "My claims are final." Cleared whenever the member's claims change.
    pub confirmed: bool,
    pub joined_at: DateTime<Utc>,
}

impl Member {
    pub fn new(
        session_id: SessionId,
        participant: ParticipantId,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            participant,
            display_name: display_name.into(),
            tip_percent: None,
            confirmed: false,
            joined_at: Utc::now(),
        }
    }

    pub fn effective_tip(&self, global: TipPercent) -> TipPercent {
        self.tip_percent.unwrap_or(global)
    }
}
