use chrono::{DateTime, Utc};
use tab_types::{ParticipantId, Session, SessionStatus};
use tracing::{info, warn};

use crate::config::{ClosedClaimPolicy, LifecycleConfig};
use crate::error::{LifecycleError, LifecycleResult};

use SessionStatus::{Closed, Created, OcrDone, Settled, Voting};

/// Statuses reachable from `from` in one step.
pub fn allowed_transitions(from: SessionStatus) -> &'static [SessionStatus] {
    match from {
        Created => &[OcrDone, Voting],
        OcrDone => &[Created, Voting],
        Voting => &[Closed],
        Closed => &[Voting, Settled],
        Settled => &[],
    }
}

pub fn can_transition(from: SessionStatus, to: SessionStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

/// Whether a claim change may proceed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimGate {
    Open,
    /// Proceed, but the session was already closed; totals shown at close
    /// are stale and should be recomputed.
    Flagged,
}

impl ClaimGate {
    pub fn is_flagged(self) -> bool {
        matches!(self, Self::Flagged)
    }
}

/// Kinds of item mutation, gated differently per phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemEdit {
    /// Replace the whole item list (drops all claims).
    Replace,
    /// Rename or re-price one item.
    Edit,
    Delete,
    RemoveUnclaimed,
}

/// Phase rules for sessions.
#[derive(Clone, Debug, Default)]
pub struct SessionLifecycle {
    config: LifecycleConfig,
}

impl SessionLifecycle {
    pub fn new(config: LifecycleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Move `session` to `target` on behalf of `actor`, returning the
    /// updated record. Entering `closed` stamps `closed_at`, reopening
    /// voting clears it, and entering `settled` stamps `settled_at`.
    pub fn transition(
        &self,
        session: &Session,
        actor: &ParticipantId,
        target: SessionStatus,
        at: DateTime<Utc>,
    ) -> LifecycleResult<Session> {
        if !session.is_owner(actor) {
            return Err(LifecycleError::NotOwner);
        }
        let from = session.status;
        if from.is_terminal() {
            return Err(LifecycleError::Settled);
        }
        if !can_transition(from, target) {
            return Err(LifecycleError::InvalidTransition { from, to: target });
        }

        let mut next = session.clone();
        next.status = target;
        match target {
            Closed => next.closed_at = Some(at),
            Voting => next.closed_at = None,
            Settled => next.settled_at = Some(at),
            Created | OcrDone => {}
        }
        info!(session = %session.id, %from, to = %target, "session status changed");
        Ok(next)
    }

    /// Decide whether a claim may change while the session is in `status`.
    pub fn claim_gate(&self, status: SessionStatus) -> LifecycleResult<ClaimGate> {
        match status {
            Voting => Ok(ClaimGate::Open),
            Created | OcrDone if self.config.claims_before_voting => Ok(ClaimGate::Open),
            Created | OcrDone => Err(LifecycleError::ClaimsNotOpen(status)),
            Closed => match self.config.closed_claims {
                ClosedClaimPolicy::Allow => Ok(ClaimGate::Open),
                ClosedClaimPolicy::Warn => {
                    warn!(%status, "claim changed after close; settlement must be recomputed");
                    Ok(ClaimGate::Flagged)
                }
                ClosedClaimPolicy::Block => Err(LifecycleError::ClaimsFrozen(status)),
            },
            Settled => Err(LifecycleError::Settled),
        }
    }

    /// Check an item mutation against the session's phase.
    pub fn check_item_edit(&self, status: SessionStatus, edit: ItemEdit) -> LifecycleResult<()> {
        if status.is_terminal() {
            return Err(LifecycleError::Settled);
        }
        let allowed = match edit {
            ItemEdit::Replace => status.is_pre_voting(),
            ItemEdit::Edit | ItemEdit::Delete => status != Closed,
            ItemEdit::RemoveUnclaimed => true,
        };
        if allowed {
            Ok(())
        } else {
            Err(LifecycleError::ItemsLocked(status))
        }
    }

    /// Tips, confirmation and other member settings may change until the
    /// session is settled.
    pub fn check_mutable(&self, status: SessionStatus) -> LifecycleResult<()> {
        if status.is_terminal() {
            Err(LifecycleError::Settled)
        } else {
            Ok(())
        }
    }
}
