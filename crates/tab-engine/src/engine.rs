use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tab_store::{ClaimSheet, ClaimWrite, LedgerStore, StoreError};
use tab_types::{ItemClaims, ItemId, ParticipantId, SessionId};
use tracing::{debug, warn};

use crate::cycle::{cycle_step, CycleOutcome, CycleStep};
use crate::error::{ClaimError, ClaimResult};
use crate::split::equal_split;

/// Tuning for the claim engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Compare-and-write attempts per operation before giving up.
    pub max_write_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_write_attempts: 32,
        }
    }
}

/// Result of [`ClaimEngine::assign_claim`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct AssignOutcome {
    pub previous: u32,
    pub quantity: u32,
    pub confirmation_cleared: bool,
}

/// Units handed out on one item by an equal split.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ItemSplit {
    pub item: ItemId,
    pub shares: Vec<(ParticipantId, u32)>,
}

/// Mutates claims against a [`LedgerStore`] without ever letting an item's
/// claims exceed its quantity.
pub struct ClaimEngine {
    store: Arc<dyn LedgerStore>,
    config: EngineConfig,
}

impl ClaimEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<dyn LedgerStore>, config: EngineConfig) -> Self {
        Self {
            store,
            config: EngineConfig {
                max_write_attempts: config.max_write_attempts.max(1),
            },
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Advance `participant`'s claim on `item` by one step of
    /// 0 → 1 → … → quantity → 0.
    ///
    /// When no unit is free the call returns the unchanged quantity with
    /// `blocked = true`. A committed change clears the participant's
    /// confirmation.
    pub fn cycle_claim(
        &self,
        item: &ItemId,
        participant: &ParticipantId,
    ) -> ClaimResult<CycleOutcome> {
        let session = self.session_of(item)?;

        let (quantity, step) = self.commit_with_retry(item, |sheet| {
            let own = sheet.claims.get(participant);
            let step = cycle_step(own, sheet.claims.total(), sheet.capacity);
            if step == CycleStep::Blocked {
                return Ok(Decision::Keep((own, step)));
            }
            let next = step.apply(own);
            let mut claims = sheet.claims.clone();
            claims.set(participant.clone(), next);
            Ok(Decision::Write(claims, (next, step)))
        })?;

        if step == CycleStep::Blocked {
            debug!(item = %item, participant = %participant, quantity, "claim blocked, item full");
            return Ok(CycleOutcome::blocked(quantity));
        }

        debug!(item = %item, participant = %participant, quantity, ?step, "claim cycled");
        let confirmation_cleared = self.clear_confirmation(&session, participant)?;
        Ok(CycleOutcome {
            quantity,
            blocked: false,
            confirmation_cleared,
        })
    }

    /// Set `participant`'s claim on `item` to exactly `quantity`.
    ///
    /// Fails with [`ClaimError::OverCapacity`] when the other participants'
    /// claims leave fewer than `quantity` units.
    pub fn assign_claim(
        &self,
        item: &ItemId,
        participant: &ParticipantId,
        quantity: u32,
    ) -> ClaimResult<AssignOutcome> {
        let session = self.session_of(item)?;

        let previous = self.commit_with_retry(item, |sheet| {
            let own = sheet.claims.get(participant);
            let others = sheet.claims.total() - u64::from(own);
            let available = u64::from(sheet.capacity).saturating_sub(others);
            if u64::from(quantity) > available {
                return Err(ClaimError::OverCapacity {
                    item: *item,
                    requested: quantity,
                    available: u32::try_from(available).unwrap_or(u32::MAX),
                });
            }
            if own == quantity {
                return Ok(Decision::Keep(own));
            }
            let mut claims = sheet.claims.clone();
            claims.set(participant.clone(), quantity);
            Ok(Decision::Write(claims, own))
        })?;

        let confirmation_cleared = if previous == quantity {
            false
        } else {
            debug!(item = %item, participant = %participant, previous, quantity, "claim assigned");
            self.clear_confirmation(&session, participant)?
        };

        Ok(AssignOutcome {
            previous,
            quantity,
            confirmation_cleared,
        })
    }

    /// Hand the item's unclaimed units to `participants` with
    /// [`equal_split`], adding to whatever they already hold.
    ///
    /// Returns the units each participant received.
    pub fn split_remaining_equally(
        &self,
        item: &ItemId,
        participants: &[ParticipantId],
    ) -> ClaimResult<Vec<(ParticipantId, u32)>> {
        let session = self.session_of(item)?;

        let shares = self.commit_with_retry(item, |sheet| {
            let shares = equal_split(sheet.remaining(), participants);
            if shares.is_empty() {
                return Ok(Decision::Keep(shares));
            }
            let mut claims = sheet.claims.clone();
            for (participant, units) in &shares {
                let held = claims.get(participant);
                claims.set(participant.clone(), held + units);
            }
            Ok(Decision::Write(claims, shares))
        })?;

        for (participant, _) in &shares {
            self.clear_confirmation(&session, participant)?;
        }
        if !shares.is_empty() {
            debug!(item = %item, recipients = shares.len(), "split remaining units");
        }
        Ok(shares)
    }

    /// Equal-split every item of the session that still has free units,
    /// across all members in join order.
    pub fn split_unclaimed(&self, session: &SessionId) -> ClaimResult<Vec<ItemSplit>> {
        let participants: Vec<ParticipantId> = self
            .store
            .members(session)?
            .into_iter()
            .map(|m| m.participant)
            .collect();

        let mut splits = Vec::new();
        for item in self.store.items(session)? {
            match self.split_remaining_equally(&item.id, &participants) {
                Ok(shares) if shares.is_empty() => {}
                Ok(shares) => splits.push(ItemSplit {
                    item: item.id,
                    shares,
                }),
                // Removed between listing and splitting.
                Err(ClaimError::ItemNotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(splits)
    }

    /// Items on which `participant` holds a nonzero claim, with the units.
    pub fn participant_claims(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
    ) -> ClaimResult<Vec<(ItemId, u32)>> {
        let snapshot = self.store.snapshot(session)?;
        Ok(snapshot
            .items
            .iter()
            .filter_map(|entry| {
                let units = entry.claims.get(participant);
                (units > 0).then_some((entry.item.id, units))
            })
            .collect())
    }

    fn session_of(&self, item: &ItemId) -> ClaimResult<SessionId> {
        self.store
            .item(item)?
            .map(|item| item.session_id)
            .ok_or(ClaimError::ItemNotFound(*item))
    }

    /// Read the sheet, let `decide` compute the new claims, and
    /// compare-and-write them; re-read on a stale version.
    fn commit_with_retry<T>(
        &self,
        item: &ItemId,
        mut decide: impl FnMut(&ClaimSheet) -> ClaimResult<Decision<T>>,
    ) -> ClaimResult<T> {
        for attempt in 1..=self.config.max_write_attempts {
            let sheet = self.store.claim_sheet(item)?;
            let (claims, value) = match decide(&sheet)? {
                Decision::Keep(value) => return Ok(value),
                Decision::Write(claims, value) => (claims, value),
            };
            match self.store.write_claims(item, sheet.version, claims)? {
                ClaimWrite::Committed { .. } => return Ok(value),
                ClaimWrite::Stale { current_version } => {
                    debug!(item = %item, attempt, current_version, "stale claim sheet, retrying");
                }
            }
        }

        warn!(item = %item, attempts = self.config.max_write_attempts, "claim write kept losing races");
        Err(ClaimError::Contention {
            item: *item,
            attempts: self.config.max_write_attempts,
        })
    }

    fn clear_confirmation(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
    ) -> ClaimResult<bool> {
        match self.store.set_confirmed(session, participant, false) {
            Ok(was_confirmed) => Ok(was_confirmed),
            // Claims may be held by identifiers that never joined.
            Err(StoreError::MemberNotFound { .. }) => Ok(false),
            // Settled after the claim landed; the flag no longer matters.
            Err(StoreError::SessionSettled(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

enum Decision<T> {
    Keep(T),
    Write(ItemClaims, T),
}
