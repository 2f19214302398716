use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tab_engine::{ClaimEngine, EngineConfig, ItemSplit};
use tab_lifecycle::{ItemEdit, LifecycleConfig, SessionLifecycle};
use tab_notify::{publish_best_effort, EventPayload, Notifier, SessionEvent};
use tab_settle::{compute_all_shares, compute_participant_share, PricedItem, SettlementReport};
use tab_store::{LedgerStore, SessionPatch, StoreError};
use tab_types::{
    CurrencyCode, InviteToken, Item, ItemDraft, ItemId, Member, ParticipantId, Session, SessionId,
    SessionStatus, TipPercent,
};
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::recognizer::{
    total_mismatch, ReceiptImage, ReceiptRecognizer, RecognitionSummary, StaticRecognizer,
};
use crate::views::{ClaimUpdate, ItemView, MyShare, SessionView, ShareLine};

/// Fresh tokens tried before giving up on a unique invite.
const INVITE_ATTEMPTS: usize = 8;

/// Re-reads allowed when a session's status moves under a guarded write.
const SESSION_WRITE_ATTEMPTS: usize = 8;

/// The operations TabSplit exposes, composed from the store, claim engine,
/// lifecycle rules, notifier and receipt recognizer.
///
/// Caller identity is taken verbatim from the `participant` / `actor`
/// arguments.
pub struct TabService {
    store: Arc<dyn LedgerStore>,
    engine: ClaimEngine,
    lifecycle: SessionLifecycle,
    notifier: Arc<dyn Notifier>,
    recognizer: Arc<dyn ReceiptRecognizer>,
    config: ServiceConfig,
}

impl TabService {
    pub fn new(store: Arc<dyn LedgerStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            engine: ClaimEngine::new(store.clone()),
            store,
            lifecycle: SessionLifecycle::default(),
            notifier,
            recognizer: Arc::new(StaticRecognizer::unavailable()),
            config: ServiceConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_lifecycle(mut self, config: LifecycleConfig) -> Self {
        self.lifecycle = SessionLifecycle::new(config);
        self
    }

    pub fn with_engine(mut self, config: EngineConfig) -> Self {
        self.engine = ClaimEngine::with_config(self.store.clone(), config);
        self
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn ReceiptRecognizer>) -> Self {
        self.recognizer = recognizer;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // ---- Sessions and membership ----

    /// Open a session owned by `owner`, who becomes its first member.
    pub async fn create_session(
        &self,
        owner: &ParticipantId,
        display_name: &str,
        currency: Option<&str>,
    ) -> ServiceResult<Session> {
        let currency = match currency {
            Some(raw) => CurrencyCode::parse(raw)?,
            None => self.config.default_currency.clone(),
        };

        let mut last_err = None;
        for _ in 0..INVITE_ATTEMPTS {
            let token = InviteToken::generate(self.config.invite_token_len);
            let session = Session::new(owner.clone(), token, currency.clone());
            match self.store.insert_session(session.clone()) {
                Ok(()) => {
                    let member = Member::new(session.id, owner.clone(), name_or_id(display_name, owner));
                    self.store.insert_member(member)?;
                    info!(session = %session.id, owner = %owner, "session created");
                    return Ok(session);
                }
                Err(err @ StoreError::DuplicateInvite(_)) => last_err = Some(err),
                Err(err) => return Err(err.into()),
            }
        }
        Err(ServiceError::Store(last_err.unwrap_or(StoreError::DuplicateInvite(String::new()))))
    }

    /// Join the session behind `token`.
    pub async fn join_session(
        &self,
        token: &InviteToken,
        participant: &ParticipantId,
        display_name: &str,
    ) -> ServiceResult<Session> {
        let session = self
            .store
            .session_by_invite(token)?
            .ok_or_else(|| ServiceError::InviteNotFound(token.to_string()))?;
        self.lifecycle.check_mutable(session.status)?;

        let display_name = name_or_id(display_name, participant);
        self.store.insert_member(Member::new(
            session.id,
            participant.clone(),
            display_name.clone(),
        ))?;
        info!(session = %session.id, participant = %participant, "member joined");

        self.emit(
            session.id,
            EventPayload::MemberJoined {
                participant: participant.clone(),
                display_name,
            },
        )
        .await;
        Ok(session)
    }

    /// Sessions `participant` belongs to, newest first.
    pub async fn sessions_for(&self, participant: &ParticipantId) -> ServiceResult<Vec<Session>> {
        Ok(self.store.sessions_for_participant(participant)?)
    }

    /// The session record, for members only.
    pub async fn session(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
    ) -> ServiceResult<Session> {
        Ok(self.require_member(session, participant)?.0)
    }

    /// The caller's own membership record.
    pub async fn member(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
    ) -> ServiceResult<Member> {
        Ok(self.require_member(session, participant)?.1)
    }

    pub async fn session_view(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
    ) -> ServiceResult<SessionView> {
        self.require_member(session, participant)?;
        let snapshot = self.store.snapshot(session)?;
        let items = snapshot
            .items
            .into_iter()
            .map(|entry| ItemView {
                remaining: u64::from(entry.item.quantity)
                    .saturating_sub(entry.claims.total())
                    .try_into()
                    .unwrap_or(0),
                item: entry.item,
                claims: entry.claims,
            })
            .collect();
        Ok(SessionView {
            session: snapshot.session,
            members: snapshot.members,
            items,
        })
    }

    // ---- Items ----

    /// Replace every item of the session. All claims are dropped.
    pub async fn replace_items(
        &self,
        session: &SessionId,
        actor: &ParticipantId,
        drafts: Vec<ItemDraft>,
    ) -> ServiceResult<Vec<Item>> {
        let session = self.require_owner(session, actor, "replace items")?;
        self.lifecycle
            .check_item_edit(session.status, ItemEdit::Replace)?;
        for draft in &drafts {
            draft.validate()?;
        }
        let items = self.store_items(&session, drafts).await?;
        self.emit_items_updated(&session).await?;
        Ok(items)
    }

    pub async fn add_item(
        &self,
        session: &SessionId,
        actor: &ParticipantId,
        draft: ItemDraft,
    ) -> ServiceResult<Item> {
        let session = self.require_owner(session, actor, "add items")?;
        self.lifecycle.check_item_edit(session.status, ItemEdit::Edit)?;
        let item = Item::from_draft(session.id, draft)?;
        self.store.insert_item(item.clone())?;
        self.emit_items_updated(&session).await?;
        Ok(item)
    }

    /// Rename and re-price an item. Its quantity and claims are kept.
    pub async fn edit_item(
        &self,
        session: &SessionId,
        actor: &ParticipantId,
        item: &ItemId,
        name: &str,
        price: Decimal,
    ) -> ServiceResult<Item> {
        let session = self.require_owner(session, actor, "edit items")?;
        self.lifecycle.check_item_edit(session.status, ItemEdit::Edit)?;
        let mut stored = self.load_item(&session, item)?;
        stored.edit(name, price)?;
        self.store.update_item(&stored)?;
        self.emit_items_updated(&session).await?;
        Ok(stored)
    }

    pub async fn delete_item(
        &self,
        session: &SessionId,
        actor: &ParticipantId,
        item: &ItemId,
    ) -> ServiceResult<()> {
        let session = self.require_owner(session, actor, "delete items")?;
        self.lifecycle
            .check_item_edit(session.status, ItemEdit::Delete)?;
        self.load_item(&session, item)?;

        let claims = self
            .store
            .remove_item(item)?
            .ok_or(ServiceError::ItemNotFound(*item))?;
        self.unconfirm_holders(&session, claims.holders().cloned().collect())
            .await?;
        self.emit_items_updated(&session).await
    }

    /// Drop the items nobody claimed. Returns their ids.
    pub async fn remove_unclaimed_items(
        &self,
        session: &SessionId,
        actor: &ParticipantId,
    ) -> ServiceResult<Vec<ItemId>> {
        let session = self.require_owner(session, actor, "remove unclaimed items")?;
        self.lifecycle
            .check_item_edit(session.status, ItemEdit::RemoveUnclaimed)?;
        let removed = self.store.remove_unclaimed_items(&session.id)?;
        if !removed.is_empty() {
            info!(session = %session.id, removed = removed.len(), "unclaimed items removed");
            self.emit_items_updated(&session).await?;
        }
        Ok(removed)
    }

    /// Clear every item and, after a scan, return the session to `created`
    /// so a new receipt can be uploaded.
    pub async fn reset_items(
        &self,
        session: &SessionId,
        actor: &ParticipantId,
    ) -> ServiceResult<Session> {
        let session = self.require_owner(session, actor, "reset items")?;
        self.lifecycle
            .check_item_edit(session.status, ItemEdit::Replace)?;
        self.store_items(&session, Vec::new()).await?;

        let updated = if session.status == SessionStatus::OcrDone {
            self.apply_transition(&session.id, actor, SessionStatus::Created)
                .await?
        } else {
            session.clone()
        };
        self.emit_items_updated(&updated).await?;
        Ok(updated)
    }

    /// Recognize a receipt and store its lines as the session's items.
    ///
    /// Lines that fail validation are skipped. The recognized currency, when
    /// valid, replaces the session's. A `created` session moves to
    /// `ocr_done`.
    pub async fn ingest_receipt(
        &self,
        session: &SessionId,
        actor: &ParticipantId,
        images: Vec<ReceiptImage>,
    ) -> ServiceResult<RecognitionSummary> {
        let session = self.require_owner(session, actor, "upload a receipt")?;
        self.lifecycle
            .check_item_edit(session.status, ItemEdit::Replace)?;

        let receipt = self.recognizer.parse_receipt(&images).await?;

        let mut drafts = Vec::with_capacity(receipt.items.len());
        let mut skipped = 0;
        for line in receipt.items {
            let draft = ItemDraft::new(line.name, line.price, line.quantity);
            match draft.validate() {
                Ok(()) => drafts.push(draft),
                Err(err) => {
                    skipped += 1;
                    warn!(session = %session.id, error = %err, "skipping unreadable receipt line");
                }
            }
        }
        let total_mismatch = total_mismatch(drafts.iter().map(|d| d.price), receipt.total);
        let items = self.store_items(&session, drafts).await?;

        let mut updated = session.clone();
        if let Some(code) = receipt
            .currency
            .as_deref()
            .and_then(|raw| CurrencyCode::parse(raw).ok())
        {
            (_, updated) = self.patch_session(&session.id, |current| {
                self.lifecycle
                    .check_item_edit(current.status, ItemEdit::Replace)?;
                Ok(SessionPatch::Currency(code.clone()))
            })?;
        }
        if updated.status == SessionStatus::Created {
            updated = self
                .apply_transition(&updated.id, actor, SessionStatus::OcrDone)
                .await?;
        }
        self.emit_items_updated(&updated).await?;

        info!(
            session = %updated.id,
            items = items.len(),
            skipped,
            total_mismatch,
            "receipt ingested"
        );
        Ok(RecognitionSummary {
            items,
            total: receipt.total,
            currency: updated.currency,
            total_mismatch,
            skipped,
        })
    }

    // ---- Claims ----

    /// Step the caller's own claim on `item` (0 → 1 → … → quantity → 0).
    pub async fn cycle_claim(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
        item: &ItemId,
    ) -> ServiceResult<ClaimUpdate> {
        let (session, _) = self.require_member(session, participant)?;
        self.load_item(&session, item)?;
        let gate = self.lifecycle.claim_gate(session.status)?;

        let outcome = self.engine.cycle_claim(item, participant)?;
        if !outcome.blocked {
            self.emit_claim(&session, item, participant, outcome.quantity)
                .await;
        }
        if outcome.confirmation_cleared {
            self.emit(
                session.id,
                EventPayload::MemberUnconfirmed {
                    participant: participant.clone(),
                },
            )
            .await;
        }

        Ok(ClaimUpdate {
            item: *item,
            quantity: outcome.quantity,
            blocked: outcome.blocked,
            resettle_required: gate.is_flagged() && !outcome.blocked,
        })
    }

    /// Set a member's claim on `item` to an exact quantity (owner only).
    pub async fn assign_claim(
        &self,
        session: &SessionId,
        actor: &ParticipantId,
        item: &ItemId,
        participant: &ParticipantId,
        quantity: u32,
    ) -> ServiceResult<ClaimUpdate> {
        let session = self.require_owner(session, actor, "assign claims")?;
        self.require_member(&session.id, participant)?;
        self.load_item(&session, item)?;
        let gate = self.lifecycle.claim_gate(session.status)?;

        let outcome = self.engine.assign_claim(item, participant, quantity)?;
        let changed = outcome.previous != outcome.quantity;
        if changed {
            self.emit_claim(&session, item, participant, outcome.quantity)
                .await;
        }
        if outcome.confirmation_cleared {
            self.emit(
                session.id,
                EventPayload::MemberUnconfirmed {
                    participant: participant.clone(),
                },
            )
            .await;
        }

        Ok(ClaimUpdate {
            item: *item,
            quantity: outcome.quantity,
            blocked: false,
            resettle_required: gate.is_flagged() && changed,
        })
    }

    /// Split every item's unclaimed units equally across all members
    /// (owner only).
    pub async fn split_unclaimed(
        &self,
        session: &SessionId,
        actor: &ParticipantId,
    ) -> ServiceResult<Vec<ItemSplit>> {
        let session = self.require_owner(session, actor, "split unclaimed items")?;
        self.lifecycle.claim_gate(session.status)?;

        let confirmed_before: BTreeSet<ParticipantId> = self
            .store
            .members(&session.id)?
            .into_iter()
            .filter(|m| m.confirmed)
            .map(|m| m.participant)
            .collect();

        let splits = self.engine.split_unclaimed(&session.id)?;
        let mut recipients = BTreeSet::new();
        for split in &splits {
            let sheet = self.store.claim_sheet(&split.item)?;
            for (participant, _) in &split.shares {
                self.emit_claim(&session, &split.item, participant, sheet.claims.get(participant))
                    .await;
                recipients.insert(participant.clone());
            }
        }
        for participant in recipients.intersection(&confirmed_before) {
            self.emit(
                session.id,
                EventPayload::MemberUnconfirmed {
                    participant: participant.clone(),
                },
            )
            .await;
        }
        info!(session = %session.id, items = splits.len(), "unclaimed units split");
        Ok(splits)
    }

    // ---- Tips and confirmation ----

    /// Set the caller's own tip override (0–100).
    pub async fn set_tip(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
        percent: i64,
    ) -> ServiceResult<Member> {
        let (session, _) = self.require_member(session, participant)?;
        self.lifecycle.check_mutable(session.status)?;
        let tip = TipPercent::new(percent)?;
        let member = self
            .store
            .set_member_tip(&session.id, participant, Some(tip))?;
        self.emit(
            session.id,
            EventPayload::TipChanged {
                participant: Some(participant.clone()),
                tip_percent: tip,
            },
        )
        .await;
        Ok(member)
    }

    /// Set the session's global tip (owner only).
    pub async fn set_session_tip(
        &self,
        session: &SessionId,
        actor: &ParticipantId,
        percent: i64,
    ) -> ServiceResult<Session> {
        self.require_owner(session, actor, "set the session tip")?;
        let tip = TipPercent::new(percent)?;
        let (_, session) = self.patch_session(session, |current| {
            self.lifecycle.check_mutable(current.status)?;
            Ok(SessionPatch::Tip(tip))
        })?;
        self.emit(
            session.id,
            EventPayload::TipChanged {
                participant: None,
                tip_percent: session.tip_percent,
            },
        )
        .await;
        Ok(session)
    }

    pub async fn set_currency(
        &self,
        session: &SessionId,
        actor: &ParticipantId,
        code: &str,
    ) -> ServiceResult<Session> {
        self.require_owner(session, actor, "change the currency")?;
        let currency = CurrencyCode::parse(code)?;
        let (_, session) = self.patch_session(session, |current| {
            self.lifecycle.check_mutable(current.status)?;
            Ok(SessionPatch::Currency(currency.clone()))
        })?;
        Ok(session)
    }

    /// Mark the caller's claims as final.
    pub async fn confirm(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
    ) -> ServiceResult<Member> {
        self.set_confirmation(session, participant, true).await
    }

    pub async fn unconfirm(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
    ) -> ServiceResult<Member> {
        self.set_confirmation(session, participant, false).await
    }

    // ---- Settlement ----

    /// Rounded total of every member holding claims.
    pub async fn compute_all_shares(
        &self,
        session: &SessionId,
        viewer: &ParticipantId,
    ) -> ServiceResult<BTreeMap<ParticipantId, Decimal>> {
        self.require_member(session, viewer)?;
        let snapshot = self.store.snapshot(session)?;
        let items: Vec<PricedItem> = snapshot.items.iter().map(PricedItem::from).collect();
        let tips: HashMap<ParticipantId, TipPercent> = snapshot
            .members
            .iter()
            .filter_map(|m| m.tip_percent.map(|tip| (m.participant.clone(), tip)))
            .collect();
        Ok(compute_all_shares(&items, snapshot.session.tip_percent, &tips))
    }

    /// Full settlement preview of the session.
    pub async fn settlement_report(
        &self,
        session: &SessionId,
        viewer: &ParticipantId,
    ) -> ServiceResult<SettlementReport> {
        self.require_member(session, viewer)?;
        let snapshot = self.store.snapshot(session)?;
        Ok(SettlementReport::from_snapshot(&snapshot))
    }

    /// The caller's own share with per-item detail.
    pub async fn compute_participant_share(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
    ) -> ServiceResult<MyShare> {
        let (_, member) = self.require_member(session, participant)?;
        let snapshot = self.store.snapshot(session)?;
        let tip = member.effective_tip(snapshot.session.tip_percent);

        let items: Vec<PricedItem> = snapshot.items.iter().map(PricedItem::from).collect();
        let breakdown = compute_participant_share(&items, participant, tip);
        let lines = snapshot
            .items
            .iter()
            .zip(&items)
            .filter_map(|(entry, priced)| {
                let units = entry.claims.get(participant);
                (units > 0).then(|| ShareLine {
                    item: entry.item.id,
                    name: entry.item.name.clone(),
                    units,
                    amount: priced.cost_of(units),
                })
            })
            .collect();

        Ok(MyShare {
            currency: snapshot.session.currency,
            tip_percent: tip,
            lines,
            dishes_total: breakdown.dishes_total,
            tip_amount: breakdown.tip_amount,
            grand_total: breakdown.grand_total,
        })
    }

    // ---- Lifecycle ----

    /// Move the session to `target` (owner only). Settling goes through
    /// [`settle`](Self::settle).
    pub async fn transition(
        &self,
        session: &SessionId,
        actor: &ParticipantId,
        target: SessionStatus,
    ) -> ServiceResult<Session> {
        if target == SessionStatus::Settled {
            self.settle(session, actor).await?;
            return self.load_session(session);
        }
        self.apply_transition(session, actor, target).await
    }

    /// Move `closed → settled` and compute the final settlement from the
    /// frozen ledger.
    pub async fn settle(
        &self,
        session: &SessionId,
        actor: &ParticipantId,
    ) -> ServiceResult<SettlementReport> {
        self.require_owner(session, actor, "settle the bill")?;
        let session = self
            .apply_transition(session, actor, SessionStatus::Settled)
            .await?;
        let snapshot = self.store.snapshot(&session.id)?;
        let report = SettlementReport::from_snapshot(&snapshot);
        info!(
            session = %session.id,
            grand_total = %report.grand_total,
            rounding_surplus = %report.rounding_surplus,
            "session settled"
        );
        self.emit(
            session.id,
            EventPayload::Settled {
                grand_total: report.grand_total,
            },
        )
        .await;
        Ok(report)
    }

    // ---- Internals ----

    fn load_session(&self, id: &SessionId) -> ServiceResult<Session> {
        self.store
            .session(id)?
            .ok_or(ServiceError::SessionNotFound(*id))
    }

    fn require_member(
        &self,
        id: &SessionId,
        participant: &ParticipantId,
    ) -> ServiceResult<(Session, Member)> {
        let session = self.load_session(id)?;
        let member = self
            .store
            .member(id, participant)?
            .ok_or_else(|| ServiceError::NotMember {
                session: *id,
                participant: participant.clone(),
            })?;
        Ok((session, member))
    }

    fn require_owner(
        &self,
        id: &SessionId,
        actor: &ParticipantId,
        action: &'static str,
    ) -> ServiceResult<Session> {
        let session = self.load_session(id)?;
        if !session.is_owner(actor) {
            return Err(ServiceError::NotOwner(action));
        }
        Ok(session)
    }

    fn load_item(&self, session: &Session, item: &ItemId) -> ServiceResult<Item> {
        self.store
            .item(item)?
            .filter(|stored| stored.session_id == session.id)
            .ok_or(ServiceError::ItemNotFound(*item))
    }

    /// Decide a session change against a fresh read and apply it only if
    /// the status has not moved since. Returns the session before and after.
    fn patch_session<F>(&self, id: &SessionId, mut decide: F) -> ServiceResult<(Session, Session)>
    where
        F: FnMut(&Session) -> ServiceResult<SessionPatch>,
    {
        for _ in 0..SESSION_WRITE_ATTEMPTS {
            let current = self.load_session(id)?;
            let patch = decide(&current)?;
            match self.store.patch_session(id, current.status, patch) {
                Ok(updated) => return Ok((current, updated)),
                Err(StoreError::StatusChanged { .. }) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        warn!(session = %id, "session status kept moving under a write");
        Err(ServiceError::SessionContention(*id))
    }

    async fn apply_transition(
        &self,
        id: &SessionId,
        actor: &ParticipantId,
        target: SessionStatus,
    ) -> ServiceResult<Session> {
        let (before, updated) = self.patch_session(id, |current| {
            let next = self
                .lifecycle
                .transition(current, actor, target, Utc::now())?;
            Ok(SessionPatch::status_of(&next))
        })?;
        self.emit(
            *id,
            EventPayload::StatusChanged {
                from: before.status,
                to: updated.status,
            },
        )
        .await;
        Ok(updated)
    }

    /// Replace the session's items with `drafts`, clearing the confirmation
    /// of everyone who held a claim.
    async fn store_items(
        &self,
        session: &Session,
        drafts: Vec<ItemDraft>,
    ) -> ServiceResult<Vec<Item>> {
        let holders: BTreeSet<ParticipantId> = self
            .store
            .clear_items(&session.id)?
            .iter()
            .flat_map(|claims| claims.holders().cloned())
            .collect();

        let mut items = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let item = Item::from_draft(session.id, draft)?;
            self.store.insert_item(item.clone())?;
            items.push(item);
        }
        self.unconfirm_holders(session, holders).await?;
        Ok(items)
    }

    /// Clear confirmation for each participant, announcing those that were
    /// confirmed.
    async fn unconfirm_holders(
        &self,
        session: &Session,
        participants: BTreeSet<ParticipantId>,
    ) -> ServiceResult<()> {
        for participant in participants {
            let was_confirmed = match self.store.set_confirmed(&session.id, &participant, false) {
                Ok(previous) => previous,
                Err(StoreError::MemberNotFound { .. }) => false,
                Err(err) => return Err(err.into()),
            };
            if was_confirmed {
                self.emit(session.id, EventPayload::MemberUnconfirmed { participant })
                    .await;
            }
        }
        Ok(())
    }

    async fn set_confirmation(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
        confirmed: bool,
    ) -> ServiceResult<Member> {
        let (session, _) = self.require_member(session, participant)?;
        self.lifecycle.check_mutable(session.status)?;
        let previous = self
            .store
            .set_confirmed(&session.id, participant, confirmed)?;
        let (_, member) = self.require_member(&session.id, participant)?;
        if previous != confirmed {
            let participant = participant.clone();
            let payload = if confirmed {
                EventPayload::MemberConfirmed { participant }
            } else {
                EventPayload::MemberUnconfirmed { participant }
            };
            self.emit(session.id, payload).await;
        }
        Ok(member)
    }

    async fn emit_claim(
        &self,
        session: &Session,
        item: &ItemId,
        participant: &ParticipantId,
        quantity: u32,
    ) {
        self.emit(
            session.id,
            EventPayload::ClaimUpdated {
                item: *item,
                participant: participant.clone(),
                quantity,
            },
        )
        .await;
    }

    async fn emit_items_updated(&self, session: &Session) -> ServiceResult<()> {
        let item_count = self.store.items(&session.id)?.len();
        self.emit(session.id, EventPayload::ItemsUpdated { item_count })
            .await;
        Ok(())
    }

    async fn emit(&self, session: SessionId, payload: EventPayload) {
        publish_best_effort(self.notifier.as_ref(), SessionEvent::new(session, payload)).await;
    }
}

fn name_or_id(display_name: &str, participant: &ParticipantId) -> String {
    let trimmed = display_name.trim();
    if trimmed.is_empty() {
        participant.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::recognizer::{RecognizedItem, RecognizedReceipt};
    use rust_decimal_macros::dec;
    use tab_lifecycle::{ClosedClaimPolicy, LifecycleError};
    use tab_notify::{BroadcastNotifier, EventKind, NullNotifier};
    use tab_store::InMemoryLedger;

    fn service() -> TabService {
        TabService::new(Arc::new(InMemoryLedger::new()), Arc::new(NullNotifier))
    }

    fn alice() -> ParticipantId {
        "alice".into()
    }

    fn bob() -> ParticipantId {
        "bob".into()
    }

    /// Session owned by alice, joined by bob, with a single 2-unit item,
    /// already open for voting.
    async fn voting_session(svc: &TabService) -> (Session, Item) {
        let session = svc.create_session(&alice(), "Alice", None).await.unwrap();
        svc.join_session(&session.invite_token, &bob(), "Bob")
            .await
            .unwrap();
        let item = svc
            .add_item(&session.id, &alice(), ItemDraft::new("Dumplings", dec!(600), 2))
            .await
            .unwrap();
        svc.transition(&session.id, &alice(), SessionStatus::Voting)
            .await
            .unwrap();
        (session, item)
    }

    #[tokio::test]
    async fn owner_is_the_first_member() {
        let svc = service();
        let session = svc.create_session(&alice(), "  ", Some("eur")).await.unwrap();
        assert_eq!(session.currency.as_str(), "EUR");

        let view = svc.session_view(&session.id, &alice()).await.unwrap();
        assert_eq!(view.members.len(), 1);
        assert_eq!(view.members[0].display_name, "alice");
        assert_eq!(svc.sessions_for(&alice()).await.unwrap(), vec![session]);
    }

    #[tokio::test]
    async fn joining_twice_conflicts_and_unknown_invites_are_not_found() {
        let svc = service();
        let session = svc.create_session(&alice(), "Alice", None).await.unwrap();
        svc.join_session(&session.invite_token, &bob(), "Bob")
            .await
            .unwrap();

        let err = svc
            .join_session(&session.invite_token, &bob(), "Bob")
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::AlreadyJoined(bob()));

        let err = svc
            .join_session(&InviteToken::from_raw("nope"), &bob(), "Bob")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn outsiders_cannot_read_a_session() {
        let svc = service();
        let session = svc.create_session(&alice(), "Alice", None).await.unwrap();
        let err = svc.session_view(&session.id, &bob()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn claims_wait_for_voting() {
        let svc = service();
        let session = svc.create_session(&alice(), "Alice", None).await.unwrap();
        let item = svc
            .add_item(&session.id, &alice(), ItemDraft::new("Tea", dec!(100), 1))
            .await
            .unwrap();
        let err = svc
            .cycle_claim(&session.id, &alice(), &item.id)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::Lifecycle(LifecycleError::ClaimsNotOpen(SessionStatus::Created))
        );
    }

    #[tokio::test]
    async fn cycling_blocks_when_the_item_is_exhausted() {
        let svc = service();
        let (session, item) = voting_session(&svc).await;

        let first = svc.cycle_claim(&session.id, &alice(), &item.id).await.unwrap();
        let second = svc.cycle_claim(&session.id, &alice(), &item.id).await.unwrap();
        assert_eq!((first.quantity, second.quantity), (1, 2));

        let blocked = svc.cycle_claim(&session.id, &bob(), &item.id).await.unwrap();
        assert!(blocked.blocked);
        assert_eq!(blocked.quantity, 0);

        let released = svc.cycle_claim(&session.id, &alice(), &item.id).await.unwrap();
        assert_eq!(released.quantity, 0);
        assert!(!released.blocked);
    }

    #[tokio::test]
    async fn changing_claims_clears_confirmation() {
        let svc = service();
        let (session, item) = voting_session(&svc).await;

        svc.cycle_claim(&session.id, &bob(), &item.id).await.unwrap();
        assert!(svc.confirm(&session.id, &bob()).await.unwrap().confirmed);

        svc.cycle_claim(&session.id, &bob(), &item.id).await.unwrap();
        let view = svc.session_view(&session.id, &bob()).await.unwrap();
        let member = view.members.iter().find(|m| m.participant == bob()).unwrap();
        assert!(!member.confirmed);
    }

    #[tokio::test]
    async fn assign_is_owner_only_and_respects_capacity() {
        let svc = service();
        let (session, item) = voting_session(&svc).await;

        let err = svc
            .assign_claim(&session.id, &bob(), &item.id, &bob(), 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let err = svc
            .assign_claim(&session.id, &alice(), &item.id, &bob(), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::OverCapacity { available: 2, .. }));

        let update = svc
            .assign_claim(&session.id, &alice(), &item.id, &bob(), 2)
            .await
            .unwrap();
        assert_eq!(update.quantity, 2);

        let err = svc
            .assign_claim(&session.id, &alice(), &item.id, &"carol".into(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotMember { .. }));
    }

    #[tokio::test]
    async fn split_unclaimed_covers_every_member() {
        let svc = service();
        let (session, item) = voting_session(&svc).await;

        let splits = svc.split_unclaimed(&session.id, &alice()).await.unwrap();
        assert_eq!(splits.len(), 1);
        let view = svc.session_view(&session.id, &alice()).await.unwrap();
        let claims = &view.items[0].claims;
        assert_eq!(view.items[0].item.id, item.id);
        assert_eq!(claims.get(&alice()), 1);
        assert_eq!(claims.get(&bob()), 1);
        assert_eq!(view.items[0].remaining, 0);
    }

    #[tokio::test]
    async fn shares_honour_tip_overrides() {
        let svc = service();
        let (session, item) = voting_session(&svc).await;
        svc.cycle_claim(&session.id, &alice(), &item.id).await.unwrap();
        svc.cycle_claim(&session.id, &bob(), &item.id).await.unwrap();
        svc.set_session_tip(&session.id, &alice(), 10).await.unwrap();
        svc.set_tip(&session.id, &bob(), 20).await.unwrap();

        let mine = svc
            .compute_participant_share(&session.id, &bob())
            .await
            .unwrap();
        assert_eq!(mine.dishes_total, dec!(300));
        assert_eq!(mine.tip_amount, dec!(60));
        assert_eq!(mine.grand_total, dec!(360));
        assert_eq!(mine.lines.len(), 1);

        let all = svc.compute_all_shares(&session.id, &alice()).await.unwrap();
        assert_eq!(all[&alice()], dec!(330));
        assert_eq!(all[&bob()], mine.grand_total);

        let err = svc.set_tip(&session.id, &bob(), 101).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = svc.set_session_tip(&session.id, &bob(), 5).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[tokio::test]
    async fn settling_freezes_the_session() {
        let svc = service();
        let (session, item) = voting_session(&svc).await;
        svc.cycle_claim(&session.id, &bob(), &item.id).await.unwrap();

        let err = svc.settle(&session.id, &alice()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lifecycle);

        svc.transition(&session.id, &alice(), SessionStatus::Closed)
            .await
            .unwrap();
        let settled = svc
            .transition(&session.id, &alice(), SessionStatus::Settled)
            .await
            .unwrap();
        assert_eq!(settled.status, SessionStatus::Settled);
        assert!(settled.settled_at.is_some());

        let err = svc.set_tip(&session.id, &bob(), 5).await.unwrap_err();
        assert_eq!(err, ServiceError::Lifecycle(LifecycleError::Settled));
        let err = svc
            .cycle_claim(&session.id, &bob(), &item.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lifecycle);
    }

    #[tokio::test]
    async fn closed_claims_follow_the_configured_policy() {
        let svc = service().with_lifecycle(LifecycleConfig {
            closed_claims: ClosedClaimPolicy::Block,
            ..Default::default()
        });
        let (session, item) = voting_session(&svc).await;
        svc.transition(&session.id, &alice(), SessionStatus::Closed)
            .await
            .unwrap();
        let err = svc
            .cycle_claim(&session.id, &bob(), &item.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lifecycle);

        let svc = service();
        let (session, item) = voting_session(&svc).await;
        svc.transition(&session.id, &alice(), SessionStatus::Closed)
            .await
            .unwrap();
        let update = svc.cycle_claim(&session.id, &bob(), &item.id).await.unwrap();
        assert!(update.resettle_required);
    }

    #[tokio::test]
    async fn unconfirm_withdraws_a_confirmation() {
        let notifier = Arc::new(BroadcastNotifier::default());
        let svc = TabService::new(Arc::new(InMemoryLedger::new()), notifier.clone());
        let (session, _) = voting_session(&svc).await;
        let mut events = notifier.subscribe(session.id).unwrap();

        assert!(svc.confirm(&session.id, &bob()).await.unwrap().confirmed);
        let member = svc.unconfirm(&session.id, &bob()).await.unwrap();
        assert!(!member.confirmed);
        assert_eq!(member.display_name, "Bob");
        assert_eq!(events.recv().await.unwrap().kind, EventKind::MemberConfirmed);
        assert_eq!(events.recv().await.unwrap().kind, EventKind::MemberUnconfirmed);

        // Already unconfirmed: no second event.
        svc.unconfirm(&session.id, &bob()).await.unwrap();
        svc.set_session_tip(&session.id, &alice(), 5).await.unwrap();
        assert_eq!(events.recv().await.unwrap().kind, EventKind::TipChanged);
    }

    #[tokio::test]
    async fn deleting_a_claimed_item_unconfirms_its_holders() {
        let svc = service();
        let (session, item) = voting_session(&svc).await;
        svc.cycle_claim(&session.id, &bob(), &item.id).await.unwrap();
        svc.confirm(&session.id, &bob()).await.unwrap();

        svc.delete_item(&session.id, &alice(), &item.id).await.unwrap();
        let view = svc.session_view(&session.id, &bob()).await.unwrap();
        assert!(view.items.is_empty());
        assert!(view.members.iter().all(|m| !m.confirmed));

        let err = svc
            .delete_item(&session.id, &alice(), &item.id)
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::ItemNotFound(item.id));
    }

    #[tokio::test]
    async fn replacing_items_is_limited_to_pre_voting() {
        let svc = service();
        let session = svc.create_session(&alice(), "Alice", None).await.unwrap();
        let items = svc
            .replace_items(
                &session.id,
                &alice(),
                vec![
                    ItemDraft::new("Rice", dec!(80), 1),
                    ItemDraft::new("Soup", dec!(250), 2),
                ],
            )
            .await
            .unwrap();
        assert_eq!(items.len(), 2);

        let err = svc
            .replace_items(&session.id, &alice(), vec![ItemDraft::new("", dec!(1), 1)])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        svc.transition(&session.id, &alice(), SessionStatus::Voting)
            .await
            .unwrap();
        let err = svc
            .replace_items(&session.id, &alice(), Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lifecycle);

        let edited = svc
            .edit_item(&session.id, &alice(), &items[0].id, "Fried rice", dec!(95))
            .await
            .unwrap();
        assert_eq!(edited.name, "Fried rice");
        assert_eq!(edited.quantity, 1);
    }

    #[tokio::test]
    async fn remove_unclaimed_keeps_claimed_items() {
        let svc = service();
        let (session, item) = voting_session(&svc).await;
        let spare = svc
            .add_item(&session.id, &alice(), ItemDraft::new("Bread", dec!(50), 1))
            .await
            .unwrap();
        svc.cycle_claim(&session.id, &bob(), &item.id).await.unwrap();

        let removed = svc
            .remove_unclaimed_items(&session.id, &alice())
            .await
            .unwrap();
        assert_eq!(removed, vec![spare.id]);
    }

    #[tokio::test]
    async fn ingest_receipt_stores_valid_lines_and_advances() {
        let receipt = RecognizedReceipt {
            items: vec![
                RecognizedItem {
                    name: "Noodles".into(),
                    price: dec!(400),
                    quantity: 2,
                },
                RecognizedItem {
                    name: "Discount".into(),
                    price: dec!(-50),
                    quantity: 1,
                },
            ],
            total: dec!(350),
            currency: Some("jpy".into()),
        };
        let svc = service().with_recognizer(Arc::new(StaticRecognizer::new(receipt)));
        let session = svc.create_session(&alice(), "Alice", None).await.unwrap();

        let summary = svc
            .ingest_receipt(
                &session.id,
                &alice(),
                vec![ReceiptImage::new("image/png", vec![0; 4])],
            )
            .await
            .unwrap();
        assert_eq!(summary.items.len(), 1);
        assert_eq!(summary.skipped, 1);
        assert!(summary.total_mismatch);
        assert_eq!(summary.currency.as_str(), "JPY");

        let view = svc.session_view(&session.id, &alice()).await.unwrap();
        assert_eq!(view.session.status, SessionStatus::OcrDone);

        let reset = svc.reset_items(&session.id, &alice()).await.unwrap();
        assert_eq!(reset.status, SessionStatus::Created);
        assert!(svc
            .session_view(&session.id, &alice())
            .await
            .unwrap()
            .items
            .is_empty());
    }

    #[tokio::test]
    async fn recognizer_failures_surface_as_recognition_errors() {
        let svc = service();
        let session = svc.create_session(&alice(), "Alice", None).await.unwrap();
        let err = svc
            .ingest_receipt(
                &session.id,
                &alice(),
                vec![ReceiptImage::new("image/png", vec![1])],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Recognition);
    }

    #[tokio::test]
    async fn events_reach_session_subscribers() {
        let notifier = Arc::new(BroadcastNotifier::default());
        let svc = TabService::new(Arc::new(InMemoryLedger::new()), notifier.clone());
        let session = svc.create_session(&alice(), "Alice", None).await.unwrap();
        let mut events = notifier.subscribe(session.id).unwrap();

        svc.join_session(&session.invite_token, &bob(), "Bob")
            .await
            .unwrap();
        svc.set_session_tip(&session.id, &alice(), 15).await.unwrap();

        assert_eq!(events.recv().await.unwrap().kind, EventKind::MemberJoined);
        assert_eq!(events.recv().await.unwrap().kind, EventKind::TipChanged);
    }

    #[tokio::test]
    async fn concurrent_cycles_never_overclaim() {
        let svc = Arc::new(service().with_engine(EngineConfig {
            max_write_attempts: 10_000,
        }));
        let session = svc.create_session(&alice(), "Alice", None).await.unwrap();
        let guests: Vec<ParticipantId> = (0..8).map(|i| format!("guest-{i}").into()).collect();
        for guest in &guests {
            svc.join_session(&session.invite_token, guest, "")
                .await
                .unwrap();
        }
        let item = svc
            .add_item(&session.id, &alice(), ItemDraft::new("Skewers", dec!(900), 3))
            .await
            .unwrap();
        svc.transition(&session.id, &alice(), SessionStatus::Voting)
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for guest in guests {
            let svc = svc.clone();
            let session = session.id;
            let item = item.id;
            tasks.push(tokio::spawn(async move {
                svc.cycle_claim(&session, &guest, &item).await.unwrap()
            }));
        }
        let mut granted = 0;
        for task in tasks {
            if !task.await.unwrap().blocked {
                granted += 1;
            }
        }
        assert_eq!(granted, 3);

        let view = svc.session_view(&session.id, &alice()).await.unwrap();
        assert_eq!(view.items[0].claims.total(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn tip_change_racing_settle_never_reopens_the_session() {
        let svc = Arc::new(service());
        for _ in 0..200 {
            let (session, item) = voting_session(&svc).await;
            svc.cycle_claim(&session.id, &bob(), &item.id).await.unwrap();
            svc.transition(&session.id, &alice(), SessionStatus::Closed)
                .await
                .unwrap();

            let id = session.id;
            let settler = {
                let svc = svc.clone();
                tokio::spawn(async move { svc.settle(&id, &alice()).await })
            };
            let tipper = {
                let svc = svc.clone();
                tokio::spawn(async move { svc.set_session_tip(&id, &alice(), 25).await })
            };
            let report = settler.await.unwrap().unwrap();
            match tipper.await.unwrap() {
                Ok(tipped) => assert_eq!(tipped.status, SessionStatus::Closed),
                Err(err) => assert_eq!(err, ServiceError::Lifecycle(LifecycleError::Settled)),
            }

            let stored = svc.session(&session.id, &alice()).await.unwrap();
            assert_eq!(stored.status, SessionStatus::Settled);
            assert!(stored.settled_at.is_some());
            assert_eq!(report.shares.len(), 1);
            assert_eq!(report.shares[0].tip_percent, stored.tip_percent);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn tip_change_racing_a_claim_keeps_confirmation_cleared() {
        let svc = Arc::new(service());
        let (session, item) = voting_session(&svc).await;
        for round in 0..200u32 {
            svc.assign_claim(&session.id, &alice(), &item.id, &bob(), 1 + round % 2)
                .await
                .unwrap();
            svc.confirm(&session.id, &bob()).await.unwrap();

            let tipper = {
                let svc = svc.clone();
                let id = session.id;
                tokio::spawn(async move { svc.set_tip(&id, &bob(), 15).await })
            };
            let claimer = {
                let svc = svc.clone();
                let (id, item) = (session.id, item.id);
                tokio::spawn(async move {
                    svc.assign_claim(&id, &alice(), &item, &bob(), 2 - round % 2)
                        .await
                })
            };
            tipper.await.unwrap().unwrap();
            claimer.await.unwrap().unwrap();

            let member = svc.member(&session.id, &bob()).await.unwrap();
            assert!(!member.confirmed, "round {round} left a stale confirmation");
        }
    }

    #[tokio::test]
    async fn settlement_is_taken_after_the_status_change() {
        let notifier = Arc::new(BroadcastNotifier::default());
        let svc = TabService::new(Arc::new(InMemoryLedger::new()), notifier.clone());
        let (session, item) = voting_session(&svc).await;
        svc.cycle_claim(&session.id, &bob(), &item.id).await.unwrap();
        svc.transition(&session.id, &alice(), SessionStatus::Closed)
            .await
            .unwrap();
        let mut events = notifier.subscribe(session.id).unwrap();

        let report = svc.settle(&session.id, &alice()).await.unwrap();
        assert_eq!(report.grand_total, dec!(300));
        assert_eq!(events.recv().await.unwrap().kind, EventKind::StatusChanged);
        assert_eq!(events.recv().await.unwrap().kind, EventKind::Settled);

        let err = svc.settle(&session.id, &alice()).await.unwrap_err();
        assert_eq!(err, ServiceError::Lifecycle(LifecycleError::Settled));
        let err = svc.set_currency(&session.id, &alice(), "EUR").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Lifecycle);
    }

    #[tokio::test]
    async fn prices_past_the_ceiling_are_rejected() {
        let svc = service();
        let (session, item) = voting_session(&svc).await;

        let err = svc
            .add_item(&session.id, &alice(), ItemDraft::new("Gold", Decimal::MAX, 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = svc
            .edit_item(&session.id, &alice(), &item.id, "Gold", Decimal::MAX)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = svc
            .add_item(
                &session.id,
                &alice(),
                ItemDraft::new("Rice", dec!(1), tab_types::MAX_ITEM_QUANTITY + 1),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn largest_allowed_bill_settles_without_overflow() {
        let svc = service();
        let session = svc.create_session(&alice(), "Alice", None).await.unwrap();
        let mut items = Vec::new();
        for name in ["Caviar", "Truffle", "Saffron"] {
            items.push(
                svc.add_item(
                    &session.id,
                    &alice(),
                    ItemDraft::new(name, tab_types::MAX_ITEM_PRICE, tab_types::MAX_ITEM_QUANTITY),
                )
                .await
                .unwrap(),
            );
        }
        svc.set_session_tip(&session.id, &alice(), 100).await.unwrap();
        svc.transition(&session.id, &alice(), SessionStatus::Voting)
            .await
            .unwrap();
        for item in &items {
            svc.assign_claim(&session.id, &alice(), &item.id, &alice(), tab_types::MAX_ITEM_QUANTITY)
                .await
                .unwrap();
        }
        svc.transition(&session.id, &alice(), SessionStatus::Closed)
            .await
            .unwrap();

        let report = svc.settle(&session.id, &alice()).await.unwrap();
        assert_eq!(report.grand_total, tab_types::MAX_ITEM_PRICE * dec!(6));
    }
}
