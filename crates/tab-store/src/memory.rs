use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tab_types::{
    InviteToken, Item, ItemClaims, ItemId, Member, ParticipantId, Session, SessionId,
    SessionStatus, TipPercent,
};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::snapshot::{ClaimSheet, ClaimWrite, ItemSnapshot, LedgerSnapshot, SessionPatch};
use crate::traits::LedgerStore;

/// In-memory ledger for tests, local demos, and single-instance serving.
///
/// State is process-scoped: it is lost on drop and is not shared between
/// service instances. Record tables sit behind one `RwLock`; each item's
/// claims sit behind their own `Mutex`, so claim traffic on different
/// items never contends.
///
/// Lock order is always `records` → `cells` → a single cell. Claim writes
/// hold a `records` read guard while they commit, so a status change
/// (which needs the write guard) cannot interleave with one.
pub struct InMemoryLedger {
    records: RwLock<Records>,
    cells: RwLock<HashMap<ItemId, Arc<Mutex<ClaimCell>>>>,
}

#[derive(Default)]
struct Records {
    sessions: HashMap<SessionId, Session>,
    invites: HashMap<InviteToken, SessionId>,
    members: HashMap<SessionId, Vec<Member>>,
    items: HashMap<ItemId, Item>,
    session_items: HashMap<SessionId, Vec<ItemId>>,
}

impl Records {
    /// Fails unless the session exists and is not settled.
    fn writable(&self, session: &SessionId) -> StoreResult<()> {
        match self.sessions.get(session) {
            None => Err(StoreError::SessionNotFound(*session)),
            Some(stored) if stored.status.is_terminal() => {
                Err(StoreError::SessionSettled(*session))
            }
            Some(_) => Ok(()),
        }
    }

    /// Like [`Records::writable`], for the session owning `item`.
    fn item_writable(&self, item: &ItemId) -> StoreResult<()> {
        let stored = self.items.get(item).ok_or(StoreError::ItemNotFound(*item))?;
        self.writable(&stored.session_id)
    }

    fn member_mut(
        &mut self,
        session: &SessionId,
        participant: &ParticipantId,
    ) -> StoreResult<&mut Member> {
        self.members
            .get_mut(session)
            .and_then(|members| members.iter_mut().find(|m| &m.participant == participant))
            .ok_or_else(|| StoreError::MemberNotFound {
                session: *session,
                participant: participant.clone(),
            })
    }
}

struct ClaimCell {
    sheet: ClaimSheet,
    removed: bool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Records::default()),
            cells: RwLock::new(HashMap::new()),
        }
    }

    fn read_records(&self) -> StoreResult<RwLockReadGuard<'_, Records>> {
        self.records
            .read()
            .map_err(|_| StoreError::LockPoisoned("ledger read lock poisoned".into()))
    }

    fn write_records(&self) -> StoreResult<RwLockWriteGuard<'_, Records>> {
        self.records
            .write()
            .map_err(|_| StoreError::LockPoisoned("ledger write lock poisoned".into()))
    }

    fn cell(&self, item: &ItemId) -> StoreResult<Arc<Mutex<ClaimCell>>> {
        let cells = self
            .cells
            .read()
            .map_err(|_| StoreError::LockPoisoned("claim index lock poisoned".into()))?;
        cells
            .get(item)
            .cloned()
            .ok_or(StoreError::ItemNotFound(*item))
    }

    fn lock_cell(cell: &Mutex<ClaimCell>) -> StoreResult<MutexGuard<'_, ClaimCell>> {
        cell.lock()
            .map_err(|_| StoreError::LockPoisoned("claim cell lock poisoned".into()))
    }

    /// Detach an item's claim cell, marking it removed for any writer that
    /// already holds a handle to it, and hand back the claims it held.
    /// Caller holds the records write lock.
    fn drop_cell(&self, item: &ItemId) -> StoreResult<ItemClaims> {
        let removed = self
            .cells
            .write()
            .map_err(|_| StoreError::LockPoisoned("claim index lock poisoned".into()))?
            .remove(item);
        let Some(cell) = removed else {
            return Ok(ItemClaims::new());
        };
        let mut guard = Self::lock_cell(&cell)?;
        guard.removed = true;
        Ok(std::mem::take(&mut guard.sheet.claims))
    }

    fn remove_item_locked(
        &self,
        records: &mut Records,
        id: &ItemId,
    ) -> StoreResult<Option<ItemClaims>> {
        let Some(item) = records.items.remove(id) else {
            return Ok(None);
        };
        if let Some(ids) = records.session_items.get_mut(&item.session_id) {
            ids.retain(|candidate| candidate != id);
        }
        self.drop_cell(id).map(Some)
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore for InMemoryLedger {
    fn insert_session(&self, session: Session) -> StoreResult<()> {
        let mut records = self.write_records()?;
        if records.sessions.contains_key(&session.id) {
            return Err(StoreError::DuplicateSession(session.id));
        }
        if records.invites.contains_key(&session.invite_token) {
            return Err(StoreError::DuplicateInvite(session.invite_token.to_string()));
        }
        records
            .invites
            .insert(session.invite_token.clone(), session.id);
        records.members.entry(session.id).or_default();
        records.session_items.entry(session.id).or_default();
        records.sessions.insert(session.id, session);
        Ok(())
    }

    fn session(&self, id: &SessionId) -> StoreResult<Option<Session>> {
        Ok(self.read_records()?.sessions.get(id).cloned())
    }

    fn session_by_invite(&self, token: &InviteToken) -> StoreResult<Option<Session>> {
        let records = self.read_records()?;
        Ok(records
            .invites
            .get(token)
            .and_then(|id| records.sessions.get(id))
            .cloned())
    }

    fn patch_session(
        &self,
        id: &SessionId,
        expected: SessionStatus,
        patch: SessionPatch,
    ) -> StoreResult<Session> {
        let mut records = self.write_records()?;
        let stored = records
            .sessions
            .get_mut(id)
            .ok_or(StoreError::SessionNotFound(*id))?;
        if stored.status != expected {
            return Err(StoreError::StatusChanged {
                session: *id,
                expected,
                actual: stored.status,
            });
        }
        if stored.status.is_terminal() {
            return Err(StoreError::SessionSettled(*id));
        }
        patch.apply(stored);
        debug!(session = %id, status = %stored.status, "patched session");
        Ok(stored.clone())
    }

    fn sessions_for_participant(&self, participant: &ParticipantId) -> StoreResult<Vec<Session>> {
        let records = self.read_records()?;
        let mut sessions: Vec<Session> = records
            .members
            .iter()
            .filter(|(_, members)| members.iter().any(|m| &m.participant == participant))
            .filter_map(|(id, _)| records.sessions.get(id).cloned())
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(sessions)
    }

    fn insert_member(&self, member: Member) -> StoreResult<()> {
        let mut records = self.write_records()?;
        records.writable(&member.session_id)?;
        let members = records.members.entry(member.session_id).or_default();
        if members.iter().any(|m| m.participant == member.participant) {
            return Err(StoreError::DuplicateMember {
                session: member.session_id,
                participant: member.participant,
            });
        }
        members.push(member);
        Ok(())
    }

    fn member(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
    ) -> StoreResult<Option<Member>> {
        let records = self.read_records()?;
        Ok(records
            .members
            .get(session)
            .and_then(|members| members.iter().find(|m| &m.participant == participant))
            .cloned())
    }

    fn members(&self, session: &SessionId) -> StoreResult<Vec<Member>> {
        let records = self.read_records()?;
        records
            .members
            .get(session)
            .cloned()
            .ok_or(StoreError::SessionNotFound(*session))
    }

    fn set_member_tip(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
        tip: Option<TipPercent>,
    ) -> StoreResult<Member> {
        let mut records = self.write_records()?;
        records.writable(session)?;
        let member = records.member_mut(session, participant)?;
        member.tip_percent = tip;
        Ok(member.clone())
    }

    fn set_confirmed(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
        confirmed: bool,
    ) -> StoreResult<bool> {
        let mut records = self.write_records()?;
        records.writable(session)?;
        let member = records.member_mut(session, participant)?;
        let previous = member.confirmed;
        member.confirmed = confirmed;
        Ok(previous)
    }

    fn insert_item(&self, item: Item) -> StoreResult<()> {
        let mut records = self.write_records()?;
        records.writable(&item.session_id)?;
        let cell = ClaimCell {
            sheet: ClaimSheet::new(item.id, item.quantity),
            removed: false,
        };
        self.cells
            .write()
            .map_err(|_| StoreError::LockPoisoned("claim index lock poisoned".into()))?
            .insert(item.id, Arc::new(Mutex::new(cell)));
        records
            .session_items
            .entry(item.session_id)
            .or_default()
            .push(item.id);
        records.items.insert(item.id, item);
        Ok(())
    }

    fn item(&self, id: &ItemId) -> StoreResult<Option<Item>> {
        Ok(self.read_records()?.items.get(id).cloned())
    }

    fn items(&self, session: &SessionId) -> StoreResult<Vec<Item>> {
        let records = self.read_records()?;
        let ids = records
            .session_items
            .get(session)
            .ok_or(StoreError::SessionNotFound(*session))?;
        Ok(ids
            .iter()
            .filter_map(|id| records.items.get(id).cloned())
            .collect())
    }

    fn update_item(&self, item: &Item) -> StoreResult<()> {
        let mut records = self.write_records()?;
        records.item_writable(&item.id)?;
        let stored = records
            .items
            .get_mut(&item.id)
            .ok_or(StoreError::ItemNotFound(item.id))?;
        stored.name = item.name.clone();
        stored.price = item.price;
        Ok(())
    }

    fn remove_item(&self, id: &ItemId) -> StoreResult<Option<ItemClaims>> {
        let mut records = self.write_records()?;
        if !records.items.contains_key(id) {
            return Ok(None);
        }
        records.item_writable(id)?;
        self.remove_item_locked(&mut records, id)
    }

    fn clear_items(&self, session: &SessionId) -> StoreResult<Vec<ItemClaims>> {
        let mut records = self.write_records()?;
        records.writable(session)?;
        let ids = records
            .session_items
            .get(session)
            .cloned()
            .unwrap_or_default();
        let mut removed = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(claims) = self.remove_item_locked(&mut records, id)? {
                removed.push(claims);
            }
        }
        debug!(session = %session, removed = removed.len(), "cleared items");
        Ok(removed)
    }

    fn remove_unclaimed_items(&self, session: &SessionId) -> StoreResult<Vec<ItemId>> {
        let mut records = self.write_records()?;
        records.writable(session)?;
        let ids = records
            .session_items
            .get(session)
            .cloned()
            .ok_or(StoreError::SessionNotFound(*session))?;

        let mut removed = Vec::new();
        for id in ids {
            let cell = self.cell(&id)?;
            // Hold the cell while removing so no claim can land in between.
            let mut guard = Self::lock_cell(&cell)?;
            if !guard.sheet.claims.is_empty() {
                continue;
            }
            guard.removed = true;
            drop(guard);
            self.remove_item_locked(&mut records, &id)?;
            removed.push(id);
        }
        Ok(removed)
    }

    fn claim_sheet(&self, item: &ItemId) -> StoreResult<ClaimSheet> {
        let cell = self.cell(item)?;
        let guard = Self::lock_cell(&cell)?;
        if guard.removed {
            return Err(StoreError::ItemNotFound(*item));
        }
        Ok(guard.sheet.clone())
    }

    fn write_claims(
        &self,
        item: &ItemId,
        expected_version: u64,
        claims: ItemClaims,
    ) -> StoreResult<ClaimWrite> {
        let records = self.read_records()?;
        records.item_writable(item)?;
        let cell = self.cell(item)?;
        let mut guard = Self::lock_cell(&cell)?;
        if guard.removed {
            return Err(StoreError::ItemNotFound(*item));
        }
        if guard.sheet.version != expected_version {
            return Ok(ClaimWrite::Stale {
                current_version: guard.sheet.version,
            });
        }
        let requested = claims.total();
        if requested > u64::from(guard.sheet.capacity) {
            return Err(StoreError::CapacityViolation {
                item: *item,
                capacity: guard.sheet.capacity,
                requested,
            });
        }
        guard.sheet.claims = claims;
        guard.sheet.version += 1;
        Ok(ClaimWrite::Committed {
            version: guard.sheet.version,
        })
    }

    fn snapshot(&self, session: &SessionId) -> StoreResult<LedgerSnapshot> {
        let records = self.read_records()?;
        let stored = records
            .sessions
            .get(session)
            .cloned()
            .ok_or(StoreError::SessionNotFound(*session))?;
        let members = records.members.get(session).cloned().unwrap_or_default();

        let mut items = Vec::new();
        for id in records.session_items.get(session).into_iter().flatten() {
            let Some(item) = records.items.get(id) else {
                continue;
            };
            let cell = self.cell(id)?;
            let claims = Self::lock_cell(&cell)?.sheet.claims.clone();
            items.push(ItemSnapshot {
                item: item.clone(),
                claims,
            });
        }

        Ok(LedgerSnapshot {
            session: stored,
            members,
            items,
        })
    }
}
