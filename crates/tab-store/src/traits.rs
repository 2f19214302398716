use tab_types::{
    InviteToken, Item, ItemClaims, ItemId, Member, ParticipantId, Session, SessionId,
    SessionStatus, TipPercent,
};

use crate::error::StoreResult;
use crate::snapshot::{ClaimSheet, ClaimWrite, LedgerSnapshot, SessionPatch};

/// Storage boundary for TabSplit records.
///
/// Implementations must be thread-safe and must honour these contracts:
/// - `claim_sheet` and `write_claims` for one item are linearizable: a
///   `write_claims` succeeds only if no other write to that item committed
///   since the sheet at `expected_version` was read.
/// - `write_claims` rejects any claim set whose total exceeds the item's
///   quantity with [`StoreError::CapacityViolation`](crate::StoreError).
/// - Claims on different items never contend with one another.
/// - Once a session is settled, every write touching it (members, items,
///   claims, the session itself) fails with
///   [`StoreError::SessionSettled`](crate::StoreError).
pub trait LedgerStore: Send + Sync {
    // ---- Sessions ----

    /// Insert a new session. Fails if its id or invite token is taken.
    fn insert_session(&self, session: Session) -> StoreResult<()>;

    fn session(&self, id: &SessionId) -> StoreResult<Option<Session>>;

    fn session_by_invite(&self, token: &InviteToken) -> StoreResult<Option<Session>>;

    /// Apply `patch` if the session is still in `expected` status, under
    /// the same lock that orders every other write. Returns the patched
    /// session, or [`StoreError::StatusChanged`](crate::StoreError) when the
    /// status moved since the caller read it.
    fn patch_session(
        &self,
        id: &SessionId,
        expected: SessionStatus,
        patch: SessionPatch,
    ) -> StoreResult<Session>;

    /// Sessions the participant belongs to, newest first.
    fn sessions_for_participant(&self, participant: &ParticipantId) -> StoreResult<Vec<Session>>;

    // ---- Members ----

    /// Register a member. Fails if the participant already joined.
    fn insert_member(&self, member: Member) -> StoreResult<()>;

    fn member(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
    ) -> StoreResult<Option<Member>>;

    /// Members in join order.
    fn members(&self, session: &SessionId) -> StoreResult<Vec<Member>>;

    /// Set or clear a member's personal tip. Leaves every other field,
    /// including the confirmation flag, as stored.
    fn set_member_tip(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
        tip: Option<TipPercent>,
    ) -> StoreResult<Member>;

    /// Set the confirmation flag. Returns the previous value.
    fn set_confirmed(
        &self,
        session: &SessionId,
        participant: &ParticipantId,
        confirmed: bool,
    ) -> StoreResult<bool>;

    // ---- Items ----

    fn insert_item(&self, item: Item) -> StoreResult<()>;

    fn item(&self, id: &ItemId) -> StoreResult<Option<Item>>;

    /// Items in creation order.
    fn items(&self, session: &SessionId) -> StoreResult<Vec<Item>>;

    /// Overwrite an item's name and price.
    fn update_item(&self, item: &Item) -> StoreResult<()>;

    /// Remove an item and its claims. Returns the claims it held at the
    /// moment of removal, or `None` if there was no such item.
    fn remove_item(&self, id: &ItemId) -> StoreResult<Option<ItemClaims>>;

    /// Remove every item of the session. Returns the claims each removed
    /// item held, in item order.
    fn clear_items(&self, session: &SessionId) -> StoreResult<Vec<ItemClaims>>;

    /// Remove the session's items that hold no claims, atomically per item.
    fn remove_unclaimed_items(&self, session: &SessionId) -> StoreResult<Vec<ItemId>>;

    // ---- Claims ----

    /// Consistent read of one item's claims.
    fn claim_sheet(&self, item: &ItemId) -> StoreResult<ClaimSheet>;

    /// Compare-and-write the item's full claim set.
    fn write_claims(
        &self,
        item: &ItemId,
        expected_version: u64,
        claims: ItemClaims,
    ) -> StoreResult<ClaimWrite>;

    // ---- Snapshots ----

    /// Session, members and items with claims, for settlement.
    fn snapshot(&self, session: &SessionId) -> StoreResult<LedgerSnapshot>;
}
