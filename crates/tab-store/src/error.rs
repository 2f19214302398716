use tab_types::{ItemId, ParticipantId, SessionId, SessionStatus};

/// Errors produced by ledger store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("participant {participant} is not a member of session {session}")]
    MemberNotFound {
        session: SessionId,
        participant: ParticipantId,
    },

    #[error("participant {participant} already joined session {session}")]
    DuplicateMember {
        session: SessionId,
        participant: ParticipantId,
    },

    #[error("session already exists: {0}")]
    DuplicateSession(SessionId),

    #[error("invite token already in use: {0}")]
    DuplicateInvite(String),

    #[error("claims on item {item} would total {requested}, above its quantity {capacity}")]
    CapacityViolation {
        item: ItemId,
        capacity: u32,
        requested: u64,
    },

    /// A guarded session write found the session in another status.
    #[error("session {session} is {actual}, expected {expected}")]
    StatusChanged {
        session: SessionId,
        expected: SessionStatus,
        actual: SessionStatus,
    },

    #[error("session {0} is settled")]
    SessionSettled(SessionId),

    #[error("store lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
