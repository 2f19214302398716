use tab_store::StoreError;
use tab_types::{ItemId, SessionId};

/// Errors produced by claim operations.
///
/// Hitting an item's capacity while cycling is not an error; it is reported
/// through [`CycleOutcome::blocked`](crate::CycleOutcome).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimError {
    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("cannot claim {requested} units of item {item}: only {available} available")]
    OverCapacity {
        item: ItemId,
        requested: u32,
        available: u32,
    },

    #[error("session {0} is settled")]
    SessionSettled(SessionId),

    #[error("item {item} stayed contended after {attempts} write attempts")]
    Contention { item: ItemId, attempts: u32 },

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ClaimError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ItemNotFound(id) => Self::ItemNotFound(id),
            StoreError::SessionNotFound(id) => Self::SessionNotFound(id),
            StoreError::SessionSettled(id) => Self::SessionSettled(id),
            other => Self::Store(other),
        }
    }
}

pub type ClaimResult<T> = Result<T, ClaimError>;
