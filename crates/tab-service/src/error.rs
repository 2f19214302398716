use serde::Serialize;
use tab_engine::ClaimError;
use tab_lifecycle::LifecycleError;
use tab_store::StoreError;
use tab_types::{ItemId, ParticipantId, SessionId, TypeError};

use crate::recognizer::RecognitionError;

/// Caller-facing classification of a [`ServiceError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    Conflict,
    Validation,
    /// The operation does not fit the session's current phase.
    Lifecycle,
    /// The receipt recognizer failed.
    Recognition,
    Internal,
}

/// Errors returned by [`TabService`](crate::TabService).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("no session for invite {0}")]
    InviteNotFound(String),

    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    #[error("{participant} is not a member of session {session}")]
    NotMember {
        session: SessionId,
        participant: ParticipantId,
    },

    #[error("only the session owner may {0}")]
    NotOwner(&'static str),

    #[error("{0} already joined this session")]
    AlreadyJoined(ParticipantId),

    #[error("invalid input: {0}")]
    Invalid(#[from] TypeError),

    #[error("{0}")]
    Validation(String),

    #[error("cannot claim {requested} units of item {item}: only {available} available")]
    OverCapacity {
        item: ItemId,
        requested: u32,
        available: u32,
    },

    #[error("item {0} is too contended, try again")]
    Contention(ItemId),

    #[error("session {0} kept changing status, try again")]
    SessionContention(SessionId),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("receipt recognition failed: {0}")]
    Recognition(#[from] RecognitionError),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SessionNotFound(_) | Self::InviteNotFound(_) | Self::ItemNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::NotMember { .. } | Self::NotOwner(_) => ErrorKind::Forbidden,
            Self::Lifecycle(LifecycleError::NotOwner) => ErrorKind::Forbidden,
            Self::Lifecycle(_) => ErrorKind::Lifecycle,
            Self::AlreadyJoined(_)
            | Self::OverCapacity { .. }
            | Self::Contention(_)
            | Self::SessionContention(_) => ErrorKind::Conflict,
            Self::Invalid(_) | Self::Validation(_) => ErrorKind::Validation,
            Self::Recognition(_) => ErrorKind::Recognition,
            Self::Store(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SessionNotFound(id) => Self::SessionNotFound(id),
            StoreError::ItemNotFound(id) => Self::ItemNotFound(id),
            StoreError::MemberNotFound {
                session,
                participant,
            } => Self::NotMember {
                session,
                participant,
            },
            StoreError::DuplicateMember { participant, .. } => Self::AlreadyJoined(participant),
            StoreError::SessionSettled(_) => Self::Lifecycle(LifecycleError::Settled),
            other => Self::Store(other),
        }
    }
}

impl From<ClaimError> for ServiceError {
    fn from(err: ClaimError) -> Self {
        match err {
            ClaimError::ItemNotFound(id) => Self::ItemNotFound(id),
            ClaimError::SessionNotFound(id) => Self::SessionNotFound(id),
            ClaimError::OverCapacity {
                item,
                requested,
                available,
            } => Self::OverCapacity {
                item,
                requested,
                available,
            },
            ClaimError::Contention { item, .. } => Self::Contention(item),
            ClaimError::SessionSettled(_) => Self::Lifecycle(LifecycleError::Settled),
            ClaimError::Store(err) => err.into(),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tab_types::SessionStatus;

    #[test]
    fn kinds_cover_caller_categories() {
        let session = SessionId::new();
        assert_eq!(ServiceError::SessionNotFound(session).kind(), ErrorKind::NotFound);
        assert_eq!(ServiceError::NotOwner("close voting").kind(), ErrorKind::Forbidden);
        assert_eq!(
            ServiceError::AlreadyJoined("p".into()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            ServiceError::Invalid(TypeError::InvalidTipPercent(150)).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            ServiceError::from(LifecycleError::ClaimsFrozen(SessionStatus::Closed)).kind(),
            ErrorKind::Lifecycle
        );
        assert_eq!(
            ServiceError::from(LifecycleError::NotOwner).kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(
            ServiceError::from(RecognitionError::new("timeout")).kind(),
            ErrorKind::Recognition
        );
    }

    #[test]
    fn store_errors_keep_their_meaning() {
        let session = SessionId::new();
        let err: ServiceError = StoreError::DuplicateMember {
            session,
            participant: "p".into(),
        }
        .into();
        assert_eq!(err, ServiceError::AlreadyJoined("p".into()));

        let err: ServiceError = StoreError::LockPoisoned("x".into()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);

        let err: ServiceError = StoreError::SessionSettled(session).into();
        assert_eq!(err, ServiceError::Lifecycle(LifecycleError::Settled));
        assert_eq!(err.kind(), ErrorKind::Lifecycle);
    }
}
