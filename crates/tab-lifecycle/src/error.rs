use tab_types::SessionStatus;

/// Errors raised when an operation does not fit the session's phase.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("only the session owner may change its status")]
    NotOwner,

    #[error("cannot move a session from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("session is settled; nothing can change")]
    Settled,

    #[error("claims are not accepted while the session is {0}")]
    ClaimsNotOpen(SessionStatus),

    #[error("claims are frozen while the session is {0}")]
    ClaimsFrozen(SessionStatus),

    #[error("items cannot be changed this way while the session is {0}")]
    ItemsLocked(SessionStatus),
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;
