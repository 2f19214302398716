/// Errors produced while publishing events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

pub type NotifyResult<T> = Result<T, NotifyError>;
