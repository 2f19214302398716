use serde::{Deserialize, Serialize};

/// What to do with claim changes while a session is `closed`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClosedClaimPolicy {
    /// Accept silently.
    Allow,
    /// Accept, log a warning and flag the change so the owner re-settles.
    #[default]
    Warn,
    /// Reject with [`LifecycleError::ClaimsFrozen`](crate::LifecycleError).
    Block,
}

/// Configuration for the session lifecycle.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub closed_claims: ClosedClaimPolicy,
    /// Accept claims in `created` / `ocr_done`, before voting opens.
    pub claims_before_voting: bool,
}

impl LifecycleConfig {
    /// The strictest configuration: claims only while voting.
    pub fn strict() -> Self {
        Self {
            closed_claims: ClosedClaimPolicy::Block,
            claims_before_voting: false,
        }
    }
}
