use serde::Serialize;

/// Decision taken by one cycling step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleStep {
    /// The participant already holds every unit; drop to zero.
    Release,
    /// No free capacity is left; keep the current quantity.
    Blocked,
    /// Take one more unit.
    Increment,
}

impl CycleStep {
    /// The participant's quantity after applying this step to `own`.
    pub fn apply(self, own: u32) -> u32 {
        match self {
            Self::Release => 0,
            Self::Blocked => own,
            Self::Increment => own + 1,
        }
    }
}

/// Decide the next step for a participant holding `own` units of an item
/// whose claims total `total` out of `max`.
///
/// Releasing is checked first and never blocks, since it only frees
/// capacity.
pub fn cycle_step(own: u32, total: u64, max: u32) -> CycleStep {
    if own >= max {
        CycleStep::Release
    } else if total >= u64::from(max) {
        CycleStep::Blocked
    } else {
        CycleStep::Increment
    }
}

/// Result of [`ClaimEngine::cycle_claim`](crate::ClaimEngine::cycle_claim).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CycleOutcome {
    /// The caller's claimed quantity after the call.
    pub quantity: u32,
    /// `true` when the item had no free unit to take.
    pub blocked: bool,
    /// `true` when the change cleared the caller's confirmation.
    pub confirmation_cleared: bool,
}

impl CycleOutcome {
    pub fn blocked(quantity: u32) -> Self {
        Self {
            quantity,
            blocked: true,
            confirmation_cleared: false,
        }
    }
}
