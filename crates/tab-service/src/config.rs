use serde::{Deserialize, Serialize};
use tab_types::CurrencyCode;

/// Service-level settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Currency tag for sessions created without one.
    pub default_currency: CurrencyCode,
    /// Length of generated invite tokens.
    pub invite_token_len: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_currency: CurrencyCode::default(),
            invite_token_len: 8,
        }
    }
}
