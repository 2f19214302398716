use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use tab_types::ParticipantId;

use crate::error::ServerError;

pub const PARTICIPANT_HEADER: &str = "x-participant-id";
pub const DISPLAY_NAME_HEADER: &str = "x-display-name";

/// The calling participant, as asserted by the identity layer in front of
/// this server. Trusted verbatim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub participant: ParticipantId,
    /// Empty when the header is absent.
    pub display_name: String,
}

impl Caller {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ServerError> {
        let raw = headers
            .get(PARTICIPANT_HEADER)
            .ok_or_else(|| ServerError::Unauthenticated(format!("{PARTICIPANT_HEADER} missing")))?
            .to_str()
            .map_err(|_| ServerError::Unauthenticated(format!("{PARTICIPANT_HEADER} not ASCII")))?;
        let participant = ParticipantId::parse(raw)
            .map_err(|e| ServerError::Unauthenticated(e.to_string()))?;
        let display_name = headers
            .get(DISPLAY_NAME_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Ok(Self {
            participant,
            display_name,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}
