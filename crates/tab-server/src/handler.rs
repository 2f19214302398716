use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tab_service::{
    ClaimUpdate, MyShare, ReceiptImage, RecognitionSummary, ServiceError, SessionView,
};
use tab_types::{InviteToken, Item, ItemDraft, ItemId, Member, ParticipantId, Session, SessionId, SessionStatus};
use tokio::sync::broadcast::error::RecvError;

use crate::auth::Caller;
use crate::error::{ServerError, ServerResult};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateSessionRequest {
    pub display_name: Option<String>,
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceItemsRequest {
    pub items: Vec<ItemDraft>,
}

#[derive(Debug, Deserialize)]
pub struct EditItemRequest {
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct AssignClaimRequest {
    pub participant: ParticipantId,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct TipRequest {
    pub tip_percent: i64,
}

#[derive(Debug, Deserialize)]
pub struct CurrencyRequest {
    pub currency: String,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: SessionStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EventPollQuery {
    pub timeout_ms: Option<u64>,
}

pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "name": "tab-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ---- Sessions ----

pub async fn create_session(
    State(state): State<AppState>,
    caller: Caller,
    Json(req): Json<CreateSessionRequest>,
) -> ServerResult<(StatusCode, Json<Session>)> {
    let name = req.display_name.unwrap_or(caller.display_name);
    let session = state
        .service
        .create_session(&caller.participant, &name, req.currency.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn my_sessions(
    State(state): State<AppState>,
    caller: Caller,
) -> ServerResult<Json<Vec<Session>>> {
    Ok(Json(state.service.sessions_for(&caller.participant).await?))
}

pub async fn get_session(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<SessionId>,
) -> ServerResult<Json<SessionView>> {
    Ok(Json(state.service.session_view(&id, &caller.participant).await?))
}

pub async fn join_session(
    State(state): State<AppState>,
    caller: Caller,
    Path(token): Path<String>,
) -> ServerResult<Json<Session>> {
    let session = state
        .service
        .join_session(
            &InviteToken::from_raw(token),
            &caller.participant,
            &caller.display_name,
        )
        .await?;
    Ok(Json(session))
}

// ---- Items ----

pub async fn replace_items(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<SessionId>,
    Json(req): Json<ReplaceItemsRequest>,
) -> ServerResult<Json<Vec<Item>>> {
    let items = state
        .service
        .replace_items(&id, &caller.participant, req.items)
        .await?;
    Ok(Json(items))
}

pub async fn add_item(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<SessionId>,
    Json(draft): Json<ItemDraft>,
) -> ServerResult<(StatusCode, Json<Item>)> {
    let item = state.service.add_item(&id, &caller.participant, draft).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn edit_item(
    State(state): State<AppState>,
    caller: Caller,
    Path((id, item)): Path<(SessionId, ItemId)>,
    Json(req): Json<EditItemRequest>,
) -> ServerResult<Json<Item>> {
    let item = state
        .service
        .edit_item(&id, &caller.participant, &item, &req.name, req.price)
        .await?;
    Ok(Json(item))
}

pub async fn delete_item(
    State(state): State<AppState>,
    caller: Caller,
    Path((id, item)): Path<(SessionId, ItemId)>,
) -> ServerResult<StatusCode> {
    state
        .service
        .delete_item(&id, &caller.participant, &item)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_unclaimed(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<SessionId>,
) -> ServerResult<Json<serde_json::Value>> {
    let removed = state
        .service
        .remove_unclaimed_items(&id, &caller.participant)
        .await?;
    Ok(Json(json!({ "removed": removed })))
}

pub async fn reset_items(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<SessionId>,
) -> ServerResult<Json<Session>> {
    Ok(Json(state.service.reset_items(&id, &caller.participant).await?))
}

// ---- Receipt photos ----

/// Stage one receipt photo from the raw request body.
pub async fn upload_photo(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<SessionId>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<(StatusCode, Json<serde_json::Value>)> {
    let session = state.service.session(&id, &caller.participant).await?;
    if !session.is_owner(&caller.participant) {
        return Err(ServiceError::NotOwner("upload a receipt").into());
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");
    let staged = state
        .photos
        .stage(id, ReceiptImage::new(content_type, body.to_vec()))?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "staged": staged }))))
}

/// Recognize every staged photo and store the result as the session's items.
pub async fn recognize_receipt(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<SessionId>,
) -> ServerResult<Json<RecognitionSummary>> {
    let images = state.photos.take(&id)?;
    if images.is_empty() {
        return Err(ServerError::BadRequest("no receipt photos staged".into()));
    }
    match state
        .service
        .ingest_receipt(&id, &caller.participant, images.clone())
        .await
    {
        Ok(summary) => Ok(Json(summary)),
        Err(err) => {
            state.photos.restore(id, images)?;
            Err(err.into())
        }
    }
}

// ---- Claims ----

pub async fn cycle_claim(
    State(state): State<AppState>,
    caller: Caller,
    Path((id, item)): Path<(SessionId, ItemId)>,
) -> ServerResult<Json<ClaimUpdate>> {
    let update = state
        .service
        .cycle_claim(&id, &caller.participant, &item)
        .await?;
    Ok(Json(update))
}

pub async fn assign_claim(
    State(state): State<AppState>,
    caller: Caller,
    Path((id, item)): Path<(SessionId, ItemId)>,
    Json(req): Json<AssignClaimRequest>,
) -> ServerResult<Json<ClaimUpdate>> {
    let update = state
        .service
        .assign_claim(&id, &caller.participant, &item, &req.participant, req.quantity)
        .await?;
    Ok(Json(update))
}

pub async fn split_unclaimed(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<SessionId>,
) -> ServerResult<Json<Vec<tab_engine::ItemSplit>>> {
    Ok(Json(
        state.service.split_unclaimed(&id, &caller.participant).await?,
    ))
}

// ---- Tips, currency and confirmation ----

pub async fn set_tip(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<SessionId>,
    Json(req): Json<TipRequest>,
) -> ServerResult<Json<Member>> {
    let member = state
        .service
        .set_tip(&id, &caller.participant, req.tip_percent)
        .await?;
    Ok(Json(member))
}

pub async fn set_session_tip(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<SessionId>,
    Json(req): Json<TipRequest>,
) -> ServerResult<Json<Session>> {
    let session = state
        .service
        .set_session_tip(&id, &caller.participant, req.tip_percent)
        .await?;
    Ok(Json(session))
}

pub async fn set_currency(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<SessionId>,
    Json(req): Json<CurrencyRequest>,
) -> ServerResult<Json<Session>> {
    let session = state
        .service
        .set_currency(&id, &caller.participant, &req.currency)
        .await?;
    Ok(Json(session))
}

pub async fn confirm(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<SessionId>,
) -> ServerResult<Json<Member>> {
    Ok(Json(state.service.confirm(&id, &caller.participant).await?))
}

pub async fn unconfirm(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<SessionId>,
) -> ServerResult<Json<Member>> {
    Ok(Json(state.service.unconfirm(&id, &caller.participant).await?))
}

// ---- Settlement and lifecycle ----

pub async fn shares(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<SessionId>,
) -> ServerResult<Json<tab_settle::SettlementReport>> {
    Ok(Json(
        state
            .service
            .settlement_report(&id, &caller.participant)
            .await?,
    ))
}

pub async fn my_share(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<SessionId>,
) -> ServerResult<Json<MyShare>> {
    Ok(Json(
        state
            .service
            .compute_participant_share(&id, &caller.participant)
            .await?,
    ))
}

pub async fn transition(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<SessionId>,
    Json(req): Json<TransitionRequest>,
) -> ServerResult<Json<Session>> {
    let session = state
        .service
        .transition(&id, &caller.participant, req.status)
        .await?;
    Ok(Json(session))
}

pub async fn settle(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<SessionId>,
) -> ServerResult<Json<tab_settle::SettlementReport>> {
    Ok(Json(state.service.settle(&id, &caller.participant).await?))
}

// ---- Events ----

/// Long-poll for the next event of a session. `204` when none arrives in
/// time.
pub async fn next_event(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<SessionId>,
    Query(query): Query<EventPollQuery>,
) -> ServerResult<Response> {
    state.service.member(&id, &caller.participant).await?;
    let mut events = state
        .events
        .subscribe(id)
        .map_err(|e| ServerError::Internal(e.to_string()))?;

    let limit = state.config.event_poll_timeout_ms;
    let wait = Duration::from_millis(query.timeout_ms.unwrap_or(limit).min(limit));
    let next = tokio::time::timeout(wait, async {
        loop {
            match events.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .await;

    Ok(match next {
        Ok(Some(event)) => Json(event).into_response(),
        _ => StatusCode::NO_CONTENT.into_response(),
    })
}
