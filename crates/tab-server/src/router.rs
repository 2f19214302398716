use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handler;
use crate::server::AppState;

/// Build the axum router with all TabSplit endpoints.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/sessions", post(handler::create_session))
        .route("/v1/sessions/mine", get(handler::my_sessions))
        .route("/v1/sessions/:id", get(handler::get_session))
        .route("/v1/invites/:token/join", post(handler::join_session))
        .route(
            "/v1/sessions/:id/items",
            put(handler::replace_items).post(handler::add_item),
        )
        .route(
            "/v1/sessions/:id/items/unclaimed",
            delete(handler::remove_unclaimed),
        )
        .route("/v1/sessions/:id/items/reset", post(handler::reset_items))
        .route(
            "/v1/sessions/:id/items/:item",
            put(handler::edit_item).delete(handler::delete_item),
        )
        .route("/v1/sessions/:id/photos", post(handler::upload_photo))
        .route("/v1/sessions/:id/receipt", post(handler::recognize_receipt))
        .route(
            "/v1/sessions/:id/claims/split-unclaimed",
            post(handler::split_unclaimed),
        )
        .route("/v1/sessions/:id/claims/:item", put(handler::assign_claim))
        .route(
            "/v1/sessions/:id/claims/:item/cycle",
            post(handler::cycle_claim),
        )
        .route("/v1/sessions/:id/tip", put(handler::set_tip))
        .route("/v1/sessions/:id/global-tip", put(handler::set_session_tip))
        .route("/v1/sessions/:id/currency", put(handler::set_currency))
        .route("/v1/sessions/:id/confirm", post(handler::confirm))
        .route("/v1/sessions/:id/unconfirm", post(handler::unconfirm))
        .route("/v1/sessions/:id/shares", get(handler::shares))
        .route("/v1/sessions/:id/my-share", get(handler::my_share))
        .route("/v1/sessions/:id/transition", post(handler::transition))
        .route("/v1/sessions/:id/settle", post(handler::settle))
        .route("/v1/sessions/:id/events/next", get(handler::next_event))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
