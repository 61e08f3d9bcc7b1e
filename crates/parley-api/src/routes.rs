use std::time::Duration;

use axum::{
    Router,
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::require_auth;
use crate::{AppState, auth, conversations, messages};

/// Build the full HTTP surface. Requests that exceed `request_timeout` get a
/// 408 and are dropped, which cancels any transaction they started.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let public_routes = Router::new()
        .route("/account", post(auth::register))
        .route("/account/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/account", get(auth::list_accounts).put(auth::update_account))
        .route("/account/{id}", get(auth::get_account))
        .route("/message", post(messages::send_message))
        .route(
            "/conversation",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route("/conversation/{id}", get(conversations::conversation_messages))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
