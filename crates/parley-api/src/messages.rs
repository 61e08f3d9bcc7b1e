use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use parley_db::store::SendMessageParams;
use parley_types::api::{Claims, SendMessageRequest, SendMessageResponse};

use crate::error::ApiError;
use crate::validation::{ensure_valid, validate_send_message};
use crate::{AppState, run_store};

/// POST /message: append to an existing conversation as the authenticated
/// user, joining it first if necessary.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    ensure_valid(validate_send_message(&req))?;

    let params = SendMessageParams {
        sender_id: claims.sub,
        conversation_id: req.conversation_id,
        content: req.content,
    };
    let sent = run_store(&state, move |db, cancel| db.send_message(&params, cancel)).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SendMessageResponse {
            sent_at: sent.created_at,
            id: sent.message_id,
        }),
    ))
}
