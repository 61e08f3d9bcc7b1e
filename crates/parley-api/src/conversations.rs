use axum::{
    Extension, Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};

use parley_db::store::CreateConversationParams;
use parley_types::api::{Claims, CreateConversationRequest, CreateConversationResponse};
use parley_types::models::{Conversation, Message};

use crate::error::ApiError;
use crate::validation::{ensure_valid, validate_create_conversation};
use crate::{AppState, run_store};

/// POST /conversation: create a conversation with the caller and every
/// recipient address that belongs to an account.
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<CreateConversationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    ensure_valid(validate_create_conversation(&req))?;

    // The body may name the sender, but only as the caller themselves.
    if req.sender_id.is_some_and(|id| id != claims.sub) {
        return Err(ApiError::Forbidden);
    }

    let params = CreateConversationParams {
        sender_id: claims.sub,
        name: req.name,
        recipient_emails: req.recipient_emails,
    };
    let created =
        run_store(&state, move |db, cancel| db.create_conversation(&params, cancel)).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateConversationResponse {
            id: created.id,
            name: created.name,
            unresolved_emails: created.unresolved_emails,
        }),
    ))
}

/// GET /conversation: conversations the caller belongs to.
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let user_id = claims.sub;
    let conversations =
        run_store(&state, move |db, _| db.list_conversations_for_user(user_id)).await?;
    Ok(Json(conversations))
}

/// GET /conversation/{id}: the conversation's messages, members only.
pub async fn conversation_messages(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let Path(conversation_id) = path?;
    let user_id = claims.sub;
    let messages = run_store(&state, move |db, _| {
        db.get_conversation(conversation_id)?;
        match db.get_membership(user_id, conversation_id) {
            Ok(_) => db.list_messages(conversation_id).map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    })
    .await?
    .ok_or(ApiError::Forbidden)?;

    Ok(Json(messages))
}
