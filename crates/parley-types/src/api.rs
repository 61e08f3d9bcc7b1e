use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::User;

// -- JWT Claims --

/// JWT claims shared by token issuance and the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub name: String,
    pub exp: usize,
}

// -- Account --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Partial profile update for the caller. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub page_id: i64,
    pub page_size: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

// -- Messages --

/// The sender is always the authenticated principal, never a body field.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(rename = "conversationID")]
    pub conversation_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    #[serde(rename = "sentAt")]
    pub sent_at: DateTime<Utc>,
    pub id: i64,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateConversationRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "recipientEmails")]
    pub recipient_emails: Vec<String>,
    #[serde(rename = "senderID", default)]
    pub sender_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateConversationResponse {
    pub id: i64,
    pub name: Option<String>,
    /// Addresses that did not resolve to an account and were skipped.
    #[serde(rename = "unresolvedEmails")]
    pub unresolved_emails: Vec<String>,
}
