use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public view of an account. The credential hash never leaves `parley-db`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// A conversation. `name` is genuinely optional: `None` is serialized as `null`,
/// never coerced to an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub name: Option<String>,
}

/// A user's right to read and append to a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: i64,
    #[serde(rename = "userID")]
    pub user_id: i64,
    #[serde(rename = "conversationID")]
    pub conversation_id: i64,
}

/// A stored message. `sender_name` is a copy of the sender's display name at
/// send time, so later renames do not rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    #[serde(rename = "from")]
    pub sender_name: String,
    pub content: String,
    #[serde(rename = "conversationID")]
    pub conversation_id: i64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}
