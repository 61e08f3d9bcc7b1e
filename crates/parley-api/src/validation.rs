//! Request validation. Each function inspects one request type and returns the
//! field errors it finds; an empty list means the request may proceed.

use serde::Serialize;

use parley_types::api::{
    CreateConversationRequest, ListUsersQuery, RegisterRequest, SendMessageRequest,
    UpdateUserRequest,
};

use crate::error::ApiError;

const MAX_CONVERSATION_NAME: usize = 128;
const MAX_USER_NAME: usize = 64;
const MIN_PASSWORD: usize = 8;
const MIN_PAGE_SIZE: i64 = 5;
const MAX_PAGE_SIZE: i64 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Turn a list of field errors into a handler result.
pub fn ensure_valid(errors: Vec<FieldError>) -> Result<(), ApiError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

pub fn validate_send_message(req: &SendMessageRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if req.content.trim().is_empty() {
        errors.push(FieldError::new("content", "must not be empty"));
    }
    if req.conversation_id < 1 {
        errors.push(FieldError::new("conversationID", "must be at least 1"));
    }
    errors
}

pub fn validate_create_conversation(req: &CreateConversationRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if let Some(name) = &req.name {
        if name.trim().is_empty() {
            errors.push(FieldError::new("name", "must not be blank when present"));
        } else if name.chars().count() > MAX_CONVERSATION_NAME {
            errors.push(FieldError::new(
                "name",
                format!("must be at most {MAX_CONVERSATION_NAME} characters"),
            ));
        }
    }

    if req.recipient_emails.is_empty() {
        errors.push(FieldError::new("recipientEmails", "must contain at least one address"));
    }
    for email in &req.recipient_emails {
        if !is_valid_email(email) {
            errors.push(FieldError::new(
                "recipientEmails",
                format!("{email:?} is not a valid email address"),
            ));
        }
    }

    if let Some(sender_id) = req.sender_id {
        if sender_id < 1 {
            errors.push(FieldError::new("senderID", "must be at least 1"));
        }
    }

    errors
}

pub fn validate_register(req: &RegisterRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let name_len = req.name.trim().chars().count();
    if name_len == 0 || name_len > MAX_USER_NAME {
        errors.push(FieldError::new(
            "name",
            format!("must be 1 to {MAX_USER_NAME} characters"),
        ));
    }
    if !is_valid_email(&req.email) {
        errors.push(FieldError::new("email", "is not a valid email address"));
    }
    if req.password.len() < MIN_PASSWORD {
        errors.push(FieldError::new(
            "password",
            format!("must be at least {MIN_PASSWORD} characters"),
        ));
    }
    errors
}

/// An update must change at least one field, and each field it carries
/// follows the registration rules.
pub fn validate_update_user(req: &UpdateUserRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if req.name.is_none()
        && req.email.is_none()
        && req.image.is_none()
        && req.status.is_none()
        && req.password.is_none()
    {
        errors.push(FieldError::new("body", "must change at least one field"));
        return errors;
    }

    if let Some(name) = &req.name {
        let name_len = name.trim().chars().count();
        if name_len == 0 || name_len > MAX_USER_NAME {
            errors.push(FieldError::new(
                "name",
                format!("must be 1 to {MAX_USER_NAME} characters"),
            ));
        }
    }
    if let Some(email) = &req.email {
        if !is_valid_email(email) {
            errors.push(FieldError::new("email", "is not a valid email address"));
        }
    }
    if let Some(password) = &req.password {
        if password.len() < MIN_PASSWORD {
            errors.push(FieldError::new(
                "password",
                format!("must be at least {MIN_PASSWORD} characters"),
            ));
        }
    }
    if req.image.as_deref().is_some_and(|image| image.trim().is_empty()) {
        errors.push(FieldError::new("image", "must not be blank when present"));
    }
    if req.status.as_deref().is_some_and(|status| status.trim().is_empty()) {
        errors.push(FieldError::new("status", "must not be blank when present"));
    }
    errors
}

pub fn validate_list_users(query: &ListUsersQuery) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if query.page_id < 1 {
        errors.push(FieldError::new("page_id", "must be at least 1"));
    }
    if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&query.page_size) {
        errors.push(FieldError::new(
            "page_size",
            format!("must be between {MIN_PAGE_SIZE} and {MAX_PAGE_SIZE}"),
        ));
    }
    errors
}

/// Syntactic address check: one `@`, a non-empty local part, a dotted domain
/// with no empty labels, and no whitespace anywhere.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}
