use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info};

use parley_db::identity::UserUpdate;
use parley_types::api::{
    AuthResponse, Claims, ListUsersQuery, LoginRequest, RegisterRequest, UpdateUserRequest,
};
use parley_types::models::User;

use crate::error::ApiError;
use crate::validation::{
    ensure_valid, validate_list_users, validate_register, validate_update_user,
};
use crate::{AppState, run_store};

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    ensure_valid(validate_register(&req))?;

    let password_hash = hash_password(&req.password)?;
    let name = req.name.trim().to_string();
    let email = req.email;
    let user = run_store(&state, move |db, _| db.create_user(&name, &email, &password_hash)).await?;
    info!(user_id = user.id, "account registered");

    let token = issue_token(&state, &user)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { user, token })))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let email = req.email.clone();
    let row = run_store(&state, move |db, _| db.get_credentials_by_email(&email))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&row.hashed_password).map_err(|e| {
        error!("stored password hash for user {} is unreadable: {}", row.id, e);
        ApiError::Internal
    })?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let user = row.into_user()?;
    let token = issue_token(&state, &user)?;
    Ok(Json(AuthResponse { user, token }))
}

/// GET /account/{id}: the caller's own profile.
pub async fn get_account(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>, ApiError> {
    let Path(id) = path?;
    if id != claims.sub {
        return Err(ApiError::Forbidden);
    }
    let user = run_store(&state, move |db, _| db.get_user_by_id(id)).await?;
    Ok(Json(user))
}

/// PUT /account: change any subset of the caller's profile fields.
pub async fn update_account(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    ensure_valid(validate_update_user(&req))?;

    let password_hash = req.password.as_deref().map(hash_password).transpose()?;
    let name = req.name.map(|name| name.trim().to_string());
    let user_id = claims.sub;
    let user = run_store(&state, move |db, _| {
        let update = UserUpdate {
            name: name.as_deref(),
            email: req.email.as_deref(),
            image: req.image.as_deref(),
            status: req.status.as_deref(),
            hashed_password: password_hash.as_deref(),
        };
        db.update_user(user_id, &update)
    })
    .await?;
    info!(user_id = user.id, "account updated");

    Ok((StatusCode::ACCEPTED, Json(user)))
}

/// GET /account?page_id&page_size: one page of accounts ordered by id.
pub async fn list_accounts(
    State(state): State<AppState>,
    query: Result<Query<ListUsersQuery>, QueryRejection>,
) -> Result<Json<Vec<User>>, ApiError> {
    let Query(page) = query?;
    ensure_valid(validate_list_users(&page))?;

    let offset = (page.page_id - 1).saturating_mul(page.page_size);
    let users = run_store(&state, move |db, _| db.list_users(page.page_size, offset)).await?;
    Ok(Json(users))
}

// Hash password with Argon2id
fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("password hashing failed: {}", e);
            ApiError::Internal
        })
}

fn issue_token(state: &AppState, user: &User) -> Result<String, ApiError> {
    create_token(&state.jwt_secret, state.token_ttl, user).map_err(|e| {
        error!("token encoding failed: {}", e);
        ApiError::Internal
    })
}

pub fn create_token(
    secret: &str,
    ttl: chrono::Duration,
    user: &User,
) -> jsonwebtoken::errors::Result<String> {
    let claims = Claims {
        sub: user.id,
        name: user.name.clone(),
        exp: (chrono::Utc::now() + ttl).timestamp().max(0) as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}
