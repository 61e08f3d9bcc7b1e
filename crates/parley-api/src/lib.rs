pub mod auth;
pub mod conversations;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod validation;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::error;

use parley_db::Database;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
}

/// Run blocking store work off the async runtime.
///
/// The closure receives a cancellation token that fires if this future is
/// dropped before the work completes (client disconnect or request timeout),
/// so an in-flight transaction rolls back instead of committing.
pub(crate) async fn run_store<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database, &CancellationToken) -> parley_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let state = state.clone();

    tokio::task::spawn_blocking(move || f(&state.db, &cancel))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}
