pub mod auth;
pub mod chats;
pub mod config;
pub mod db;
pub mod identity;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::FromRef,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use sqlx::SqlitePool;

use chats::{ChatError, ChatService, ConversationStore, Relay};
use identity::{IdentityService, SqliteIdentity};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub chats: ChatService,
}

impl AppState {
    /// State backed by `db_pool` for both conversations and identity lookups,
    /// with a fresh relay.
    pub fn new(db_pool: SqlitePool) -> Self {
        let identity: Arc<dyn IdentityService> = Arc::new(SqliteIdentity::new(db_pool.clone()));
        Self::with_identity(db_pool, identity)
    }

    pub fn with_identity(db_pool: SqlitePool, identity: Arc<dyn IdentityService>) -> Self {
        let chats = ChatService::new(ConversationStore::new(db_pool.clone()), Relay::new(), identity);
        Self { db_pool, chats }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(chats::router())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.downcast_ref::<ChatError>() {
            Some(ChatError::Validation(_)) => StatusCode::BAD_REQUEST,
            Some(ChatError::Unauthorized) => StatusCode::UNAUTHORIZED,
            Some(ChatError::NotFound(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("{:#}", self.0);
            "internal server error".to_owned()
        } else {
            self.0.to_string()
        };

        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

macro_rules! apperr_impl {
    ($E:ty) => {
        impl From<$E> for AppError {
            fn from(err: $E) -> Self {
                Self(anyhow::Error::from(err))
            }
        }
    };
}

apperr_impl!(ChatError);
apperr_impl!(serde_json::Error);
apperr_impl!(sqlx::Error);
apperr_impl!(axum::Error);
