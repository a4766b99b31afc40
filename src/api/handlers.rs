use axum::{
    extract::{ConnectInfo, FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::comments::CommentBoard;
use crate::config::{Config, ProfileConfig};
use crate::identity::{extract_client_ip, IdentityKey};
use crate::models::{AddCommentRequest, CommentView, EditCommentRequest};
use crate::storage::{LiveStore, StorageError};
use crate::visits::VisitCounter;

pub struct AppState {
    pub visits: VisitCounter,
    pub board: CommentBoard,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<LiveStore>, config: Arc<Config>) -> Self {
        Self {
            visits: VisitCounter::new(Arc::clone(&store)),
            board: CommentBoard::new(store),
            config,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, Deserialize)]
pub struct SuccessResponse {
    pub message: String,
}

#[derive(Serialize, Deserialize)]
pub struct IpResponse {
    pub ip: String,
}

#[derive(Serialize, Deserialize)]
pub struct VisitResponse {
    pub visitor: i64,
}

#[derive(Serialize, Deserialize)]
pub struct TotalResponse {
    pub total: i64,
}

#[derive(Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: String,
}

#[derive(Serialize, Deserialize)]
pub struct DraftResponse {
    pub text: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn storage_error(action: &str, e: StorageError) -> ApiError {
    tracing::error!("Failed to {}: {}", action, e);
    let status = match e {
        StorageError::InvalidKey(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: format!("Failed to {}: {}", action, e),
        }),
    )
}

/// The requesting visitor, as far as the trusted-proxy policy lets us tell.
pub struct Caller(pub Option<IdentityKey>);

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let socket_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let ip = extract_client_ip(&parts.headers, socket_ip, &state.config.identity);
        Ok(Caller(ip.map(IdentityKey::from)))
    }
}

/// IP echo: tell callers which address they are known by
pub async fn caller_ip(Caller(caller): Caller) -> Result<Json<IpResponse>, ApiError> {
    match caller {
        Some(key) => Ok(Json(IpResponse { ip: key.into() })),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Client address unavailable".to_string(),
            }),
        )),
    }
}

/// Static profile content
pub async fn profile(State(state): State<Arc<AppState>>) -> Json<ProfileConfig> {
    Json(state.config.profile.clone())
}

/// Record one visit for the caller
pub async fn record_visit(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Result<Response, ApiError> {
    let Some(key) = caller else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let visitor = state
        .visits
        .record_visit(&key)
        .await
        .map_err(|e| storage_error("record visit", e))?;
    Ok(Json(VisitResponse { visitor }).into_response())
}

/// Total visits across all visitors
pub async fn total_visits(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TotalResponse>, ApiError> {
    let total = state
        .visits
        .total()
        .await
        .map_err(|e| storage_error("count visits", e))?;
    Ok(Json(TotalResponse { total }))
}

/// All comments, flagged with whether the caller owns them
pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
) -> Result<Json<Vec<CommentView>>, ApiError> {
    let comments = state
        .board
        .comments()
        .await
        .map_err(|e| storage_error("list comments", e))?;
    Ok(Json(
        comments
            .iter()
            .map(|c| c.view_for(caller.as_ref()))
            .collect(),
    ))
}

/// Post a comment; blank text is accepted and ignored
pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Json(payload): Json<AddCommentRequest>,
) -> Result<Response, ApiError> {
    let created = state
        .board
        .add_comment(&payload.text, caller.as_ref())
        .await
        .map_err(|e| storage_error("add comment", e))?;

    Ok(match created {
        Some(id) => (StatusCode::CREATED, Json(CreatedResponse { id })).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// Open the edit dialog: the current text for the owner, nothing for anyone else
pub async fn begin_edit(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let Some(key) = caller else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    let text = state
        .board
        .begin_edit(&id, &key)
        .await
        .map_err(|e| storage_error("load comment", e))?;

    Ok(match text {
        Some(text) => Json(DraftResponse { text }).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// Save an edit. Always 204 so denials look like success.
pub async fn commit_edit(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    Json(payload): Json<EditCommentRequest>,
) -> Result<StatusCode, ApiError> {
    if let Some(key) = caller {
        state
            .board
            .commit_edit(&id, &payload.text, &key)
            .await
            .map_err(|e| storage_error("edit comment", e))?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a comment. Always 204 so denials look like success.
pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    Caller(caller): Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if let Some(key) = caller {
        state
            .board
            .delete_comment(&id, &key)
            .await
            .map_err(|e| storage_error("delete comment", e))?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Health check endpoint
pub async fn health_check() -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: "OK".to_string(),
    })
}
