use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use burrow_control::{RepositoryError, SessionError};
use burrow_proto::{Remote, TunnelAcl};
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::*;
use crate::AppState;

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(status: StatusCode, code: &str, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: Some(code.to_string()),
        }),
    )
}

fn session_error(err: SessionError) -> ApiError {
    let (status, code) = match &err {
        SessionError::Repository(RepositoryError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND")
        }
        SessionError::TunnelNotFound { .. } => (StatusCode::NOT_FOUND, "TUNNEL_NOT_FOUND"),
        SessionError::InvalidTunnelSpec { .. } => {
            (StatusCode::BAD_REQUEST, "INVALID_TUNNEL_SPEC")
        }
        SessionError::DuplicateBinding { .. } => (StatusCode::CONFLICT, "DUPLICATE_BINDING"),
        SessionError::SessionActive(_) => (StatusCode::CONFLICT, "SESSION_ACTIVE"),
        SessionError::NotConnected(_) => (StatusCode::CONFLICT, "SESSION_NOT_CONNECTED"),
        SessionError::PoolExhausted { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "PORT_POOL_EXHAUSTED")
        }
        SessionError::ResourceUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "RESOURCE_UNAVAILABLE")
        }
        SessionError::Bind { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "BIND_FAILED"),
        SessionError::Repository(RepositoryError::Storage(_)) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR")
        }
    };
    error_response(status, code, err)
}

/// Health check
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "system"
)]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    let sessions = state.service.count().await.map_err(session_error)?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions,
    }))
}

/// List all sessions, connected and lost
#[utoipa::path(
    get,
    path = "/api/sessions",
    responses(
        (status = 200, description = "List of sessions", body = SessionList),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionList>, ApiError> {
    debug!("Listing sessions");

    let mut sessions = Vec::new();
    for session in state.service.get_all().await.map_err(session_error)? {
        sessions.push(SessionInfo::from_session(&session).await);
    }
    let total = sessions.len();

    Ok(Json(SessionList { sessions, total }))
}

/// Get a session by ID
#[utoipa::path(
    get,
    path = "/api/sessions/{id}",
    params(
        ("id" = String, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Session information", body = SessionInfo),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionInfo>, ApiError> {
    let session = state.service.get_by_id(&id).await.map_err(session_error)?;
    Ok(Json(SessionInfo::from_session(&session).await))
}

/// End a session.
///
/// A connected session is asked to terminate and the request is accepted;
/// a lost session's record is deleted.
#[utoipa::path(
    delete,
    path = "/api/sessions/{id}",
    params(
        ("id" = String, Path, description = "Session ID")
    ),
    responses(
        (status = 202, description = "Connected session is terminating"),
        (status = 204, description = "Lost session deleted"),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    tag = "sessions"
)]
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session = state.service.get_by_id(&id).await.map_err(session_error)?;

    if session.is_active() {
        info!("Terminating session {} on operator request", id);
        session.close();
        return Ok(StatusCode::ACCEPTED);
    }

    state.service.forget(&id).await.map_err(session_error)?;
    info!("Deleted lost session {}", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Open tunnels on a connected session
#[utoipa::path(
    put,
    path = "/api/sessions/{id}/tunnels",
    params(
        ("id" = String, Path, description = "Session ID")
    ),
    request_body = OpenTunnelsRequest,
    responses(
        (status = 201, description = "Tunnels opened", body = OpenTunnelsResponse),
        (status = 400, description = "Invalid forward or ACL", body = ErrorResponse),
        (status = 404, description = "Session not found or not connected", body = ErrorResponse),
        (status = 409, description = "Local endpoint already used", body = ErrorResponse),
        (status = 503, description = "No port available", body = ErrorResponse)
    ),
    tag = "tunnels"
)]
pub async fn open_tunnels(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<OpenTunnelsRequest>,
) -> Result<(StatusCode, Json<OpenTunnelsResponse>), ApiError> {
    let remotes = req
        .remotes
        .iter()
        .map(|spec| spec.parse::<Remote>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, "INVALID_TUNNEL_SPEC", e))?;
    let acl = TunnelAcl::from_allowlist(&req.acl)
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, "INVALID_ACL", e))?;

    let session = state
        .service
        .get_active_by_id(&id)
        .await
        .map_err(session_error)?;

    let tunnels = state
        .service
        .open_tunnels(&session, &remotes, &acl)
        .await
        .map_err(session_error)?;

    info!("Opened {} tunnels on session {}", tunnels.len(), id);

    Ok((
        StatusCode::CREATED,
        Json(OpenTunnelsResponse {
            tunnels: tunnels.iter().map(|t| TunnelInfo::from(t.as_ref())).collect(),
        }),
    ))
}

/// Close one tunnel of a connected session
#[utoipa::path(
    delete,
    path = "/api/sessions/{id}/tunnels/{tunnel_id}",
    params(
        ("id" = String, Path, description = "Session ID"),
        ("tunnel_id" = String, Path, description = "Tunnel ID")
    ),
    responses(
        (status = 204, description = "Tunnel closed"),
        (status = 404, description = "Session or tunnel not found", body = ErrorResponse)
    ),
    tag = "tunnels"
)]
pub async fn close_tunnel(
    State(state): State<Arc<AppState>>,
    Path((id, tunnel_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let session = state
        .service
        .get_active_by_id(&id)
        .await
        .map_err(session_error)?;

    state
        .service
        .close_tunnel(&session, &tunnel_id)
        .await
        .map_err(session_error)?;

    Ok(StatusCode::NO_CONTENT)
}
