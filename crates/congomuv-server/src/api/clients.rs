//! Client shell API endpoints.
//!
//! A client is one mounted shell, standing in for a browser tab. Every
//! mutating endpoint returns the shell state after the gate has settled and
//! any profile fetch has been committed.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use congomuv_core::{
    ActivityKind, CommitOutcome, ControlMessage, IdleStatus, RoutePath, Session, ShellState,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::{self, SharedState};

/// Creates the clients router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", post(mount_client))
        .route("/{id}", get(get_client).delete(unmount_client))
        .route("/{id}/location", put(navigate))
        .route("/{id}/session", post(sign_in))
        .route("/{id}/sign-out", post(sign_out))
        .route("/{id}/profile/refresh", post(refresh_profile))
        .route("/{id}/activity", post(record_activity))
        .route("/{id}/control", post(publish_control))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for mounting a client.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[schema(example = json!({
    "path": "#/operator",
    "token": "dev-operator"
}))]
pub struct MountRequest {
    /// Initial hash path. Defaults to `/`.
    #[serde(default)]
    pub path: Option<RoutePath>,

    /// Session token to sign in with right away.
    #[serde(default)]
    pub token: Option<String>,
}

/// Request body for a hash change.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({ "path": "#/admin" }))]
pub struct NavigateRequest {
    /// New hash path.
    pub path: RoutePath,
}

/// Request body for signing in.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({ "token": "dev-operator" }))]
pub struct SignInRequest {
    /// Session token issued by the auth backend.
    #[schema(min_length = 1)]
    pub token: String,
}

/// Request body for user activity.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({ "kind": "key" }))]
pub struct ActivityRequest {
    /// What the user did.
    pub kind: ActivityKind,
}

/// Request body for the control channel.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({ "message": "reset_idle" }))]
pub struct ControlRequest {
    /// Message to publish.
    pub message: ControlMessage,
}

/// A mounted client.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ClientResponse {
    /// Client id.
    pub id: Uuid,

    /// When the client was mounted.
    pub mounted_at: DateTime<Utc>,

    /// Shell state after the gate settled.
    pub shell: ShellState,

    /// Idle timer status.
    pub idle: IdleStatus,

    /// Outcome of the profile fetch triggered by this request, if any.
    pub profile_fetch: Option<CommitOutcome>,
}

async fn describe(
    state: &SharedState,
    id: Uuid,
    profile_fetch: Option<CommitOutcome>,
) -> ApiResult<Json<ClientResponse>> {
    let guard = state.read().await;
    let entry = guard.client(id)?;

    Ok(Json(ClientResponse {
        id,
        mounted_at: entry.mounted_at(),
        shell: entry.shell.state(),
        idle: entry.idle_status(),
        profile_fetch,
    }))
}

// ============================================================================
// Handlers
// ============================================================================

/// Mount a client shell.
#[utoipa::path(
    post,
    path = "/api/clients",
    tag = "clients",
    operation_id = "mountClient",
    summary = "Mount a client shell",
    description = "Creates a shell at the given hash path and starts its idle timer. \
        With a token, the session is restored before the first gate run, so a protected \
        path stays put while the profile loads.",
    request_body = MountRequest,
    responses(
        (status = 201, description = "Client mounted", body = ClientResponse),
        (status = 400, description = "Path longer than 512 bytes", body = ErrorResponse)
    )
)]
pub async fn mount_client(
    State(state): State<SharedState>,
    Json(request): Json<MountRequest>,
) -> ApiResult<(StatusCode, Json<ClientResponse>)> {
    let path = request.path.unwrap_or_default();
    let (id, outcome) = state::mount_client(&state, path, request.token).await?;
    let response = describe(&state, id, outcome).await?;
    Ok((StatusCode::CREATED, response))
}

/// Get a client's state.
#[utoipa::path(
    get,
    path = "/api/clients/{id}",
    tag = "clients",
    operation_id = "getClient",
    summary = "Get client state",
    params(("id" = Uuid, Path, description = "Client id")),
    responses(
        (status = 200, description = "Client state", body = ClientResponse),
        (status = 404, description = "Unknown client", body = ErrorResponse)
    )
)]
pub async fn get_client(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ClientResponse>> {
    describe(&state, id, None).await
}

/// Unmount a client shell.
#[utoipa::path(
    delete,
    path = "/api/clients/{id}",
    tag = "clients",
    operation_id = "unmountClient",
    summary = "Unmount a client shell",
    description = "Stops the idle timer and forgets the client. Profile fetches still in \
        flight are discarded.",
    params(("id" = Uuid, Path, description = "Client id")),
    responses(
        (status = 204, description = "Client unmounted"),
        (status = 404, description = "Unknown client", body = ErrorResponse)
    )
)]
pub async fn unmount_client(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state::unmount_client(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Change the hash path.
#[utoipa::path(
    put,
    path = "/api/clients/{id}/location",
    tag = "clients",
    operation_id = "navigate",
    summary = "Change the hash path",
    description = "Equivalent to a hashchange event: the gate re-runs and may rewrite the \
        path before settling. With a session the profile is re-read, so a role change on the \
        backend applies right away.",
    params(("id" = Uuid, Path, description = "Client id")),
    request_body = NavigateRequest,
    responses(
        (status = 200, description = "Settled client state", body = ClientResponse),
        (status = 404, description = "Unknown client", body = ErrorResponse)
    )
)]
pub async fn navigate(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(request): Json<NavigateRequest>,
) -> ApiResult<Json<ClientResponse>> {
    let outcome =
        state::update_client(&state, id, |entry| entry.shell.navigate(request.path)).await?;
    describe(&state, id, outcome).await
}

/// Sign in.
#[utoipa::path(
    post,
    path = "/api/clients/{id}/session",
    tag = "clients",
    operation_id = "signIn",
    summary = "Sign in with a session token",
    description = "Stores the session, arms the idle timer and fetches the profile. A token \
        the auth backend rejects leaves the shell loading with `profile_fetch: failed`.",
    params(("id" = Uuid, Path, description = "Client id")),
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Client state after the profile fetch", body = ClientResponse),
        (status = 400, description = "Empty token", body = ErrorResponse),
        (status = 404, description = "Unknown client", body = ErrorResponse)
    )
)]
pub async fn sign_in(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SignInRequest>,
) -> ApiResult<Json<ClientResponse>> {
    let token = request.token.trim().to_string();
    if token.is_empty() {
        return Err(ApiError::BadRequest {
            error_code: "empty_token".to_string(),
            message: "Session token cannot be empty".to_string(),
        });
    }

    let outcome =
        state::update_client(&state, id, |entry| entry.shell.sign_in(Session::new(token))).await?;
    info!(client = %id, ?outcome, "Client signed in");
    describe(&state, id, outcome).await
}

/// Sign out.
#[utoipa::path(
    post,
    path = "/api/clients/{id}/sign-out",
    tag = "clients",
    operation_id = "signOut",
    summary = "Sign out",
    description = "Publishes a sign-out on the client's control channel, then processes it: \
        the session is revoked, markers cleared and the gate re-evaluated.",
    params(("id" = Uuid, Path, description = "Client id")),
    responses(
        (status = 200, description = "Client state after sign-out", body = ClientResponse),
        (status = 404, description = "Unknown client", body = ErrorResponse)
    )
)]
pub async fn sign_out(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ClientResponse>> {
    publish(&state, id, ControlMessage::SignOut).await
}

/// Refresh the profile.
#[utoipa::path(
    post,
    path = "/api/clients/{id}/profile/refresh",
    tag = "clients",
    operation_id = "refreshProfile",
    summary = "Re-read the profile",
    description = "Fetches the profile again for the current session. Idempotent; a role \
        change takes effect immediately.",
    params(("id" = Uuid, Path, description = "Client id")),
    responses(
        (status = 200, description = "Client state after the refresh", body = ClientResponse),
        (status = 404, description = "Unknown client", body = ErrorResponse)
    )
)]
pub async fn refresh_profile(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ClientResponse>> {
    let outcome = state::update_client(&state, id, |entry| entry.shell.refresh_profile()).await?;
    describe(&state, id, outcome).await
}

/// Record user activity.
#[utoipa::path(
    post,
    path = "/api/clients/{id}/activity",
    tag = "clients",
    operation_id = "recordActivity",
    summary = "Record user activity",
    description = "Resets the idle timer and hides the warning. `visibility_change` also \
        refreshes the profile.",
    params(("id" = Uuid, Path, description = "Client id")),
    request_body = ActivityRequest,
    responses(
        (status = 200, description = "Client state", body = ClientResponse),
        (status = 404, description = "Unknown client", body = ErrorResponse)
    )
)]
pub async fn record_activity(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ActivityRequest>,
) -> ApiResult<Json<ClientResponse>> {
    let outcome =
        state::update_client(&state, id, |entry| entry.shell.record_activity(request.kind)).await?;
    describe(&state, id, outcome).await
}

/// Publish a control message.
#[utoipa::path(
    post,
    path = "/api/clients/{id}/control",
    tag = "clients",
    operation_id = "publishControl",
    summary = "Publish a control message",
    description = "Sends `sign_out`, `reset_idle` or `refresh_profile` through the client's \
        control channel, the way menus and the idle monitor do.",
    params(("id" = Uuid, Path, description = "Client id")),
    request_body = ControlRequest,
    responses(
        (status = 200, description = "Client state after processing", body = ClientResponse),
        (status = 404, description = "Unknown client", body = ErrorResponse)
    )
)]
pub async fn publish_control(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ControlRequest>,
) -> ApiResult<Json<ClientResponse>> {
    publish(&state, id, request.message).await
}

async fn publish(
    state: &SharedState,
    id: Uuid,
    message: ControlMessage,
) -> ApiResult<Json<ClientResponse>> {
    let outcome = state::update_client(state, id, |entry| {
        entry.shell.control().publish(message);
        entry.shell.process_control()
    })
    .await?;
    describe(state, id, outcome).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_request_defaults() {
        let request: MountRequest = serde_json::from_str("{}").unwrap();
        assert!(request.path.is_none());
        assert!(request.token.is_none());
    }

    #[test]
    fn test_navigate_request_normalizes_hash() {
        let request: NavigateRequest = serde_json::from_str(r##"{"path": "#/Admin/"}"##).unwrap();
        assert_eq!(request.path.as_str(), "/Admin");
    }

    #[test]
    fn test_navigate_request_encodes_unsafe_path() {
        let request: NavigateRequest = serde_json::from_str(r#"{"path": "/a b"}"#).unwrap();
        assert_eq!(request.path.as_str(), "/a%20b");
    }

    #[test]
    fn test_control_request_deserialization() {
        let request: ControlRequest =
            serde_json::from_str(r#"{"message": "refresh_profile"}"#).unwrap();
        assert_eq!(request.message, ControlMessage::RefreshProfile);
    }
}
