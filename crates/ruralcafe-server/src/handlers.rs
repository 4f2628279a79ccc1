//! API route handlers.
//!
//! Clients are identified by the connection's peer IP; every control
//! request that acts on a user first resolves the IP through the session
//! map, which also refreshes the sliding expiry window.

use std::net::{IpAddr, SocketAddr};

use axum::body::Body;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::header;
use axum::response::Response;
use axum::Json;
use tracing::{debug, info};

use ruralcafe_cache::Package;
use ruralcafe_proxy::{DequeueOutcome, FetchRequest, ProxyRole};

use crate::error::{ApiError, Result};
use crate::models::{
    AddRequest, AddResponse, CredentialsRequest, LoginResponse, LogoutResponse, RemoveQuery,
    RemoveResponse, RichnessQuery, RichnessResponse, SignupResponse, StatusResponse,
};
use crate::state::AppState;
use crate::{PACKAGE_CONTENT_SIZE_HEADER, PACKAGE_INDEX_SIZE_HEADER};

/// Resolves the calling session and refreshes its activity window.
fn authenticate(state: &AppState, addr: SocketAddr) -> Result<(IpAddr, u64)> {
    let ip = addr.ip();
    let user_id = state
        .sessions
        .user_id_for(ip)
        .ok_or(ApiError::NotAuthenticated)?;
    state.sessions.touch(ip);
    Ok((ip, user_id))
}

/// POST /api/auth/signup - Register a new user.
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<SignupResponse>> {
    let id = state.users.sign_up(&req.username, &req.password)?;
    Ok(Json(SignupResponse { id }))
}

/// POST /api/auth/login - Verify credentials and bind the session to the
/// client IP.
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<LoginResponse>> {
    if !state.users.check_password(&req.username, &req.password) {
        debug!(username = %req.username, "Login rejected");
        return Err(ApiError::InvalidCredentials);
    }
    let user_id = state
        .users
        .id_of(&req.username)
        .ok_or(ApiError::InvalidCredentials)?;

    state.sessions.log_in(addr.ip(), user_id);
    Ok(Json(LoginResponse { user_id }))
}

/// POST /api/auth/logout - End the calling session.
pub async fn logout(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Json<LogoutResponse>> {
    let (_ip, user_id) = authenticate(&state, addr)?;
    state.sessions.log_out(user_id);
    Ok(Json(LogoutResponse { user_id }))
}

/// GET /api/request/richness?r=<value> - Set the session's richness.
pub async fn set_richness(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<RichnessQuery>,
) -> Result<Json<RichnessResponse>> {
    let (ip, user_id) = authenticate(&state, addr)?;
    let richness = state.role.set_richness(&ip.to_string(), user_id, &query.r)?;
    Ok(Json(RichnessResponse { richness }))
}

/// GET /api/request/remove?i=<id> - Cancel or dequeue a pending request.
pub async fn remove_request(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<RemoveQuery>,
) -> Result<Json<RemoveResponse>> {
    let (_ip, user_id) = authenticate(&state, addr)?;

    let outcome = match state.role.dequeue(query.i).await? {
        DequeueOutcome::Removed => "removed",
        DequeueOutcome::Cancelling => "cancelling",
        DequeueOutcome::NotFound => {
            return Err(ApiError::NotFound(format!(
                "no pending request with id {}",
                query.i
            )));
        }
    };

    info!(id = query.i, user_id, outcome, "Request removed");
    Ok(Json(RemoveResponse {
        id: query.i,
        outcome: outcome.to_string(),
    }))
}

/// POST /api/request/add - Queue a page fetch for the calling session.
pub async fn add_request(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<AddRequest>,
) -> Result<Json<AddResponse>> {
    let (ip, user_id) = authenticate(&state, addr)?;
    let endpoint = ip.to_string();
    let richness = state.role.settings_for(&endpoint, user_id).richness;

    let id = state
        .role
        .enqueue(FetchRequest {
            endpoint,
            user_id,
            uri: req.uri.clone(),
            richness,
        })
        .await?;

    info!(id, user_id, uri = %req.uri, %richness, "Request enqueued");
    Ok(Json(AddResponse { id }))
}

/// GET /api/package - Bundle the cached text pages into one package.
///
/// The gzip payload carries no segment framing; the uncompressed index
/// and content byte counts are declared in response headers.
pub async fn get_package(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Result<Response> {
    authenticate(&state, addr)?;

    let files = state.cache.text_files();
    let package = Package::assemble(state.cache.root(), &files)?;

    info!(
        files = files.len(),
        index_size = package.index_size,
        content_size = package.content_size,
        "Package assembled"
    );

    Response::builder()
        .header(header::CONTENT_TYPE, "application/gzip")
        .header(PACKAGE_INDEX_SIZE_HEADER, package.index_size)
        .header(PACKAGE_CONTENT_SIZE_HEADER, package.content_size)
        .body(Body::from(package.payload))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// GET /api/status - Queue, worker, session, and cache counters.
pub async fn get_status(State(state): State<AppState>) -> Result<Json<StatusResponse>> {
    let stats = match &state.role {
        ProxyRole::Remote { queue, .. } => queue.stats(),
        ProxyRole::Local { .. } => Default::default(),
    };
    let (active, max_inflight) = state
        .dispatcher
        .as_ref()
        .map(|d| (d.active(), d.max_inflight()))
        .unwrap_or((0, 0));

    Ok(Json(StatusResponse {
        queued: stats.queued,
        active,
        max_inflight,
        sessions: state.sessions.active_count(),
        cached_files: state.cache.count(),
        completed: stats.completed,
        failed: stats.failed,
        cancelled: stats.cancelled,
    }))
}
