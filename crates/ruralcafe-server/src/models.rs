//! API request and response models.

use serde::{Deserialize, Serialize};

use ruralcafe_core::Richness;

/// POST /api/auth/signup and /api/auth/login body.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

/// Response to a signup.
#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub id: u64,
}

/// Response to a login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: u64,
}

/// Response to a logout.
#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub user_id: u64,
}

/// GET /api/request/richness query.
#[derive(Debug, Deserialize)]
pub struct RichnessQuery {
    pub r: String,
}

/// Confirmation of a richness change.
#[derive(Debug, Serialize)]
pub struct RichnessResponse {
    pub richness: Richness,
}

/// GET /api/request/remove query.
#[derive(Debug, Deserialize)]
pub struct RemoveQuery {
    pub i: u64,
}

/// Confirmation of a remove.
#[derive(Debug, Serialize)]
pub struct RemoveResponse {
    pub id: u64,
    /// `removed` for a queued request, `cancelling` for a dispatched one.
    pub outcome: String,
}

/// POST /api/request/add body.
#[derive(Debug, Deserialize)]
pub struct AddRequest {
    pub uri: String,
}

/// Response to an add.
#[derive(Debug, Serialize)]
pub struct AddResponse {
    pub id: u64,
}

/// GET /api/status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub queued: usize,
    pub active: usize,
    pub max_inflight: usize,
    pub sessions: usize,
    pub cached_files: usize,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}
