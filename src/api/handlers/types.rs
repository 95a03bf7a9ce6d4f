//! Request and response bodies for the session API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::session::{Decision, Status};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub app_name: String,
    pub return_url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub challenge: String,
    pub qr_data: String,
    pub status: Status,
    pub expires_in: i64,
    pub expires_at: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApproveSessionRequest {
    /// Base64url Ed25519 signature over the session challenge.
    pub signed_challenge: String,
    pub decision: Decision,
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CookieSyncRequest {
    pub session_token: String,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
