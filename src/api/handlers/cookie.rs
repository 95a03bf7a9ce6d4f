//! Same-origin cookie sync: the browser client trades its session token for
//! an HttpOnly cookie so later page loads stay authenticated.

use std::sync::Arc;

use axum::{
    http::{header::SET_COOKIE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use tracing::instrument;

use crate::api::handlers::types::CookieSyncRequest;
use crate::api::state::ApiConfig;
use crate::session::SessionStore;

pub const SESSION_COOKIE_NAME: &str = "sesamo_session";

fn session_cookie(config: &ApiConfig, token: &str, max_age: i64) -> Option<HeaderValue> {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    );
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    // Rejects header injection through the token.
    HeaderValue::from_str(&cookie).ok()
}

fn cookie_max_age(config: &ApiConfig, expires_at: Option<i64>, now: i64) -> i64 {
    match expires_at {
        Some(expires_at) => (expires_at - now).max(0),
        None => config.cookie_ttl_seconds(),
    }
}

/// Set the session cookie from a freshly approved session token.
#[utoipa::path(
    post,
    path = "/api/auth/session",
    request_body = CookieSyncRequest,
    responses(
        (status = 204, description = "Cookie set"),
        (status = 400, description = "Malformed token"),
    ),
    tag = "cookie"
)]
#[instrument(skip_all)]
pub async fn set_session_cookie(
    config: Extension<Arc<ApiConfig>>,
    store: Extension<Arc<SessionStore>>,
    Json(payload): Json<CookieSyncRequest>,
) -> Response {
    if payload.session_token.trim().is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let max_age = cookie_max_age(&config, payload.expires_at, store.now_unix());
    let Some(cookie) = session_cookie(&config, &payload.session_token, max_age) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    (StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]).into_response()
}

/// Clear the session cookie on logout.
#[utoipa::path(
    delete,
    path = "/api/auth/session",
    responses((status = 204, description = "Cookie cleared")),
    tag = "cookie"
)]
#[instrument(skip_all)]
pub async fn clear_session_cookie(config: Extension<Arc<ApiConfig>>) -> Response {
    let Some(cookie) = session_cookie(&config, "", 0) else {
        return StatusCode::NO_CONTENT.into_response();
    };
    (StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]).into_response()
}
