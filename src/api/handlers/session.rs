//! Session lifecycle endpoints: create, status, scan, approve.

use std::sync::Arc;

use axum::{
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use tracing::instrument;

use crate::api::handlers::types::{
    ApproveSessionRequest, CreateSessionRequest, CreateSessionResponse, ErrorResponse,
};
use crate::api::state::ApiConfig;
use crate::session::{qr, ClientMeta, SessionError, SessionSnapshot, SessionStore, Status};
use crate::verify::SignatureVerifier;

fn error_response(err: &SessionError) -> Response {
    let (status, code) = match err {
        SessionError::StoreUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
        SessionError::SessionNotFound => (StatusCode::NOT_FOUND, "session_not_found"),
        SessionError::SessionExpired => (StatusCode::GONE, "session_expired"),
        SessionError::SignatureInvalid { .. } => (StatusCode::UNAUTHORIZED, "signature_invalid"),
        SessionError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
    };
    (
        status,
        Json(ErrorResponse {
            error: code.to_owned(),
            message: err.to_string(),
        }),
    )
        .into_response()
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: "bad_request".to_owned(),
            message: message.to_owned(),
        }),
    )
        .into_response()
}

/// Issue a new login session and its QR payload.
#[utoipa::path(
    post,
    path = "/v1/auth/session",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = CreateSessionResponse),
        (status = 400, description = "Missing application name or return URL", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse),
    ),
    tag = "session"
)]
#[instrument(skip_all)]
pub async fn create_session(
    config: Extension<Arc<ApiConfig>>,
    store: Extension<Arc<SessionStore>>,
    Json(payload): Json<CreateSessionRequest>,
) -> Response {
    if payload.app_name.trim().is_empty() {
        return bad_request("appName must not be empty");
    }
    if payload.return_url.trim().is_empty() {
        return bad_request("returnUrl must not be empty");
    }

    let issued = match store
        .create(ClientMeta {
            app_name: payload.app_name,
            return_url: payload.return_url,
        })
        .await
    {
        Ok(issued) => issued,
        Err(err) => return error_response(&err),
    };

    let qr_data = match qr::payload(config.base_url(), &issued.session_id, &issued.challenge) {
        Ok(qr_data) => qr_data,
        Err(_) => return error_response(&SessionError::StoreUnavailable),
    };

    (
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: issued.session_id,
            challenge: issued.challenge,
            qr_data,
            status: Status::Waiting,
            expires_in: issued.expires_in,
            expires_at: issued.expires_at,
        }),
    )
        .into_response()
}

/// Current session snapshot, for polling clients.
#[utoipa::path(
    get,
    path = "/v1/auth/session/{id}",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session snapshot", body = SessionSnapshot),
        (status = 404, description = "Unknown session", body = ErrorResponse),
    ),
    tag = "session"
)]
#[instrument(skip(store))]
pub async fn get_session(
    store: Extension<Arc<SessionStore>>,
    Path(id): Path<String>,
) -> Response {
    match store.snapshot(&id).await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(err) => error_response(&err),
    }
}

/// Informational scan report from the device.
#[utoipa::path(
    post,
    path = "/v1/auth/session/{id}/scan",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Scan recorded", body = SessionSnapshot),
        (status = 404, description = "Unknown session", body = ErrorResponse),
        (status = 409, description = "Session already decided", body = ErrorResponse),
        (status = 410, description = "Session expired", body = ErrorResponse),
    ),
    tag = "session"
)]
#[instrument(skip(store))]
pub async fn scan_session(
    store: Extension<Arc<SessionStore>>,
    Path(id): Path<String>,
) -> Response {
    match store.mark_scanned(&id).await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(err) => error_response(&err),
    }
}

/// Apply a signed device decision to the session.
#[utoipa::path(
    post,
    path = "/v1/auth/session/{id}/approve",
    params(("id" = String, Path, description = "Session id")),
    request_body = ApproveSessionRequest,
    responses(
        (status = 200, description = "Decision applied", body = SessionSnapshot),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 401, description = "Signature rejected", body = ErrorResponse),
        (status = 404, description = "Unknown session", body = ErrorResponse),
        (status = 409, description = "Illegal transition", body = ErrorResponse),
        (status = 410, description = "Session expired", body = ErrorResponse),
    ),
    tag = "session"
)]
#[instrument(skip(store, verifier, payload))]
pub async fn approve_session(
    store: Extension<Arc<SessionStore>>,
    verifier: Extension<Arc<dyn SignatureVerifier>>,
    Path(id): Path<String>,
    Json(payload): Json<ApproveSessionRequest>,
) -> Response {
    if payload.user_id.trim().is_empty() {
        return bad_request("userId must not be empty");
    }
    if payload.username.trim().is_empty() {
        return bad_request("username must not be empty");
    }

    let signature = match Base64UrlUnpadded::decode_vec(&payload.signed_challenge) {
        Ok(signature) => signature,
        Err(_) => return bad_request("signedChallenge is not valid base64url"),
    };

    match store
        .apply_decision(
            &id,
            payload.decision,
            &payload.user_id,
            &payload.username,
            &signature,
            verifier.0.as_ref(),
        )
        .await
    {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(err) => error_response(&err),
    }
}
