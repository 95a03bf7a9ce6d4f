use thiserror::Error;

use crate::session::Status;

/// Protocol-level failures surfaced by the session store.
///
/// Each variant maps to one HTTP status in the API layer, so callers can
/// distinguish "retry later" from "give up" without string matching.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session store unavailable")]
    StoreUnavailable,

    #[error("session not found")]
    SessionNotFound,

    #[error("session expired")]
    SessionExpired,

    #[error("signature verification failed for {identity}")]
    SignatureInvalid { identity: String },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: Status, to: Status },
}
