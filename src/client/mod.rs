//! Client-side login flow: session creation, QR rendering, status polling
//! and credential persistence.

mod persist;
mod poller;

pub use persist::{CredentialSink, SessionCredentials, COOKIE_SYNC_PATH};
pub use poller::{
    FlowConfig, FlowOutcome, LoginFlow, DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT,
};

use thiserror::Error;

/// Failures surfaced by the login flow.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("failed to persist credentials: {0}")]
    Persist(#[from] std::io::Error),

    #[error("protocol violation: {0}")]
    Protocol(String),
}
