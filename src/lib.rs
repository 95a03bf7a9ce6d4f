//! sesamo: QR-code passwordless session authentication.
//!
//! A requesting application creates a short-lived session and renders its QR
//! payload. An already-authenticated device scans the QR, signs the embedded
//! challenge and approves (or rejects) the login. The requesting application
//! polls the session status and, once approved, receives a session token it
//! syncs into an HttpOnly cookie.

pub mod api;
pub mod cli;
pub mod client;
pub mod session;
pub mod verify;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub(crate) mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub(crate) const APP_USER_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
