//! Core domain for the QR login handshake: session records, the status state
//! machine, the in-memory store, token generation and the QR payload.

pub mod clock;
mod error;
mod model;
pub mod qr;
mod status;
mod store;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::SessionError;
pub use model::{ClientMeta, Decision, IssuedSession, Session, SessionSnapshot};
pub use status::Status;
pub use store::{
    SessionStore, DEFAULT_GC_INTERVAL, DEFAULT_RETENTION_SECONDS, DEFAULT_TTL_SECONDS,
};
