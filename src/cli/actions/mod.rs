pub mod server;

use std::path::PathBuf;

/// What the CLI resolved to do.
#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        base_url: String,
        frontend_url: String,
        session_ttl: i64,
        retention: i64,
        verifier_keys: Option<PathBuf>,
        insecure_verifier: bool,
    },
}
