use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use url::Url;

use crate::api::{self, ApiConfig};
use crate::cli::actions::Action;
use crate::session::{SessionStore, SystemClock};
use crate::verify::{Ed25519Verifier, InsecureVerifier, SignatureVerifier};

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    let Action::Server {
        port,
        base_url,
        frontend_url,
        session_ttl,
        retention,
        verifier_keys,
        insecure_verifier,
    } = action;

    let base_url = Url::parse(&base_url)
        .with_context(|| format!("invalid base URL: {base_url}"))?;

    let config = Arc::new(ApiConfig::new(base_url, frontend_url));

    let store = Arc::new(SessionStore::new(
        Arc::new(SystemClock),
        session_ttl,
        retention,
    ));

    let verifier: Arc<dyn SignatureVerifier> = match verifier_keys {
        Some(path) => {
            let verifier = Ed25519Verifier::from_key_file(&path)?;
            info!(keys = verifier.len(), "loaded verifier keys");
            Arc::new(verifier)
        }
        None => {
            debug_assert!(insecure_verifier);
            warn!("running with the insecure verifier, signatures are NOT checked");
            Arc::new(InsecureVerifier)
        }
    };

    api::new(port, config, store, verifier).await?;

    Ok(())
}
