//! Challenge signature verification.
//!
//! The approval endpoint proves possession of a registered device key by
//! verifying an Ed25519 signature over the session challenge. Key
//! registration and rotation happen outside this service; the verifier only
//! consumes a static key file.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use ed25519_dalek::{Signature, VerifyingKey, PUBLIC_KEY_LENGTH};
use tracing::warn;

/// Verifies that `signature` over `challenge` was produced by the device key
/// registered for `identity`.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, identity: &str, challenge: &str, signature: &[u8]) -> bool;
}

/// Ed25519 verifier over a static identity → public key registry.
pub struct Ed25519Verifier {
    keys: HashMap<String, VerifyingKey>,
}

impl Ed25519Verifier {
    #[must_use]
    pub fn new(keys: HashMap<String, VerifyingKey>) -> Self {
        Self { keys }
    }

    /// Load the registry from a JSON file mapping identity to a base64url
    /// encoded 32-byte Ed25519 public key.
    pub fn from_key_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read key file {}", path.display()))?;
        let encoded: HashMap<String, String> =
            serde_json::from_str(&raw).context("key file is not a JSON map")?;

        let mut keys = HashMap::with_capacity(encoded.len());
        for (identity, key_b64) in encoded {
            let bytes = Base64UrlUnpadded::decode_vec(&key_b64)
                .with_context(|| format!("key for {identity} is not valid base64url"))?;
            let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes
                .try_into()
                .map_err(|_| anyhow!("key for {identity} is not {PUBLIC_KEY_LENGTH} bytes"))?;
            let key = VerifyingKey::from_bytes(&bytes)
                .with_context(|| format!("key for {identity} is not a valid Ed25519 key"))?;
            keys.insert(identity, key);
        }

        Ok(Self::new(keys))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, identity: &str, challenge: &str, signature: &[u8]) -> bool {
        let Some(key) = self.keys.get(identity) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify_strict(challenge.as_bytes(), &signature).is_ok()
    }
}

/// Accepts every signature. Development and tests only, behind an explicit
/// opt-in flag.
pub struct InsecureVerifier;

impl SignatureVerifier for InsecureVerifier {
    fn verify(&self, identity: &str, _challenge: &str, _signature: &[u8]) -> bool {
        warn!(identity, "insecure verifier accepted signature without checking");
        true
    }
}
