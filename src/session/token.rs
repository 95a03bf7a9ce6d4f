//! Random identifiers: session ids, challenges and session tokens.
//!
//! All three are independent 32-byte draws from the OS CSPRNG, base64url
//! encoded without padding. Ids and tokens carry distinct prefixes so one can
//! never be mistaken for (or derived from) the other.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::rngs::OsRng;
use rand::RngCore;

pub const SESSION_ID_PREFIX: &str = "qrs_";
pub const SESSION_TOKEN_PREFIX: &str = "tok_";

const TOKEN_BYTES: usize = 32;

fn random_b64() -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to gather entropy from the OS")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// New session id, `qrs_` prefixed.
pub fn generate_session_id() -> Result<String> {
    Ok(format!("{SESSION_ID_PREFIX}{}", random_b64()?))
}

/// New challenge, raw base64url. Drawn independently from the session id.
pub fn generate_challenge() -> Result<String> {
    random_b64()
}

/// New session token, `tok_` prefixed. Minted only on approval.
pub fn generate_session_token() -> Result<String> {
    Ok(format!("{SESSION_TOKEN_PREFIX}{}", random_b64()?))
}
