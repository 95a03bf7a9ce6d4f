//! QR payload for the login handshake.
//!
//! The payload is a URL in a private scheme so authenticator apps can claim
//! it: `sesamo://v1/login?session=<id>&challenge=<challenge>&server=<base>`.
//! The challenge appears here and nowhere else after session creation.

use anyhow::{anyhow, Context, Result};
use url::Url;

pub const QR_SCHEME: &str = "sesamo";
pub const QR_VERSION_HOST: &str = "v1";
pub const QR_PATH: &str = "/login";

/// Build the QR payload for a freshly issued session.
pub fn payload(server: &Url, session_id: &str, challenge: &str) -> Result<String> {
    let url = Url::parse_with_params(
        &format!("{QR_SCHEME}://{QR_VERSION_HOST}{QR_PATH}"),
        [
            ("session", session_id),
            ("challenge", challenge),
            ("server", server.as_str()),
        ],
    )
    .context("failed to build QR payload URL")?;
    Ok(url.into())
}

/// Parsed QR payload, as an authenticator app sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrPayload {
    pub session_id: String,
    pub challenge: String,
    pub server: Url,
}

impl QrPayload {
    /// Parse and validate a scanned payload.
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).context("QR payload is not a valid URL")?;

        if url.scheme() != QR_SCHEME {
            return Err(anyhow!("unexpected QR scheme: {}", url.scheme()));
        }

        if url.host_str() != Some(QR_VERSION_HOST) {
            return Err(anyhow!("unsupported QR payload version"));
        }

        let mut session_id = None;
        let mut challenge = None;
        let mut server = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "session" => session_id = Some(value.into_owned()),
                "challenge" => challenge = Some(value.into_owned()),
                "server" => server = Some(value.into_owned()),
                _ => {}
            }
        }

        let session_id = session_id.ok_or_else(|| anyhow!("QR payload missing session"))?;
        let challenge = challenge.ok_or_else(|| anyhow!("QR payload missing challenge"))?;
        let server = server.ok_or_else(|| anyhow!("QR payload missing server"))?;
        let server = Url::parse(&server).context("QR payload server is not a valid URL")?;

        Ok(Self {
            session_id,
            challenge,
            server,
        })
    }
}
