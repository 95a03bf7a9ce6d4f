//! Credential persistence with two sinks kept in step: a local JSON file and
//! the server's same-origin cookie sync endpoint.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use crate::client::ClientError;

pub const COOKIE_SYNC_PATH: &str = "/api/auth/session";

/// Credentials captured from an approved session.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionCredentials {
    pub session_token: String,
    pub user_id: String,
    pub username: String,
    pub expires_at: i64,
}

impl SessionCredentials {
    #[must_use]
    pub const fn is_valid_at(&self, now_unix: i64) -> bool {
        now_unix < self.expires_at
    }
}

/// Writes credentials to both sinks; clearing wipes both together.
pub struct CredentialSink {
    http: reqwest::Client,
    server: Url,
    path: PathBuf,
}

impl CredentialSink {
    #[must_use]
    pub fn new(http: reqwest::Client, server: Url, path: PathBuf) -> Self {
        Self { http, server, path }
    }

    fn sync_url(&self) -> Result<Url, ClientError> {
        self.server
            .join(COOKIE_SYNC_PATH)
            .map_err(|err| ClientError::Protocol(format!("invalid cookie sync URL: {err}")))
    }

    /// Persist to the local file first, then sync the cookie. A cookie sync
    /// failure leaves the file in place and surfaces the error so the caller
    /// can retry.
    pub async fn persist(&self, credentials: &SessionCredentials) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(credentials)
            .map_err(|err| ClientError::Protocol(format!("credentials not serializable: {err}")))?;
        tokio::fs::write(&self.path, body).await?;
        debug!(path = %self.path.display(), "credentials written");

        let response = self
            .http
            .post(self.sync_url()?)
            .json(&json!({
                "sessionToken": credentials.session_token,
                "expiresAt": credentials.expires_at,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::Server {
                status: response.status().as_u16(),
                message: "cookie sync rejected".to_owned(),
            });
        }

        Ok(())
    }

    /// Remove the credentials file and clear the cookie.
    pub async fn clear(&self) -> Result<(), ClientError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let response = self.http.delete(self.sync_url()?).send().await?;
        if !response.status().is_success() {
            warn!(status = %response.status(), "cookie clear rejected");
        }

        Ok(())
    }

    /// Load cached credentials. Corrupt or missing files read as absent.
    pub async fn load(&self) -> Option<SessionCredentials> {
        let raw = tokio::fs::read_to_string(&self.path).await.ok()?;
        serde_json::from_str(&raw).ok()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
