//! The interactive login flow: create a session, render the QR to the
//! terminal, poll for a decision, persist credentials once approved.

use std::path::PathBuf;
use std::time::Duration;

use qrcode::render::unicode;
use qrcode::QrCode;
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::client::persist::{CredentialSink, SessionCredentials};
use crate::client::ClientError;
use crate::session::{SessionSnapshot, Status};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Flow parameters, builder-style.
#[derive(Clone, Debug)]
pub struct FlowConfig {
    pub server_url: Url,
    pub app_name: String,
    pub return_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl FlowConfig {
    #[must_use]
    pub fn new(server_url: Url, app_name: String, return_url: String) -> Self {
        Self {
            server_url,
            app_name,
            return_url,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// How the flow ended. The loop returns on the first terminal status and
/// `Approved` carries the redirect target by value, so consuming the outcome
/// is what bounds the flow to a single redirect.
#[derive(Debug)]
pub enum FlowOutcome {
    Approved {
        return_url: String,
        credentials: SessionCredentials,
    },
    Rejected,
    Expired,
    Cancelled,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedSession {
    session_id: String,
    qr_data: String,
    expires_in: i64,
}

pub struct LoginFlow {
    http: reqwest::Client,
    config: FlowConfig,
    sink: CredentialSink,
    cancel: CancellationToken,
}

impl LoginFlow {
    pub fn new(config: FlowConfig, credentials_path: PathBuf) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(crate::APP_USER_AGENT)
            .build()?;
        let sink = CredentialSink::new(http.clone(), config.server_url.clone(), credentials_path);
        Ok(Self {
            http,
            config,
            sink,
            cancel: CancellationToken::new(),
        })
    }

    /// Token to tear the poll loop down from another task.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cached credentials, if any.
    pub async fn credentials(&self) -> Option<SessionCredentials> {
        self.sink.load().await
    }

    /// Log out: clear the credentials file and the session cookie.
    pub async fn clear_session(&self) -> Result<(), ClientError> {
        self.sink.clear().await
    }

    /// Run the flow to completion, rendering the QR to the terminal.
    pub async fn run(&self) -> Result<FlowOutcome, ClientError> {
        self.run_with(render_qr).await
    }

    /// Run the flow with a custom presenter for the QR payload.
    pub async fn run_with(
        &self,
        present_qr: impl FnOnce(&str),
    ) -> Result<FlowOutcome, ClientError> {
        let created = self.create_session().await?;
        present_qr(&created.qr_data);

        // Local deadline independent of server responsiveness: even if the
        // server hangs, the flow stops when the session would have expired.
        let deadline = Instant::now()
            + Duration::from_secs(u64::try_from(created.expires_in.max(0)).unwrap_or(0));

        let mut last_rank = Status::Waiting.rank();
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return Ok(FlowOutcome::Cancelled),
                () = tokio::time::sleep_until(deadline) => return Ok(FlowOutcome::Expired),
                _ = ticker.tick() => {}
            }

            let snapshot = tokio::select! {
                () = self.cancel.cancelled() => return Ok(FlowOutcome::Cancelled),
                () = tokio::time::sleep_until(deadline) => return Ok(FlowOutcome::Expired),
                result = self.poll_status(&created.session_id) => result,
            };

            let snapshot = match snapshot {
                Ok(snapshot) => snapshot,
                // Purged server-side: indistinguishable from expiry.
                Err(ClientError::Server { status: 404 | 410, .. }) => {
                    return Ok(FlowOutcome::Expired)
                }
                Err(ClientError::Network(err)) => {
                    debug!("poll failed, retrying next tick: {err}");
                    continue;
                }
                Err(ClientError::Server { status, message }) if status >= 500 => {
                    debug!("server error {status} ({message}), retrying next tick");
                    continue;
                }
                Err(err) => return Err(err),
            };

            // Out-of-order observation, e.g. a stale response racing a newer
            // one. Ignore it rather than regress.
            if snapshot.status.rank() < last_rank {
                warn!(status = %snapshot.status, "ignoring out-of-order status");
                continue;
            }
            last_rank = snapshot.status.rank();

            match snapshot.status {
                Status::Waiting | Status::Scanned => {}
                Status::Approved => {
                    let credentials = extract_credentials(&snapshot)?;
                    self.sink.persist(&credentials).await?;
                    return Ok(FlowOutcome::Approved {
                        return_url: self.config.return_url.clone(),
                        credentials,
                    });
                }
                Status::Rejected => return Ok(FlowOutcome::Rejected),
                Status::Expired => return Ok(FlowOutcome::Expired),
            }
        }
    }

    async fn create_session(&self) -> Result<CreatedSession, ClientError> {
        let url = join(&self.config.server_url, "/v1/auth/session")?;
        let response = self
            .http
            .post(url)
            .json(&json!({
                "appName": self.config.app_name,
                "returnUrl": self.config.return_url,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::Server {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.json().await?)
    }

    async fn poll_status(&self, session_id: &str) -> Result<SessionSnapshot, ClientError> {
        let url = join(
            &self.config.server_url,
            &format!("/v1/auth/session/{session_id}"),
        )?;
        let response = self.http.get(url).send().await?;

        if !response.status().is_success() {
            return Err(ClientError::Server {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.json().await?)
    }
}

fn join(base: &Url, path: &str) -> Result<Url, ClientError> {
    base.join(path)
        .map_err(|err| ClientError::Protocol(format!("invalid URL path {path}: {err}")))
}

/// An approved snapshot must carry the full credential set.
fn extract_credentials(snapshot: &SessionSnapshot) -> Result<SessionCredentials, ClientError> {
    let session_token = snapshot
        .session_token
        .clone()
        .ok_or_else(|| ClientError::Protocol("approved session without token".into()))?;
    let user_id = snapshot
        .user_id
        .clone()
        .ok_or_else(|| ClientError::Protocol("approved session without userId".into()))?;
    let username = snapshot
        .username
        .clone()
        .ok_or_else(|| ClientError::Protocol("approved session without username".into()))?;

    Ok(SessionCredentials {
        session_token,
        user_id,
        username,
        expires_at: snapshot.expires_at,
    })
}

fn render_qr(qr_data: &str) {
    match QrCode::new(qr_data) {
        Ok(code) => {
            let rendered = code
                .render::<unicode::Dense1x2>()
                .quiet_zone(true)
                .build();
            println!("{rendered}");
            println!("Scan with your authenticator app, or open: {qr_data}");
        }
        Err(err) => {
            warn!("QR rendering failed: {err}");
            println!("Open this link with your authenticator app: {qr_data}");
        }
    }
}
