//! Session record and its externally visible projection.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::session::Status;

/// Metadata the requesting application binds to the session at creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientMeta {
    pub app_name: String,
    pub return_url: String,
}

/// Device verdict submitted with a signed challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

/// Full server-side session record. Never serialized to clients; use
/// [`Session::snapshot`] for anything that leaves the process.
#[derive(Clone, Debug)]
pub struct Session {
    pub id: String,
    pub challenge: String,
    pub status: Status,
    pub created_at: i64,
    pub expires_at: i64,
    pub approved_at: Option<i64>,
    /// When the session entered a terminal state, for retention GC.
    pub terminal_at: Option<i64>,
    pub client_meta: ClientMeta,
    pub session_token: Option<String>,
    pub user_id: Option<String>,
    pub username: Option<String>,
}

impl Session {
    /// Token present iff the session is approved.
    #[must_use]
    pub fn token_invariant_holds(&self) -> bool {
        self.session_token.is_some() == (self.status == Status::Approved)
    }

    /// Client-visible projection. Carries credentials only once approved and
    /// never carries the challenge.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            status: self.status,
            expires_at: self.expires_at,
            session_token: self.session_token.clone(),
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            approved_at: self.approved_at,
        }
    }
}

/// What the status endpoint returns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub status: Status,
    pub expires_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<i64>,
}

/// What the issuer hands back on creation, before QR encoding.
#[derive(Clone, Debug)]
pub struct IssuedSession {
    pub session_id: String,
    pub challenge: String,
    pub expires_at: i64,
    pub expires_in: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiting_session() -> Session {
        Session {
            id: "qrs_test".into(),
            challenge: "secret-challenge".into(),
            status: Status::Waiting,
            created_at: 1_000,
            expires_at: 1_300,
            approved_at: None,
            terminal_at: None,
            client_meta: ClientMeta {
                app_name: "demo".into(),
                return_url: "https://app.test/done".into(),
            },
            session_token: None,
            user_id: None,
            username: None,
        }
    }

    #[test]
    fn snapshot_never_carries_challenge() -> anyhow::Result<()> {
        let session = waiting_session();
        let json = serde_json::to_string(&session.snapshot())?;
        assert!(!json.contains("secret-challenge"));
        assert!(!json.contains("challenge"));
        Ok(())
    }

    #[test]
    fn snapshot_omits_unset_optionals() -> anyhow::Result<()> {
        let session = waiting_session();
        let json = serde_json::to_string(&session.snapshot())?;
        assert!(!json.contains("sessionToken"));
        assert!(!json.contains("userId"));
        assert!(json.contains("\"status\":\"waiting\""));
        assert!(json.contains("\"sessionId\":\"qrs_test\""));
        Ok(())
    }

    #[test]
    fn token_invariant() {
        let mut session = waiting_session();
        assert!(session.token_invariant_holds());

        session.session_token = Some("tok_x".into());
        assert!(!session.token_invariant_holds());

        session.status = Status::Approved;
        assert!(session.token_invariant_holds());
    }

    #[test]
    fn decision_serializes_lowercase() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_string(&Decision::Approve)?, "\"approve\"");
        assert_eq!(
            serde_json::from_str::<Decision>("\"reject\"")?,
            Decision::Reject
        );
        Ok(())
    }
}
