//! In-memory session table with per-session locking.
//!
//! The outer mutex only resolves the map entry; every state transition runs
//! under the per-session lock, so a transition is a compare-and-swap against
//! the status observed inside the critical section. The GC sweep takes the
//! same lock (via `try_lock`), so it can never evict a session mid-approval.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::session::{
    token, ClientMeta, Clock, Decision, IssuedSession, Session, SessionError, SessionSnapshot,
    Status,
};
use crate::verify::SignatureVerifier;

pub const DEFAULT_TTL_SECONDS: i64 = 300;
pub const DEFAULT_RETENTION_SECONDS: i64 = 600;
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(60);

type SharedSession = Arc<Mutex<Session>>;

pub struct SessionStore {
    clock: Arc<dyn Clock>,
    ttl_seconds: i64,
    retention_seconds: i64,
    sessions: Mutex<HashMap<String, SharedSession>>,
}

impl SessionStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, ttl_seconds: i64, retention_seconds: i64) -> Self {
        Self {
            clock,
            ttl_seconds,
            retention_seconds,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    /// Store time, for callers deriving relative lifetimes from `expires_at`.
    #[must_use]
    pub fn now_unix(&self) -> i64 {
        self.clock.now_unix()
    }

    /// Issue a new `waiting` session bound to the caller's metadata.
    ///
    /// Id and challenge are independent CSPRNG draws; entropy failure maps to
    /// `StoreUnavailable` rather than producing a weak identifier.
    pub async fn create(&self, client_meta: ClientMeta) -> Result<IssuedSession, SessionError> {
        let id = token::generate_session_id().map_err(|err| {
            warn!("session id generation failed: {err:#}");
            SessionError::StoreUnavailable
        })?;
        let challenge = token::generate_challenge().map_err(|err| {
            warn!("challenge generation failed: {err:#}");
            SessionError::StoreUnavailable
        })?;

        let now = self.clock.now_unix();
        let expires_at = now + self.ttl_seconds;
        let session = Session {
            id: id.clone(),
            challenge: challenge.clone(),
            status: Status::Waiting,
            created_at: now,
            expires_at,
            approved_at: None,
            terminal_at: None,
            client_meta,
            session_token: None,
            user_id: None,
            username: None,
        };

        let mut sessions = self.sessions.lock().await;
        sessions.insert(id.clone(), Arc::new(Mutex::new(session)));
        debug!(session_id = %id, expires_at, "session created");

        Ok(IssuedSession {
            session_id: id,
            challenge,
            expires_at,
            expires_in: self.ttl_seconds,
        })
    }

    async fn entry(&self, session_id: &str) -> Result<SharedSession, SessionError> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or(SessionError::SessionNotFound)
    }

    /// Lazy expiry: flip to `expired` if the deadline passed. Must be called
    /// under the per-session lock, before any read or transition.
    fn expire_if_due(&self, session: &mut Session) {
        if !session.status.is_terminal() && self.clock.now_unix() > session.expires_at {
            session.status = Status::Expired;
            session.terminal_at = Some(self.clock.now_unix());
            debug!(session_id = %session.id, "session expired lazily");
        }
    }

    /// Current snapshot. Read-only apart from lazy expiry.
    pub async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, SessionError> {
        let entry = self.entry(session_id).await?;
        let mut session = entry.lock().await;
        self.expire_if_due(&mut session);
        Ok(session.snapshot())
    }

    /// Informational `waiting → scanned` transition. Idempotent when already
    /// scanned, since a device may retry the report.
    pub async fn mark_scanned(&self, session_id: &str) -> Result<SessionSnapshot, SessionError> {
        let entry = self.entry(session_id).await?;
        let mut session = entry.lock().await;
        self.expire_if_due(&mut session);

        match session.status {
            Status::Waiting => {
                session.status = Status::Scanned;
                Ok(session.snapshot())
            }
            Status::Scanned => Ok(session.snapshot()),
            Status::Expired => Err(SessionError::SessionExpired),
            from => Err(SessionError::InvalidTransition {
                from,
                to: Status::Scanned,
            }),
        }
    }

    /// Apply a device decision: verify the signature, then CAS the
    /// transition. On approve the session token is minted and the identity
    /// bound inside the same critical section, so a concurrent status read
    /// can never observe `approved` without its token.
    pub async fn apply_decision(
        &self,
        session_id: &str,
        decision: Decision,
        user_id: &str,
        username: &str,
        signature: &[u8],
        verifier: &dyn SignatureVerifier,
    ) -> Result<SessionSnapshot, SessionError> {
        let entry = self.entry(session_id).await?;
        let mut session = entry.lock().await;

        // Expiry wins over any competing transition.
        self.expire_if_due(&mut session);
        if session.status == Status::Expired {
            return Err(SessionError::SessionExpired);
        }

        if !verifier.verify(user_id, &session.challenge, signature) {
            warn!(session_id = %session.id, user_id, "challenge signature rejected");
            return Err(SessionError::SignatureInvalid {
                identity: user_id.to_owned(),
            });
        }

        let now = self.clock.now_unix();
        match (decision, session.status) {
            (Decision::Approve, Status::Waiting | Status::Scanned) => {
                let session_token = token::generate_session_token().map_err(|err| {
                    warn!("session token generation failed: {err:#}");
                    SessionError::StoreUnavailable
                })?;
                session.status = Status::Approved;
                session.session_token = Some(session_token);
                session.user_id = Some(user_id.to_owned());
                session.username = Some(username.to_owned());
                session.approved_at = Some(now);
                session.terminal_at = Some(now);
                info!(session_id = %session.id, user_id, "session approved");
                Ok(session.snapshot())
            }
            // Replay of an already-applied approval gets the same snapshot
            // back, but only for the identity that approved; anyone else is
            // an illegal transition, not a token handout.
            (Decision::Approve, Status::Approved) => {
                if session.user_id.as_deref() == Some(user_id) {
                    Ok(session.snapshot())
                } else {
                    Err(SessionError::InvalidTransition {
                        from: Status::Approved,
                        to: Status::Approved,
                    })
                }
            }
            (Decision::Reject, Status::Waiting | Status::Scanned) => {
                session.status = Status::Rejected;
                session.terminal_at = Some(now);
                info!(session_id = %session.id, user_id, "session rejected");
                Ok(session.snapshot())
            }
            (Decision::Reject, Status::Rejected) => Ok(session.snapshot()),
            (decision, from) => Err(SessionError::InvalidTransition {
                from,
                to: match decision {
                    Decision::Approve => Status::Approved,
                    Decision::Reject => Status::Rejected,
                },
            }),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// One GC pass: expire overdue sessions, drop terminal ones past the
    /// retention window. Sessions whose lock is held are skipped and picked
    /// up on the next sweep.
    pub async fn gc_sweep(&self) {
        let now = self.clock.now_unix();
        let retention = self.retention_seconds;
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();

        sessions.retain(|_, entry| {
            let Ok(mut session) = entry.try_lock() else {
                return true;
            };
            if !session.status.is_terminal() && now > session.expires_at {
                session.status = Status::Expired;
                session.terminal_at = Some(now);
            }
            match session.terminal_at {
                Some(terminal_at) => now - terminal_at <= retention,
                None => true,
            }
        });

        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, remaining = sessions.len(), "session GC sweep");
        }
    }

    /// Periodic GC task, torn down through the cancellation token.
    pub fn spawn_gc(
        store: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        debug!("session GC task stopping");
                        return;
                    }
                    _ = ticker.tick() => store.gc_sweep().await,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ManualClock;

    /// Verifier accepting one fixed signature, for store-level tests.
    struct FixedVerifier;

    impl SignatureVerifier for FixedVerifier {
        fn verify(&self, _identity: &str, _challenge: &str, signature: &[u8]) -> bool {
            signature == b"good"
        }
    }

    fn meta() -> ClientMeta {
        ClientMeta {
            app_name: "demo".into(),
            return_url: "https://app.test/done".into(),
        }
    }

    fn store_at(now: i64) -> (Arc<SessionStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        let store = Arc::new(SessionStore::new(
            clock.clone(),
            DEFAULT_TTL_SECONDS,
            DEFAULT_RETENTION_SECONDS,
        ));
        (store, clock)
    }

    #[tokio::test]
    async fn create_issues_waiting_session() -> anyhow::Result<()> {
        let (store, _) = store_at(1_000);
        let issued = store.create(meta()).await?;

        assert!(issued.session_id.starts_with("qrs_"));
        assert_eq!(issued.expires_at, 1_000 + DEFAULT_TTL_SECONDS);
        assert_eq!(issued.expires_in, DEFAULT_TTL_SECONDS);

        let snapshot = store.snapshot(&issued.session_id).await?;
        assert_eq!(snapshot.status, Status::Waiting);
        assert!(snapshot.session_token.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn id_and_challenge_are_independent() -> anyhow::Result<()> {
        let (store, _) = store_at(1_000);
        let issued = store.create(meta()).await?;
        assert_ne!(issued.session_id, issued.challenge);
        assert!(!issued.session_id.contains(&issued.challenge));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let (store, _) = store_at(1_000);
        assert_eq!(
            store.snapshot("qrs_missing").await,
            Err(SessionError::SessionNotFound)
        );
    }

    #[tokio::test]
    async fn approve_mints_token_and_binds_identity() -> anyhow::Result<()> {
        let (store, _) = store_at(1_000);
        let issued = store.create(meta()).await?;

        let snapshot = store
            .apply_decision(
                &issued.session_id,
                Decision::Approve,
                "usr_1",
                "alice",
                b"good",
                &FixedVerifier,
            )
            .await?;

        assert_eq!(snapshot.status, Status::Approved);
        let token = snapshot.session_token.as_deref().unwrap_or_default();
        assert!(token.starts_with("tok_"));
        assert_ne!(token, issued.challenge);
        assert_eq!(snapshot.user_id.as_deref(), Some("usr_1"));
        assert_eq!(snapshot.username.as_deref(), Some("alice"));
        assert_eq!(snapshot.approved_at, Some(1_000));
        Ok(())
    }

    #[tokio::test]
    async fn approve_replay_is_idempotent() -> anyhow::Result<()> {
        let (store, _) = store_at(1_000);
        let issued = store.create(meta()).await?;

        let first = store
            .apply_decision(
                &issued.session_id,
                Decision::Approve,
                "usr_1",
                "alice",
                b"good",
                &FixedVerifier,
            )
            .await?;
        let second = store
            .apply_decision(
                &issued.session_id,
                Decision::Approve,
                "usr_1",
                "alice",
                b"good",
                &FixedVerifier,
            )
            .await?;

        assert_eq!(first.session_token, second.session_token);
        assert_eq!(first.approved_at, second.approved_at);
        Ok(())
    }

    #[tokio::test]
    async fn approve_replay_by_another_identity_is_refused() -> anyhow::Result<()> {
        let (store, _) = store_at(1_000);
        let issued = store.create(meta()).await?;

        let first = store
            .apply_decision(
                &issued.session_id,
                Decision::Approve,
                "usr_1",
                "alice",
                b"good",
                &FixedVerifier,
            )
            .await?;

        let err = store
            .apply_decision(
                &issued.session_id,
                Decision::Approve,
                "usr_2",
                "mallory",
                b"good",
                &FixedVerifier,
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidTransition {
                from: Status::Approved,
                to: Status::Approved,
            }
        );

        // The original approval is untouched.
        let snapshot = store.snapshot(&issued.session_id).await?;
        assert_eq!(snapshot.user_id.as_deref(), Some("usr_1"));
        assert_eq!(snapshot.session_token, first.session_token);
        Ok(())
    }

    #[tokio::test]
    async fn reject_after_approve_is_invalid_and_keeps_token() -> anyhow::Result<()> {
        let (store, _) = store_at(1_000);
        let issued = store.create(meta()).await?;

        store
            .apply_decision(
                &issued.session_id,
                Decision::Approve,
                "usr_1",
                "alice",
                b"good",
                &FixedVerifier,
            )
            .await?;

        let err = store
            .apply_decision(
                &issued.session_id,
                Decision::Reject,
                "usr_1",
                "alice",
                b"good",
                &FixedVerifier,
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidTransition {
                from: Status::Approved,
                to: Status::Rejected,
            }
        );

        let snapshot = store.snapshot(&issued.session_id).await?;
        assert_eq!(snapshot.status, Status::Approved);
        assert!(snapshot.session_token.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_and_state_untouched() -> anyhow::Result<()> {
        let (store, _) = store_at(1_000);
        let issued = store.create(meta()).await?;

        let err = store
            .apply_decision(
                &issued.session_id,
                Decision::Approve,
                "usr_1",
                "alice",
                b"evil",
                &FixedVerifier,
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::SignatureInvalid {
                identity: "usr_1".into()
            }
        );

        let snapshot = store.snapshot(&issued.session_id).await?;
        assert_eq!(snapshot.status, Status::Waiting);
        assert!(snapshot.session_token.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn expiry_wins_over_late_approval() -> anyhow::Result<()> {
        let (store, clock) = store_at(1_000);
        let issued = store.create(meta()).await?;

        clock.advance(DEFAULT_TTL_SECONDS + 1);

        let err = store
            .apply_decision(
                &issued.session_id,
                Decision::Approve,
                "usr_1",
                "alice",
                b"good",
                &FixedVerifier,
            )
            .await
            .unwrap_err();
        assert_eq!(err, SessionError::SessionExpired);

        let snapshot = store.snapshot(&issued.session_id).await?;
        assert_eq!(snapshot.status, Status::Expired);
        assert!(snapshot.session_token.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn expiry_is_lazy_on_read() -> anyhow::Result<()> {
        let (store, clock) = store_at(1_000);
        let issued = store.create(meta()).await?;

        clock.advance(DEFAULT_TTL_SECONDS);
        assert_eq!(
            store.snapshot(&issued.session_id).await?.status,
            Status::Waiting
        );

        clock.advance(1);
        assert_eq!(
            store.snapshot(&issued.session_id).await?.status,
            Status::Expired
        );
        Ok(())
    }

    #[tokio::test]
    async fn scan_is_informational_and_idempotent() -> anyhow::Result<()> {
        let (store, _) = store_at(1_000);
        let issued = store.create(meta()).await?;

        assert_eq!(
            store.mark_scanned(&issued.session_id).await?.status,
            Status::Scanned
        );
        assert_eq!(
            store.mark_scanned(&issued.session_id).await?.status,
            Status::Scanned
        );
        Ok(())
    }

    #[tokio::test]
    async fn approve_skipping_scan_is_legal() -> anyhow::Result<()> {
        let (store, _) = store_at(1_000);
        let issued = store.create(meta()).await?;

        let snapshot = store
            .apply_decision(
                &issued.session_id,
                Decision::Approve,
                "usr_1",
                "alice",
                b"good",
                &FixedVerifier,
            )
            .await?;
        assert_eq!(snapshot.status, Status::Approved);
        Ok(())
    }

    #[tokio::test]
    async fn sessions_are_isolated() -> anyhow::Result<()> {
        let (store, _) = store_at(1_000);
        let first = store.create(meta()).await?;
        let second = store.create(meta()).await?;

        store
            .apply_decision(
                &first.session_id,
                Decision::Approve,
                "usr_1",
                "alice",
                b"good",
                &FixedVerifier,
            )
            .await?;

        let snapshot = store.snapshot(&second.session_id).await?;
        assert_eq!(snapshot.status, Status::Waiting);
        assert!(snapshot.session_token.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn gc_removes_terminal_sessions_past_retention() -> anyhow::Result<()> {
        let (store, clock) = store_at(1_000);
        let rejected = store.create(meta()).await?;
        let live = store.create(meta()).await?;

        store
            .apply_decision(
                &rejected.session_id,
                Decision::Reject,
                "usr_1",
                "alice",
                b"good",
                &FixedVerifier,
            )
            .await?;

        clock.advance(DEFAULT_RETENTION_SECONDS + 1);
        store.gc_sweep().await;

        assert_eq!(
            store.snapshot(&rejected.session_id).await,
            Err(SessionError::SessionNotFound)
        );
        // The live session expired meanwhile but stays within retention.
        assert_eq!(
            store.snapshot(&live.session_id).await?.status,
            Status::Expired
        );
        Ok(())
    }

    #[tokio::test]
    async fn gc_keeps_fresh_sessions() -> anyhow::Result<()> {
        let (store, _) = store_at(1_000);
        let issued = store.create(meta()).await?;

        store.gc_sweep().await;
        assert_eq!(store.len().await, 1);
        assert!(store.snapshot(&issued.session_id).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_decisions_settle_on_one_terminal_state() -> anyhow::Result<()> {
        let (store, _) = store_at(1_000);
        let issued = store.create(meta()).await?;

        let approve = {
            let store = store.clone();
            let id = issued.session_id.clone();
            tokio::spawn(async move {
                store
                    .apply_decision(&id, Decision::Approve, "usr_1", "alice", b"good", &FixedVerifier)
                    .await
            })
        };
        let reject = {
            let store = store.clone();
            let id = issued.session_id.clone();
            tokio::spawn(async move {
                store
                    .apply_decision(&id, Decision::Reject, "usr_1", "alice", b"good", &FixedVerifier)
                    .await
            })
        };

        let approve = approve.await?;
        let reject = reject.await?;
        // Exactly one decision lands; the loser sees InvalidTransition.
        assert!(approve.is_ok() != reject.is_ok());

        let snapshot = store.snapshot(&issued.session_id).await?;
        assert!(snapshot.status.is_terminal());
        assert_eq!(
            snapshot.session_token.is_some(),
            snapshot.status == Status::Approved
        );
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_reads_never_observe_approved_without_token() -> anyhow::Result<()> {
        let (store, _) = store_at(1_000);
        let issued = store.create(meta()).await?;
        let id = issued.session_id.clone();

        let reader = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    let snapshot = store.snapshot(&id).await.expect("session present");
                    assert_eq!(
                        snapshot.session_token.is_some(),
                        snapshot.status == Status::Approved
                    );
                    tokio::task::yield_now().await;
                }
            })
        };

        store
            .apply_decision(&id, Decision::Approve, "usr_1", "alice", b"good", &FixedVerifier)
            .await?;
        reader.await?;
        Ok(())
    }
}
