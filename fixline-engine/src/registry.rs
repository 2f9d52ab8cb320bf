/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Session registry.
//!
//! [`Engine`] owns every session of the process, keyed by [`SessionId`], and
//! enforces one transport per session. It is shared by handle (`Arc`); there
//! is no global state.

use fixline_core::error::SessionError;
use fixline_core::types::SessionId;
use fixline_dictionary::Dictionary;
use fixline_session::{Application, SessionConfig, SessionEngine};
use fixline_store::MessageStore;
use fixline_tagvalue::peek_header;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};
use tracing::{info, warn};

/// Shared handle to one session.
pub type SessionHandle = Arc<Mutex<SessionEngine>>;

/// What to do when a second connection arrives for a connected session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Refuse the new connection.
    #[default]
    Reject,
    /// Log out the existing connection and hand the session to the new one.
    ForceLogout,
}

/// Process-wide session supervisor.
#[derive(Debug)]
pub struct Engine {
    dictionary: Arc<Dictionary>,
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    duplicate_policy: DuplicatePolicy,
    timer_tick: Duration,
    logon_wait: Duration,
}

impl Engine {
    /// Creates an empty engine using `dictionary` for every session.
    #[must_use]
    pub fn new(dictionary: Arc<Dictionary>) -> Self {
        Self {
            dictionary,
            sessions: RwLock::new(HashMap::new()),
            duplicate_policy: DuplicatePolicy::default(),
            timer_tick: Duration::from_secs(1),
            logon_wait: Duration::from_secs(10),
        }
    }

    /// Sets the duplicate connection policy.
    #[must_use]
    pub const fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Sets how often session timers run.
    #[must_use]
    pub const fn with_timer_tick(mut self, tick: Duration) -> Self {
        self.timer_tick = tick;
        self
    }

    /// Sets how long an accepted stream may take to deliver its first message.
    #[must_use]
    pub const fn with_logon_wait(mut self, wait: Duration) -> Self {
        self.logon_wait = wait;
        self
    }

    /// Returns the duplicate connection policy.
    #[must_use]
    pub const fn duplicate_policy(&self) -> DuplicatePolicy {
        self.duplicate_policy
    }

    /// Returns the timer period.
    #[must_use]
    pub const fn timer_tick(&self) -> Duration {
        self.timer_tick
    }

    /// Returns the first-message deadline for accepted streams.
    #[must_use]
    pub const fn logon_wait(&self) -> Duration {
        self.logon_wait
    }

    /// Returns the dictionary shared by all sessions.
    #[must_use]
    pub fn dictionary(&self) -> &Arc<Dictionary> {
        &self.dictionary
    }

    /// Registers a session.
    ///
    /// # Errors
    /// `Configuration` if the configuration is invalid or the identity is
    /// already registered.
    pub async fn add_session(
        &self,
        config: SessionConfig,
        store: Arc<dyn MessageStore>,
        application: Arc<dyn Application>,
    ) -> Result<SessionHandle, SessionError> {
        let session_id = config.session_id();
        if self.sessions.read().contains_key(&session_id) {
            return Err(SessionError::Configuration(format!(
                "session {session_id} already registered"
            )));
        }
        let engine =
            SessionEngine::new(config, Arc::clone(&self.dictionary), store, application).await?;
        let handle = Arc::new(Mutex::new(engine));

        let mut sessions = self.sessions.write();
        if sessions.contains_key(&session_id) {
            return Err(SessionError::Configuration(format!(
                "session {session_id} already registered"
            )));
        }
        sessions.insert(session_id.clone(), Arc::clone(&handle));
        info!(session = %session_id, "session registered");
        Ok(handle)
    }

    /// Returns a registered session.
    #[must_use]
    pub fn session(&self, session_id: &SessionId) -> Option<SessionHandle> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Returns the registered identities.
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Unregisters a session. Its transport, if any, is left to wind down.
    pub fn remove_session(&self, session_id: &SessionId) -> Option<SessionHandle> {
        self.sessions.write().remove(session_id)
    }

    /// Finds the session an inbound frame belongs to.
    ///
    /// The counterparty's SenderCompID is our TargetCompID, so the identity
    /// is the frame's header with the CompIDs swapped.
    ///
    /// # Errors
    /// `ProtocolViolation` for a frame without a routable header,
    /// `UnknownSession` if no session matches.
    pub fn identify(&self, frame: &[u8]) -> Result<SessionHandle, SessionError> {
        let peek = peek_header(frame).map_err(|err| SessionError::ProtocolViolation {
            reason: format!("unroutable first message: {err}"),
        })?;
        let session_id =
            SessionId::from_inbound(&peek.begin_string, &peek.sender_comp_id, &peek.target_comp_id);
        if let Some(handle) = self.session(&session_id) {
            return Ok(handle);
        }
        // Sub IDs are part of the key but not of the routing header.
        self.sessions
            .read()
            .iter()
            .find(|(id, _)| {
                id.begin_string == session_id.begin_string
                    && id.sender_comp_id == session_id.sender_comp_id
                    && id.target_comp_id == session_id.target_comp_id
            })
            .map(|(_, handle)| Arc::clone(handle))
            .ok_or_else(|| SessionError::UnknownSession {
                session: session_id.to_string(),
            })
    }

    /// Attaches a transport to a locked session, applying the duplicate
    /// connection policy.
    ///
    /// # Errors
    /// `AlreadyConnected` under [`DuplicatePolicy::Reject`], or whatever
    /// [`SessionEngine::connect`] reports.
    pub async fn attach(
        &self,
        session: &mut SessionEngine,
        outbound: mpsc::UnboundedSender<bytes::Bytes>,
    ) -> Result<(), SessionError> {
        if session.state().is_connected() {
            match self.duplicate_policy {
                DuplicatePolicy::Reject => {
                    warn!(session = %session.session_id(), "duplicate connection refused");
                    return Err(SessionError::AlreadyConnected {
                        session: session.session_id().to_string(),
                    });
                }
                DuplicatePolicy::ForceLogout => {
                    warn!(session = %session.session_id(), "duplicate connection, logging out the existing one");
                    session.shutdown().await;
                }
            }
        }
        session.connect(outbound, Instant::now()).await
    }

    /// Shuts every session down.
    pub async fn shutdown(&self) {
        let handles: Vec<SessionHandle> = self.sessions.read().values().cloned().collect();
        for handle in handles {
            handle.lock().await.shutdown().await;
        }
        info!("engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixline_core::types::CompId;
    use fixline_dictionary::Version;
    use fixline_session::{NoOpApplication, SessionState};
    use fixline_store::MemoryStore;

    fn engine() -> Engine {
        Engine::new(Arc::new(Dictionary::session(Version::Fix44)))
    }

    fn config(sender: &str, target: &str) -> SessionConfig {
        SessionConfig::new(
            CompId::new(sender).unwrap(),
            CompId::new(target).unwrap(),
            "FIX.4.4",
        )
    }

    async fn register(engine: &Engine, sender: &str, target: &str) -> SessionHandle {
        engine
            .add_session(
                config(sender, target),
                Arc::new(MemoryStore::new()),
                Arc::new(NoOpApplication),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_and_lookup() {
        let engine = engine();
        register(&engine, "SERVER", "CLIENT").await;
        let id = SessionId::new("FIX.4.4", "SERVER", "CLIENT");
        assert!(engine.session(&id).is_some());
        assert_eq!(engine.session_ids(), vec![id.clone()]);
        assert!(engine.remove_session(&id).is_some());
        assert!(engine.session(&id).is_none());
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let engine = engine();
        register(&engine, "SERVER", "CLIENT").await;
        let err = engine
            .add_session(
                config("SERVER", "CLIENT"),
                Arc::new(MemoryStore::new()),
                Arc::new(NoOpApplication),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_identify_swaps_comp_ids() {
        let engine = engine();
        register(&engine, "SERVER", "CLIENT").await;
        register(&engine, "SERVER", "OTHER").await;

        let frame = b"8=FIX.4.4\x019=5\x0135=A\x0149=OTHER\x0156=SERVER\x0134=1\x0110=000\x01";
        let handle = engine.identify(frame).unwrap();
        assert_eq!(handle.lock().await.session_id().target_comp_id, "OTHER");

        let stranger = b"8=FIX.4.4\x019=5\x0135=A\x0149=NOBODY\x0156=SERVER\x0134=1\x0110=000\x01";
        assert!(matches!(
            engine.identify(stranger),
            Err(SessionError::UnknownSession { .. })
        ));
        assert!(matches!(
            engine.identify(b"garbage"),
            Err(SessionError::ProtocolViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_connection_policies() {
        let engine = engine();
        let handle = register(&engine, "SERVER", "CLIENT").await;
        let mut session = handle.lock().await;

        let (first, _rx1) = mpsc::unbounded_channel();
        engine.attach(&mut session, first).await.unwrap();
        let (second, _rx2) = mpsc::unbounded_channel();
        assert!(matches!(
            engine.attach(&mut session, second).await,
            Err(SessionError::AlreadyConnected { .. })
        ));
        drop(session);

        let engine = engine.with_duplicate_policy(DuplicatePolicy::ForceLogout);
        let mut session = handle.lock().await;
        let before = session.connection_id();
        let (third, _rx3) = mpsc::unbounded_channel();
        engine.attach(&mut session, third).await.unwrap();
        assert_eq!(session.connection_id(), before + 1);
        assert_eq!(session.state(), SessionState::LogonPending);
    }
}
