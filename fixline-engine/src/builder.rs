/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Engine builder for fluent configuration.
//!
//! This module provides a builder API for configuring FIX engines.

use crate::registry::{DuplicatePolicy, Engine};
use fixline_core::error::SessionError;
use fixline_dictionary::{Dictionary, Version};
use fixline_session::{Application, NoOpApplication, SessionConfig};
use fixline_store::{FileStore, MemoryStore, MessageStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Builder for configuring a FIX engine.
#[derive(Debug)]
pub struct EngineBuilder<A: Application = NoOpApplication> {
    /// Application callback handler.
    application: Arc<A>,
    /// Session configurations.
    sessions: Vec<SessionConfig>,
    /// Dictionary shared by all sessions.
    dictionary: Option<Arc<Dictionary>>,
    /// Directory for durable stores; in-memory stores when unset.
    store_dir: Option<PathBuf>,
    /// Duplicate connection policy.
    duplicate_policy: DuplicatePolicy,
    /// Session timer period.
    timer_tick: Duration,
    /// First-message deadline for accepted streams.
    logon_wait: Duration,
}

impl Default for EngineBuilder<NoOpApplication> {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder<NoOpApplication> {
    /// Creates a new engine builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            application: Arc::new(NoOpApplication),
            sessions: Vec::new(),
            dictionary: None,
            store_dir: None,
            duplicate_policy: DuplicatePolicy::Reject,
            timer_tick: Duration::from_secs(1),
            logon_wait: Duration::from_secs(10),
        }
    }
}

impl<A: Application + 'static> EngineBuilder<A> {
    /// Sets the application callback handler.
    #[must_use]
    pub fn with_application<B: Application>(self, application: B) -> EngineBuilder<B> {
        EngineBuilder {
            application: Arc::new(application),
            sessions: self.sessions,
            dictionary: self.dictionary,
            store_dir: self.store_dir,
            duplicate_policy: self.duplicate_policy,
            timer_tick: self.timer_tick,
            logon_wait: self.logon_wait,
        }
    }

    /// Adds a session configuration.
    #[must_use]
    pub fn add_session(mut self, config: SessionConfig) -> Self {
        self.sessions.push(config);
        self
    }

    /// Sets the dictionary. Defaults to the session dictionary of the first
    /// session's BeginString.
    #[must_use]
    pub fn with_dictionary(mut self, dictionary: Dictionary) -> Self {
        self.dictionary = Some(Arc::new(dictionary));
        self
    }

    /// Persists every session under `dir`.
    #[must_use]
    pub fn with_file_store(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    /// Sets the duplicate connection policy.
    #[must_use]
    pub const fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Sets the session timer period.
    #[must_use]
    pub const fn with_timer_tick(mut self, tick: Duration) -> Self {
        self.timer_tick = tick;
        self
    }

    /// Sets the first-message deadline for accepted streams.
    #[must_use]
    pub const fn with_logon_wait(mut self, wait: Duration) -> Self {
        self.logon_wait = wait;
        self
    }

    /// Returns the configured sessions.
    #[must_use]
    pub fn sessions(&self) -> &[SessionConfig] {
        &self.sessions
    }

    /// Returns the duplicate connection policy.
    #[must_use]
    pub const fn duplicate_policy(&self) -> DuplicatePolicy {
        self.duplicate_policy
    }

    /// Returns the session timer period.
    #[must_use]
    pub const fn timer_tick(&self) -> Duration {
        self.timer_tick
    }

    /// Returns the application handler.
    #[must_use]
    pub fn application(&self) -> Arc<A> {
        Arc::clone(&self.application)
    }

    fn resolve_dictionary(&self) -> Result<Arc<Dictionary>, SessionError> {
        if let Some(dictionary) = &self.dictionary {
            return Ok(Arc::clone(dictionary));
        }
        let begin_string = self
            .sessions
            .first()
            .map_or("FIX.4.4", |config| config.begin_string.as_str());
        let version = Version::from_begin_string(begin_string).ok_or_else(|| {
            SessionError::Configuration(format!("no built-in dictionary for {begin_string}"))
        })?;
        Ok(Arc::new(Dictionary::session(version)))
    }

    /// Builds the engine, opening a store and registering every session.
    ///
    /// # Errors
    /// `Configuration` for an invalid or duplicated session, `Store` if a
    /// file store cannot be opened.
    pub async fn build(self) -> Result<Arc<Engine>, SessionError> {
        let engine = Engine::new(self.resolve_dictionary()?)
            .with_duplicate_policy(self.duplicate_policy)
            .with_timer_tick(self.timer_tick)
            .with_logon_wait(self.logon_wait);
        let application: Arc<dyn Application> = self.application;

        for config in self.sessions {
            let store: Arc<dyn MessageStore> = match &self.store_dir {
                Some(dir) => Arc::new(FileStore::open(dir, &config.session_id())?),
                None => Arc::new(MemoryStore::new()),
            };
            engine
                .add_session(config, store, Arc::clone(&application))
                .await?;
        }
        Ok(Arc::new(engine))
    }
}
