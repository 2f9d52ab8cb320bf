/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Session configuration.

use fixline_core::error::SessionError;
use fixline_core::types::{CompId, SessionId};
use std::time::Duration;

/// Which side opens the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionRole {
    /// Connects out and sends the first Logon.
    Initiator,
    /// Accepts connections and answers the counterparty's Logon.
    Acceptor,
}

/// EndSeqNo(16) policy for ResendRequests sent on a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResendRange {
    /// Request exactly the missing span `[expected, received - 1]`.
    #[default]
    Bounded,
    /// Request `[expected, 0]`, i.e. everything from the gap onward.
    ToInfinity,
}

/// Configuration for a FIX session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sender CompID (tag 49), this side.
    pub sender_comp_id: CompId,
    /// Target CompID (tag 56), the counterparty.
    pub target_comp_id: CompId,
    /// FIX version BeginString (e.g., "FIX.4.4").
    pub begin_string: String,
    /// Initiator or acceptor.
    pub role: SessionRole,
    /// Heartbeat interval proposed in Logon; zero disables heartbeats.
    pub heartbeat_interval: Duration,
    /// Extra silence tolerated before a TestRequest goes out.
    pub heartbeat_grace: Duration,
    /// Whether to reset sequence numbers on logon.
    pub reset_on_logon: bool,
    /// Whether to reset sequence numbers on logout.
    pub reset_on_logout: bool,
    /// Whether to reset sequence numbers on disconnect.
    pub reset_on_disconnect: bool,
    /// Maximum message size in bytes.
    pub max_message_size: usize,
    /// Logon timeout duration.
    pub logon_timeout: Duration,
    /// Logout timeout duration.
    pub logout_timeout: Duration,
    /// Whether to validate incoming message checksums.
    pub validate_checksum: bool,
    /// Whether to validate incoming message length.
    pub validate_length: bool,
    /// Whether to reject inbound messages missing dictionary-required fields.
    pub validate_required_fields: bool,
    /// Whether to check inbound SenderCompID/TargetCompID.
    pub check_comp_id: bool,
    /// EndSeqNo policy for gap recovery.
    pub resend_range: ResendRange,
    /// DefaultApplVerID(1137) sent in Logon on FIXT sessions.
    pub default_appl_ver_id: Option<String>,
    /// Optional sender sub ID (tag 50).
    pub sender_sub_id: Option<String>,
    /// Optional target sub ID (tag 57).
    pub target_sub_id: Option<String>,
}

impl SessionConfig {
    /// Creates an initiator configuration with default timers.
    ///
    /// # Arguments
    /// * `sender_comp_id` - The sender CompID
    /// * `target_comp_id` - The target CompID
    /// * `begin_string` - The FIX version string
    #[must_use]
    pub fn new(
        sender_comp_id: CompId,
        target_comp_id: CompId,
        begin_string: impl Into<String>,
    ) -> Self {
        Self {
            sender_comp_id,
            target_comp_id,
            begin_string: begin_string.into(),
            role: SessionRole::Initiator,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_grace: Duration::from_secs(1),
            reset_on_logon: false,
            reset_on_logout: false,
            reset_on_disconnect: false,
            max_message_size: 1024 * 1024,
            logon_timeout: Duration::from_secs(10),
            logout_timeout: Duration::from_secs(10),
            validate_checksum: true,
            validate_length: true,
            validate_required_fields: true,
            check_comp_id: true,
            resend_range: ResendRange::Bounded,
            default_appl_ver_id: None,
            sender_sub_id: None,
            target_sub_id: None,
        }
    }

    /// Sets the role.
    #[must_use]
    pub const fn with_role(mut self, role: SessionRole) -> Self {
        self.role = role;
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the heartbeat grace period.
    #[must_use]
    pub const fn with_heartbeat_grace(mut self, grace: Duration) -> Self {
        self.heartbeat_grace = grace;
        self
    }

    /// Sets whether to reset sequence numbers on logon.
    #[must_use]
    pub const fn with_reset_on_logon(mut self, reset: bool) -> Self {
        self.reset_on_logon = reset;
        self
    }

    /// Sets whether to reset sequence numbers on logout.
    #[must_use]
    pub const fn with_reset_on_logout(mut self, reset: bool) -> Self {
        self.reset_on_logout = reset;
        self
    }

    /// Sets whether to reset sequence numbers on disconnect.
    #[must_use]
    pub const fn with_reset_on_disconnect(mut self, reset: bool) -> Self {
        self.reset_on_disconnect = reset;
        self
    }

    /// Sets the maximum message size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Sets the logon timeout.
    #[must_use]
    pub const fn with_logon_timeout(mut self, timeout: Duration) -> Self {
        self.logon_timeout = timeout;
        self
    }

    /// Sets the logout timeout.
    #[must_use]
    pub const fn with_logout_timeout(mut self, timeout: Duration) -> Self {
        self.logout_timeout = timeout;
        self
    }

    /// Sets checksum and body length validation.
    #[must_use]
    pub const fn with_validation(mut self, checksum: bool, length: bool) -> Self {
        self.validate_checksum = checksum;
        self.validate_length = length;
        self
    }

    /// Sets whether dictionary-required fields are enforced.
    #[must_use]
    pub const fn with_required_field_validation(mut self, validate: bool) -> Self {
        self.validate_required_fields = validate;
        self
    }

    /// Sets the gap recovery policy.
    #[must_use]
    pub const fn with_resend_range(mut self, range: ResendRange) -> Self {
        self.resend_range = range;
        self
    }

    /// Sets DefaultApplVerID for FIXT sessions.
    #[must_use]
    pub fn with_default_appl_ver_id(mut self, id: impl Into<String>) -> Self {
        self.default_appl_ver_id = Some(id.into());
        self
    }

    /// Sets the sender sub ID.
    #[must_use]
    pub fn with_sender_sub_id(mut self, sub_id: impl Into<String>) -> Self {
        self.sender_sub_id = Some(sub_id.into());
        self
    }

    /// Sets the target sub ID.
    #[must_use]
    pub fn with_target_sub_id(mut self, sub_id: impl Into<String>) -> Self {
        self.target_sub_id = Some(sub_id.into());
        self
    }

    /// Returns the heartbeat interval in seconds.
    #[must_use]
    pub const fn heartbeat_interval_secs(&self) -> u64 {
        self.heartbeat_interval.as_secs()
    }

    /// Returns the session identity, from this side's point of view.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        let mut id = SessionId::new(
            self.begin_string.clone(),
            self.sender_comp_id.as_str(),
            self.target_comp_id.as_str(),
        );
        id.sender_sub_id = self.sender_sub_id.clone();
        id.target_sub_id = self.target_sub_id.clone();
        id
    }

    /// Returns true for FIXT transport sessions.
    #[must_use]
    pub fn is_fixt(&self) -> bool {
        self.begin_string.starts_with("FIXT")
    }

    /// Checks the configuration for contradictions.
    ///
    /// # Errors
    /// Returns `SessionError::Configuration` describing the first problem.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.begin_string.is_empty() {
            return Err(SessionError::Configuration(
                "begin_string must not be empty".to_string(),
            ));
        }
        if self.sender_comp_id == self.target_comp_id {
            return Err(SessionError::Configuration(format!(
                "sender and target CompID are both {}",
                self.sender_comp_id
            )));
        }
        if self.logon_timeout.is_zero() || self.logout_timeout.is_zero() {
            return Err(SessionError::Configuration(
                "logon and logout timeouts must be positive".to_string(),
            ));
        }
        if self.is_fixt() && self.default_appl_ver_id.is_none() {
            return Err(SessionError::Configuration(
                "FIXT sessions require default_appl_ver_id".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for session configuration.
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    sender_comp_id: Option<CompId>,
    target_comp_id: Option<CompId>,
    begin_string: Option<String>,
    role: Option<SessionRole>,
    heartbeat_interval: Option<Duration>,
    reset_on_logon: bool,
    max_message_size: Option<usize>,
    resend_range: ResendRange,
    default_appl_ver_id: Option<String>,
}

impl SessionConfigBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sender CompID.
    #[must_use]
    pub fn sender_comp_id(mut self, id: CompId) -> Self {
        self.sender_comp_id = Some(id);
        self
    }

    /// Sets the target CompID.
    #[must_use]
    pub fn target_comp_id(mut self, id: CompId) -> Self {
        self.target_comp_id = Some(id);
        self
    }

    /// Sets the FIX version.
    #[must_use]
    pub fn begin_string(mut self, version: impl Into<String>) -> Self {
        self.begin_string = Some(version.into());
        self
    }

    /// Sets the role.
    #[must_use]
    pub const fn role(mut self, role: SessionRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub const fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Sets whether to reset on logon.
    #[must_use]
    pub const fn reset_on_logon(mut self, reset: bool) -> Self {
        self.reset_on_logon = reset;
        self
    }

    /// Sets the maximum message size.
    #[must_use]
    pub const fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = Some(size);
        self
    }

    /// Sets the gap recovery policy.
    #[must_use]
    pub const fn resend_range(mut self, range: ResendRange) -> Self {
        self.resend_range = range;
        self
    }

    /// Sets DefaultApplVerID for FIXT sessions.
    #[must_use]
    pub fn default_appl_ver_id(mut self, id: impl Into<String>) -> Self {
        self.default_appl_ver_id = Some(id.into());
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    /// Returns `SessionError::Configuration` if a CompID is missing or the
    /// result fails [`SessionConfig::validate`].
    pub fn build(self) -> Result<SessionConfig, SessionError> {
        let sender = self
            .sender_comp_id
            .ok_or_else(|| SessionError::Configuration("sender_comp_id is required".to_string()))?;
        let target = self
            .target_comp_id
            .ok_or_else(|| SessionError::Configuration("target_comp_id is required".to_string()))?;
        let begin_string = self.begin_string.unwrap_or_else(|| "FIX.4.4".to_string());

        let mut config = SessionConfig::new(sender, target, begin_string);
        if let Some(role) = self.role {
            config.role = role;
        }
        if let Some(interval) = self.heartbeat_interval {
            config.heartbeat_interval = interval;
        }
        config.reset_on_logon = self.reset_on_logon;
        if let Some(size) = self.max_message_size {
            config.max_message_size = size;
        }
        config.resend_range = self.resend_range;
        config.default_appl_ver_id = self.default_appl_ver_id;

        config.validate()?;
        Ok(config)
    }
}
