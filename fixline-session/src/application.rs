/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Application callback interface.
//!
//! This module defines the callback interface for handling FIX messages,
//! following the QuickFIX pattern with async support. Callbacks run while
//! the session engine holds its lock, so they should return promptly.

use crate::state::SessionState;
use async_trait::async_trait;
use fixline_core::error::{DecodeError, SessionError};
use fixline_core::message::Message;
use fixline_core::types::{SeqNum, SessionId, SessionRejectReason};

/// Reason for rejecting a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectReason {
    /// SessionRejectReason for admin messages, BusinessRejectReason for
    /// application messages.
    pub code: u32,
    /// Human-readable rejection text.
    pub text: String,
    /// Reference tag that caused the rejection.
    pub ref_tag: Option<u32>,
}

impl RejectReason {
    /// Creates a new rejection reason.
    #[must_use]
    pub fn new(code: u32, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
            ref_tag: None,
        }
    }

    /// Sets the reference tag.
    #[must_use]
    pub const fn with_ref_tag(mut self, tag: u32) -> Self {
        self.ref_tag = Some(tag);
        self
    }
}

/// Something the session handled on its own that the application may want
/// to know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session changed state.
    StateChanged {
        /// Previous state.
        from: SessionState,
        /// New state.
        to: SessionState,
    },
    /// A ResendRequest was sent.
    ResendRequested {
        /// BeginSeqNo.
        begin: SeqNum,
        /// EndSeqNo; 0 means through the latest.
        end: SeqNum,
    },
    /// A counterparty ResendRequest was answered.
    ResendServed {
        /// First sequence number answered.
        begin: SeqNum,
        /// Last sequence number answered.
        end: SeqNum,
        /// Application messages re-sent.
        resent: usize,
        /// SequenceReset-GapFill messages sent.
        gap_fills: usize,
    },
    /// A PossDup message below the expected number was dropped.
    DuplicateIgnored {
        /// Its MsgSeqNum.
        seq_num: SeqNum,
    },
    /// The counterparty moved the expected sequence number.
    SequenceReset {
        /// New expected number.
        new_seq_num: SeqNum,
        /// True for GapFill mode.
        gap_fill: bool,
    },
    /// A frame could not be decoded and was discarded.
    Garbled {
        /// Decode failure.
        error: DecodeError,
    },
    /// A session-level Reject was sent.
    RejectSent {
        /// MsgSeqNum of the rejected message.
        ref_seq_num: SeqNum,
        /// Reject reason.
        reason: SessionRejectReason,
        /// Text sent with it.
        text: Option<String>,
    },
    /// The counterparty sent a session-level Reject.
    RejectReceived {
        /// RefSeqNum(45), if present.
        ref_seq_num: Option<SeqNum>,
        /// SessionRejectReason(373), if present and known.
        reason: Option<SessionRejectReason>,
        /// Text(58), if present.
        text: Option<String>,
    },
    /// The counterparty did not answer a TestRequest.
    HeartbeatTimeout,
    /// An error ended or degraded the session, or a recoverable sequence
    /// gap was found.
    Error(SessionError),
}

/// Application callback interface for handling FIX messages.
///
/// Implement this trait to receive callbacks for session events
/// and message processing.
#[async_trait]
pub trait Application: Send + Sync {
    /// Called when a session is created.
    ///
    /// # Arguments
    /// * `session_id` - The session identifier
    async fn on_create(&self, session_id: &SessionId);

    /// Called on successful logon.
    ///
    /// # Arguments
    /// * `session_id` - The session identifier
    async fn on_logon(&self, session_id: &SessionId);

    /// Called when a logged-on session ends, cleanly or not.
    ///
    /// # Arguments
    /// * `session_id` - The session identifier
    async fn on_logout(&self, session_id: &SessionId);

    /// Called before sending an admin message.
    ///
    /// Allows modification of outgoing admin messages (Logon, Heartbeat, etc.).
    /// The header is already stamped.
    ///
    /// # Arguments
    /// * `message` - The message to be sent (mutable)
    /// * `session_id` - The session identifier
    async fn to_admin(&self, message: &mut Message, session_id: &SessionId);

    /// Called when an admin message is received.
    ///
    /// # Arguments
    /// * `message` - The received message
    /// * `session_id` - The session identifier
    ///
    /// # Returns
    /// `Ok(())` to accept, `Err(RejectReason)` to answer with a session Reject.
    #[allow(clippy::wrong_self_convention)]
    async fn from_admin(&self, message: &Message, session_id: &SessionId)
    -> Result<(), RejectReason>;

    /// Called before sending an application message.
    ///
    /// Allows modification of outgoing application messages.
    ///
    /// # Arguments
    /// * `message` - The message to be sent (mutable)
    /// * `session_id` - The session identifier
    async fn to_app(&self, message: &mut Message, session_id: &SessionId);

    /// Called when an application message is received.
    ///
    /// # Arguments
    /// * `message` - The received message
    /// * `session_id` - The session identifier
    ///
    /// # Returns
    /// `Ok(())` to accept, `Err(RejectReason)` to answer with a
    /// BusinessMessageReject.
    #[allow(clippy::wrong_self_convention)]
    async fn from_app(&self, message: &Message, session_id: &SessionId)
    -> Result<(), RejectReason>;

    /// Called for every [`SessionEvent`].
    async fn on_event(&self, _session_id: &SessionId, _event: &SessionEvent) {}
}

/// Default no-op application implementation.
#[derive(Debug, Default)]
pub struct NoOpApplication;

#[async_trait]
impl Application for NoOpApplication {
    async fn on_create(&self, _session_id: &SessionId) {}

    async fn on_logon(&self, _session_id: &SessionId) {}

    async fn on_logout(&self, _session_id: &SessionId) {}

    async fn to_admin(&self, _message: &mut Message, _session_id: &SessionId) {}

    async fn from_admin(
        &self,
        _message: &Message,
        _session_id: &SessionId,
    ) -> Result<(), RejectReason> {
        Ok(())
    }

    async fn to_app(&self, _message: &mut Message, _session_id: &SessionId) {}

    async fn from_app(
        &self,
        _message: &Message,
        _session_id: &SessionId,
    ) -> Result<(), RejectReason> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_reason() {
        let reason = RejectReason::new(1, "Invalid tag").with_ref_tag(35);
        assert_eq!(reason.code, 1);
        assert_eq!(reason.text, "Invalid tag");
        assert_eq!(reason.ref_tag, Some(35));
    }

    #[tokio::test]
    async fn test_noop_application() {
        let app = NoOpApplication;
        let session_id = SessionId::new("FIX.4.4", "SENDER", "TARGET");

        app.on_create(&session_id).await;
        app.on_logon(&session_id).await;
        app.on_event(&session_id, &SessionEvent::HeartbeatTimeout).await;
        app.on_logout(&session_id).await;

        let msg = Message::new("D");
        assert!(app.from_app(&msg, &session_id).await.is_ok());
    }
}
