/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Heartbeat and TestRequest management.
//!
//! This module handles FIX session liveness:
//! - Sending a Heartbeat when nothing was sent for one interval
//! - Sending one TestRequest after interval + grace of inbound silence
//! - Declaring a timeout when the TestRequest goes unanswered for an interval
//!
//! Every method takes the current [`Instant`] so the caller owns the clock.

use std::time::{Duration, Instant};

/// What the session must do after a liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Nothing is due.
    None,
    /// Send a Heartbeat.
    SendHeartbeat,
    /// Send a TestRequest and report it through `on_test_request_sent`.
    SendTestRequest,
    /// The counterparty did not answer the TestRequest.
    TimedOut,
}

/// Manages heartbeat timing for a FIX session.
#[derive(Debug)]
pub struct HeartbeatManager {
    /// Heartbeat interval; zero disables supervision.
    interval: Duration,
    /// Silence tolerated on top of the interval before probing.
    grace: Duration,
    /// Time of last message sent.
    last_sent: Instant,
    /// Time of last message received.
    last_received: Instant,
    /// Pending TestRequest ID, if any.
    test_request_pending: Option<String>,
    /// Time when TestRequest was sent.
    test_request_sent_at: Option<Instant>,
}

impl HeartbeatManager {
    /// Creates a manager whose clocks start at `now`.
    ///
    /// # Arguments
    /// * `interval` - The negotiated heartbeat interval
    /// * `grace` - Extra inbound silence tolerated before a TestRequest
    /// * `now` - Start of supervision
    #[must_use]
    pub fn new(interval: Duration, grace: Duration, now: Instant) -> Self {
        Self {
            interval,
            grace,
            last_sent: now,
            last_received: now,
            test_request_pending: None,
            test_request_sent_at: None,
        }
    }

    /// Records that a message was sent.
    #[inline]
    pub fn on_message_sent(&mut self, now: Instant) {
        self.last_sent = now;
    }

    /// Records that a message was received.
    ///
    /// Any inbound traffic proves the counterparty alive, so a pending
    /// TestRequest is cleared whatever the message type.
    pub fn on_message_received(&mut self, now: Instant) {
        self.last_received = now;
        self.test_request_pending = None;
        self.test_request_sent_at = None;
    }

    /// Records that a TestRequest was sent.
    ///
    /// # Arguments
    /// * `test_req_id` - The TestReqID that was sent
    /// * `now` - When it was sent
    pub fn on_test_request_sent(&mut self, test_req_id: String, now: Instant) {
        self.test_request_pending = Some(test_req_id);
        self.test_request_sent_at = Some(now);
        self.last_sent = now;
    }

    /// Decides what is due at `now`.
    ///
    /// The TestRequest goes out after interval + grace of silence; the
    /// session times out once twice the interval has passed with no reply.
    #[must_use]
    pub fn check(&self, now: Instant) -> HeartbeatAction {
        if self.interval.is_zero() {
            return HeartbeatAction::None;
        }
        if let Some(sent_at) = self.test_request_sent_at {
            if now > sent_at && now.saturating_duration_since(self.last_received) >= self.interval * 2 {
                return HeartbeatAction::TimedOut;
            }
        } else if now.saturating_duration_since(self.last_received) >= self.interval + self.grace {
            return HeartbeatAction::SendTestRequest;
        }
        if now.saturating_duration_since(self.last_sent) >= self.interval {
            return HeartbeatAction::SendHeartbeat;
        }
        HeartbeatAction::None
    }

    /// Returns the pending TestRequest ID, if any.
    #[must_use]
    pub fn pending_test_request(&self) -> Option<&str> {
        self.test_request_pending.as_deref()
    }

    /// Returns the time since the last message was received.
    #[must_use]
    pub fn time_since_last_received(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_received)
    }

    /// Returns the heartbeat interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Restarts supervision at `now` with a new interval.
    pub fn restart(&mut self, interval: Duration, now: Instant) {
        self.interval = interval;
        self.last_sent = now;
        self.last_received = now;
        self.test_request_pending = None;
        self.test_request_sent_at = None;
    }
}

/// Generates a unique TestReqID.
///
/// Uses the current timestamp in nanoseconds.
#[must_use]
pub fn generate_test_req_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    format!("TEST{}", nanos)
}
