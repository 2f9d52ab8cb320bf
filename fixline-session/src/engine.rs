/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Session engine.
//!
//! [`SessionEngine`] runs one FIX session over whatever transport feeds it
//! bytes. It owns the state machine, the sequence tracker, the heartbeat
//! manager and the message store handle, and writes outbound frames to an
//! unbounded channel drained by a separate writer task.
//!
//! Outbound path: stamp header, encode, append to the store, advance the
//! counter, then hand the frame to the channel. A message is therefore
//! durable before it can reach the wire.
//!
//! Inbound path: frame, decode, validate the header, check the sequence
//! number, dispatch. Out-of-order messages wait in a buffer until the
//! missing range has been resent.

use crate::application::{Application, SessionEvent};
use crate::config::{ResendRange, SessionConfig, SessionRole};
use crate::heartbeat::{HeartbeatAction, HeartbeatManager, generate_test_req_id};
use crate::messages::{self, RejectDetails};
use crate::sequence::{SequenceCheck, SequenceTracker};
use crate::state::{Action, SessionState, Trigger, Transition};
use bytes::{Bytes, BytesMut};
use fixline_core::error::{DecodeError, SessionError};
use fixline_core::message::{Message, MsgType};
use fixline_core::tags;
use fixline_core::types::{SeqNum, SessionId, SessionRejectReason, Timestamp};
use fixline_dictionary::Dictionary;
use fixline_store::MessageStore;
use fixline_tagvalue::{Decoder as FrameDecoder, encode, peek_header};
use fixline_transport::FixCodec;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::codec::Decoder as _;
use tracing::{debug, error, info, warn};

/// An inbound message waiting for a gap to close.
#[derive(Debug)]
enum Pending {
    /// Process when its turn comes.
    Message(Message),
    /// Already acted upon; only consumes its sequence number.
    Handled,
}

fn violation(reason: impl Into<String>) -> SessionError {
    SessionError::ProtocolViolation {
        reason: reason.into(),
    }
}

fn copy(value: &str) -> Bytes {
    Bytes::copy_from_slice(value.as_bytes())
}

/// One FIX session.
pub struct SessionEngine {
    config: SessionConfig,
    session_id: SessionId,
    dictionary: Arc<Dictionary>,
    store: Arc<dyn MessageStore>,
    application: Arc<dyn Application>,
    state: SessionState,
    sequence: SequenceTracker,
    heartbeat: HeartbeatManager,
    heart_bt_int: Duration,
    outbound: Option<mpsc::UnboundedSender<Bytes>>,
    inbound: BytesMut,
    codec: FixCodec,
    pending: BTreeMap<u64, Pending>,
    deadline: Option<Instant>,
    reset_requested: bool,
    connection_id: u64,
}

impl fmt::Debug for SessionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEngine")
            .field("session_id", &self.session_id)
            .field("state", &self.state)
            .field("sequence", &self.sequence)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl SessionEngine {
    /// Creates a disconnected session resuming from the store's counters and
    /// notifies the application through `on_create`.
    ///
    /// # Errors
    /// Returns `SessionError::Configuration` if the configuration is invalid.
    pub async fn new(
        config: SessionConfig,
        dictionary: Arc<Dictionary>,
        store: Arc<dyn MessageStore>,
        application: Arc<dyn Application>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let session_id = config.session_id();
        let (outgoing, incoming) = store.counters();
        let codec = FixCodec::new().with_max_message_size(config.max_message_size);
        let heart_bt_int = config.heartbeat_interval;
        let heartbeat = HeartbeatManager::new(heart_bt_int, config.heartbeat_grace, Instant::now());

        application.on_create(&session_id).await;
        debug!(session = %session_id, next_out = outgoing.value(), next_in = incoming.value(), "session created");

        Ok(Self {
            config,
            session_id,
            dictionary,
            store,
            application,
            state: SessionState::Disconnected,
            sequence: SequenceTracker::with_initial(outgoing, incoming),
            heartbeat,
            heart_bt_int,
            outbound: None,
            inbound: BytesMut::new(),
            codec,
            pending: BTreeMap::new(),
            deadline: None,
            reset_requested: false,
            connection_id: 0,
        })
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the session identity.
    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the sequence counters.
    #[must_use]
    pub const fn sequence(&self) -> &SequenceTracker {
        &self.sequence
    }

    /// Returns the generation of the current transport; bumped by every
    /// [`connect`](Self::connect).
    #[must_use]
    pub const fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Returns the number of out-of-order messages held back.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Attaches a transport. Initiators send Logon right away.
    ///
    /// # Errors
    /// `AlreadyConnected` if a transport is attached, or a store error when
    /// a reset on logon fails.
    pub async fn connect(
        &mut self,
        outbound: mpsc::UnboundedSender<Bytes>,
        now: Instant,
    ) -> Result<(), SessionError> {
        if self.state.is_connected() {
            return Err(SessionError::AlreadyConnected {
                session: self.session_id.to_string(),
            });
        }
        self.outbound = Some(outbound);
        self.connection_id += 1;
        self.inbound.clear();
        self.pending.clear();
        self.heart_bt_int = self.config.heartbeat_interval;
        self.reset_requested = false;

        if self.config.role == SessionRole::Initiator && self.config.reset_on_logon {
            self.reset_sequences().await?;
            self.reset_requested = true;
        }
        info!(session = %self.session_id, role = ?self.config.role, "transport attached");
        self.apply(Trigger::Connected { role: self.config.role }, now).await
    }

    /// Feeds raw transport bytes using the wall clock.
    ///
    /// # Errors
    /// See [`on_bytes_received_at`](Self::on_bytes_received_at).
    pub async fn on_bytes_received(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.on_bytes_received_at(bytes, Instant::now()).await
    }

    /// Feeds raw transport bytes; any number of whole or partial frames.
    ///
    /// # Errors
    /// Returns the fatal error that ended the session (protocol violation,
    /// MsgSeqNum too low, rejected logon, store failure). The session is
    /// `Disconnected` when this returns an error.
    pub async fn on_bytes_received_at(
        &mut self,
        bytes: &[u8],
        now: Instant,
    ) -> Result<(), SessionError> {
        if !self.state.is_connected() {
            warn!(session = %self.session_id, len = bytes.len(), "bytes received while disconnected");
            return Ok(());
        }
        self.inbound.extend_from_slice(bytes);

        while self.state.is_connected() {
            let frame = match self.codec.decode(&mut self.inbound) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => return Err(self.fail(violation(err.to_string()), now).await),
            };
            if let Err(err) = self.on_frame(&frame, now).await {
                if err.is_fatal() {
                    return Err(self.fail(err, now).await);
                }
                warn!(session = %self.session_id, error = %err, "inbound message not handled");
                self.emit(SessionEvent::Error(err)).await;
            }
        }
        Ok(())
    }

    /// Sends an application message.
    ///
    /// # Returns
    /// The sequence number the message was sent with.
    ///
    /// # Errors
    /// `InvalidState` unless logged on, `Configuration` for admin message
    /// types, `Encode` for an unencodable message, or `Store` if persisting
    /// fails, which also ends the session.
    pub async fn send_application_message(&mut self, message: Message) -> Result<SeqNum, SessionError> {
        if !self.state.is_logged_on() {
            return Err(SessionError::InvalidState {
                expected: "Active".to_string(),
                current: self.state.to_string(),
            });
        }
        if message.is_admin() {
            return Err(SessionError::Configuration(
                "admin messages are generated by the session".to_string(),
            ));
        }
        let now = Instant::now();
        let sent = self.send(message, now).await;
        match sent {
            Err(err @ SessionError::Store(_)) => Err(self.fail(err, now).await),
            other => other,
        }
    }

    /// Runs timers: logon and logout deadlines, heartbeats, TestRequests.
    ///
    /// # Errors
    /// `HeartbeatTimeout` when the counterparty stayed silent after a
    /// TestRequest, or a store error while sending; both disconnect.
    pub async fn on_timer(&mut self, now: Instant) -> Result<(), SessionError> {
        match self.state {
            SessionState::Disconnected => Ok(()),
            SessionState::LogonPending | SessionState::LogoutPending => {
                if self.deadline.is_some_and(|deadline| now >= deadline) {
                    warn!(session = %self.session_id, state = %self.state, "session timed out");
                    self.apply(Trigger::Timeout, now).await?;
                }
                Ok(())
            }
            SessionState::Active | SessionState::Recovering { .. } => {
                let result = match self.heartbeat.check(now) {
                    HeartbeatAction::None => Ok(()),
                    HeartbeatAction::SendHeartbeat => {
                        self.send(messages::heartbeat(None), now).await.map(|_| ())
                    }
                    HeartbeatAction::SendTestRequest => {
                        let id = generate_test_req_id();
                        debug!(session = %self.session_id, test_req_id = %id, "inbound silence, probing");
                        let sent = self.send(messages::test_request(&id), now).await;
                        self.heartbeat.on_test_request_sent(id, now);
                        sent.map(|_| ())
                    }
                    HeartbeatAction::TimedOut => {
                        let elapsed = self.heartbeat.time_since_last_received(now);
                        self.emit(SessionEvent::HeartbeatTimeout).await;
                        Err(SessionError::HeartbeatTimeout {
                            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                        })
                    }
                };
                match result {
                    Err(err) => Err(self.fail(err, now).await),
                    Ok(()) => Ok(()),
                }
            }
        }
    }

    /// Starts a graceful logout.
    ///
    /// # Errors
    /// `InvalidState` when there is no session to log out of.
    pub async fn initiate_logout(
        &mut self,
        reason: Option<String>,
        now: Instant,
    ) -> Result<(), SessionError> {
        if !matches!(
            self.state,
            SessionState::LogonPending | SessionState::Active | SessionState::Recovering { .. }
        ) {
            return Err(SessionError::InvalidState {
                expected: "Active".to_string(),
                current: self.state.to_string(),
            });
        }
        info!(session = %self.session_id, reason = ?reason, "logout requested");
        self.apply(Trigger::LogoutRequested { reason }, now).await
    }

    /// Reports a broken transport. Counters and store are kept.
    pub async fn on_transport_failure(&mut self, reason: &str) {
        if !self.state.is_connected() {
            return;
        }
        warn!(session = %self.session_id, reason, "transport failed");
        self.emit(SessionEvent::Error(SessionError::Transport(reason.to_string())))
            .await;
        if let Err(err) = self.apply(Trigger::TransportFailed, Instant::now()).await {
            warn!(session = %self.session_id, error = %err, "cleanup after transport failure");
        }
    }

    /// Stops the session, abandoning any resend in progress.
    ///
    /// A logged-on session gets a best-effort Logout first.
    pub async fn shutdown(&mut self) {
        let now = Instant::now();
        if self.state.is_logged_on()
            && let Err(err) = self.send(messages::logout(Some("shutdown")), now).await
        {
            warn!(session = %self.session_id, error = %err, "logout on shutdown not sent");
        }
        if let Err(err) = self.apply(Trigger::Shutdown, now).await {
            warn!(session = %self.session_id, error = %err, "shutdown cleanup");
        }
    }

    // ---- state machine ----

    async fn apply(&mut self, trigger: Trigger, now: Instant) -> Result<(), SessionError> {
        let logout = matches!(trigger, Trigger::LogoutReceived);
        let from = self.state;
        let Transition { next, actions } = from.on(trigger);
        self.state = next;
        if from != next {
            info!(session = %self.session_id, from = %from, to = %next, "session state changed");
            self.deadline = match next {
                SessionState::LogonPending => Some(now + self.config.logon_timeout),
                SessionState::LogoutPending => Some(now + self.config.logout_timeout),
                _ => None,
            };
        }

        let mut result = Ok(());
        for action in actions {
            if let Err(err) = self.perform(action, now).await {
                warn!(session = %self.session_id, error = %err, "session action failed");
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }

        if from != next {
            self.emit(SessionEvent::StateChanged { from, to: next }).await;
            if next == SessionState::Disconnected {
                let logged_out = logout || from == SessionState::LogoutPending;
                if let Err(err) = self.on_disconnected(from, logged_out).await
                    && result.is_ok()
                {
                    result = Err(err);
                }
            }
        }
        result
    }

    async fn perform(&mut self, action: Action, now: Instant) -> Result<(), SessionError> {
        match action {
            Action::SendLogon => {
                let logon = messages::logon(
                    self.heart_bt_int.as_secs(),
                    self.reset_requested,
                    self.config.default_appl_ver_id.as_deref(),
                );
                self.send(logon, now).await.map(|_| ())
            }
            Action::SendLogout { reason } => self
                .send(messages::logout(reason.as_deref()), now)
                .await
                .map(|_| ()),
            Action::SendResendRequest { begin, end } => {
                let end = match self.config.resend_range {
                    ResendRange::Bounded => end,
                    ResendRange::ToInfinity => SeqNum::new(0),
                };
                info!(session = %self.session_id, begin = begin.value(), end = end.value(), "requesting resend");
                self.send(messages::resend_request(begin, end), now).await?;
                self.emit(SessionEvent::ResendRequested { begin, end }).await;
                Ok(())
            }
            Action::StartHeartbeat => {
                self.heartbeat.restart(self.heart_bt_int, now);
                Ok(())
            }
            Action::Disconnect => {
                self.teardown();
                Ok(())
            }
        }
    }

    fn teardown(&mut self) {
        self.outbound = None;
        self.inbound.clear();
        self.pending.clear();
        self.deadline = None;
        self.reset_requested = false;
    }

    async fn on_disconnected(&mut self, from: SessionState, logged_out: bool) -> Result<(), SessionError> {
        self.teardown();
        if from.is_logged_on() || from == SessionState::LogoutPending {
            self.application.on_logout(&self.session_id).await;
        }
        if self.config.reset_on_disconnect || (self.config.reset_on_logout && logged_out) {
            self.reset_sequences().await?;
        }
        Ok(())
    }

    async fn fail(&mut self, err: SessionError, now: Instant) -> SessionError {
        error!(session = %self.session_id, error = %err, "session failure");
        self.emit(SessionEvent::Error(err.clone())).await;
        let trigger = match &err {
            SessionError::LogonRejected { reason } if self.state == SessionState::LogonPending => {
                Trigger::LogonRejected {
                    reason: reason.clone(),
                }
            }
            SessionError::HeartbeatTimeout { .. } => Trigger::Timeout,
            SessionError::Transport(_) => Trigger::TransportFailed,
            SessionError::SequenceTooLow { expected, received } => Trigger::ProtocolViolation {
                reason: format!("MsgSeqNum too low, expecting {expected} but received {received}"),
            },
            SessionError::ProtocolViolation { reason } => Trigger::ProtocolViolation {
                reason: reason.clone(),
            },
            other => Trigger::ProtocolViolation {
                reason: other.to_string(),
            },
        };
        if let Err(secondary) = self.apply(trigger, now).await {
            warn!(session = %self.session_id, error = %secondary, "logout after failure not delivered");
        }
        err
    }

    async fn emit(&self, event: SessionEvent) {
        self.application.on_event(&self.session_id, &event).await;
    }

    async fn reset_sequences(&mut self) -> Result<(), SessionError> {
        self.store.reset().await?;
        self.sequence.reset();
        info!(session = %self.session_id, "sequence numbers reset");
        Ok(())
    }

    async fn persist_incoming(&self) -> Result<(), SessionError> {
        self.store
            .set_next_target_seq(self.sequence.next_incoming())
            .await?;
        Ok(())
    }

    // ---- outbound ----

    fn stamp_header(&self, message: &mut Message, seq: SeqNum, sending_time: Timestamp) {
        let header = message.header_mut();
        header.set_field(tags::BEGIN_STRING, copy(&self.config.begin_string));
        header.set_field(tags::SENDER_COMP_ID, copy(self.config.sender_comp_id.as_str()));
        header.set_field(tags::TARGET_COMP_ID, copy(self.config.target_comp_id.as_str()));
        if let Some(sub) = &self.config.sender_sub_id {
            header.set_field(tags::SENDER_SUB_ID, copy(sub));
        }
        if let Some(sub) = &self.config.target_sub_id {
            header.set_field(tags::TARGET_SUB_ID, copy(sub));
        }
        header.set_as(tags::MSG_SEQ_NUM, &seq);
        header.set_as(tags::SENDING_TIME, &sending_time);
    }

    fn transmit(&mut self, frame: Bytes, now: Instant) {
        match &self.outbound {
            Some(tx) => {
                if tx.send(frame).is_err() {
                    warn!(session = %self.session_id, "writer gone, frame dropped");
                }
            }
            None => warn!(session = %self.session_id, "no transport, frame dropped"),
        }
        self.heartbeat.on_message_sent(now);
    }

    /// Stamps, stores and transmits a message under the next sequence number.
    async fn send(&mut self, mut message: Message, now: Instant) -> Result<SeqNum, SessionError> {
        if self.outbound.is_none() {
            return Err(SessionError::InvalidState {
                expected: "connected".to_string(),
                current: self.state.to_string(),
            });
        }
        let seq = self.sequence.peek_outgoing();
        self.stamp_header(&mut message, seq, Timestamp::now());
        if message.is_admin() {
            self.application.to_admin(&mut message, &self.session_id).await;
        } else {
            self.application.to_app(&mut message, &self.session_id).await;
        }

        let frame = encode(&message, Some(&*self.dictionary))?.freeze();
        if let Err(err) = self.store.append(seq, frame.clone()).await {
            error!(session = %self.session_id, seq = seq.value(), error = %err, "store append failed");
            return Err(err.into());
        }
        self.sequence.next_outgoing();
        self.transmit(frame, now);
        debug!(
            session = %self.session_id,
            seq = seq.value(),
            msg_type = message.header().get_str(tags::MSG_TYPE).unwrap_or_default(),
            "sent"
        );
        Ok(seq)
    }

    /// Transmits a copy of an earlier message under its original number.
    fn send_copy(
        &mut self,
        mut message: Message,
        seq: SeqNum,
        orig_sending_time: Option<Timestamp>,
        now: Instant,
    ) -> Result<(), SessionError> {
        let sending_time = Timestamp::now();
        self.stamp_header(&mut message, seq, sending_time);
        let header = message.header_mut();
        header.set_as(tags::POSS_DUP_FLAG, &true);
        header.set_as(
            tags::ORIG_SENDING_TIME,
            &orig_sending_time.unwrap_or(sending_time),
        );
        let frame = encode(&message, Some(&*self.dictionary))?.freeze();
        self.transmit(frame, now);
        Ok(())
    }

    fn send_gap_fill(&mut self, from: u64, new_seq: u64, now: Instant) -> Result<(), SessionError> {
        debug!(session = %self.session_id, from, new_seq, "gap fill");
        self.send_copy(
            messages::sequence_reset(SeqNum::new(new_seq), true),
            SeqNum::new(from),
            None,
            now,
        )
    }

    async fn send_reject(&mut self, details: RejectDetails, now: Instant) -> Result<(), SessionError> {
        warn!(
            session = %self.session_id,
            ref_seq = details.ref_seq_num.value(),
            reason = %details.reason,
            text = details.text.as_deref().unwrap_or_default(),
            "rejecting message"
        );
        self.send(messages::reject(&details), now).await?;
        self.emit(SessionEvent::RejectSent {
            ref_seq_num: details.ref_seq_num,
            reason: details.reason,
            text: details.text,
        })
        .await;
        Ok(())
    }

    /// Decodes a stored frame if it is an application message worth resending.
    fn replayable(&self, frame: &[u8]) -> Option<Message> {
        match FrameDecoder::new(&self.dictionary).decode(frame) {
            Ok(message) if !message.is_admin() => Some(message),
            Ok(_) => None,
            Err(err) => {
                warn!(session = %self.session_id, error = %err, "stored message unreadable, gap filling");
                None
            }
        }
    }

    /// Answers a ResendRequest from the store.
    async fn serve_resend(&mut self, begin: SeqNum, end: SeqNum, now: Instant) -> Result<(), SessionError> {
        let last_sent = self.sequence.peek_outgoing().value().saturating_sub(1);
        let first = begin.value().max(1);
        let last = if end.value() == 0 || end.value() > last_sent {
            last_sent
        } else {
            end.value()
        };
        if first > last {
            warn!(session = %self.session_id, begin = first, last_sent, "resend request beyond last sent message");
            return Ok(());
        }
        info!(session = %self.session_id, begin = first, end = last, "serving resend request");

        let stored = self.store.range(SeqNum::new(first), SeqNum::new(last)).await?;
        let mut gap_start: Option<u64> = None;
        let mut cursor = first;
        let (mut resent, mut gap_fills) = (0usize, 0usize);
        for entry in stored {
            let seq = entry.seq_num.value();
            if seq > cursor {
                gap_start.get_or_insert(cursor);
            }
            cursor = seq + 1;
            match self.replayable(&entry.bytes) {
                Some(message) => {
                    if let Some(start) = gap_start.take() {
                        self.send_gap_fill(start, seq, now)?;
                        gap_fills += 1;
                    }
                    let orig = message.sending_time().ok();
                    self.send_copy(message, entry.seq_num, orig, now)?;
                    resent += 1;
                }
                None => {
                    gap_start.get_or_insert(seq);
                }
            }
        }
        if cursor <= last {
            gap_start.get_or_insert(cursor);
        }
        if let Some(start) = gap_start {
            self.send_gap_fill(start, last + 1, now)?;
            gap_fills += 1;
        }

        self.emit(SessionEvent::ResendServed {
            begin: SeqNum::new(first),
            end: SeqNum::new(last),
            resent,
            gap_fills,
        })
        .await;
        Ok(())
    }

    // ---- inbound ----

    async fn on_frame(&mut self, frame: &[u8], now: Instant) -> Result<(), SessionError> {
        let decoded = FrameDecoder::new(&self.dictionary)
            .with_checksum_validation(self.config.validate_checksum)
            .with_length_validation(self.config.validate_length)
            .decode(frame);
        let message = match decoded {
            Ok(message) => message,
            Err(err) => return self.on_undecodable(frame, err, now).await,
        };
        self.heartbeat.on_message_received(now);
        self.process(message, now).await?;
        self.drain(now).await
    }

    /// Handles a frame the decoder refused.
    ///
    /// Broken framing is dropped without touching counters. A well-framed
    /// message with bad content gets a session Reject and consumes its
    /// sequence number when it is the one expected.
    async fn on_undecodable(&mut self, frame: &[u8], err: DecodeError, now: Instant) -> Result<(), SessionError> {
        let peeked = peek_header(frame).ok();
        let target = match (&peeked, err.reject_reason()) {
            (Some(peek), Some(reason)) if !err.is_garbled() => {
                peek.seq_num.map(|seq| (seq, reason, peek.msg_type.clone()))
            }
            _ => None,
        };
        let Some((seq, reason, msg_type)) = target else {
            warn!(session = %self.session_id, error = %err, "discarding garbled message");
            self.emit(SessionEvent::Garbled { error: err }).await;
            return Ok(());
        };

        self.heartbeat.on_message_received(now);
        if self.state == SessionState::LogonPending {
            return Err(SessionError::LogonRejected {
                reason: format!("invalid Logon: {err}"),
            });
        }
        match self.sequence.expect(seq) {
            SequenceCheck::Accept => {
                self.persist_incoming().await?;
                let details = RejectDetails::new(seq, reason)
                    .with_ref_tag(err.ref_tag())
                    .with_ref_msg_type(msg_type)
                    .with_text(err.to_string());
                self.send_reject(details, now).await?;
                self.drain(now).await
            }
            _ => {
                warn!(session = %self.session_id, seq = seq.value(), error = %err, "discarding invalid out-of-order message");
                self.emit(SessionEvent::Garbled { error: err }).await;
                Ok(())
            }
        }
    }

    fn comp_id_problem(&self, message: &Message) -> Option<u32> {
        if !self.config.check_comp_id {
            return None;
        }
        let header = message.header();
        if header.get_str(tags::SENDER_COMP_ID).ok() != Some(self.config.target_comp_id.as_str()) {
            return Some(tags::SENDER_COMP_ID);
        }
        if header.get_str(tags::TARGET_COMP_ID).ok() != Some(self.config.sender_comp_id.as_str()) {
            return Some(tags::TARGET_COMP_ID);
        }
        None
    }

    /// Content problems answered with a Reject once the sequence number is in order.
    fn content_problem(&self, message: &Message, msg_type: &MsgType, seq: SeqNum) -> Option<RejectDetails> {
        let details = |reason, tag: Option<u32>, text: String| {
            RejectDetails::new(seq, reason)
                .with_ref_tag(tag)
                .with_ref_msg_type(msg_type.as_str())
                .with_text(text)
        };
        if !message.header().is_set_field(tags::SENDING_TIME) {
            return Some(details(
                SessionRejectReason::RequiredTagMissing,
                Some(tags::SENDING_TIME),
                "SendingTime missing".to_string(),
            ));
        }
        if message.sending_time().is_err() {
            return Some(details(
                SessionRejectReason::IncorrectDataFormat,
                Some(tags::SENDING_TIME),
                "SendingTime is not a UTCTimestamp".to_string(),
            ));
        }
        if self.config.validate_required_fields
            && let Err(err) = self.dictionary.validate(message)
        {
            return Some(details(
                err.reject_reason().unwrap_or(SessionRejectReason::Other),
                err.ref_tag(),
                err.to_string(),
            ));
        }
        None
    }

    /// Validates one decoded message and routes it by sequence number.
    async fn process(&mut self, message: Message, now: Instant) -> Result<(), SessionError> {
        let msg_type = message
            .msg_type()
            .map_err(|e| violation(format!("MsgType unreadable: {e}")))?;
        let begin_string = message.header().get_str(tags::BEGIN_STRING).unwrap_or_default();
        if begin_string != self.config.begin_string {
            return Err(violation(format!(
                "BeginString {begin_string} does not match {}",
                self.config.begin_string
            )));
        }
        let Ok(seq) = message.seq_num() else {
            return Err(violation("MsgSeqNum missing or invalid"));
        };

        if self.state == SessionState::LogonPending {
            match &msg_type {
                MsgType::Logon => {}
                MsgType::Logout => {
                    let text = message.body().get_str(tags::TEXT).unwrap_or_default().to_string();
                    warn!(session = %self.session_id, text = %text, "logon refused by counterparty");
                    self.emit(SessionEvent::Error(SessionError::LogonRejected { reason: text }))
                        .await;
                    return self.apply(Trigger::LogoutReceived, now).await;
                }
                other => {
                    return Err(SessionError::LogonRejected {
                        reason: format!("expected Logon, received MsgType {other}"),
                    });
                }
            }
        }

        if let Some(tag) = self.comp_id_problem(&message) {
            if self.state.is_logged_on() {
                let details = RejectDetails::new(seq, SessionRejectReason::CompIdProblem)
                    .with_ref_tag(Some(tag))
                    .with_ref_msg_type(msg_type.as_str())
                    .with_text("CompID problem");
                self.send_reject(details, now).await?;
            }
            return Err(violation(format!("CompID problem on tag {tag}")));
        }

        if message.poss_dup() && msg_type != MsgType::SequenceReset {
            let orig = message.header().get_as::<Timestamp>(tags::ORIG_SENDING_TIME).ok();
            match (orig, message.sending_time().ok()) {
                (None, _) => return Err(violation("PossDupFlag=Y without OrigSendingTime")),
                (Some(orig), Some(sent)) if orig > sent => {
                    return Err(violation("OrigSendingTime later than SendingTime"));
                }
                _ => {}
            }
        }

        let rejection = self.content_problem(&message, &msg_type, seq);

        if msg_type == MsgType::Logon && self.state == SessionState::LogonPending {
            if let Some(details) = rejection {
                return Err(SessionError::LogonRejected {
                    reason: details.text.unwrap_or_default(),
                });
            }
            return self.on_logon(message, seq, now).await;
        }

        let gap_fill = message.get_as::<bool>(tags::GAP_FILL_FLAG).unwrap_or(false);
        if msg_type == MsgType::SequenceReset && !gap_fill && rejection.is_none() {
            return self.on_sequence_reset(&message, seq, false, now).await;
        }

        match self.sequence.expect(seq) {
            SequenceCheck::Accept => {
                self.persist_incoming().await?;
                match rejection {
                    Some(details) => self.send_reject(details, now).await,
                    None => self.dispatch(message, msg_type, seq, now).await,
                }
            }
            SequenceCheck::Gap { expected, received } => {
                self.on_gap(message, msg_type, expected, received, now).await
            }
            SequenceCheck::Duplicate { expected, received } => {
                if message.poss_dup() {
                    debug!(session = %self.session_id, seq = received, "duplicate ignored");
                    self.emit(SessionEvent::DuplicateIgnored { seq_num: seq }).await;
                    Ok(())
                } else {
                    Err(SessionError::SequenceTooLow { expected, received })
                }
            }
        }
    }

    async fn on_logon(&mut self, message: Message, seq: SeqNum, now: Instant) -> Result<(), SessionError> {
        let heart_bt_int = match message.get_as::<i64>(tags::HEART_BT_INT) {
            Ok(secs) if secs >= 0 => secs.unsigned_abs(),
            _ => {
                return Err(SessionError::LogonRejected {
                    reason: "HeartBtInt missing or negative".to_string(),
                });
            }
        };

        let role = self.config.role;
        let reset = message.get_as::<bool>(tags::RESET_SEQ_NUM_FLAG).unwrap_or(false)
            || (role == SessionRole::Acceptor && self.config.reset_on_logon);
        if reset && !self.reset_requested {
            self.reset_sequences().await?;
            self.reset_requested = true;
        }

        let check = self.sequence.expect(seq);
        match check {
            SequenceCheck::Duplicate { expected, received } => {
                return Err(SessionError::LogonRejected {
                    reason: format!("MsgSeqNum too low, expecting {expected} but received {received}"),
                });
            }
            SequenceCheck::Accept => self.persist_incoming().await?,
            SequenceCheck::Gap { .. } => {}
        }

        if let Err(reason) = self.application.from_admin(&message, &self.session_id).await {
            return Err(SessionError::LogonRejected { reason: reason.text });
        }

        self.heart_bt_int = match role {
            SessionRole::Acceptor => Duration::from_secs(heart_bt_int),
            SessionRole::Initiator => self.config.heartbeat_interval,
        };
        self.apply(Trigger::LogonAccepted { role }, now).await?;
        self.reset_requested = false;
        info!(session = %self.session_id, heart_bt_int, "logged on");
        self.application.on_logon(&self.session_id).await;

        if let SequenceCheck::Gap { expected, received } = check {
            warn!(session = %self.session_id, expected, received, "logon sequence number ahead");
            self.emit(SessionEvent::Error(SessionError::SequenceGap {
                expected,
                received,
            }))
            .await;
            self.pending.insert(received, Pending::Handled);
            self.request_gap(SeqNum::new(expected), SeqNum::new(received - 1), now)
                .await?;
        }
        Ok(())
    }

    async fn on_gap(
        &mut self,
        message: Message,
        msg_type: MsgType,
        expected: u64,
        received: u64,
        now: Instant,
    ) -> Result<(), SessionError> {
        warn!(session = %self.session_id, expected, received, "inbound sequence gap");
        self.emit(SessionEvent::Error(SessionError::SequenceGap { expected, received }))
            .await;

        let begin = self
            .pending
            .range(..received)
            .next_back()
            .map_or(expected, |(&seq, _)| (seq + 1).max(expected));

        match msg_type {
            MsgType::Logout => {
                return self.dispatch(message, msg_type, SeqNum::new(received), now).await;
            }
            MsgType::ResendRequest => {
                self.dispatch(message, msg_type, SeqNum::new(received), now).await?;
                self.pending.insert(received, Pending::Handled);
            }
            _ => {
                self.pending
                    .entry(received)
                    .or_insert(Pending::Message(message));
            }
        }
        self.request_gap(SeqNum::new(begin), SeqNum::new(received - 1), now)
            .await
    }

    async fn request_gap(&mut self, begin: SeqNum, end: SeqNum, now: Instant) -> Result<(), SessionError> {
        if begin > end {
            return Ok(());
        }
        if self.config.resend_range == ResendRange::ToInfinity
            && matches!(self.state, SessionState::Recovering { .. })
        {
            return Ok(());
        }
        self.apply(Trigger::GapDetected { begin, end }, now).await
    }

    /// Processes held-back messages that are now in sequence.
    async fn drain(&mut self, now: Instant) -> Result<(), SessionError> {
        while self.state.is_connected() {
            let next = self.sequence.next_incoming().value();
            self.pending = self.pending.split_off(&next);
            let Some(entry) = self.pending.remove(&next) else {
                break;
            };
            match entry {
                Pending::Message(message) => self.process(message, now).await?,
                Pending::Handled => {
                    self.sequence.expect(SeqNum::new(next));
                    self.persist_incoming().await?;
                }
            }
        }

        if let SessionState::Recovering { end, .. } = self.state
            && self.sequence.next_incoming() > end
        {
            info!(session = %self.session_id, next = self.sequence.next_incoming().value(), "gap closed");
            self.apply(Trigger::GapClosed, now).await?;
            if let Some(&first) = self.pending.keys().next() {
                let expected = self.sequence.next_incoming();
                self.request_gap(expected, SeqNum::new(first - 1), now).await?;
            }
        }
        Ok(())
    }

    async fn on_sequence_reset(
        &mut self,
        message: &Message,
        seq: SeqNum,
        gap_fill: bool,
        now: Instant,
    ) -> Result<(), SessionError> {
        let expected = self.sequence.next_incoming();
        let reject = |reason, text: String| {
            RejectDetails::new(seq, reason)
                .with_ref_tag(Some(tags::NEW_SEQ_NO))
                .with_ref_msg_type(MsgType::SequenceReset.as_str())
                .with_text(text)
        };
        let new_seq = match message.get_as::<SeqNum>(tags::NEW_SEQ_NO) {
            Ok(new_seq) => new_seq,
            Err(err) => {
                let details = reject(SessionRejectReason::IncorrectDataFormat, err.to_string());
                return self.send_reject(details, now).await;
            }
        };
        if new_seq < expected {
            let details = reject(
                SessionRejectReason::ValueIsIncorrect,
                format!("NewSeqNo {new_seq} below expected {expected}"),
            );
            return self.send_reject(details, now).await;
        }
        if new_seq > expected {
            self.sequence.set_next_incoming(new_seq);
            self.persist_incoming().await?;
        }
        info!(session = %self.session_id, new_seq = new_seq.value(), gap_fill, "inbound sequence reset");
        self.emit(SessionEvent::SequenceReset {
            new_seq_num: new_seq,
            gap_fill,
        })
        .await;
        Ok(())
    }

    /// Acts on an in-sequence message.
    async fn dispatch(
        &mut self,
        message: Message,
        msg_type: MsgType,
        seq: SeqNum,
        now: Instant,
    ) -> Result<(), SessionError> {
        if msg_type.is_admin()
            && let Err(reason) = self.application.from_admin(&message, &self.session_id).await
        {
            let details = RejectDetails::new(
                seq,
                SessionRejectReason::from_code(reason.code).unwrap_or(SessionRejectReason::Other),
            )
            .with_ref_tag(reason.ref_tag)
            .with_ref_msg_type(msg_type.as_str())
            .with_text(reason.text);
            return self.send_reject(details, now).await;
        }

        match msg_type {
            MsgType::Heartbeat => Ok(()),
            MsgType::TestRequest => {
                let id = message.body().get_str(tags::TEST_REQ_ID).ok().map(str::to_owned);
                self.send(messages::heartbeat(id.as_deref()), now).await.map(|_| ())
            }
            MsgType::ResendRequest => {
                let begin = message.get_as::<SeqNum>(tags::BEGIN_SEQ_NO);
                let end = message.get_as::<SeqNum>(tags::END_SEQ_NO);
                match (begin, end) {
                    (Ok(begin), Ok(end)) => self.serve_resend(begin, end, now).await,
                    (Err(err), _) | (_, Err(err)) => {
                        let details = RejectDetails::new(seq, SessionRejectReason::IncorrectDataFormat)
                            .with_ref_tag(Some(err.tag()))
                            .with_ref_msg_type(msg_type.as_str())
                            .with_text(err.to_string());
                        self.send_reject(details, now).await
                    }
                }
            }
            MsgType::Reject => {
                let ref_seq_num = message.get_as::<SeqNum>(tags::REF_SEQ_NUM).ok();
                let reason = message
                    .get_as::<u32>(tags::SESSION_REJECT_REASON)
                    .ok()
                    .and_then(SessionRejectReason::from_code);
                let text = message.body().get_str(tags::TEXT).ok().map(str::to_owned);
                warn!(session = %self.session_id, ref_seq = ?ref_seq_num, reason = ?reason, text = ?text, "counterparty rejected a message");
                self.emit(SessionEvent::RejectReceived {
                    ref_seq_num,
                    reason,
                    text,
                })
                .await;
                Ok(())
            }
            MsgType::SequenceReset => self.on_sequence_reset(&message, seq, true, now).await,
            MsgType::Logout => {
                let text = message.body().get_str(tags::TEXT).unwrap_or_default();
                info!(session = %self.session_id, text, "logout received");
                self.apply(Trigger::LogoutReceived, now).await
            }
            MsgType::Logon => {
                warn!(session = %self.session_id, seq = seq.value(), "Logon while logged on ignored");
                Ok(())
            }
            MsgType::BusinessMessageReject | MsgType::Application(_) => {
                if let Err(reason) = self.application.from_app(&message, &self.session_id).await {
                    debug!(session = %self.session_id, seq = seq.value(), code = reason.code, "application rejected message");
                    let reject = messages::business_message_reject(
                        seq,
                        msg_type.as_str(),
                        reason.code,
                        Some(&reason.text),
                    );
                    self.send(reject, now).await?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::RejectReason;
    use async_trait::async_trait;
    use fixline_core::error::StoreError;
    use fixline_core::types::CompId;
    use fixline_dictionary::Version;
    use fixline_store::{MemoryStore, StoredMessage};
    use fixline_tagvalue::{calculate_checksum, decode, format_checksum};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Default)]
    struct Recorder {
        events: Mutex<Vec<SessionEvent>>,
        received: Mutex<Vec<u64>>,
        logons: Mutex<usize>,
        logouts: Mutex<usize>,
    }

    impl Recorder {
        fn events(&self) -> Vec<SessionEvent> {
            self.events.lock().clone()
        }
    }

    #[async_trait]
    impl Application for Recorder {
        async fn on_create(&self, _session_id: &SessionId) {}

        async fn on_logon(&self, _session_id: &SessionId) {
            *self.logons.lock() += 1;
        }

        async fn on_logout(&self, _session_id: &SessionId) {
            *self.logouts.lock() += 1;
        }

        async fn to_admin(&self, _message: &mut Message, _session_id: &SessionId) {}

        async fn from_admin(&self, _message: &Message, _session_id: &SessionId) -> Result<(), RejectReason> {
            Ok(())
        }

        async fn to_app(&self, _message: &mut Message, _session_id: &SessionId) {}

        async fn from_app(&self, message: &Message, _session_id: &SessionId) -> Result<(), RejectReason> {
            self.received.lock().push(message.seq_num().map_or(0, SeqNum::value));
            if message.body().get_str(tags::TEXT).ok() == Some("refuse") {
                return Err(RejectReason::new(3, "unsupported"));
            }
            Ok(())
        }

        async fn on_event(&self, _session_id: &SessionId, event: &SessionEvent) {
            self.events.lock().push(event.clone());
        }
    }

    #[derive(Debug, Default)]
    struct FlakyStore {
        inner: MemoryStore,
        broken: AtomicBool,
    }

    #[async_trait]
    impl MessageStore for FlakyStore {
        async fn append(&self, seq_num: SeqNum, message: Bytes) -> Result<(), StoreError> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(StoreError::StoreFailed {
                    seq_num: seq_num.value(),
                    reason: "disk full".to_string(),
                });
            }
            self.inner.append(seq_num, message).await
        }

        async fn range(&self, begin: SeqNum, end: SeqNum) -> Result<Vec<StoredMessage>, StoreError> {
            self.inner.range(begin, end).await
        }

        fn next_sender_seq(&self) -> SeqNum {
            self.inner.next_sender_seq()
        }

        fn next_target_seq(&self) -> SeqNum {
            self.inner.next_target_seq()
        }

        async fn set_next_sender_seq(&self, seq: SeqNum) -> Result<(), StoreError> {
            self.inner.set_next_sender_seq(seq).await
        }

        async fn set_next_target_seq(&self, seq: SeqNum) -> Result<(), StoreError> {
            self.inner.set_next_target_seq(seq).await
        }

        async fn reset(&self) -> Result<(), StoreError> {
            self.inner.reset().await
        }

        fn creation_time(&self) -> Timestamp {
            self.inner.creation_time()
        }
    }

    struct Harness {
        engine: SessionEngine,
        rx: mpsc::UnboundedReceiver<Bytes>,
        app: Arc<Recorder>,
        dict: Arc<Dictionary>,
        t0: Instant,
    }

    fn config(role: SessionRole) -> SessionConfig {
        SessionConfig::new(
            CompId::new("SERVER").unwrap(),
            CompId::new("CLIENT").unwrap(),
            "FIX.4.4",
        )
        .with_role(role)
    }

    fn earlier() -> Timestamp {
        Timestamp::from_millis(Timestamp::now().as_millis() - 60_000)
    }

    fn app_message(text: &str) -> Message {
        let mut msg = Message::new("B");
        msg.set_field(148, copy(text));
        msg
    }

    fn poss_dup(mut msg: Message) -> Message {
        msg.header_mut().set_as(tags::POSS_DUP_FLAG, &true);
        msg.header_mut().set_as(tags::ORIG_SENDING_TIME, &earlier());
        msg
    }

    fn counterparty_logon() -> Message {
        messages::logon(30, false, None)
    }

    impl Harness {
        async fn new(config: SessionConfig, store: Arc<dyn MessageStore>) -> Self {
            let dict = Arc::new(Dictionary::session(Version::Fix44));
            let app = Arc::new(Recorder::default());
            let engine = SessionEngine::new(config, dict.clone(), store, app.clone())
                .await
                .unwrap();
            let (tx, rx) = mpsc::unbounded_channel();
            let mut harness = Self {
                engine,
                rx,
                app,
                dict,
                t0: Instant::now(),
            };
            harness.engine.connect(tx, harness.t0).await.unwrap();
            harness
        }

        async fn acceptor() -> Self {
            Self::new(config(SessionRole::Acceptor), Arc::new(MemoryStore::new())).await
        }

        async fn logged_on() -> Self {
            let mut harness = Self::acceptor().await;
            harness.feed(counterparty_logon(), 1).await.unwrap();
            assert_eq!(harness.engine.state(), SessionState::Active);
            harness.sent();
            harness
        }

        fn frame(&self, mut msg: Message, seq: u64) -> Vec<u8> {
            let header = msg.header_mut();
            header.set_field(tags::BEGIN_STRING, "FIX.4.4");
            header.set_field(tags::SENDER_COMP_ID, "CLIENT");
            header.set_field(tags::TARGET_COMP_ID, "SERVER");
            header.set_as(tags::MSG_SEQ_NUM, &SeqNum::new(seq));
            header.set_as(tags::SENDING_TIME, &Timestamp::now());
            encode(&msg, Some(&*self.dict)).unwrap().to_vec()
        }

        async fn feed(&mut self, msg: Message, seq: u64) -> Result<(), SessionError> {
            let bytes = self.frame(msg, seq);
            self.engine.on_bytes_received_at(&bytes, self.t0).await
        }

        fn sent(&mut self) -> Vec<Message> {
            let mut out = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                out.push(decode(&frame, &self.dict).unwrap());
            }
            out
        }
    }

    fn seq_of(msg: &Message) -> u64 {
        msg.seq_num().unwrap().value()
    }

    fn type_of(msg: &Message) -> MsgType {
        msg.msg_type().unwrap()
    }

    fn raw_frame(body: &str) -> Vec<u8> {
        let body = body.replace('|', "\x01");
        let mut frame = format!("8=FIX.4.4\x019={}\x01{}", body.len(), body).into_bytes();
        let checksum = format_checksum(calculate_checksum(&frame));
        frame.extend_from_slice(b"10=");
        frame.extend_from_slice(&checksum);
        frame.push(0x01);
        frame
    }

    #[tokio::test]
    async fn test_acceptor_logon_echoes_heart_bt_int() {
        let mut h = Harness::acceptor().await;
        assert_eq!(h.engine.state(), SessionState::LogonPending);

        let mut logon = counterparty_logon();
        logon.set_as(tags::HEART_BT_INT, &45u64);
        h.feed(logon, 1).await.unwrap();

        assert_eq!(h.engine.state(), SessionState::Active);
        let sent = h.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(type_of(&sent[0]), MsgType::Logon);
        assert_eq!(seq_of(&sent[0]), 1);
        assert_eq!(sent[0].get_as::<u64>(tags::HEART_BT_INT).unwrap(), 45);
        assert_eq!(sent[0].header().get_str(tags::SENDER_COMP_ID).unwrap(), "SERVER");
        assert_eq!(*h.app.logons.lock(), 1);
        assert_eq!(h.engine.sequence().next_incoming().value(), 2);
    }

    #[tokio::test]
    async fn test_initiator_sends_logon_on_connect() {
        let mut h = Harness::new(config(SessionRole::Initiator), Arc::new(MemoryStore::new())).await;
        let sent = h.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(type_of(&sent[0]), MsgType::Logon);
        assert_eq!(sent[0].get_as::<u64>(tags::HEART_BT_INT).unwrap(), 30);

        h.feed(counterparty_logon(), 1).await.unwrap();
        assert_eq!(h.engine.state(), SessionState::Active);
        assert!(h.sent().is_empty());
    }

    #[tokio::test]
    async fn test_first_message_must_be_logon() {
        let mut h = Harness::acceptor().await;
        let err = h.feed(messages::heartbeat(None), 1).await.unwrap_err();
        assert!(matches!(err, SessionError::LogonRejected { .. }));
        assert_eq!(h.engine.state(), SessionState::Disconnected);
        let sent = h.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(type_of(&sent[0]), MsgType::Logout);
    }

    #[tokio::test]
    async fn test_logon_without_heart_bt_int_is_rejected() {
        let mut h = Harness::acceptor().await;
        let mut logon = Message::new(MsgType::Logon);
        logon.set_field(tags::ENCRYPT_METHOD, "0");
        let err = h.feed(logon, 1).await.unwrap_err();
        assert!(matches!(err, SessionError::LogonRejected { .. }));
        assert_eq!(h.engine.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_logon_timeout() {
        let mut h = Harness::new(config(SessionRole::Initiator), Arc::new(MemoryStore::new())).await;
        h.engine.on_timer(h.t0 + Duration::from_secs(5)).await.unwrap();
        assert_eq!(h.engine.state(), SessionState::LogonPending);
        h.engine.on_timer(h.t0 + Duration::from_secs(10)).await.unwrap();
        assert_eq!(h.engine.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_reset_seq_num_flag_resets_both_counters() {
        let store = Arc::new(MemoryStore::with_initial_seqs(SeqNum::new(20), SeqNum::new(30)));
        let mut h = Harness::new(config(SessionRole::Acceptor), store.clone()).await;

        let mut logon = counterparty_logon();
        logon.set_as(tags::RESET_SEQ_NUM_FLAG, &true);
        h.feed(logon, 1).await.unwrap();

        assert_eq!(h.engine.state(), SessionState::Active);
        let sent = h.sent();
        assert_eq!(seq_of(&sent[0]), 1);
        assert!(sent[0].get_as::<bool>(tags::RESET_SEQ_NUM_FLAG).unwrap());
        assert_eq!(store.next_sender_seq().value(), 2);
        assert_eq!(store.next_target_seq().value(), 2);
    }

    #[tokio::test]
    async fn test_in_order_messages_advance_expected() {
        let mut h = Harness::logged_on().await;
        for seq in 2..=6 {
            h.feed(app_message("news"), seq).await.unwrap();
        }
        assert_eq!(h.engine.sequence().next_incoming().value(), 7);
        assert_eq!(*h.app.received.lock(), vec![2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_gap_recovery_with_single_resend_request() {
        let mut h = Harness::logged_on().await;
        for seq in 2..=4 {
            h.feed(app_message("news"), seq).await.unwrap();
        }

        h.feed(app_message("early"), 8).await.unwrap();
        assert_eq!(
            h.engine.state(),
            SessionState::Recovering {
                begin: SeqNum::new(5),
                end: SeqNum::new(7)
            }
        );
        let sent = h.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(type_of(&sent[0]), MsgType::ResendRequest);
        assert_eq!(sent[0].get_as::<u64>(tags::BEGIN_SEQ_NO).unwrap(), 5);
        assert_eq!(sent[0].get_as::<u64>(tags::END_SEQ_NO).unwrap(), 7);
        assert_eq!(h.engine.pending_count(), 1);
        assert!(h.app.events().contains(&SessionEvent::Error(SessionError::SequenceGap {
            expected: 5,
            received: 8,
        })));

        for seq in 5..=7 {
            h.feed(poss_dup(app_message("replay")), seq).await.unwrap();
        }
        assert_eq!(h.engine.state(), SessionState::Active);
        assert_eq!(h.engine.sequence().next_incoming().value(), 9);
        assert!(h.sent().is_empty());
        assert_eq!(*h.app.received.lock(), vec![2, 3, 4, 5, 6, 7, 8]);
    }

    #[tokio::test]
    async fn test_further_gap_inside_range_sends_nothing() {
        let mut h = Harness::logged_on().await;
        h.feed(app_message("a"), 5).await.unwrap();
        assert_eq!(h.sent().len(), 1);

        h.feed(app_message("b"), 4).await.unwrap();
        assert!(h.sent().is_empty());

        h.feed(app_message("c"), 7).await.unwrap();
        let sent = h.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].get_as::<u64>(tags::BEGIN_SEQ_NO).unwrap(), 6);
        assert_eq!(sent[0].get_as::<u64>(tags::END_SEQ_NO).unwrap(), 6);
    }

    #[tokio::test]
    async fn test_resend_to_infinity_policy() {
        let cfg = config(SessionRole::Acceptor).with_resend_range(ResendRange::ToInfinity);
        let mut h = Harness::new(cfg, Arc::new(MemoryStore::new())).await;
        h.feed(counterparty_logon(), 1).await.unwrap();
        h.sent();

        h.feed(app_message("a"), 4).await.unwrap();
        let sent = h.sent();
        assert_eq!(sent[0].get_as::<u64>(tags::END_SEQ_NO).unwrap(), 0);

        h.feed(app_message("b"), 9).await.unwrap();
        assert!(h.sent().is_empty());
    }

    #[tokio::test]
    async fn test_logon_ahead_of_expected_requests_resend() {
        let store = Arc::new(MemoryStore::with_initial_seqs(SeqNum::new(1), SeqNum::new(5)));
        let mut h = Harness::new(config(SessionRole::Acceptor), store).await;
        h.feed(counterparty_logon(), 8).await.unwrap();

        let sent = h.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(type_of(&sent[0]), MsgType::Logon);
        assert_eq!(type_of(&sent[1]), MsgType::ResendRequest);
        assert_eq!(sent[1].get_as::<u64>(tags::BEGIN_SEQ_NO).unwrap(), 5);
        assert_eq!(sent[1].get_as::<u64>(tags::END_SEQ_NO).unwrap(), 7);

        let mut gap_fill = messages::sequence_reset(SeqNum::new(8), true);
        gap_fill.header_mut().set_as(tags::POSS_DUP_FLAG, &true);
        h.feed(gap_fill, 5).await.unwrap();
        assert_eq!(h.engine.sequence().next_incoming().value(), 9);
        assert_eq!(h.engine.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_duplicate_handling() {
        let mut h = Harness::logged_on().await;
        h.feed(app_message("a"), 2).await.unwrap();
        h.feed(app_message("b"), 3).await.unwrap();

        h.feed(poss_dup(app_message("a")), 2).await.unwrap();
        assert_eq!(h.engine.state(), SessionState::Active);
        assert!(
            h.app
                .events()
                .contains(&SessionEvent::DuplicateIgnored { seq_num: SeqNum::new(2) })
        );

        let err = h.feed(app_message("c"), 3).await.unwrap_err();
        assert_eq!(err, SessionError::SequenceTooLow { expected: 4, received: 3 });
        assert_eq!(h.engine.state(), SessionState::Disconnected);
        let sent = h.sent();
        let logout = sent.last().unwrap();
        assert_eq!(type_of(logout), MsgType::Logout);
        assert!(logout.body().get_str(tags::TEXT).unwrap().starts_with("MsgSeqNum too low"));
        assert_eq!(*h.app.logouts.lock(), 1);
    }

    #[tokio::test]
    async fn test_poss_dup_without_orig_sending_time() {
        let mut h = Harness::logged_on().await;
        let mut msg = app_message("a");
        msg.header_mut().set_as(tags::POSS_DUP_FLAG, &true);
        let err = h.feed(msg, 2).await.unwrap_err();
        assert!(matches!(err, SessionError::ProtocolViolation { .. }));
        assert_eq!(h.engine.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_sequence_reset_modes() {
        let mut h = Harness::logged_on().await;

        let mut gap_fill = messages::sequence_reset(SeqNum::new(7), true);
        gap_fill.header_mut().set_as(tags::POSS_DUP_FLAG, &true);
        h.feed(gap_fill, 2).await.unwrap();
        assert_eq!(h.engine.sequence().next_incoming().value(), 7);

        h.feed(messages::sequence_reset(SeqNum::new(20), false), 1).await.unwrap();
        assert_eq!(h.engine.sequence().next_incoming().value(), 20);
        assert!(h.sent().is_empty());

        h.feed(messages::sequence_reset(SeqNum::new(10), false), 1).await.unwrap();
        assert_eq!(h.engine.sequence().next_incoming().value(), 20);
        let sent = h.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(type_of(&sent[0]), MsgType::Reject);
        assert_eq!(sent[0].get_as::<u32>(tags::SESSION_REJECT_REASON).unwrap(), 5);
        assert_eq!(sent[0].get_as::<u32>(tags::REF_TAG_ID).unwrap(), tags::NEW_SEQ_NO);
    }

    #[tokio::test]
    async fn test_test_request_answered_with_heartbeat() {
        let mut h = Harness::logged_on().await;
        h.feed(messages::test_request("PING1"), 2).await.unwrap();
        let sent = h.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(type_of(&sent[0]), MsgType::Heartbeat);
        assert_eq!(sent[0].body().get_str(tags::TEST_REQ_ID).unwrap(), "PING1");
    }

    #[tokio::test]
    async fn test_resend_range_from_store() {
        let store = Arc::new(MemoryStore::new());
        let mut h = Harness::new(config(SessionRole::Acceptor), store.clone()).await;
        h.feed(counterparty_logon(), 1).await.unwrap();
        for i in 0..14 {
            h.engine
                .send_application_message(app_message(&format!("n{i}")))
                .await
                .unwrap();
        }
        assert_eq!(store.message_count(), 15);
        h.sent();

        let request = messages::resend_request(SeqNum::new(10), SeqNum::new(12));
        h.feed(request, 2).await.unwrap();

        let sent = h.sent();
        assert_eq!(sent.iter().map(seq_of).collect::<Vec<_>>(), vec![10, 11, 12]);
        for msg in &sent {
            assert_eq!(type_of(msg), MsgType::Application("B".to_string()));
            assert!(msg.poss_dup());
            assert!(msg.header().is_set_field(tags::ORIG_SENDING_TIME));
        }
        assert_eq!(sent[0].body().get_str(148).unwrap(), "n8");
        assert_eq!(store.message_count(), 15);
        assert_eq!(h.engine.sequence().peek_outgoing().value(), 16);
    }

    #[tokio::test]
    async fn test_resend_gap_fills_admin_runs() {
        let mut h = Harness::logged_on().await;
        h.engine.send_application_message(app_message("x")).await.unwrap();
        h.feed(messages::test_request("T"), 2).await.unwrap();
        h.engine.send_application_message(app_message("y")).await.unwrap();
        h.sent();

        h.feed(messages::resend_request(SeqNum::new(1), SeqNum::new(0)), 3)
            .await
            .unwrap();
        let sent = h.sent();
        let summary: Vec<(u64, MsgType)> = sent.iter().map(|m| (seq_of(m), type_of(m))).collect();
        assert_eq!(
            summary,
            vec![
                (1, MsgType::SequenceReset),
                (2, MsgType::Application("B".to_string())),
                (3, MsgType::SequenceReset),
                (4, MsgType::Application("B".to_string())),
            ]
        );
        assert_eq!(sent[0].get_as::<u64>(tags::NEW_SEQ_NO).unwrap(), 2);
        assert!(sent[0].get_as::<bool>(tags::GAP_FILL_FLAG).unwrap());
        assert!(sent[0].poss_dup());
        assert_eq!(sent[2].get_as::<u64>(tags::NEW_SEQ_NO).unwrap(), 4);
    }

    #[tokio::test]
    async fn test_heartbeat_probe_then_timeout() {
        let mut h = Harness::logged_on().await;
        let t0 = h.t0;
        let secs = Duration::from_secs;

        h.engine.on_timer(t0 + secs(30)).await.unwrap();
        h.engine.on_timer(t0 + secs(31)).await.unwrap();
        h.engine.on_timer(t0 + secs(45)).await.unwrap();
        h.engine.on_timer(t0 + secs(59)).await.unwrap();
        assert_eq!(h.engine.state(), SessionState::Active);

        let err = h.engine.on_timer(t0 + secs(60)).await.unwrap_err();
        assert!(matches!(err, SessionError::HeartbeatTimeout { .. }));
        assert_eq!(h.engine.state(), SessionState::Disconnected);

        let types: Vec<MsgType> = h.sent().iter().map(type_of).collect();
        assert_eq!(types, vec![MsgType::Heartbeat, MsgType::TestRequest]);
        assert!(h.app.events().contains(&SessionEvent::HeartbeatTimeout));
    }

    #[tokio::test]
    async fn test_garbled_frame_is_discarded() {
        let mut h = Harness::logged_on().await;
        let mut frame = h.frame(app_message("a"), 2);
        let len = frame.len();
        frame[len - 2] = if frame[len - 2] == b'0' { b'1' } else { b'0' };
        h.engine.on_bytes_received_at(&frame, h.t0).await.unwrap();

        assert_eq!(h.engine.state(), SessionState::Active);
        assert_eq!(h.engine.sequence().next_incoming().value(), 2);
        assert!(
            h.app
                .events()
                .iter()
                .any(|e| matches!(e, SessionEvent::Garbled { .. }))
        );
        assert!(h.sent().is_empty());
    }

    #[tokio::test]
    async fn test_bad_group_is_rejected_and_consumed() {
        let mut h = Harness::logged_on().await;
        let sending_time = Timestamp::now().format_millis();
        let frame = raw_frame(&format!(
            "35=0|49=CLIENT|56=SERVER|34=2|52={sending_time}|627=2|628=HOP1|"
        ));
        h.engine.on_bytes_received_at(&frame, h.t0).await.unwrap();

        assert_eq!(h.engine.sequence().next_incoming().value(), 3);
        let sent = h.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(type_of(&sent[0]), MsgType::Reject);
        assert_eq!(sent[0].get_as::<u64>(tags::REF_SEQ_NUM).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_comp_id_mismatch() {
        let mut h = Harness::logged_on().await;
        let mut msg = app_message("a");
        let header = msg.header_mut();
        header.set_field(tags::BEGIN_STRING, "FIX.4.4");
        header.set_field(tags::SENDER_COMP_ID, "OTHER");
        header.set_field(tags::TARGET_COMP_ID, "SERVER");
        header.set_as(tags::MSG_SEQ_NUM, &SeqNum::new(2));
        header.set_as(tags::SENDING_TIME, &Timestamp::now());
        let frame = encode(&msg, Some(&*h.dict)).unwrap();

        let err = h.engine.on_bytes_received_at(&frame, h.t0).await.unwrap_err();
        assert!(matches!(err, SessionError::ProtocolViolation { .. }));
        let types: Vec<MsgType> = h.sent().iter().map(type_of).collect();
        assert_eq!(types, vec![MsgType::Reject, MsgType::Logout]);
        assert_eq!(h.engine.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_application_reject_sends_business_reject() {
        let mut h = Harness::logged_on().await;
        let mut msg = app_message("headline");
        msg.set_field(tags::TEXT, "refuse");
        h.feed(msg, 2).await.unwrap();
        let sent = h.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(type_of(&sent[0]), MsgType::BusinessMessageReject);
        assert_eq!(sent[0].get_as::<u64>(tags::REF_SEQ_NUM).unwrap(), 2);
        assert_eq!(sent[0].body().get_str(tags::REF_MSG_TYPE).unwrap(), "B");
    }

    #[tokio::test]
    async fn test_graceful_logout() {
        let mut h = Harness::logged_on().await;
        h.engine
            .initiate_logout(Some("end of day".to_string()), h.t0)
            .await
            .unwrap();
        assert_eq!(h.engine.state(), SessionState::LogoutPending);
        let sent = h.sent();
        assert_eq!(sent[0].body().get_str(tags::TEXT).unwrap(), "end of day");

        h.feed(messages::logout(None), 2).await.unwrap();
        assert_eq!(h.engine.state(), SessionState::Disconnected);
        assert!(h.sent().is_empty());
        assert_eq!(*h.app.logouts.lock(), 1);
    }

    #[tokio::test]
    async fn test_counterparty_logout_is_answered() {
        let mut h = Harness::logged_on().await;
        h.feed(messages::logout(Some("bye")), 2).await.unwrap();
        assert_eq!(h.engine.state(), SessionState::Disconnected);
        let types: Vec<MsgType> = h.sent().iter().map(type_of).collect();
        assert_eq!(types, vec![MsgType::Logout]);
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_counters() {
        let store = Arc::new(MemoryStore::new());
        let mut h = Harness::new(config(SessionRole::Acceptor), store.clone()).await;
        h.feed(counterparty_logon(), 1).await.unwrap();
        h.feed(app_message("a"), 2).await.unwrap();

        h.engine.on_transport_failure("connection reset").await;
        assert_eq!(h.engine.state(), SessionState::Disconnected);
        assert_eq!(store.next_target_seq().value(), 3);
        assert_eq!(store.next_sender_seq().value(), 2);

        let err = h.engine.send_application_message(app_message("b")).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { .. }));

        let (tx, _rx) = mpsc::unbounded_channel();
        h.engine.connect(tx, h.t0).await.unwrap();
        assert_eq!(h.engine.sequence().next_incoming().value(), 3);
    }

    #[tokio::test]
    async fn test_second_connect_is_refused() {
        let mut h = Harness::acceptor().await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = h.engine.connect(tx, h.t0).await.unwrap_err();
        assert!(matches!(err, SessionError::AlreadyConnected { .. }));
    }

    #[tokio::test]
    async fn test_store_failure_is_fatal() {
        let store = Arc::new(FlakyStore::default());
        let mut h = Harness::new(config(SessionRole::Acceptor), store.clone()).await;
        h.feed(counterparty_logon(), 1).await.unwrap();

        store.broken.store(true, Ordering::SeqCst);
        let err = h.engine.send_application_message(app_message("a")).await.unwrap_err();
        assert!(matches!(err, SessionError::Store(_)));
        assert_eq!(h.engine.state(), SessionState::Disconnected);
        assert_eq!(h.engine.sequence().peek_outgoing().value(), 2);
    }

    #[tokio::test]
    async fn test_partial_frames_are_buffered() {
        let mut h = Harness::logged_on().await;
        let frame = h.frame(messages::test_request("SPLIT"), 2);
        let (first, second) = frame.split_at(frame.len() / 2);
        h.engine.on_bytes_received_at(first, h.t0).await.unwrap();
        assert!(h.sent().is_empty());
        h.engine.on_bytes_received_at(second, h.t0).await.unwrap();
        assert_eq!(h.sent().len(), 1);
    }
}
