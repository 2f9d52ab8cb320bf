/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Message types for FIX protocol.
//!
//! This module provides:
//! - [`MsgType`]: Session-level message types plus an application catch-all
//! - [`Message`]: Header, body and trailer field maps of one message

use crate::error::FieldMapError;
use crate::field::{FieldConvert, FixField};
use crate::fieldmap::FieldMap;
use crate::group::Group;
use crate::tags;
use crate::types::{SeqNum, Timestamp};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// FIX message types known to the session layer.
///
/// Every application message type is carried as `Application(String)`; the
/// dictionary, not this enum, knows what those types mean.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MsgType {
    /// Heartbeat (0) - Session level.
    #[default]
    Heartbeat,
    /// Test Request (1) - Session level.
    TestRequest,
    /// Resend Request (2) - Session level.
    ResendRequest,
    /// Reject (3) - Session level.
    Reject,
    /// Sequence Reset (4) - Session level.
    SequenceReset,
    /// Logout (5) - Session level.
    Logout,
    /// Logon (A) - Session level.
    Logon,
    /// Business Message Reject (j).
    BusinessMessageReject,
    /// Any other message type.
    Application(String),
}

impl std::str::FromStr for MsgType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "0" => Self::Heartbeat,
            "1" => Self::TestRequest,
            "2" => Self::ResendRequest,
            "3" => Self::Reject,
            "4" => Self::SequenceReset,
            "5" => Self::Logout,
            "A" => Self::Logon,
            "j" => Self::BusinessMessageReject,
            other => Self::Application(other.to_string()),
        })
    }
}

impl From<&str> for MsgType {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(t) => t,
            Err(never) => match never {},
        }
    }
}

impl MsgType {
    /// Returns the wire representation of this message type.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Heartbeat => "0",
            Self::TestRequest => "1",
            Self::ResendRequest => "2",
            Self::Reject => "3",
            Self::SequenceReset => "4",
            Self::Logout => "5",
            Self::Logon => "A",
            Self::BusinessMessageReject => "j",
            Self::Application(s) => s.as_str(),
        }
    }

    /// Returns true if this is an administrative (session-level) message.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Self::Heartbeat
                | Self::TestRequest
                | Self::ResendRequest
                | Self::Reject
                | Self::SequenceReset
                | Self::Logout
                | Self::Logon
        )
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A FIX message: header, body and trailer.
///
/// Field-level setters and getters on `Message` act on the body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    header: FieldMap,
    body: FieldMap,
    trailer: FieldMap,
}

impl Message {
    /// Creates a message of the given type with MsgType(35) set in the header.
    #[must_use]
    pub fn new(msg_type: impl Into<MsgType>) -> Self {
        let mut msg = Self::default();
        let msg_type = msg_type.into();
        msg.header
            .set_field(tags::MSG_TYPE, Bytes::copy_from_slice(msg_type.as_str().as_bytes()));
        msg
    }

    /// Creates a message from its three parts.
    #[must_use]
    pub fn from_parts(header: FieldMap, body: FieldMap, trailer: FieldMap) -> Self {
        Self { header, body, trailer }
    }

    /// Returns the header.
    #[must_use]
    pub fn header(&self) -> &FieldMap {
        &self.header
    }

    /// Returns the header mutably.
    pub fn header_mut(&mut self) -> &mut FieldMap {
        &mut self.header
    }

    /// Returns the body.
    #[must_use]
    pub fn body(&self) -> &FieldMap {
        &self.body
    }

    /// Returns the body mutably.
    pub fn body_mut(&mut self) -> &mut FieldMap {
        &mut self.body
    }

    /// Returns the trailer.
    #[must_use]
    pub fn trailer(&self) -> &FieldMap {
        &self.trailer
    }

    /// Returns the trailer mutably.
    pub fn trailer_mut(&mut self) -> &mut FieldMap {
        &mut self.trailer
    }

    /// Sets a body field.
    pub fn set_field(&mut self, tag: u32, value: impl Into<Bytes>) {
        self.body.set_field(tag, value);
    }

    /// Sets a body field from a typed value.
    pub fn set_as<T: FieldConvert>(&mut self, tag: u32, value: &T) {
        self.body.set_as(tag, value);
    }

    /// Sets a body field through its descriptor.
    pub fn set<F: FixField>(&mut self, value: F::Value) {
        self.body.set::<F>(value);
    }

    /// Returns a raw body field.
    ///
    /// # Errors
    /// Returns `FieldMapError::FieldNotFound` if absent.
    pub fn get_field(&self, tag: u32) -> Result<&Bytes, FieldMapError> {
        self.body.get_field(tag)
    }

    /// Returns a body field converted to `T`.
    ///
    /// # Errors
    /// Returns `FieldNotFound` or `InvalidValue`.
    pub fn get_as<T: FieldConvert>(&self, tag: u32) -> Result<T, FieldMapError> {
        self.body.get_as(tag)
    }

    /// Returns a body field through its descriptor.
    ///
    /// # Errors
    /// Returns `FieldNotFound` or `InvalidValue`.
    pub fn get<F: FixField>(&self) -> Result<F::Value, FieldMapError> {
        self.body.get::<F>()
    }

    /// Returns true if the body field is set.
    #[must_use]
    pub fn is_set_field(&self, tag: u32) -> bool {
        self.body.is_set_field(tag)
    }

    /// Appends a body group entry.
    ///
    /// # Errors
    /// Returns `FieldMapError::MissingDelimiter` if the entry lacks its delimiter.
    pub fn add_group(&mut self, entry: Group) -> Result<(), FieldMapError> {
        self.body.add_group(entry)
    }

    /// Returns the message type.
    ///
    /// # Errors
    /// Returns `FieldMapError::FieldNotFound` if MsgType is not set.
    pub fn msg_type(&self) -> Result<MsgType, FieldMapError> {
        Ok(MsgType::from(self.header.get_str(tags::MSG_TYPE)?))
    }

    /// Returns MsgSeqNum(34).
    ///
    /// # Errors
    /// Returns `FieldNotFound` or `InvalidValue`.
    pub fn seq_num(&self) -> Result<SeqNum, FieldMapError> {
        self.header.get_as(tags::MSG_SEQ_NUM)
    }

    /// Returns SendingTime(52).
    ///
    /// # Errors
    /// Returns `FieldNotFound` or `InvalidValue`.
    pub fn sending_time(&self) -> Result<Timestamp, FieldMapError> {
        self.header.get_as(tags::SENDING_TIME)
    }

    /// Returns true if this is a session-level message.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.msg_type().is_ok_and(|t| t.is_admin())
    }

    /// Returns true if PossDupFlag(43) is `Y`.
    #[must_use]
    pub fn poss_dup(&self) -> bool {
        self.header
            .get_as::<bool>(tags::POSS_DUP_FLAG)
            .unwrap_or(false)
    }
}
