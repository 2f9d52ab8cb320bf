/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Error types for the fixline FIX session engine.
//!
//! Every layer owns a `thiserror` enum; [`FixError`] aggregates them for
//! callers that cross layers. The split mirrors how each class of failure is
//! handled by the session engine:
//! - [`DecodeError`]: malformed input, the message is discarded or rejected
//! - [`FieldMapError`]: data-model access failures
//! - [`SessionError`]: sequence, protocol and transport failures
//! - [`StoreError`]: persistence failures, fatal to the session

use crate::types::SessionRejectReason;
use thiserror::Error;

/// Result type alias using [`FixError`] as the error type.
pub type Result<T> = std::result::Result<T, FixError>;

/// Top-level error type for all fixline operations.
#[derive(Debug, Error)]
pub enum FixError {
    /// Error during message decoding.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Error during message encoding.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Error accessing a field map.
    #[error("field error: {0}")]
    FieldMap(#[from] FieldMapError),

    /// Error in session layer operations.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Error in message store operations.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error from underlying transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that occur during FIX message decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Message buffer is incomplete, need more data.
    #[error("incomplete message, need more data")]
    Incomplete,

    /// BeginString (tag 8) is not the first field.
    #[error("invalid begin string: expected 8=FIX.x.y as first field")]
    InvalidBeginString,

    /// BodyLength (tag 9) is not the second field.
    #[error("missing body length field (tag 9)")]
    MissingBodyLength,

    /// BodyLength value is not a valid integer.
    #[error("invalid body length value")]
    InvalidBodyLength,

    /// BodyLength disagrees with the number of bytes actually present.
    #[error("body length mismatch: declared {declared}, actual {actual}")]
    BodyLengthMismatch {
        /// Declared BodyLength value.
        declared: usize,
        /// Number of bytes between BodyLength and CheckSum.
        actual: usize,
    },

    /// MsgType (tag 35) is not the third field.
    #[error("missing msg type field (tag 35)")]
    MissingMsgType,

    /// CheckSum (tag 10) is absent.
    #[error("missing checksum field (tag 10)")]
    MissingChecksum,

    /// Checksum mismatch between calculated and declared values.
    #[error("checksum mismatch: calculated {calculated}, declared {declared}")]
    ChecksumMismatch {
        /// Calculated checksum value.
        calculated: u8,
        /// Declared checksum value in message.
        declared: u8,
    },

    /// Invalid tag format (not a positive integer, or no `=`).
    #[error("invalid tag format: {0}")]
    InvalidTag(String),

    /// A tag appears twice outside of a repeating group.
    #[error("tag {tag} appears more than once")]
    DuplicateTag {
        /// The repeated tag.
        tag: u32,
    },

    /// Missing required field.
    #[error("missing required field: tag {tag}")]
    MissingRequiredField {
        /// The tag number of the missing field.
        tag: u32,
    },

    /// Invalid field value for the expected type.
    #[error("invalid field value for tag {tag}: {reason}")]
    InvalidFieldValue {
        /// The tag number of the field.
        tag: u32,
        /// Description of why the value is invalid.
        reason: String,
    },

    /// Repeating group count disagrees with the entries on the wire.
    #[error("group count mismatch for tag {count_tag}: expected {expected}, found {actual}")]
    GroupCountMismatch {
        /// The tag containing the group count.
        count_tag: u32,
        /// Declared number of group entries.
        expected: u32,
        /// Actual number of group entries found.
        actual: u32,
    },

    /// A group entry does not start with the group's delimiter tag.
    #[error("group {count_tag} entry must start with tag {delimiter}, found {found}")]
    GroupDelimiterMissing {
        /// The group count tag.
        count_tag: u32,
        /// The declared delimiter tag.
        delimiter: u32,
        /// The tag actually found.
        found: u32,
    },

    /// A group member repeated or out of declared order within one entry.
    #[error("unexpected tag {tag} inside group {count_tag}")]
    UnexpectedGroupTag {
        /// The group count tag.
        count_tag: u32,
        /// The offending member tag.
        tag: u32,
    },

    /// Bytes follow the CheckSum field.
    #[error("unexpected data after checksum at offset {offset}")]
    TrailingData {
        /// Offset of the first trailing byte.
        offset: usize,
    },

    /// Invalid UTF-8 in string field.
    #[error("invalid utf-8 in field: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Message exceeds maximum allowed size.
    #[error("message too large: {size} bytes exceeds maximum {max_size}")]
    MessageTooLarge {
        /// Actual message size in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max_size: usize,
    },
}

impl DecodeError {
    /// Returns true if the message framing itself is broken.
    ///
    /// Garbled messages cannot be trusted to carry a usable MsgSeqNum, so the
    /// session discards them without consuming a sequence number.
    #[must_use]
    pub const fn is_garbled(&self) -> bool {
        matches!(
            self,
            Self::Incomplete
                | Self::InvalidBeginString
                | Self::MissingBodyLength
                | Self::InvalidBodyLength
                | Self::BodyLengthMismatch { .. }
                | Self::MissingMsgType
                | Self::MissingChecksum
                | Self::ChecksumMismatch { .. }
                | Self::InvalidTag(_)
                | Self::TrailingData { .. }
                | Self::MessageTooLarge { .. }
        )
    }

    /// Returns the session-level reject reason for a well-framed but invalid message.
    #[must_use]
    pub const fn reject_reason(&self) -> Option<SessionRejectReason> {
        match self {
            Self::DuplicateTag { .. } => Some(SessionRejectReason::TagAppearsMoreThanOnce),
            Self::MissingRequiredField { .. } => Some(SessionRejectReason::RequiredTagMissing),
            Self::InvalidFieldValue { .. } | Self::InvalidUtf8(_) => {
                Some(SessionRejectReason::IncorrectDataFormat)
            }
            Self::GroupCountMismatch { .. } => {
                Some(SessionRejectReason::IncorrectNumInGroupCount)
            }
            Self::GroupDelimiterMissing { .. } => {
                Some(SessionRejectReason::RepeatingGroupFieldsOutOfOrder)
            }
            Self::UnexpectedGroupTag { .. } => {
                Some(SessionRejectReason::RepeatingGroupFieldsOutOfOrder)
            }
            _ => None,
        }
    }

    /// Returns the tag the error refers to, if any.
    #[must_use]
    pub const fn ref_tag(&self) -> Option<u32> {
        match self {
            Self::DuplicateTag { tag }
            | Self::MissingRequiredField { tag }
            | Self::InvalidFieldValue { tag, .. }
            | Self::UnexpectedGroupTag { tag, .. } => Some(*tag),
            Self::GroupCountMismatch { count_tag, .. }
            | Self::GroupDelimiterMissing { count_tag, .. } => Some(*count_tag),
            _ => None,
        }
    }
}

/// Errors that occur during FIX message encoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Missing required field during encoding.
    #[error("missing required field: tag {tag}")]
    MissingRequiredField {
        /// The tag number of the missing field.
        tag: u32,
    },

    /// Invalid field value for encoding.
    #[error("invalid field value for tag {tag}: {reason}")]
    InvalidFieldValue {
        /// The tag number of the field.
        tag: u32,
        /// Description of why the value is invalid.
        reason: String,
    },
}

/// Errors raised by [`FieldMap`](crate::fieldmap::FieldMap) and
/// [`Group`](crate::group::Group) accessors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldMapError {
    /// The requested tag is not present.
    #[error("field not found: tag {tag}")]
    FieldNotFound {
        /// The missing tag.
        tag: u32,
    },

    /// The tag is not a member of the group's schema.
    #[error("tag {tag} is not a member of group {count_tag}")]
    TagNotInGroup {
        /// The rejected tag.
        tag: u32,
        /// The group count tag.
        count_tag: u32,
    },

    /// A group entry lacks its delimiter tag.
    #[error("group {count_tag} entry is missing delimiter tag {delimiter}")]
    MissingDelimiter {
        /// The group count tag.
        count_tag: u32,
        /// The delimiter tag.
        delimiter: u32,
    },

    /// The requested group entry does not exist.
    #[error("group {count_tag} has no entry at index {index}")]
    GroupNotFound {
        /// The group count tag.
        count_tag: u32,
        /// The requested zero-based index.
        index: usize,
    },

    /// The raw value could not be converted to the requested type.
    #[error("invalid value for tag {tag}: {reason}")]
    InvalidValue {
        /// The tag of the field.
        tag: u32,
        /// Why conversion failed.
        reason: String,
    },
}

impl From<FieldMapError> for DecodeError {
    fn from(err: FieldMapError) -> Self {
        match err {
            FieldMapError::FieldNotFound { tag } => Self::MissingRequiredField { tag },
            FieldMapError::TagNotInGroup { tag, count_tag } => {
                Self::UnexpectedGroupTag { count_tag, tag }
            }
            FieldMapError::MissingDelimiter { count_tag, delimiter } => {
                Self::GroupDelimiterMissing {
                    count_tag,
                    delimiter,
                    found: 0,
                }
            }
            FieldMapError::GroupNotFound { count_tag, .. } => {
                Self::MissingRequiredField { tag: count_tag }
            }
            FieldMapError::InvalidValue { tag, reason } => Self::InvalidFieldValue { tag, reason },
        }
    }
}

impl From<FieldMapError> for EncodeError {
    fn from(err: FieldMapError) -> Self {
        match err {
            FieldMapError::FieldNotFound { tag } => Self::MissingRequiredField { tag },
            other => Self::InvalidFieldValue {
                tag: other.tag(),
                reason: other.to_string(),
            },
        }
    }
}

impl FieldMapError {
    /// Returns the tag the error refers to.
    #[must_use]
    pub const fn tag(&self) -> u32 {
        match self {
            Self::FieldNotFound { tag }
            | Self::TagNotInGroup { tag, .. }
            | Self::InvalidValue { tag, .. } => *tag,
            Self::MissingDelimiter { count_tag, .. } | Self::GroupNotFound { count_tag, .. } => {
                *count_tag
            }
        }
    }
}

/// Errors in FIX session layer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Session is not in the correct state for the operation.
    #[error("invalid session state: expected {expected}, current {current}")]
    InvalidState {
        /// Expected state for the operation.
        expected: String,
        /// Current session state.
        current: String,
    },

    /// Logon was rejected by counterparty or by local validation.
    #[error("logon rejected: {reason}")]
    LogonRejected {
        /// Reason for rejection.
        reason: String,
    },

    /// Heartbeat timeout - no response to TestRequest.
    #[error("heartbeat timeout after {elapsed_ms} milliseconds")]
    HeartbeatTimeout {
        /// Elapsed time in milliseconds since last message.
        elapsed_ms: u64,
    },

    /// Sequence number gap detected.
    #[error("sequence gap detected: expected {expected}, received {received}")]
    SequenceGap {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },

    /// Sequence number too low without PossDupFlag.
    #[error("sequence too low: expected >= {expected}, received {received}")]
    SequenceTooLow {
        /// Minimum expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },

    /// Counterparty broke the session protocol.
    #[error("protocol violation: {reason}")]
    ProtocolViolation {
        /// Description of the violation.
        reason: String,
    },

    /// A second connection was attempted for a connected session.
    #[error("session {session} already has an active connection")]
    AlreadyConnected {
        /// Display form of the session identity.
        session: String,
    },

    /// No session is registered for the identity.
    #[error("unknown session: {session}")]
    UnknownSession {
        /// Display form of the session identity.
        session: String,
    },

    /// Session configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport failure; the session is disconnected but its state is kept.
    #[error("transport error: {0}")]
    Transport(String),

    /// Outgoing message could not be encoded.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Persistence failure; fatal to the session.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SessionError {
    /// Returns true if the error terminates the session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ProtocolViolation { .. }
                | Self::SequenceTooLow { .. }
                | Self::HeartbeatTimeout { .. }
                | Self::LogonRejected { .. }
                | Self::Transport(_)
                | Self::Store(_)
        )
    }
}

/// Errors in message store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Failed to store message.
    #[error("failed to store message seq={seq_num}: {reason}")]
    StoreFailed {
        /// Sequence number of the message.
        seq_num: u64,
        /// Reason for failure.
        reason: String,
    },

    /// Store is corrupted, e.g. a hole inside an otherwise contiguous log.
    #[error("store corrupted: {reason}")]
    Corrupted {
        /// Description of the corruption.
        reason: String,
    },

    /// I/O error in persistent store.
    #[error("store i/o error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::ChecksumMismatch {
            calculated: 100,
            declared: 200,
        };
        assert_eq!(
            err.to_string(),
            "checksum mismatch: calculated 100, declared 200"
        );
    }

    #[test]
    fn test_fix_error_from_decode() {
        let decode_err = DecodeError::Incomplete;
        let fix_err: FixError = decode_err.into();
        assert!(matches!(fix_err, FixError::Decode(DecodeError::Incomplete)));
    }

    #[test]
    fn test_garbled_vs_rejectable() {
        assert!(DecodeError::ChecksumMismatch { calculated: 1, declared: 2 }.is_garbled());
        assert!(DecodeError::MissingChecksum.is_garbled());

        let err = DecodeError::GroupCountMismatch {
            count_tag: 78,
            expected: 2,
            actual: 1,
        };
        assert!(!err.is_garbled());
        assert_eq!(
            err.reject_reason(),
            Some(SessionRejectReason::IncorrectNumInGroupCount)
        );
        assert_eq!(err.ref_tag(), Some(78));
    }

    #[test]
    fn test_field_map_error_into_decode() {
        let err: DecodeError = FieldMapError::FieldNotFound { tag: 34 }.into();
        assert_eq!(err, DecodeError::MissingRequiredField { tag: 34 });
    }

    #[test]
    fn test_session_error_fatality() {
        let gap = SessionError::SequenceGap {
            expected: 5,
            received: 10,
        };
        assert!(!gap.is_fatal());
        assert_eq!(
            gap.to_string(),
            "sequence gap detected: expected 5, received 10"
        );

        let store = SessionError::from(StoreError::Io("disk full".to_string()));
        assert!(store.is_fatal());
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Corrupted {
            reason: "missing seq=42".to_string(),
        };
        assert_eq!(err.to_string(), "store corrupted: missing seq=42");
    }
}
