/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Zero-copy field tokenizer.
//!
//! Splits a buffer into [`FieldRef`]s without allocating. The decoder drives
//! it tag by tag so that length-prefixed data fields can be read by size.

use fixline_core::error::DecodeError;
use fixline_core::field::FieldRef;
use fixline_core::tags;
use fixline_core::types::SeqNum;
use memchr::memchr;

/// SOH (Start of Header) delimiter used in FIX messages.
pub const SOH: u8 = 0x01;

/// Equals sign delimiter between tag and value.
pub const EQUALS: u8 = b'=';

/// Zero-copy tokenizer over a FIX buffer.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    input: &'a [u8],
    offset: usize,
}

impl<'a> Tokenizer<'a> {
    /// Creates a tokenizer positioned at the start of `input`.
    #[inline]
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, offset: 0 }
    }

    /// Reads the next `tag=` prefix.
    ///
    /// # Returns
    /// `None` at end of input.
    ///
    /// # Errors
    /// `InvalidTag` if the tag is not a positive integer or `=` is missing.
    pub fn read_tag(&mut self) -> Option<Result<u32, DecodeError>> {
        let remaining = self.remaining();
        if remaining.is_empty() {
            return None;
        }
        let Some(eq_pos) = memchr(EQUALS, remaining) else {
            return Some(Err(DecodeError::InvalidTag(
                String::from_utf8_lossy(remaining).into_owned(),
            )));
        };
        let tag_bytes = &remaining[..eq_pos];
        match parse_tag(tag_bytes) {
            Some(tag) => {
                self.offset += eq_pos + 1;
                Some(Ok(tag))
            }
            None => Some(Err(DecodeError::InvalidTag(
                String::from_utf8_lossy(tag_bytes).into_owned(),
            ))),
        }
    }

    /// Reads a value after [`read_tag`](Self::read_tag).
    ///
    /// With `len` set, exactly that many bytes are taken and must be followed
    /// by SOH; otherwise the value runs to the next SOH.
    ///
    /// # Errors
    /// `Incomplete` if the buffer ends first, `InvalidFieldValue` if a sized
    /// value is not terminated by SOH.
    pub fn read_value(&mut self, tag: u32, len: Option<usize>) -> Result<&'a [u8], DecodeError> {
        let remaining = self.remaining();
        let end = match len {
            Some(len) => {
                match remaining.get(len) {
                    Some(&SOH) => len,
                    Some(_) => {
                        return Err(DecodeError::InvalidFieldValue {
                            tag,
                            reason: format!("data field not terminated after {len} bytes"),
                        });
                    }
                    None => return Err(DecodeError::Incomplete),
                }
            }
            None => memchr(SOH, remaining).ok_or(DecodeError::Incomplete)?,
        };
        self.offset += end + 1;
        Ok(&remaining[..end])
    }

    /// Parses the next field.
    ///
    /// # Returns
    /// `None` at end of input.
    #[inline]
    pub fn next_field(&mut self) -> Option<Result<FieldRef<'a>, DecodeError>> {
        Some(
            self.read_tag()?
                .and_then(|tag| Ok(FieldRef::new(tag, self.read_value(tag, None)?))),
        )
    }

    /// Returns the current offset in the buffer.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Returns the unread bytes.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.input[self.offset.min(self.input.len())..]
    }

    /// Returns true if the buffer has been fully consumed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offset >= self.input.len()
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<FieldRef<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_field()
    }
}

/// Parses a tag number from ASCII digits.
#[inline]
fn parse_tag(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || bytes.len() > 10 || bytes[0] == b'0' {
        return None;
    }
    bytes.iter().try_fold(0u32, |acc, &b| {
        if !b.is_ascii_digit() {
            return None;
        }
        acc.checked_mul(10)?.checked_add(u32::from(b - b'0'))
    })
}

/// Routing fields read from a frame without a dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPeek {
    /// BeginString(8).
    pub begin_string: String,
    /// MsgType(35).
    pub msg_type: String,
    /// SenderCompID(49) of the message author.
    pub sender_comp_id: String,
    /// TargetCompID(56) the message is addressed to.
    pub target_comp_id: String,
    /// MsgSeqNum(34), if present and numeric.
    pub seq_num: Option<SeqNum>,
}

/// Reads the routing header of a frame.
///
/// Stops at CheckSum; data fields are not length-aware, so peeking is
/// only reliable on the standard header, which precedes any of them.
///
/// # Errors
/// `InvalidBeginString` if the frame does not start with tag 8, or
/// `MissingRequiredField` if MsgType, SenderCompID or TargetCompID is absent.
pub fn peek_header(frame: &[u8]) -> Result<HeaderPeek, DecodeError> {
    let mut tokenizer = Tokenizer::new(frame);
    let first = tokenizer.next_field().ok_or(DecodeError::Incomplete)??;
    if first.tag != tags::BEGIN_STRING {
        return Err(DecodeError::InvalidBeginString);
    }
    let begin_string = first.as_str()?.to_string();

    let mut msg_type = None;
    let mut sender = None;
    let mut target = None;
    let mut seq_num = None;
    for field in tokenizer {
        let field = field?;
        match field.tag {
            tags::MSG_TYPE => msg_type = Some(field.as_str()?.to_string()),
            tags::SENDER_COMP_ID => sender = Some(field.as_str()?.to_string()),
            tags::TARGET_COMP_ID => target = Some(field.as_str()?.to_string()),
            tags::MSG_SEQ_NUM => seq_num = field.get::<SeqNum>().ok(),
            tags::CHECKSUM => break,
            _ => {}
        }
        if msg_type.is_some() && sender.is_some() && target.is_some() && seq_num.is_some() {
            break;
        }
    }

    Ok(HeaderPeek {
        begin_string,
        msg_type: msg_type.ok_or(DecodeError::MissingRequiredField { tag: tags::MSG_TYPE })?,
        sender_comp_id: sender.ok_or(DecodeError::MissingRequiredField {
            tag: tags::SENDER_COMP_ID,
        })?,
        target_comp_id: target.ok_or(DecodeError::MissingRequiredField {
            tag: tags::TARGET_COMP_ID,
        })?,
        seq_num,
    })
}
