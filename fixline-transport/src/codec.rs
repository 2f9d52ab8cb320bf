/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Tokio codec for FIX message framing.
//!
//! The codec only finds frame boundaries; content checks (checksum, field
//! order, groups) belong to the tag=value decoder, so that a damaged frame
//! can be discarded on its own without tearing down the stream.
//!
//! A frame normally ends where BodyLength says it does. When the bytes there
//! are not a `10=nnn` trailer, the frame is cut at the first trailer found
//! instead and handed on as is; the decoder then reports the length mismatch.

use bytes::{BufMut, Bytes, BytesMut};
use fixline_tagvalue::SOH;
use memchr::memmem;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

/// Default cap on a single frame.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Start of every frame.
const BEGIN_STRING_PREFIX: &[u8] = b"8=FIX";

/// Length of `10=nnn<SOH>`.
const TRAILER_LEN: usize = 7;

/// Errors that end the byte stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Frame exceeds the configured maximum.
    #[error("message too large: {size} bytes exceeds maximum {max_size}")]
    MessageTooLarge {
        /// Frame size in bytes, or bytes buffered without a boundary.
        size: usize,
        /// Maximum allowed size.
        max_size: usize,
    },

    /// I/O error.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Tokio codec splitting a byte stream into FIX frames.
#[derive(Debug, Clone)]
pub struct FixCodec {
    max_message_size: usize,
}

impl FixCodec {
    /// Creates a codec with the default size limit.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Sets the maximum frame size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Returns the maximum frame size.
    #[must_use]
    pub const fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Drops bytes before the next `8=FIX`; returns false if none is buffered.
    fn resync(src: &mut BytesMut) -> bool {
        if src.starts_with(BEGIN_STRING_PREFIX) {
            return true;
        }
        match memmem::find(&src[..], BEGIN_STRING_PREFIX) {
            Some(pos) => {
                warn!(skipped = pos, "discarding bytes before BeginString");
                let _ = src.split_to(pos);
                true
            }
            None => {
                // keep a prefix that may be completed by the next read
                let keep = src.len().min(BEGIN_STRING_PREFIX.len() - 1);
                let skipped = src.len() - keep;
                if skipped > 0 {
                    warn!(skipped, "discarding bytes before BeginString");
                    let _ = src.split_to(skipped);
                }
                false
            }
        }
    }

    fn check_size(&self, size: usize) -> Result<(), CodecError> {
        if size > self.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size,
                max_size: self.max_message_size,
            });
        }
        Ok(())
    }
}

impl Default for FixCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns true if `bytes` begins with a complete `10=nnn<SOH>` field.
fn is_trailer(bytes: &[u8]) -> bool {
    bytes.len() >= TRAILER_LEN
        && bytes.starts_with(b"10=")
        && bytes[3..6].iter().all(u8::is_ascii_digit)
        && bytes[6] == SOH
}

/// Finds the end of the first `<SOH>10=nnn<SOH>` at or after `from`.
fn find_trailer_end(src: &[u8], from: usize) -> Option<usize> {
    let finder = memmem::Finder::new(b"\x0110=");
    let mut start = from;
    while let Some(pos) = src.get(start..).and_then(|s| finder.find(s)) {
        let field = start + pos + 1;
        if is_trailer(&src[field..]) {
            return Some(field + TRAILER_LEN);
        }
        start = field;
    }
    None
}

impl Decoder for FixCodec {
    type Item = BytesMut;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !Self::resync(src) {
            return Ok(None);
        }

        let Some(first_soh) = memchr::memchr(SOH, &src[..]) else {
            self.check_size(src.len())?;
            return Ok(None);
        };
        let length_start = first_soh + 1;
        let Some(length_soh) = memchr::memchr(SOH, &src[length_start..]).map(|p| length_start + p)
        else {
            self.check_size(src.len())?;
            return Ok(None);
        };

        // A missing or unparsable BodyLength leaves only the trailer search.
        let declared = src[length_start..length_soh]
            .strip_prefix(b"9=")
            .and_then(|v| std::str::from_utf8(v).ok())
            .and_then(|v| v.parse::<usize>().ok());

        if let Some(body_length) = declared {
            let total = (length_soh + 1)
                .saturating_add(body_length)
                .saturating_add(TRAILER_LEN);
            if src.len() < total {
                // Wait for the declared frame unless a trailer already shows
                // the length is wrong.
                if find_trailer_end(src, length_soh).is_none() {
                    self.check_size(total)?;
                    src.reserve(total - src.len());
                    return Ok(None);
                }
            } else if is_trailer(&src[total - TRAILER_LEN..]) && src[total - TRAILER_LEN - 1] == SOH
            {
                self.check_size(total)?;
                return Ok(Some(src.split_to(total)));
            }
        }

        match find_trailer_end(src, first_soh) {
            Some(end) => {
                self.check_size(end)?;
                warn!(len = end, "frame boundary disagrees with BodyLength");
                Ok(Some(src.split_to(end)))
            }
            None => {
                self.check_size(src.len())?;
                Ok(None)
            }
        }
    }
}

impl Encoder<Bytes> for FixCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put_slice(&item);
        Ok(())
    }
}

impl Encoder<BytesMut> for FixCodec {
    type Error = CodecError;

    fn encode(&mut self, item: BytesMut, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put_slice(&item);
        Ok(())
    }
}
