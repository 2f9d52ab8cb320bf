/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Conversion between [`Message`] and tag=value bytes.

use crate::decoder::decode;
use crate::encoder::encode;
use bytes::BytesMut;
use fixline_core::error::{DecodeError, EncodeError};
use fixline_core::message::Message;
use fixline_dictionary::Dictionary;

/// Types with a FIX tag=value wire form.
pub trait WireFormat: Sized {
    /// Encodes in insertion order.
    ///
    /// # Errors
    /// Returns an `EncodeError` if the value cannot be framed.
    fn to_wire(&self) -> Result<BytesMut, EncodeError>;

    /// Encodes in the dictionary's declared order.
    ///
    /// # Errors
    /// Returns an `EncodeError` if the value cannot be framed.
    fn to_wire_with(&self, dictionary: &Dictionary) -> Result<BytesMut, EncodeError>;

    /// Decodes one complete frame.
    ///
    /// # Errors
    /// Returns a `DecodeError` describing the first defect found.
    fn from_wire(bytes: &[u8], dictionary: &Dictionary) -> Result<Self, DecodeError>;
}

impl WireFormat for Message {
    fn to_wire(&self) -> Result<BytesMut, EncodeError> {
        encode(self, None)
    }

    fn to_wire_with(&self, dictionary: &Dictionary) -> Result<BytesMut, EncodeError> {
        encode(self, Some(dictionary))
    }

    fn from_wire(bytes: &[u8], dictionary: &Dictionary) -> Result<Self, DecodeError> {
        decode(bytes, dictionary)
    }
}
