/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! FIX message encoder.
//!
//! [`Encoder`] is the low-level frame builder; [`encode`] walks a
//! [`Message`] in wire order and feeds it to an encoder.
//!
//! Wire order is BeginString, BodyLength and MsgType first, then the
//! remaining header, body and trailer fields, CheckSum last. Within each
//! section a dictionary's declared order wins; undeclared tags follow in
//! insertion order. Without a dictionary insertion order is used throughout.

use crate::checksum::{calculate_checksum, format_checksum};
use crate::tokenizer::SOH;
use bytes::{BufMut, BytesMut};
use fixline_core::error::EncodeError;
use fixline_core::fieldmap::{FieldMap, Slot};
use fixline_core::group::Group;
use fixline_core::message::Message;
use fixline_core::tags;
use fixline_dictionary::{Dictionary, Layout};
use memchr::memchr;

/// FIX frame builder.
///
/// Fields are appended to the body; [`finish`](Self::finish) prepends
/// BeginString and BodyLength and appends CheckSum.
#[derive(Debug)]
pub struct Encoder<'d> {
    body: BytesMut,
    begin_string: BytesMut,
    dictionary: Option<&'d Dictionary>,
}

impl<'d> Encoder<'d> {
    /// Creates an encoder for the given BeginString.
    ///
    /// # Arguments
    /// * `begin_string` - The FIX version string (e.g., "FIX.4.4")
    #[must_use]
    pub fn new(begin_string: &[u8]) -> Self {
        Self {
            body: BytesMut::with_capacity(256),
            begin_string: BytesMut::from(begin_string),
            dictionary: None,
        }
    }

    /// Uses a dictionary to tell data fields, which may carry SOH, apart
    /// from ordinary ones.
    #[must_use]
    pub fn with_dictionary(mut self, dictionary: &'d Dictionary) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    /// Appends a field with an unsigned integer value.
    #[inline]
    pub fn put_uint(&mut self, tag: u32, value: u64) {
        let mut buf = itoa::Buffer::new();
        self.put_unchecked(tag, buf.format(value).as_bytes());
    }

    /// Appends a field with raw bytes.
    ///
    /// # Errors
    /// Returns `EncodeError::InvalidFieldValue` if a non-data value is empty
    /// or contains SOH.
    pub fn put_raw(&mut self, tag: u32, value: &[u8]) -> Result<(), EncodeError> {
        let is_data = self
            .dictionary
            .and_then(|d| d.field_type(tag))
            .is_some_and(|t| t.is_data());
        if !is_data {
            if value.is_empty() {
                return Err(EncodeError::InvalidFieldValue {
                    tag,
                    reason: "empty value".to_string(),
                });
            }
            if memchr(SOH, value).is_some() {
                return Err(EncodeError::InvalidFieldValue {
                    tag,
                    reason: "value contains the field delimiter".to_string(),
                });
            }
        }
        self.put_unchecked(tag, value);
        Ok(())
    }

    #[inline]
    fn put_unchecked(&mut self, tag: u32, value: &[u8]) {
        let mut tag_buf = itoa::Buffer::new();
        self.body.put_slice(tag_buf.format(tag).as_bytes());
        self.body.put_u8(b'=');
        self.body.put_slice(value);
        self.body.put_u8(SOH);
    }

    /// Returns the current body length.
    #[inline]
    #[must_use]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Finalizes the frame.
    ///
    /// BodyLength counts every byte after its own SOH up to, not including,
    /// `10=`; CheckSum covers every byte before `10=`.
    #[must_use]
    pub fn finish(self) -> BytesMut {
        let mut len_buf = itoa::Buffer::new();
        let len_str = len_buf.format(self.body.len());

        let mut frame =
            BytesMut::with_capacity(self.begin_string.len() + len_str.len() + self.body.len() + 16);
        frame.put_slice(b"8=");
        frame.put_slice(&self.begin_string);
        frame.put_u8(SOH);
        frame.put_slice(b"9=");
        frame.put_slice(len_str.as_bytes());
        frame.put_u8(SOH);
        frame.put_slice(&self.body);

        let checksum = format_checksum(calculate_checksum(&frame));
        frame.put_slice(b"10=");
        frame.put_slice(&checksum);
        frame.put_u8(SOH);
        frame
    }
}

/// Tags the encoder writes itself or never writes from a map.
const fn is_framing(tag: u32) -> bool {
    matches!(
        tag,
        tags::BEGIN_STRING | tags::BODY_LENGTH | tags::MSG_TYPE | tags::CHECKSUM
    )
}

/// Returns the section's tags in wire order: declared tags first, then the
/// rest in insertion order.
fn wire_order(map: &FieldMap, layout: Option<&Layout>) -> Vec<u32> {
    let mut order = Vec::with_capacity(map.len());
    if let Some(layout) = layout {
        order.extend(
            layout
                .order()
                .iter()
                .copied()
                .filter(|&t| !is_framing(t) && map.is_set_field(t)),
        );
    }
    let undeclared: Vec<u32> = map
        .iter()
        .map(|(t, _)| t)
        .filter(|&t| !is_framing(t) && !order.contains(&t))
        .collect();
    order.extend(undeclared);
    order
}

fn put_slot(encoder: &mut Encoder<'_>, tag: u32, slot: &Slot) -> Result<(), EncodeError> {
    match slot {
        Slot::Value(value) => encoder.put_raw(tag, value),
        Slot::Groups(entries) if entries.is_empty() => Ok(()),
        Slot::Groups(entries) => {
            encoder.put_uint(tag, entries.len() as u64);
            entries.iter().try_for_each(|entry| put_entry(encoder, entry))
        }
    }
}

fn put_entry(encoder: &mut Encoder<'_>, entry: &Group) -> Result<(), EncodeError> {
    if !entry.has_delimiter() {
        return Err(EncodeError::MissingRequiredField {
            tag: entry.spec().delimiter(),
        });
    }
    entry
        .iter_ordered()
        .try_for_each(|(tag, slot)| put_slot(encoder, tag, slot))
}

fn put_section(
    encoder: &mut Encoder<'_>,
    map: &FieldMap,
    layout: Option<&Layout>,
) -> Result<(), EncodeError> {
    for tag in wire_order(map, layout) {
        if let Some(slot) = map.slot(tag) {
            put_slot(encoder, tag, slot)?;
        }
    }
    Ok(())
}

/// Encodes a message.
///
/// # Arguments
/// * `message` - Message with BeginString(8) and MsgType(35) in its header
/// * `dictionary` - Optional dictionary supplying field order and data types
///
/// # Errors
/// Returns `EncodeError::MissingRequiredField` if BeginString, MsgType or a
/// group delimiter is missing, or `InvalidFieldValue` for an unencodable value.
pub fn encode(message: &Message, dictionary: Option<&Dictionary>) -> Result<BytesMut, EncodeError> {
    let header = message.header();
    let begin_string = header.get_field(tags::BEGIN_STRING)?;
    let msg_type = header.get_str(tags::MSG_TYPE)?;

    let mut encoder = Encoder::new(begin_string);
    if let Some(dict) = dictionary {
        encoder = encoder.with_dictionary(dict);
    }
    encoder.put_raw(tags::MSG_TYPE, msg_type.as_bytes())?;

    put_section(&mut encoder, header, dictionary.map(Dictionary::header))?;
    put_section(
        &mut encoder,
        message.body(),
        dictionary.and_then(|d| d.message_layout(msg_type)),
    )?;
    put_section(&mut encoder, message.trailer(), dictionary.map(Dictionary::trailer))?;

    Ok(encoder.finish())
}
