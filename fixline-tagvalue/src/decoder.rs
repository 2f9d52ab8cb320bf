/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Dictionary-driven FIX message decoder.
//!
//! Decoding is a single forward pass in two steps: the frame is tokenized
//! and checked (BeginString, BodyLength, MsgType, CheckSum), then the flat
//! field list is assigned to header, body and trailer, with repeating
//! groups rebuilt from the dictionary's group schemas.

use crate::checksum::{calculate_checksum, parse_checksum};
use crate::tokenizer::Tokenizer;
use bytes::Bytes;
use fixline_core::error::DecodeError;
use fixline_core::field::FieldRef;
use fixline_core::fieldmap::FieldMap;
use fixline_core::group::{Group, GroupSpec};
use fixline_core::message::Message;
use fixline_core::tags;
use fixline_dictionary::{Dictionary, FieldType};
use smallvec::SmallVec;
use std::sync::Arc;

/// FIX message decoder.
#[derive(Debug, Clone)]
pub struct Decoder<'d> {
    dictionary: &'d Dictionary,
    validate_checksum: bool,
    validate_length: bool,
}

impl<'d> Decoder<'d> {
    /// Creates a decoder with checksum and body length validation enabled.
    #[must_use]
    pub const fn new(dictionary: &'d Dictionary) -> Self {
        Self {
            dictionary,
            validate_checksum: true,
            validate_length: true,
        }
    }

    /// Sets whether to validate checksums during decoding.
    #[must_use]
    pub const fn with_checksum_validation(mut self, validate: bool) -> Self {
        self.validate_checksum = validate;
        self
    }

    /// Sets whether to validate BodyLength during decoding.
    #[must_use]
    pub const fn with_length_validation(mut self, validate: bool) -> Self {
        self.validate_length = validate;
        self
    }

    /// Decodes one complete frame.
    ///
    /// # Errors
    /// Returns a `DecodeError` describing the first defect found.
    pub fn decode(&self, frame: &[u8]) -> Result<Message, DecodeError> {
        let fields = self.tokenize(frame)?;
        self.assemble(&fields)
    }

    /// Splits the frame into its fields between MsgType and CheckSum,
    /// validating the framing.
    fn tokenize<'a>(&self, frame: &'a [u8]) -> Result<SmallVec<[FieldRef<'a>; 32]>, DecodeError> {
        let mut tokenizer = Tokenizer::new(frame);

        let begin = tokenizer.next_field().ok_or(DecodeError::Incomplete)??;
        if begin.tag != tags::BEGIN_STRING {
            return Err(DecodeError::InvalidBeginString);
        }

        let length = match tokenizer.next_field() {
            Some(Ok(field)) if field.tag == tags::BODY_LENGTH => field,
            Some(Err(err)) if !matches!(err, DecodeError::InvalidTag(_)) => return Err(err),
            _ => return Err(DecodeError::MissingBodyLength),
        };
        let declared: usize = length
            .as_str()
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(DecodeError::InvalidBodyLength)?;
        let body_start = tokenizer.offset();

        let mut fields: SmallVec<[FieldRef<'a>; 32]> = SmallVec::new();
        fields.push(begin);

        match tokenizer.next_field() {
            Some(Ok(field)) if field.tag == tags::MSG_TYPE => fields.push(field),
            Some(Err(err)) => return Err(err),
            _ => return Err(DecodeError::MissingMsgType),
        }

        let mut previous: Option<FieldRef<'a>> = None;
        let checksum_start = loop {
            let field_start = tokenizer.offset();
            let Some(tag) = tokenizer.read_tag() else {
                return Err(DecodeError::MissingChecksum);
            };
            let tag = tag?;
            if tag == tags::CHECKSUM {
                break field_start;
            }
            let len = self.data_length(tag, previous.as_ref())?;
            let field = FieldRef::new(tag, tokenizer.read_value(tag, len)?);
            fields.push(field);
            previous = Some(field);
        };

        if self.validate_length && checksum_start - body_start != declared {
            return Err(DecodeError::BodyLengthMismatch {
                declared,
                actual: checksum_start - body_start,
            });
        }

        let checksum = tokenizer.read_value(tags::CHECKSUM, None)?;
        if self.validate_checksum {
            let declared = parse_checksum(checksum).ok_or_else(|| DecodeError::InvalidFieldValue {
                tag: tags::CHECKSUM,
                reason: "checksum must be three digits".to_string(),
            })?;
            let calculated = calculate_checksum(&frame[..checksum_start]);
            if calculated != declared {
                return Err(DecodeError::ChecksumMismatch {
                    calculated,
                    declared,
                });
            }
        }

        if !tokenizer.is_empty() {
            return Err(DecodeError::TrailingData {
                offset: tokenizer.offset(),
            });
        }
        Ok(fields)
    }

    /// Returns the byte count to read for `tag` when it is a data field
    /// immediately preceded by its Length field.
    fn data_length(&self, tag: u32, previous: Option<&FieldRef<'_>>) -> Result<Option<usize>, DecodeError> {
        let is_data = self.dictionary.field_type(tag).is_some_and(|t| t.is_data());
        let Some(previous) = previous.filter(|_| is_data) else {
            return Ok(None);
        };
        if self.dictionary.field_type(previous.tag) != Some(FieldType::Length) {
            return Ok(None);
        }
        previous.get::<usize>().map(Some)
    }

    /// Assigns fields to sections and rebuilds groups.
    fn assemble(&self, fields: &[FieldRef<'_>]) -> Result<Message, DecodeError> {
        let mut header = FieldMap::new();
        let mut body = FieldMap::new();
        let mut trailer = FieldMap::new();

        // fields[0] is BeginString and fields[1] MsgType
        let msg_type = fields[1].as_str()?;
        header.set_field(tags::BEGIN_STRING, Bytes::copy_from_slice(fields[0].value));
        header.set_field(tags::MSG_TYPE, Bytes::copy_from_slice(fields[1].value));

        let dict = self.dictionary;
        let mut idx = 2;
        while idx < fields.len() {
            let field = fields[idx];
            idx += 1;
            let target = if dict.is_header_tag(field.tag) {
                &mut header
            } else if dict.is_trailer_tag(field.tag) {
                &mut trailer
            } else {
                &mut body
            };
            if target.is_set_field(field.tag) {
                return Err(DecodeError::DuplicateTag { tag: field.tag });
            }
            match dict.group_spec(msg_type, field.tag) {
                Some(spec) => {
                    let count = field.get::<u32>()?;
                    for entry in read_group(fields, &mut idx, spec, count)? {
                        target.add_group(entry)?;
                    }
                }
                None => target.set_field(field.tag, Bytes::copy_from_slice(field.value)),
            }
        }

        Ok(Message::from_parts(header, body, trailer))
    }
}

/// Reads `count` entries of the group described by `spec`, starting at `*idx`.
///
/// A tag outside the schema ends the group; the delimiter starts each entry;
/// members must follow the declared order within an entry.
fn read_group(
    fields: &[FieldRef<'_>],
    idx: &mut usize,
    spec: &Arc<GroupSpec>,
    count: u32,
) -> Result<Vec<Group>, DecodeError> {
    let count_tag = spec.count_tag();
    // Each entry needs at least its delimiter field.
    let remaining = fields.len().saturating_sub(*idx);
    if count as usize > remaining {
        return Err(DecodeError::GroupCountMismatch {
            count_tag,
            expected: count,
            actual: u32::try_from(remaining).unwrap_or(u32::MAX),
        });
    }
    let mut entries: Vec<Group> = Vec::with_capacity(count as usize);
    let mut last_position = 0usize;

    while let Some(field) = fields.get(*idx).copied() {
        let Some(position) = spec.position(field.tag) else {
            break;
        };
        *idx += 1;

        if field.tag == spec.delimiter() {
            if entries.len() as u32 == count {
                return Err(DecodeError::GroupCountMismatch {
                    count_tag,
                    expected: count,
                    actual: count + 1,
                });
            }
            entries.push(Group::new(spec.clone()));
        } else if entries.is_empty() {
            return Err(DecodeError::GroupDelimiterMissing {
                count_tag,
                delimiter: spec.delimiter(),
                found: field.tag,
            });
        } else if position <= last_position {
            return Err(DecodeError::UnexpectedGroupTag {
                count_tag,
                tag: field.tag,
            });
        }
        last_position = position;

        let Some(entry) = entries.last_mut() else {
            break;
        };
        match spec.nested(field.tag) {
            Some(nested) => {
                let nested_count = field.get::<u32>()?;
                for sub in read_group(fields, idx, nested, nested_count)? {
                    entry.add_group(sub)?;
                }
            }
            None => entry.set_field(field.tag, Bytes::copy_from_slice(field.value))?,
        }
    }

    if entries.len() as u32 != count {
        return Err(DecodeError::GroupCountMismatch {
            count_tag,
            expected: count,
            actual: entries.len() as u32,
        });
    }
    Ok(entries)
}

/// Decodes one frame with full validation.
///
/// # Errors
/// Returns a `DecodeError` describing the first defect found.
pub fn decode(frame: &[u8], dictionary: &Dictionary) -> Result<Message, DecodeError> {
    Decoder::new(dictionary).decode(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode;
    use fixline_core::error::DecodeError;
    use fixline_dictionary::{GroupDef, Member, MessageCategory, MessageDef, Version};

    const SOH: &str = "\x01";

    fn dictionary() -> Dictionary {
        let mut dict = Dictionary::session(Version::Fix44);
        dict.add_message(MessageDef::new(
            "D",
            "NewOrderSingle",
            MessageCategory::App,
            vec![
                Member::field(11, true),
                Member::Group(GroupDef::new(
                    453,
                    false,
                    vec![
                        Member::field(448, false),
                        Member::field(447, false),
                        Member::field(452, false),
                        Member::Group(GroupDef::new(
                            802,
                            false,
                            vec![Member::field(523, false), Member::field(803, false)],
                        )),
                    ],
                )),
                Member::field(55, true),
            ],
        ));
        dict
    }

    /// Builds a frame with correct BodyLength and CheckSum around `body`
    /// (`|` stands for SOH).
    fn frame(body: &str) -> Vec<u8> {
        let body = body.replace('|', SOH);
        let mut out = format!("8=FIX.4.4{SOH}9={}{SOH}{body}", body.len()).into_bytes();
        let sum = calculate_checksum(&out);
        out.extend_from_slice(format!("10={sum:03}{SOH}").as_bytes());
        out
    }

    fn order(dict: &Dictionary) -> Message {
        let parties = dict.group_spec("D", 453).unwrap().clone();
        let sub = parties.nested(802).unwrap().clone();
        let mut msg = Message::new("D");
        let header = msg.header_mut();
        header.set_field(tags::BEGIN_STRING, "FIX.4.4");
        header.set_field(tags::SENDER_COMP_ID, "S");
        header.set_field(tags::TARGET_COMP_ID, "T");
        header.set_field(tags::MSG_SEQ_NUM, "2");
        msg.set_field(11, "ORD-1");
        for (id, desk) in [("BRK", Some("DESK")), ("CLR", None)] {
            let mut entry = Group::new(parties.clone());
            entry.set_field(448, id).unwrap();
            entry.set_field(452, "1").unwrap();
            if let Some(desk) = desk {
                let mut nested = Group::new(sub.clone());
                nested.set_field(523, desk).unwrap();
                entry.add_group(nested).unwrap();
            }
            msg.add_group(entry).unwrap();
        }
        msg.set_field(55, "MSFT");
        msg
    }

    #[test]
    fn test_round_trip_preserves_groups() {
        let dict = dictionary();
        let msg = order(&dict);
        let bytes = encode(&msg, Some(&dict)).unwrap();
        let decoded = decode(&bytes, &dict).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.body().group_count(453), 2);
        assert_eq!(&decoded.body().group(453, 1).unwrap().get_field(448).unwrap()[..], b"CLR");
        assert_eq!(decoded.body().group(453, 0).unwrap().group_count(802), 1);
    }

    #[test]
    fn test_sections_are_separated() {
        let dict = dictionary();
        let msg = decode(&frame("35=0|49=S|56=T|34=1|112=X|"), &dict).unwrap();
        assert!(msg.header().is_set_field(tags::SENDER_COMP_ID));
        assert!(msg.is_set_field(tags::TEST_REQ_ID));
        assert!(!msg.header().is_set_field(tags::BODY_LENGTH));
        assert!(!msg.trailer().is_set_field(tags::CHECKSUM));
    }

    #[test]
    fn test_framing_errors() {
        let dict = dictionary();
        assert_eq!(decode(b"", &dict), Err(DecodeError::Incomplete));
        assert_eq!(
            decode(b"9=5\x018=FIX.4.4\x01", &dict),
            Err(DecodeError::InvalidBeginString)
        );
        assert_eq!(
            decode(b"8=FIX.4.4\x0135=0\x01", &dict),
            Err(DecodeError::MissingBodyLength)
        );
        assert_eq!(
            decode(b"8=FIX.4.4\x019=x\x0135=0\x01", &dict),
            Err(DecodeError::InvalidBodyLength)
        );
        assert_eq!(
            decode(&frame("49=S|35=0|"), &dict),
            Err(DecodeError::MissingMsgType)
        );
        assert_eq!(
            decode(b"8=FIX.4.4\x019=5\x0135=0\x01", &dict),
            Err(DecodeError::MissingChecksum)
        );
        assert!(matches!(
            decode(b"8=FIX.4.4\x019=5\x0135=0\x01=x\x0110=000\x01", &dict),
            Err(DecodeError::InvalidTag(_))
        ));
    }

    #[test]
    fn test_checksum_and_length_mismatch() {
        let dict = dictionary();
        let mut bad_sum = frame("35=0|");
        let n = bad_sum.len();
        bad_sum[n - 2] = if bad_sum[n - 2] == b'0' { b'1' } else { b'0' };
        assert!(matches!(
            decode(&bad_sum, &dict),
            Err(DecodeError::ChecksumMismatch { .. })
        ));

        let bad_len = b"8=FIX.4.4\x019=9\x0135=0\x0110=000\x01";
        assert_eq!(
            decode(bad_len, &dict),
            Err(DecodeError::BodyLengthMismatch { declared: 9, actual: 5 })
        );
        let lenient = Decoder::new(&dict)
            .with_length_validation(false)
            .with_checksum_validation(false);
        assert!(lenient.decode(bad_len).is_ok());
    }

    #[test]
    fn test_trailing_data() {
        let dict = dictionary();
        let mut bytes = frame("35=0|");
        let end = bytes.len();
        bytes.extend_from_slice(b"58=x\x01");
        assert_eq!(decode(&bytes, &dict), Err(DecodeError::TrailingData { offset: end }));
    }

    #[test]
    fn test_duplicate_tag() {
        let dict = dictionary();
        assert_eq!(
            decode(&frame("35=0|112=A|112=B|"), &dict),
            Err(DecodeError::DuplicateTag { tag: 112 })
        );
    }

    #[test]
    fn test_group_count_mismatch() {
        let dict = dictionary();
        assert_eq!(
            decode(&frame("35=D|11=X|453=2|448=A|55=MSFT|"), &dict),
            Err(DecodeError::GroupCountMismatch { count_tag: 453, expected: 2, actual: 1 })
        );
        assert_eq!(
            decode(&frame("35=D|11=X|453=1|448=A|448=B|55=MSFT|"), &dict),
            Err(DecodeError::GroupCountMismatch { count_tag: 453, expected: 1, actual: 2 })
        );
    }

    #[test]
    fn test_oversized_group_count_is_rejected() {
        let dict = dictionary();
        assert!(matches!(
            decode(&frame("35=D|11=X|453=4294967295|448=A|55=MSFT|"), &dict),
            Err(DecodeError::GroupCountMismatch { count_tag: 453, expected: 4294967295, .. })
        ));
        assert!(matches!(
            decode(&frame("35=A|34=2|49=S|56=T|52=20261018-10:00:00.000|98=0|108=30|384=4294967295|372=D|"), &dict),
            Err(DecodeError::GroupCountMismatch { count_tag: 384, .. })
        ));
    }

    #[test]
    fn test_group_delimiter_and_order() {
        let dict = dictionary();
        assert_eq!(
            decode(&frame("35=D|11=X|453=1|452=1|448=A|55=MSFT|"), &dict),
            Err(DecodeError::GroupDelimiterMissing { count_tag: 453, delimiter: 448, found: 452 })
        );
        assert_eq!(
            decode(&frame("35=D|11=X|453=1|448=A|452=1|447=D|55=MSFT|"), &dict),
            Err(DecodeError::UnexpectedGroupTag { count_tag: 453, tag: 447 })
        );
        assert_eq!(
            decode(&frame("35=D|11=X|453=1|448=A|452=1|452=2|55=MSFT|"), &dict),
            Err(DecodeError::UnexpectedGroupTag { count_tag: 453, tag: 452 })
        );
    }

    #[test]
    fn test_data_field_may_contain_soh() {
        let dict = dictionary();
        let msg = decode(&frame("35=A|98=0|108=30|95=3|96=a\x01b|"), &dict).unwrap();
        assert_eq!(&msg.get_field(tags::RAW_DATA).unwrap()[..], b"a\x01b");
    }
}
