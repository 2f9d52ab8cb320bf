/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Schema definitions for FIX dictionaries.
//!
//! This module defines the structures that represent a FIX protocol dictionary:
//! - [`FieldDef`]: Field definitions with tag, name, and type
//! - [`Member`]: A field or repeating group inside a message, header or group
//! - [`GroupDef`]: Repeating group definitions
//! - [`MessageDef`]: Message definitions with their ordered members
//! - [`Layout`]: Precomputed order, required tags and group specs of a section
//! - [`Dictionary`]: Complete FIX version dictionary

use crate::error::DictionaryError;
use bytes::Bytes;
use fixline_core::error::{DecodeError, FieldMapError};
use fixline_core::field::{FieldConvert, FieldValue};
use fixline_core::fieldmap::FieldMap;
use fixline_core::group::GroupSpec;
use fixline_core::message::Message;
use fixline_core::tags;
use fixline_core::types::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// FIX protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Version {
    /// FIX 4.0
    Fix40,
    /// FIX 4.1
    Fix41,
    /// FIX 4.2
    Fix42,
    /// FIX 4.3
    Fix43,
    /// FIX 4.4
    Fix44,
    /// FIX 5.0
    Fix50,
    /// FIX 5.0 SP1
    Fix50Sp1,
    /// FIX 5.0 SP2
    Fix50Sp2,
    /// FIXT 1.1 (transport layer for FIX 5.0+)
    Fixt11,
}

impl Version {
    /// Returns the BeginString value for this version.
    #[must_use]
    pub const fn begin_string(&self) -> &'static str {
        match self {
            Self::Fix40 => "FIX.4.0",
            Self::Fix41 => "FIX.4.1",
            Self::Fix42 => "FIX.4.2",
            Self::Fix43 => "FIX.4.3",
            Self::Fix44 => "FIX.4.4",
            Self::Fix50 | Self::Fix50Sp1 | Self::Fix50Sp2 | Self::Fixt11 => "FIXT.1.1",
        }
    }

    /// Returns the ApplVerID for FIX 5.0+ versions.
    #[must_use]
    pub const fn appl_ver_id(&self) -> Option<&'static str> {
        match self {
            Self::Fix50 => Some("7"),
            Self::Fix50Sp1 => Some("8"),
            Self::Fix50Sp2 => Some("9"),
            _ => None,
        }
    }

    /// Returns true if this version uses FIXT transport.
    #[must_use]
    pub const fn uses_fixt(&self) -> bool {
        matches!(
            self,
            Self::Fix50 | Self::Fix50Sp1 | Self::Fix50Sp2 | Self::Fixt11
        )
    }

    /// Resolves the session-layer version named by a BeginString.
    ///
    /// `FIXT.1.1` maps to [`Version::Fixt11`]; the application version of a
    /// FIXT session travels separately in ApplVerID.
    #[must_use]
    pub fn from_begin_string(begin_string: &str) -> Option<Self> {
        Some(match begin_string {
            "FIX.4.0" => Self::Fix40,
            "FIX.4.1" => Self::Fix41,
            "FIX.4.2" => Self::Fix42,
            "FIX.4.3" => Self::Fix43,
            "FIX.4.4" => Self::Fix44,
            "FIXT.1.1" => Self::Fixt11,
            _ => return None,
        })
    }

    /// Resolves a version from a QuickFIX dictionary's `type`, `major`,
    /// `minor` and `servicepack` attributes.
    #[must_use]
    pub fn from_parts(kind: &str, major: u32, minor: u32, service_pack: u32) -> Option<Self> {
        Some(match (kind, major, minor, service_pack) {
            ("FIXT", 1, 1, _) => Self::Fixt11,
            ("FIX", 4, 0, _) => Self::Fix40,
            ("FIX", 4, 1, _) => Self::Fix41,
            ("FIX", 4, 2, _) => Self::Fix42,
            ("FIX", 4, 3, _) => Self::Fix43,
            ("FIX", 4, 4, _) => Self::Fix44,
            ("FIX", 5, 0, 0) => Self::Fix50,
            ("FIX", 5, 0, 1) => Self::Fix50Sp1,
            ("FIX", 5, 0, 2) => Self::Fix50Sp2,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.begin_string())
    }
}

/// FIX field data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Integer value.
    Int,
    /// Length field (for data fields).
    Length,
    /// Sequence number.
    SeqNum,
    /// Number of entries in a repeating group.
    NumInGroup,
    /// Tag number reference.
    TagNum,
    /// Day of month (1-31).
    DayOfMonth,
    /// Floating point number.
    Float,
    /// Quantity.
    Qty,
    /// Price.
    Price,
    /// Price offset.
    PriceOffset,
    /// Amount (price * quantity).
    Amt,
    /// Percentage.
    Percentage,
    /// Single character.
    Char,
    /// Boolean (Y/N).
    Boolean,
    /// String, and every textual type without dedicated handling.
    String,
    /// UTC timestamp.
    UtcTimestamp,
    /// Raw data (binary), preceded by a Length field.
    Data,
    /// XML data, preceded by a Length field.
    XmlData,
}

impl FieldType {
    /// Returns true if this type represents a numeric value.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Int
                | Self::Length
                | Self::SeqNum
                | Self::NumInGroup
                | Self::TagNum
                | Self::DayOfMonth
                | Self::Float
                | Self::Qty
                | Self::Price
                | Self::PriceOffset
                | Self::Amt
                | Self::Percentage
        )
    }

    /// Returns true if values of this type may contain SOH and must be
    /// read by length.
    #[must_use]
    pub const fn is_data(&self) -> bool {
        matches!(self, Self::Data | Self::XmlData)
    }
}

impl std::str::FromStr for FieldType {
    type Err = std::convert::Infallible;

    /// Creates a FieldType from a QuickFIX type name.
    ///
    /// Unknown names map to `String`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_uppercase().as_str() {
            "INT" => Self::Int,
            "LENGTH" => Self::Length,
            "SEQNUM" => Self::SeqNum,
            "NUMINGROUP" => Self::NumInGroup,
            "TAGNUM" => Self::TagNum,
            "DAYOFMONTH" => Self::DayOfMonth,
            "FLOAT" => Self::Float,
            "QTY" | "QUANTITY" => Self::Qty,
            "PRICE" => Self::Price,
            "PRICEOFFSET" => Self::PriceOffset,
            "AMT" | "AMOUNT" => Self::Amt,
            "PERCENTAGE" => Self::Percentage,
            "CHAR" => Self::Char,
            "BOOLEAN" => Self::Boolean,
            "UTCTIMESTAMP" | "TIME" => Self::UtcTimestamp,
            "DATA" => Self::Data,
            "XMLDATA" => Self::XmlData,
            _ => Self::String,
        })
    }
}

/// Definition of a FIX field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field tag number.
    pub tag: u32,
    /// Field name.
    pub name: String,
    /// Field data type.
    pub field_type: FieldType,
    /// Valid values for enumerated fields, value → description.
    pub values: Option<HashMap<String, String>>,
}

impl FieldDef {
    /// Creates a new field definition.
    ///
    /// # Arguments
    /// * `tag` - The field tag number
    /// * `name` - The field name
    /// * `field_type` - The field data type
    #[must_use]
    pub fn new(tag: u32, name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            tag,
            name: name.into(),
            field_type,
            values: None,
        }
    }

    /// Adds valid values for an enumerated field.
    #[must_use]
    pub fn with_values(mut self, values: HashMap<String, String>) -> Self {
        self.values = Some(values);
        self
    }
}

/// A member of a message, header, trailer or group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Member {
    /// A scalar field.
    Field {
        /// Field tag number.
        tag: u32,
        /// Whether the field is required.
        required: bool,
    },
    /// A repeating group.
    Group(GroupDef),
}

impl Member {
    /// Shorthand for a field member.
    #[must_use]
    pub const fn field(tag: u32, required: bool) -> Self {
        Self::Field { tag, required }
    }

    /// Returns the tag this member occupies at its level (the count tag for groups).
    #[must_use]
    pub const fn tag(&self) -> u32 {
        match self {
            Self::Field { tag, .. } => *tag,
            Self::Group(g) => g.count_tag,
        }
    }

    /// Returns true if the member is required.
    #[must_use]
    pub const fn required(&self) -> bool {
        match self {
            Self::Field { required, .. } => *required,
            Self::Group(g) => g.required,
        }
    }
}

/// Definition of a repeating group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDef {
    /// Tag of the count field (NumInGroup).
    pub count_tag: u32,
    /// Whether the group is required.
    pub required: bool,
    /// Members of each entry, in wire order; the first is the delimiter.
    pub members: Vec<Member>,
}

impl GroupDef {
    /// Creates a group definition.
    #[must_use]
    pub fn new(count_tag: u32, required: bool, members: Vec<Member>) -> Self {
        Self {
            count_tag,
            required,
            members,
        }
    }

    /// Returns the tag of the first member, which delimits entries.
    #[must_use]
    pub fn delimiter_tag(&self) -> Option<u32> {
        self.members.first().map(Member::tag)
    }

    /// Builds the runtime group schema.
    #[must_use]
    pub fn to_spec(&self) -> GroupSpec {
        let mut spec = GroupSpec::new(self.count_tag, self.members.iter().map(Member::tag));
        for member in &self.members {
            if let Member::Group(nested) = member {
                spec = spec.with_nested(nested.to_spec());
            }
        }
        spec
    }
}

/// Message category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageCategory {
    /// Administrative message (session level).
    Admin,
    /// Application message.
    App,
}

/// Definition of a FIX message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDef {
    /// Message type value (tag 35).
    pub msg_type: String,
    /// Message name.
    pub name: String,
    /// Message category (admin or app).
    pub category: MessageCategory,
    /// Body members in declared order, components already expanded.
    pub members: Vec<Member>,
}

impl MessageDef {
    /// Creates a message definition.
    #[must_use]
    pub fn new(
        msg_type: impl Into<String>,
        name: impl Into<String>,
        category: MessageCategory,
        members: Vec<Member>,
    ) -> Self {
        Self {
            msg_type: msg_type.into(),
            name: name.into(),
            category,
            members,
        }
    }
}

/// Precomputed view of one section (header, trailer or a message body).
#[derive(Debug, Clone, Default)]
pub struct Layout {
    order: Vec<u32>,
    required: Vec<u32>,
    groups: HashMap<u32, Arc<GroupSpec>>,
}

impl Layout {
    /// Builds a layout from members.
    #[must_use]
    pub fn from_members(members: &[Member]) -> Self {
        let mut layout = Self::default();
        for member in members {
            layout.order.push(member.tag());
            if member.required() {
                layout.required.push(member.tag());
            }
            if let Member::Group(group) = member {
                layout
                    .groups
                    .insert(group.count_tag, Arc::new(group.to_spec()));
            }
        }
        layout
    }

    /// Returns the declared tag order.
    #[must_use]
    pub fn order(&self) -> &[u32] {
        &self.order
    }

    /// Returns the required tags.
    #[must_use]
    pub fn required(&self) -> &[u32] {
        &self.required
    }

    /// Returns true if the tag is declared in this section.
    #[must_use]
    pub fn contains(&self, tag: u32) -> bool {
        self.order.contains(&tag)
    }

    /// Returns the schema of a top-level group in this section.
    #[must_use]
    pub fn group(&self, count_tag: u32) -> Option<&Arc<GroupSpec>> {
        self.groups.get(&count_tag)
    }
}

/// Complete FIX dictionary for a specific version.
#[derive(Debug, Clone)]
pub struct Dictionary {
    /// FIX version.
    pub version: Version,
    fields: HashMap<u32, FieldDef>,
    fields_by_name: HashMap<String, u32>,
    messages: HashMap<String, MessageDef>,
    layouts: HashMap<String, Layout>,
    header: Layout,
    trailer: Layout,
}

impl Dictionary {
    /// Creates a new empty dictionary for the specified version.
    ///
    /// # Arguments
    /// * `version` - The FIX version
    #[must_use]
    pub fn new(version: Version) -> Self {
        Self {
            version,
            fields: HashMap::new(),
            fields_by_name: HashMap::new(),
            messages: HashMap::new(),
            layouts: HashMap::new(),
            header: Layout::default(),
            trailer: Layout::default(),
        }
    }

    /// Adds a field definition.
    pub fn add_field(&mut self, field: FieldDef) {
        self.fields_by_name.insert(field.name.clone(), field.tag);
        self.fields.insert(field.tag, field);
    }

    /// Adds a message definition.
    pub fn add_message(&mut self, message: MessageDef) {
        self.layouts
            .insert(message.msg_type.clone(), Layout::from_members(&message.members));
        self.messages.insert(message.msg_type.clone(), message);
    }

    /// Sets the standard header members.
    pub fn set_header(&mut self, members: &[Member]) {
        self.header = Layout::from_members(members);
    }

    /// Sets the standard trailer members.
    pub fn set_trailer(&mut self, members: &[Member]) {
        self.trailer = Layout::from_members(members);
    }

    /// Merges another dictionary's fields and messages into this one.
    ///
    /// Used to layer an application dictionary over a FIXT transport
    /// dictionary. Header and trailer are kept unless this one has none.
    pub fn merge(&mut self, other: Dictionary) {
        for field in other.fields.into_values() {
            self.add_field(field);
        }
        for message in other.messages.into_values() {
            self.add_message(message);
        }
        if self.header.order.is_empty() {
            self.header = other.header;
        }
        if self.trailer.order.is_empty() {
            self.trailer = other.trailer;
        }
    }

    /// Gets a field definition by tag.
    #[must_use]
    pub fn get_field(&self, tag: u32) -> Option<&FieldDef> {
        self.fields.get(&tag)
    }

    /// Gets a field definition by name.
    #[must_use]
    pub fn get_field_by_name(&self, name: &str) -> Option<&FieldDef> {
        self.fields_by_name
            .get(name)
            .and_then(|tag| self.fields.get(tag))
    }

    /// Returns the declared type of a field.
    #[must_use]
    pub fn field_type(&self, tag: u32) -> Option<FieldType> {
        self.fields.get(&tag).map(|f| f.field_type)
    }

    /// Gets a message definition by type.
    #[must_use]
    pub fn get_message(&self, msg_type: &str) -> Option<&MessageDef> {
        self.messages.get(msg_type)
    }

    /// Returns an iterator over all message definitions.
    pub fn messages(&self) -> impl Iterator<Item = &MessageDef> {
        self.messages.values()
    }

    /// Returns the header layout.
    #[must_use]
    pub fn header(&self) -> &Layout {
        &self.header
    }

    /// Returns the trailer layout.
    #[must_use]
    pub fn trailer(&self) -> &Layout {
        &self.trailer
    }

    /// Returns the body layout of a message type.
    #[must_use]
    pub fn message_layout(&self, msg_type: &str) -> Option<&Layout> {
        self.layouts.get(msg_type)
    }

    /// Returns true if the tag belongs in the standard header.
    #[must_use]
    pub fn is_header_tag(&self, tag: u32) -> bool {
        matches!(tag, tags::BEGIN_STRING | tags::BODY_LENGTH | tags::MSG_TYPE)
            || self.header.contains(tag)
    }

    /// Returns true if the tag belongs in the standard trailer.
    #[must_use]
    pub fn is_trailer_tag(&self, tag: u32) -> bool {
        tag == tags::CHECKSUM || self.trailer.contains(tag)
    }

    /// Looks up the schema of a top-level group.
    ///
    /// Header groups are found for every message type.
    #[must_use]
    pub fn group_spec(&self, msg_type: &str, count_tag: u32) -> Option<&Arc<GroupSpec>> {
        self.header
            .group(count_tag)
            .or_else(|| self.layouts.get(msg_type)?.group(count_tag))
    }

    /// Converts a raw value to a typed [`FieldValue`] using the field's declared type.
    ///
    /// Undeclared tags are returned as strings.
    ///
    /// # Errors
    /// Returns `FieldMapError::InvalidValue` if the value does not parse as its type.
    pub fn convert(&self, tag: u32, raw: &[u8]) -> Result<FieldValue, FieldMapError> {
        let Some(field_type) = self.field_type(tag) else {
            return String::from_field(tag, raw).map(FieldValue::String);
        };
        Ok(match field_type {
            FieldType::Int | FieldType::DayOfMonth => FieldValue::Int(i64::from_field(tag, raw)?),
            FieldType::Length | FieldType::SeqNum | FieldType::NumInGroup | FieldType::TagNum => {
                FieldValue::UInt(u64::from_field(tag, raw)?)
            }
            FieldType::Float
            | FieldType::Qty
            | FieldType::Price
            | FieldType::PriceOffset
            | FieldType::Amt
            | FieldType::Percentage => FieldValue::Decimal(Decimal::from_field(tag, raw)?),
            FieldType::Char => FieldValue::Char(char::from_field(tag, raw)?),
            FieldType::Boolean => FieldValue::Bool(bool::from_field(tag, raw)?),
            FieldType::UtcTimestamp => FieldValue::Timestamp(Timestamp::from_field(tag, raw)?),
            FieldType::Data | FieldType::XmlData => FieldValue::Data(Bytes::copy_from_slice(raw)),
            FieldType::String => FieldValue::String(String::from_field(tag, raw)?),
        })
    }

    /// Checks that every required header, body and trailer field is present.
    ///
    /// BodyLength and CheckSum are framing and never stored, so they are not
    /// checked. Unknown message types pass.
    ///
    /// # Errors
    /// Returns `DecodeError::MissingRequiredField` for the first missing tag.
    pub fn validate(&self, message: &Message) -> Result<(), DecodeError> {
        let check = |layout: &Layout, map: &FieldMap| {
            layout
                .required()
                .iter()
                .copied()
                .filter(|&tag| tag != tags::BODY_LENGTH && tag != tags::CHECKSUM)
                .find(|&tag| !map.is_set_field(tag))
                .map_or(Ok(()), |tag| Err(DecodeError::MissingRequiredField { tag }))
        };
        check(&self.header, message.header())?;
        if let Some(layout) = message
            .msg_type()
            .ok()
            .and_then(|t| self.layouts.get(t.as_str()))
        {
            check(layout, message.body())?;
        }
        check(&self.trailer, message.trailer())
    }

    /// Returns an error if no message definitions are present.
    ///
    /// # Errors
    /// Returns `DictionaryError::Empty` for a dictionary with no messages.
    pub fn ensure_not_empty(&self) -> Result<(), DictionaryError> {
        if self.messages.is_empty() {
            return Err(DictionaryError::Empty);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dictionary {
        let mut dict = Dictionary::new(Version::Fix44);
        dict.add_field(FieldDef::new(44, "Price", FieldType::Price));
        dict.add_field(FieldDef::new(38, "OrderQty", FieldType::Qty));
        dict.add_field(FieldDef::new(43, "PossDupFlag", FieldType::Boolean));
        dict.add_field(FieldDef::new(78, "NoAllocs", FieldType::NumInGroup));
        dict.set_header(&[
            Member::field(tags::BEGIN_STRING, true),
            Member::field(tags::MSG_TYPE, true),
            Member::field(tags::SENDER_COMP_ID, true),
        ]);
        dict.add_message(MessageDef::new(
            "D",
            "NewOrderSingle",
            MessageCategory::App,
            vec![
                Member::field(11, true),
                Member::Group(GroupDef::new(
                    78,
                    false,
                    vec![Member::field(79, false), Member::field(80, false)],
                )),
                Member::field(55, true),
            ],
        ));
        dict
    }

    #[test]
    fn test_version_begin_string() {
        assert_eq!(Version::Fix42.begin_string(), "FIX.4.2");
        assert_eq!(Version::Fix44.begin_string(), "FIX.4.4");
        assert_eq!(Version::Fix50Sp2.begin_string(), "FIXT.1.1");
        assert_eq!(Version::from_begin_string("FIX.4.4"), Some(Version::Fix44));
        assert_eq!(Version::from_begin_string("FIXT.1.1"), Some(Version::Fixt11));
        assert_eq!(Version::from_begin_string("FIX.9.9"), None);
        assert_eq!(Version::from_parts("FIX", 5, 0, 2), Some(Version::Fix50Sp2));
        assert_eq!(Version::from_parts("FIX", 9, 9, 0), None);
    }

    #[test]
    fn test_field_type_from_str() {
        assert_eq!("INT".parse::<FieldType>().unwrap(), FieldType::Int);
        assert_eq!(
            "UTCTIMESTAMP".parse::<FieldType>().unwrap(),
            FieldType::UtcTimestamp
        );
        assert_eq!("MULTIPLEVALUESTRING".parse::<FieldType>().unwrap(), FieldType::String);
        assert!(FieldType::Data.is_data());
    }

    #[test]
    fn test_layout_order_and_groups() {
        let dict = sample();
        let layout = dict.message_layout("D").unwrap();
        assert_eq!(layout.order(), &[11, 78, 55]);
        assert_eq!(layout.required(), &[11, 55]);

        let spec = dict.group_spec("D", 78).unwrap();
        assert_eq!(spec.delimiter(), 79);
        assert!(dict.group_spec("8", 78).is_none());
        assert!(dict.is_header_tag(tags::SENDER_COMP_ID));
        assert!(dict.is_header_tag(tags::BODY_LENGTH));
        assert!(!dict.is_header_tag(55));
    }

    #[test]
    fn test_convert() {
        let dict = sample();
        assert_eq!(
            dict.convert(44, b"10.50").unwrap(),
            FieldValue::Decimal(Decimal::new(1050, 2))
        );
        assert_eq!(dict.convert(43, b"Y").unwrap(), FieldValue::Bool(true));
        assert_eq!(dict.convert(55, b"MSFT").unwrap(), FieldValue::String("MSFT".into()));
        assert!(dict.convert(38, b"lots").is_err());
    }

    #[test]
    fn test_validate_required() {
        let dict = sample();
        let mut msg = Message::new("D");
        msg.header_mut().set_field(tags::BEGIN_STRING, "FIX.4.4");
        msg.header_mut().set_field(tags::SENDER_COMP_ID, "S");
        msg.set_field(11, "ORD-1");
        assert_eq!(
            dict.validate(&msg),
            Err(DecodeError::MissingRequiredField { tag: 55 })
        );
        msg.set_field(55, "MSFT");
        assert!(dict.validate(&msg).is_ok());
    }
}
