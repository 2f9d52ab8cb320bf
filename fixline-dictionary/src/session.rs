/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Built-in session-level dictionary.
//!
//! Declares the standard header, the trailer and the seven administrative
//! messages, which is everything the session engine reads. Application
//! dictionaries are merged on top with [`Dictionary::merge`].

use crate::schema::{
    Dictionary, FieldDef, FieldType, GroupDef, Member, MessageCategory, MessageDef, Version,
};
use fixline_core::tags::*;

const FIELDS: &[(u32, &str, FieldType)] = &[
    (BEGIN_STRING, "BeginString", FieldType::String),
    (BODY_LENGTH, "BodyLength", FieldType::Length),
    (MSG_TYPE, "MsgType", FieldType::String),
    (MSG_SEQ_NUM, "MsgSeqNum", FieldType::SeqNum),
    (SENDER_COMP_ID, "SenderCompID", FieldType::String),
    (SENDER_SUB_ID, "SenderSubID", FieldType::String),
    (SENDING_TIME, "SendingTime", FieldType::UtcTimestamp),
    (TARGET_COMP_ID, "TargetCompID", FieldType::String),
    (TARGET_SUB_ID, "TargetSubID", FieldType::String),
    (POSS_DUP_FLAG, "PossDupFlag", FieldType::Boolean),
    (POSS_RESEND, "PossResend", FieldType::Boolean),
    (ON_BEHALF_OF_COMP_ID, "OnBehalfOfCompID", FieldType::String),
    (ORIG_SENDING_TIME, "OrigSendingTime", FieldType::UtcTimestamp),
    (DELIVER_TO_COMP_ID, "DeliverToCompID", FieldType::String),
    (SECURE_DATA_LEN, "SecureDataLen", FieldType::Length),
    (SECURE_DATA, "SecureData", FieldType::Data),
    (NO_HOPS, "NoHops", FieldType::NumInGroup),
    (HOP_COMP_ID, "HopCompID", FieldType::String),
    (HOP_SENDING_TIME, "HopSendingTime", FieldType::UtcTimestamp),
    (HOP_REF_ID, "HopRefID", FieldType::SeqNum),
    (APPL_VER_ID, "ApplVerID", FieldType::String),
    (SIGNATURE_LENGTH, "SignatureLength", FieldType::Length),
    (SIGNATURE, "Signature", FieldType::Data),
    (CHECKSUM, "CheckSum", FieldType::String),
    (BEGIN_SEQ_NO, "BeginSeqNo", FieldType::SeqNum),
    (END_SEQ_NO, "EndSeqNo", FieldType::SeqNum),
    (NEW_SEQ_NO, "NewSeqNo", FieldType::SeqNum),
    (REF_SEQ_NUM, "RefSeqNum", FieldType::SeqNum),
    (TEXT, "Text", FieldType::String),
    (RAW_DATA_LENGTH, "RawDataLength", FieldType::Length),
    (RAW_DATA, "RawData", FieldType::Data),
    (ENCRYPT_METHOD, "EncryptMethod", FieldType::Int),
    (HEART_BT_INT, "HeartBtInt", FieldType::Int),
    (TEST_REQ_ID, "TestReqID", FieldType::String),
    (GAP_FILL_FLAG, "GapFillFlag", FieldType::Boolean),
    (RESET_SEQ_NUM_FLAG, "ResetSeqNumFlag", FieldType::Boolean),
    (REF_TAG_ID, "RefTagID", FieldType::Int),
    (REF_MSG_TYPE, "RefMsgType", FieldType::String),
    (SESSION_REJECT_REASON, "SessionRejectReason", FieldType::Int),
    (BUSINESS_REJECT_REASON, "BusinessRejectReason", FieldType::Int),
    (MAX_MESSAGE_SIZE, "MaxMessageSize", FieldType::Length),
    (NO_MSG_TYPES, "NoMsgTypes", FieldType::NumInGroup),
    (MSG_DIRECTION, "MsgDirection", FieldType::Char),
    (NEXT_EXPECTED_MSG_SEQ_NUM, "NextExpectedMsgSeqNum", FieldType::SeqNum),
    (DEFAULT_APPL_VER_ID, "DefaultApplVerID", FieldType::String),
];

fn header() -> Vec<Member> {
    vec![
        Member::field(BEGIN_STRING, true),
        Member::field(BODY_LENGTH, true),
        Member::field(MSG_TYPE, true),
        Member::field(SENDER_COMP_ID, true),
        Member::field(TARGET_COMP_ID, true),
        Member::field(ON_BEHALF_OF_COMP_ID, false),
        Member::field(DELIVER_TO_COMP_ID, false),
        Member::field(SECURE_DATA_LEN, false),
        Member::field(SECURE_DATA, false),
        Member::field(MSG_SEQ_NUM, true),
        Member::field(SENDER_SUB_ID, false),
        Member::field(TARGET_SUB_ID, false),
        Member::field(POSS_DUP_FLAG, false),
        Member::field(POSS_RESEND, false),
        Member::field(SENDING_TIME, true),
        Member::field(ORIG_SENDING_TIME, false),
        Member::Group(GroupDef::new(
            NO_HOPS,
            false,
            vec![
                Member::field(HOP_COMP_ID, false),
                Member::field(HOP_SENDING_TIME, false),
                Member::field(HOP_REF_ID, false),
            ],
        )),
        Member::field(APPL_VER_ID, false),
    ]
}

fn trailer() -> Vec<Member> {
    vec![
        Member::field(SIGNATURE_LENGTH, false),
        Member::field(SIGNATURE, false),
        Member::field(CHECKSUM, true),
    ]
}

fn admin(msg_type: &str, name: &str, members: Vec<Member>) -> MessageDef {
    MessageDef::new(msg_type, name, MessageCategory::Admin, members)
}

impl Dictionary {
    /// Returns the session-level dictionary for a FIX version.
    ///
    /// For FIXT versions the Logon carries DefaultApplVerID.
    #[must_use]
    pub fn session(version: Version) -> Self {
        let mut dict = Self::new(version);
        for &(tag, name, field_type) in FIELDS {
            dict.add_field(FieldDef::new(tag, name, field_type));
        }
        dict.set_header(&header());
        dict.set_trailer(&trailer());

        dict.add_message(admin("0", "Heartbeat", vec![Member::field(TEST_REQ_ID, false)]));
        dict.add_message(admin("1", "TestRequest", vec![Member::field(TEST_REQ_ID, true)]));
        dict.add_message(admin(
            "2",
            "ResendRequest",
            vec![Member::field(BEGIN_SEQ_NO, true), Member::field(END_SEQ_NO, true)],
        ));
        dict.add_message(admin(
            "3",
            "Reject",
            vec![
                Member::field(REF_SEQ_NUM, true),
                Member::field(REF_TAG_ID, false),
                Member::field(REF_MSG_TYPE, false),
                Member::field(SESSION_REJECT_REASON, false),
                Member::field(TEXT, false),
            ],
        ));
        dict.add_message(admin(
            "4",
            "SequenceReset",
            vec![Member::field(GAP_FILL_FLAG, false), Member::field(NEW_SEQ_NO, true)],
        ));
        dict.add_message(admin("5", "Logout", vec![Member::field(TEXT, false)]));

        let mut logon = vec![
            Member::field(ENCRYPT_METHOD, true),
            Member::field(HEART_BT_INT, true),
            Member::field(RAW_DATA_LENGTH, false),
            Member::field(RAW_DATA, false),
            Member::field(RESET_SEQ_NUM_FLAG, false),
            Member::field(NEXT_EXPECTED_MSG_SEQ_NUM, false),
            Member::field(MAX_MESSAGE_SIZE, false),
            Member::Group(GroupDef::new(
                NO_MSG_TYPES,
                false,
                vec![Member::field(REF_MSG_TYPE, false), Member::field(MSG_DIRECTION, false)],
            )),
        ];
        if version.uses_fixt() {
            logon.push(Member::field(DEFAULT_APPL_VER_ID, true));
        }
        dict.add_message(admin("A", "Logon", logon));
        dict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_dictionary_messages() {
        let dict = Dictionary::session(Version::Fix44);
        for msg_type in ["0", "1", "2", "3", "4", "5", "A"] {
            let def = dict.get_message(msg_type).unwrap();
            assert_eq!(def.category, MessageCategory::Admin);
        }
        assert_eq!(dict.message_layout("2").unwrap().required(), &[BEGIN_SEQ_NO, END_SEQ_NO]);
    }

    #[test]
    fn test_session_dictionary_groups() {
        let dict = Dictionary::session(Version::Fix44);
        let hops = dict.group_spec("D", NO_HOPS).unwrap();
        assert_eq!(hops.delimiter(), HOP_COMP_ID);

        let msg_types = dict.group_spec("A", NO_MSG_TYPES).unwrap();
        assert_eq!(msg_types.members(), &[REF_MSG_TYPE, MSG_DIRECTION]);
        assert!(dict.group_spec("0", NO_MSG_TYPES).is_none());
    }

    #[test]
    fn test_fixt_logon_requires_default_appl_ver_id() {
        let fixt = Dictionary::session(Version::Fixt11);
        assert!(fixt.message_layout("A").unwrap().required().contains(&DEFAULT_APPL_VER_ID));
        let fix44 = Dictionary::session(Version::Fix44);
        assert!(!fix44.message_layout("A").unwrap().contains(DEFAULT_APPL_VER_ID));
    }

    #[test]
    fn test_data_fields_are_typed() {
        let dict = Dictionary::session(Version::Fix44);
        assert_eq!(dict.field_type(RAW_DATA_LENGTH), Some(FieldType::Length));
        assert!(dict.field_type(RAW_DATA).unwrap().is_data());
    }
}
