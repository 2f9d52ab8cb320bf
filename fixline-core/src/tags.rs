/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Tag numbers the session layer itself reads or writes.
//!
//! Application tags belong to the dictionary; only the standard header,
//! trailer and administrative message fields are named here.

// Standard header

/// BeginString: FIX version, always the first field.
pub const BEGIN_STRING: u32 = 8;
/// BodyLength: always the second field.
pub const BODY_LENGTH: u32 = 9;
/// MsgType: always the third field.
pub const MSG_TYPE: u32 = 35;
/// MsgSeqNum.
pub const MSG_SEQ_NUM: u32 = 34;
/// SenderCompID.
pub const SENDER_COMP_ID: u32 = 49;
/// SenderSubID.
pub const SENDER_SUB_ID: u32 = 50;
/// SendingTime.
pub const SENDING_TIME: u32 = 52;
/// TargetCompID.
pub const TARGET_COMP_ID: u32 = 56;
/// TargetSubID.
pub const TARGET_SUB_ID: u32 = 57;
/// PossDupFlag: the message may be a retransmission.
pub const POSS_DUP_FLAG: u32 = 43;
/// PossResend: the message may have been sent under another sequence number.
pub const POSS_RESEND: u32 = 97;
/// OnBehalfOfCompID.
pub const ON_BEHALF_OF_COMP_ID: u32 = 115;
/// OrigSendingTime: original SendingTime of a retransmitted message.
pub const ORIG_SENDING_TIME: u32 = 122;
/// DeliverToCompID.
pub const DELIVER_TO_COMP_ID: u32 = 128;
/// SecureDataLen.
pub const SECURE_DATA_LEN: u32 = 90;
/// SecureData.
pub const SECURE_DATA: u32 = 91;
/// NoHops: repeating group of routing hops.
pub const NO_HOPS: u32 = 627;
/// HopCompID.
pub const HOP_COMP_ID: u32 = 628;
/// HopSendingTime.
pub const HOP_SENDING_TIME: u32 = 629;
/// HopRefID.
pub const HOP_REF_ID: u32 = 630;
/// ApplVerID.
pub const APPL_VER_ID: u32 = 1128;

// Standard trailer

/// SignatureLength.
pub const SIGNATURE_LENGTH: u32 = 93;
/// Signature.
pub const SIGNATURE: u32 = 89;
/// CheckSum: always the last field.
pub const CHECKSUM: u32 = 10;

// Administrative messages

/// BeginSeqNo (ResendRequest).
pub const BEGIN_SEQ_NO: u32 = 7;
/// EndSeqNo (ResendRequest); 0 means "through the latest".
pub const END_SEQ_NO: u32 = 16;
/// NewSeqNo (SequenceReset).
pub const NEW_SEQ_NO: u32 = 36;
/// RefSeqNum (Reject).
pub const REF_SEQ_NUM: u32 = 45;
/// Text.
pub const TEXT: u32 = 58;
/// RawDataLength.
pub const RAW_DATA_LENGTH: u32 = 95;
/// RawData.
pub const RAW_DATA: u32 = 96;
/// EncryptMethod (Logon).
pub const ENCRYPT_METHOD: u32 = 98;
/// HeartBtInt (Logon), in seconds.
pub const HEART_BT_INT: u32 = 108;
/// TestReqID.
pub const TEST_REQ_ID: u32 = 112;
/// GapFillFlag (SequenceReset).
pub const GAP_FILL_FLAG: u32 = 123;
/// ResetSeqNumFlag (Logon).
pub const RESET_SEQ_NUM_FLAG: u32 = 141;
/// RefTagID (Reject).
pub const REF_TAG_ID: u32 = 371;
/// RefMsgType (Reject).
pub const REF_MSG_TYPE: u32 = 372;
/// SessionRejectReason (Reject).
pub const SESSION_REJECT_REASON: u32 = 373;
/// BusinessRejectReason (BusinessMessageReject).
pub const BUSINESS_REJECT_REASON: u32 = 380;
/// MaxMessageSize (Logon).
pub const MAX_MESSAGE_SIZE: u32 = 383;
/// NoMsgTypes (Logon).
pub const NO_MSG_TYPES: u32 = 384;
/// MsgDirection inside NoMsgTypes.
pub const MSG_DIRECTION: u32 = 385;
/// NextExpectedMsgSeqNum (Logon, FIX 4.4+).
pub const NEXT_EXPECTED_MSG_SEQ_NUM: u32 = 789;
/// DefaultApplVerID (Logon, FIXT).
pub const DEFAULT_APPL_VER_ID: u32 = 1137;
