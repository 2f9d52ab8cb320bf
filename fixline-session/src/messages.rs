/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Administrative message builders.
//!
//! Builders fill MsgType and body fields only. The session engine stamps
//! BeginString, CompIDs, MsgSeqNum and SendingTime when it sends.

use bytes::Bytes;
use fixline_core::message::{Message, MsgType};
use fixline_core::tags;
use fixline_core::types::{SeqNum, SessionRejectReason};

fn text(value: &str) -> Bytes {
    Bytes::copy_from_slice(value.as_bytes())
}

/// Heartbeat (0), echoing a TestReqID when answering a TestRequest.
#[must_use]
pub fn heartbeat(test_req_id: Option<&str>) -> Message {
    let mut msg = Message::new(MsgType::Heartbeat);
    if let Some(id) = test_req_id {
        msg.set_field(tags::TEST_REQ_ID, text(id));
    }
    msg
}

/// TestRequest (1).
#[must_use]
pub fn test_request(test_req_id: &str) -> Message {
    let mut msg = Message::new(MsgType::TestRequest);
    msg.set_field(tags::TEST_REQ_ID, text(test_req_id));
    msg
}

/// ResendRequest (2). An `end` of 0 asks for everything from `begin`.
#[must_use]
pub fn resend_request(begin: SeqNum, end: SeqNum) -> Message {
    let mut msg = Message::new(MsgType::ResendRequest);
    msg.set_as(tags::BEGIN_SEQ_NO, &begin);
    msg.set_as(tags::END_SEQ_NO, &end);
    msg
}

/// Session-level Reject (3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectDetails {
    /// MsgSeqNum of the rejected message.
    pub ref_seq_num: SeqNum,
    /// Why it was rejected.
    pub reason: SessionRejectReason,
    /// Offending tag, if one is to blame.
    pub ref_tag: Option<u32>,
    /// MsgType of the rejected message, when known.
    pub ref_msg_type: Option<String>,
    /// Free text.
    pub text: Option<String>,
}

impl RejectDetails {
    /// Creates details with only the mandatory parts.
    #[must_use]
    pub fn new(ref_seq_num: SeqNum, reason: SessionRejectReason) -> Self {
        Self {
            ref_seq_num,
            reason,
            ref_tag: None,
            ref_msg_type: None,
            text: None,
        }
    }

    /// Sets RefTagID.
    #[must_use]
    pub fn with_ref_tag(mut self, tag: Option<u32>) -> Self {
        self.ref_tag = tag;
        self
    }

    /// Sets RefMsgType.
    #[must_use]
    pub fn with_ref_msg_type(mut self, msg_type: impl Into<String>) -> Self {
        self.ref_msg_type = Some(msg_type.into());
        self
    }

    /// Sets Text.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Reject (3).
#[must_use]
pub fn reject(details: &RejectDetails) -> Message {
    let mut msg = Message::new(MsgType::Reject);
    msg.set_as(tags::REF_SEQ_NUM, &details.ref_seq_num);
    if let Some(tag) = details.ref_tag {
        msg.set_as(tags::REF_TAG_ID, &tag);
    }
    if let Some(msg_type) = &details.ref_msg_type {
        msg.set_field(tags::REF_MSG_TYPE, text(msg_type));
    }
    msg.set_as(tags::SESSION_REJECT_REASON, &details.reason.code());
    if let Some(reason) = &details.text {
        msg.set_field(tags::TEXT, text(reason));
    }
    msg
}

/// BusinessMessageReject (j).
#[must_use]
pub fn business_message_reject(
    ref_seq_num: SeqNum,
    ref_msg_type: &str,
    reason: u32,
    reason_text: Option<&str>,
) -> Message {
    let mut msg = Message::new(MsgType::BusinessMessageReject);
    msg.set_as(tags::REF_SEQ_NUM, &ref_seq_num);
    msg.set_field(tags::REF_MSG_TYPE, text(ref_msg_type));
    msg.set_as(tags::BUSINESS_REJECT_REASON, &reason);
    if let Some(reason_text) = reason_text {
        msg.set_field(tags::TEXT, text(reason_text));
    }
    msg
}

/// SequenceReset (4). With `gap_fill` set this is a GapFill.
#[must_use]
pub fn sequence_reset(new_seq_no: SeqNum, gap_fill: bool) -> Message {
    let mut msg = Message::new(MsgType::SequenceReset);
    if gap_fill {
        msg.set_as(tags::GAP_FILL_FLAG, &true);
    }
    msg.set_as(tags::NEW_SEQ_NO, &new_seq_no);
    msg
}

/// Logout (5).
#[must_use]
pub fn logout(reason: Option<&str>) -> Message {
    let mut msg = Message::new(MsgType::Logout);
    if let Some(reason) = reason {
        msg.set_field(tags::TEXT, text(reason));
    }
    msg
}

/// Logon (A).
///
/// # Arguments
/// * `heart_bt_int` - HeartBtInt in seconds
/// * `reset_seq_num` - Whether to set ResetSeqNumFlag=Y
/// * `default_appl_ver_id` - DefaultApplVerID for FIXT sessions
#[must_use]
pub fn logon(heart_bt_int: u64, reset_seq_num: bool, default_appl_ver_id: Option<&str>) -> Message {
    let mut msg = Message::new(MsgType::Logon);
    msg.set_field(tags::ENCRYPT_METHOD, "0");
    msg.set_as(tags::HEART_BT_INT, &heart_bt_int);
    if reset_seq_num {
        msg.set_as(tags::RESET_SEQ_NUM_FLAG, &true);
    }
    if let Some(id) = default_appl_ver_id {
        msg.set_field(tags::DEFAULT_APPL_VER_ID, text(id));
    }
    msg
}
