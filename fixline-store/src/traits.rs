/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Message store trait definition.
//!
//! A store keeps every message this side sent, keyed by sequence number, and
//! the two session counters. It is the recovery source for resend requests
//! and the only state that survives a restart.

use async_trait::async_trait;
use bytes::Bytes;
use fixline_core::error::StoreError;
use fixline_core::types::{SeqNum, Timestamp};
use std::collections::BTreeMap;
use std::fmt;

/// A message as persisted for retransmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Sequence number the message was sent with.
    pub seq_num: SeqNum,
    /// Encoded frame exactly as sent.
    pub bytes: Bytes,
    /// When the message was stored.
    pub timestamp: Timestamp,
}

/// Abstract interface for FIX message storage.
///
/// Counter getters are synchronous snapshots; every mutation is async and
/// completes only once durable for persistent implementations.
#[async_trait]
pub trait MessageStore: Send + Sync + fmt::Debug {
    /// Stores an outgoing message.
    ///
    /// The next sender sequence number moves to `seq_num + 1` if that is
    /// higher, in the same step as the message itself is stored.
    ///
    /// # Errors
    /// Returns `StoreError` if the message cannot be stored durably.
    async fn append(&self, seq_num: SeqNum, message: Bytes) -> Result<(), StoreError>;

    /// Retrieves sent messages in ascending order.
    ///
    /// `end == 0` means through the last message sent.
    ///
    /// # Errors
    /// Returns `StoreError::Corrupted` if a message that was sent inside the
    /// requested span is missing.
    async fn range(&self, begin: SeqNum, end: SeqNum) -> Result<Vec<StoredMessage>, StoreError>;

    /// Returns the next sender sequence number.
    fn next_sender_seq(&self) -> SeqNum;

    /// Returns the next expected target sequence number.
    fn next_target_seq(&self) -> SeqNum;

    /// Returns both counters read under one lock, sender first.
    fn counters(&self) -> (SeqNum, SeqNum) {
        (self.next_sender_seq(), self.next_target_seq())
    }

    /// Sets the next sender sequence number.
    ///
    /// # Errors
    /// Returns `StoreError` if the counter cannot be persisted.
    async fn set_next_sender_seq(&self, seq: SeqNum) -> Result<(), StoreError>;

    /// Sets the next expected target sequence number.
    ///
    /// # Errors
    /// Returns `StoreError` if the counter cannot be persisted.
    async fn set_next_target_seq(&self, seq: SeqNum) -> Result<(), StoreError>;

    /// Clears all messages and sets both counters to 1 as one observable step.
    ///
    /// # Errors
    /// Returns `StoreError` if the reset fails; the previous state is kept.
    async fn reset(&self) -> Result<(), StoreError>;

    /// Returns when the store (or its last reset) was created.
    fn creation_time(&self) -> Timestamp;

    /// Reloads state from persistent storage.
    ///
    /// # Errors
    /// Returns `StoreError` if the refresh fails.
    async fn refresh(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Collects `[begin, end]` from an ordered message map.
///
/// `end` is clipped to the last sent sequence number. Sequence numbers below
/// the first stored one are not reported as missing: they predate the log
/// (e.g. a counter moved forward by hand) and are gap-filled by the caller.
pub(crate) fn collect_range(
    messages: &BTreeMap<u64, StoredMessage>,
    begin: SeqNum,
    end: SeqNum,
    next_sender: SeqNum,
) -> Result<Vec<StoredMessage>, StoreError> {
    let last_sent = next_sender.value().saturating_sub(1);
    let end = if end.value() == 0 {
        last_sent
    } else {
        end.value().min(last_sent)
    };
    let begin = begin.value().max(1);
    if begin > end {
        return Ok(Vec::new());
    }

    let Some(&first_stored) = messages.keys().next() else {
        return Ok(Vec::new());
    };
    let start = begin.max(first_stored);
    if start > end {
        return Ok(Vec::new());
    }

    let found: Vec<StoredMessage> = messages.range(start..=end).map(|(_, m)| m.clone()).collect();
    let mut expected = start;
    for message in &found {
        if message.seq_num.value() != expected {
            return Err(StoreError::Corrupted {
                reason: format!("message {expected} missing from log"),
            });
        }
        expected += 1;
    }
    if expected <= end {
        return Err(StoreError::Corrupted {
            reason: format!("messages {expected}..={end} missing from log"),
        });
    }
    Ok(found)
}
