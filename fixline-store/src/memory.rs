/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! In-memory message store implementation.
//!
//! Suitable for tests and sessions that do not need to survive a restart.

use crate::traits::{MessageStore, StoredMessage, collect_range};
use async_trait::async_trait;
use bytes::Bytes;
use fixline_core::error::StoreError;
use fixline_core::types::{SeqNum, Timestamp};
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug)]
struct State {
    messages: BTreeMap<u64, StoredMessage>,
    next_sender_seq: SeqNum,
    next_target_seq: SeqNum,
    creation_time: Timestamp,
}

impl State {
    fn new(sender_seq: SeqNum, target_seq: SeqNum) -> Self {
        Self {
            messages: BTreeMap::new(),
            next_sender_seq: sender_seq,
            next_target_seq: target_seq,
            creation_time: Timestamp::now(),
        }
    }
}

/// In-memory message store.
///
/// One lock guards the messages and both counters, so a reader never sees a
/// reset half applied.
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Creates a new empty memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::with_initial_seqs(SeqNum::new(1), SeqNum::new(1))
    }

    /// Creates a new memory store with initial sequence numbers.
    #[must_use]
    pub fn with_initial_seqs(sender_seq: SeqNum, target_seq: SeqNum) -> Self {
        Self {
            state: RwLock::new(State::new(sender_seq, target_seq)),
        }
    }

    /// Returns the number of stored messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.state.read().messages.len()
    }

    /// Checks if a message with the given sequence number exists.
    #[must_use]
    pub fn contains(&self, seq_num: SeqNum) -> bool {
        self.state.read().messages.contains_key(&seq_num.value())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(&self, seq_num: SeqNum, message: Bytes) -> Result<(), StoreError> {
        let mut state = self.state.write();
        state.messages.insert(
            seq_num.value(),
            StoredMessage {
                seq_num,
                bytes: message,
                timestamp: Timestamp::now(),
            },
        );
        if seq_num >= state.next_sender_seq {
            state.next_sender_seq = seq_num.next();
        }
        Ok(())
    }

    async fn range(&self, begin: SeqNum, end: SeqNum) -> Result<Vec<StoredMessage>, StoreError> {
        let state = self.state.read();
        collect_range(&state.messages, begin, end, state.next_sender_seq)
    }

    fn next_sender_seq(&self) -> SeqNum {
        self.state.read().next_sender_seq
    }

    fn next_target_seq(&self) -> SeqNum {
        self.state.read().next_target_seq
    }

    fn counters(&self) -> (SeqNum, SeqNum) {
        let state = self.state.read();
        (state.next_sender_seq, state.next_target_seq)
    }

    async fn set_next_sender_seq(&self, seq: SeqNum) -> Result<(), StoreError> {
        self.state.write().next_sender_seq = seq;
        Ok(())
    }

    async fn set_next_target_seq(&self, seq: SeqNum) -> Result<(), StoreError> {
        self.state.write().next_target_seq = seq;
        Ok(())
    }

    async fn reset(&self) -> Result<(), StoreError> {
        *self.state.write() = State::new(SeqNum::new(1), SeqNum::new(1));
        Ok(())
    }

    fn creation_time(&self) -> Timestamp {
        self.state.read().creation_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn filled(count: u64) -> MemoryStore {
        let store = MemoryStore::new();
        for seq in 1..=count {
            store
                .append(SeqNum::new(seq), Bytes::from(format!("msg{seq}")))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_memory_store_new() {
        let store = MemoryStore::new();
        assert_eq!(store.counters(), (SeqNum::new(1), SeqNum::new(1)));
        assert_eq!(store.message_count(), 0);
    }

    #[tokio::test]
    async fn test_append_advances_sender_counter() {
        let store = filled(3).await;
        assert_eq!(store.message_count(), 3);
        assert!(store.contains(SeqNum::new(3)));
        assert!(!store.contains(SeqNum::new(4)));
        assert_eq!(store.next_sender_seq(), SeqNum::new(4));
    }

    #[tokio::test]
    async fn test_range_for_resend() {
        let store = filled(15).await;
        let found = store.range(SeqNum::new(10), SeqNum::new(12)).await.unwrap();
        let seqs: Vec<u64> = found.iter().map(|m| m.seq_num.value()).collect();
        assert_eq!(seqs, vec![10, 11, 12]);
        assert_eq!(&found[0].bytes[..], b"msg10");
    }

    #[tokio::test]
    async fn test_memory_store_sequence_numbers() {
        let store = MemoryStore::new();
        store.set_next_sender_seq(SeqNum::new(10)).await.unwrap();
        store.set_next_target_seq(SeqNum::new(20)).await.unwrap();
        assert_eq!(store.counters(), (SeqNum::new(10), SeqNum::new(20)));
    }

    #[tokio::test]
    async fn test_memory_store_reset() {
        let store = filled(3).await;
        store.set_next_target_seq(SeqNum::new(20)).await.unwrap();

        store.reset().await.unwrap();

        assert_eq!(store.message_count(), 0);
        assert_eq!(store.counters(), (SeqNum::new(1), SeqNum::new(1)));
        assert!(store
            .range(SeqNum::new(1), SeqNum::new(0))
            .await
            .unwrap()
            .is_empty());
    }
}
