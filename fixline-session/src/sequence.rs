/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 18/10/26
******************************************************************************/

//! Sequence number tracking.
//!
//! The tracker mirrors the counters held by the message store. It is owned
//! by the session engine and only touched under the engine's lock, so plain
//! integers suffice.

use fixline_core::types::SeqNum;

/// Outgoing and expected-incoming sequence numbers of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceTracker {
    next_outgoing: u64,
    next_incoming: u64,
}

impl SequenceTracker {
    /// Creates a tracker with both counters at 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next_outgoing: 1,
            next_incoming: 1,
        }
    }

    /// Creates a tracker resuming from persisted counters.
    ///
    /// # Arguments
    /// * `outgoing` - Next sequence number to send
    /// * `incoming` - Next sequence number expected from the counterparty
    #[must_use]
    pub const fn with_initial(outgoing: SeqNum, incoming: SeqNum) -> Self {
        Self {
            next_outgoing: outgoing.value(),
            next_incoming: incoming.value(),
        }
    }

    /// Returns the next outgoing sequence number and advances the counter.
    #[inline]
    pub fn next_outgoing(&mut self) -> SeqNum {
        let seq = self.next_outgoing;
        self.next_outgoing += 1;
        SeqNum::new(seq)
    }

    /// Returns the next outgoing sequence number without advancing.
    #[inline]
    #[must_use]
    pub const fn peek_outgoing(&self) -> SeqNum {
        SeqNum::new(self.next_outgoing)
    }

    /// Returns the next expected incoming sequence number.
    #[inline]
    #[must_use]
    pub const fn next_incoming(&self) -> SeqNum {
        SeqNum::new(self.next_incoming)
    }

    /// Checks a received MsgSeqNum against the expected one.
    ///
    /// Only [`SequenceCheck::Accept`] advances the expected number.
    pub fn expect(&mut self, received: SeqNum) -> SequenceCheck {
        let expected = self.next_incoming;
        let received = received.value();
        if received == expected {
            self.next_incoming += 1;
            SequenceCheck::Accept
        } else if received > expected {
            SequenceCheck::Gap { expected, received }
        } else {
            SequenceCheck::Duplicate { expected, received }
        }
    }

    /// Moves the expected incoming number, e.g. after a SequenceReset.
    #[inline]
    pub fn set_next_incoming(&mut self, seq: SeqNum) {
        self.next_incoming = seq.value();
    }

    /// Moves the next outgoing number.
    #[inline]
    pub fn set_next_outgoing(&mut self, seq: SeqNum) {
        self.next_outgoing = seq.value();
    }

    /// Resets both counters to 1.
    #[inline]
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of [`SequenceTracker::expect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// The message is the one expected.
    Accept,
    /// Messages between `expected` and `received` are missing.
    Gap {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },
    /// The message was already seen.
    Duplicate {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },
}

impl SequenceCheck {
    /// Returns true if the sequence is valid.
    #[must_use]
    pub const fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }

    /// Returns true if there's a gap.
    #[must_use]
    pub const fn is_gap(&self) -> bool {
        matches!(self, Self::Gap { .. })
    }

    /// Returns true if the sequence is too low.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_new() {
        let tracker = SequenceTracker::new();
        assert_eq!(tracker.peek_outgoing().value(), 1);
        assert_eq!(tracker.next_incoming().value(), 1);
    }

    #[test]
    fn test_next_outgoing() {
        let mut tracker = SequenceTracker::new();

        assert_eq!(tracker.next_outgoing().value(), 1);
        assert_eq!(tracker.peek_outgoing().value(), 2);
        assert_eq!(tracker.next_outgoing().value(), 2);
        assert_eq!(tracker.peek_outgoing().value(), 3);
    }

    #[test]
    fn test_in_order_messages_advance_by_count() {
        let mut tracker = SequenceTracker::new();
        for seq in 1..=25 {
            assert!(tracker.expect(SeqNum::new(seq)).is_accept());
        }
        assert_eq!(tracker.next_incoming().value(), 26);
    }

    #[test]
    fn test_expect_gap_and_duplicate_do_not_advance() {
        let mut tracker = SequenceTracker::with_initial(SeqNum::new(1), SeqNum::new(5));

        assert_eq!(
            tracker.expect(SeqNum::new(8)),
            SequenceCheck::Gap { expected: 5, received: 8 }
        );
        assert_eq!(tracker.next_incoming().value(), 5);

        assert_eq!(
            tracker.expect(SeqNum::new(3)),
            SequenceCheck::Duplicate { expected: 5, received: 3 }
        );
        assert!(tracker.expect(SeqNum::new(3)).is_duplicate());
        assert_eq!(tracker.next_incoming().value(), 5);

        assert!(tracker.expect(SeqNum::new(5)).is_accept());
        assert_eq!(tracker.next_incoming().value(), 6);
    }

    #[test]
    fn test_set_and_reset() {
        let mut tracker = SequenceTracker::with_initial(SeqNum::new(100), SeqNum::new(200));
        tracker.set_next_incoming(SeqNum::new(250));
        tracker.set_next_outgoing(SeqNum::new(150));
        assert_eq!(tracker.next_incoming().value(), 250);
        assert_eq!(tracker.peek_outgoing().value(), 150);

        tracker.reset();
        assert_eq!(tracker, SequenceTracker::new());
    }
}
