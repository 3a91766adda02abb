//! Byte-budgeted FIFO of consensus messages.

use crate::MempoolError;
use hotstuff_types::{Hash, HotstuffMessage};
use std::collections::VecDeque;
use tracing::trace;

#[derive(Debug, Clone)]
struct Entry {
    message: HotstuffMessage,
    hash: Hash,
    size: usize,
}

/// A sliding-window FIFO bounded by total encoded bytes.
///
/// Pushing past the byte cap evicts from the front, oldest first. Entries are
/// identified by the content hash of their encoding, so a retransmitted
/// message is recognised by [`MessageFifo::contains`] even though it is a
/// distinct value.
#[derive(Debug, Clone)]
pub struct MessageFifo {
    entries: VecDeque<Entry>,
    total_bytes: usize,
    max_total_bytes: usize,
}

impl MessageFifo {
    pub fn new(max_total_bytes: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            total_bytes: 0,
            max_total_bytes,
        }
    }

    /// Append a message, evicting the oldest entries while over budget.
    ///
    /// Returns the evicted messages. A message that alone exceeds the cap is
    /// rejected and the queue is left untouched.
    pub fn push(&mut self, message: HotstuffMessage) -> Result<Vec<HotstuffMessage>, MempoolError> {
        let size = message.encoded_size()?;
        if size > self.max_total_bytes {
            return Err(MempoolError::Full {
                size,
                capacity: self.max_total_bytes,
            });
        }
        let hash = message.content_hash()?;

        self.total_bytes += size;
        self.entries.push_back(Entry {
            message,
            hash,
            size,
        });

        let mut evicted = Vec::new();
        while self.total_bytes > self.max_total_bytes {
            match self.pop_entry() {
                Some(entry) => {
                    trace!(hash = ?entry.hash, size = entry.size, "Evicted oldest message");
                    evicted.push(entry.message);
                }
                None => break,
            }
        }
        Ok(evicted)
    }

    /// Remove and return the oldest message.
    pub fn pop(&mut self) -> Option<HotstuffMessage> {
        self.pop_entry().map(|entry| entry.message)
    }

    /// Remove the first message with the same content as `message`.
    pub fn remove(&mut self, message: &HotstuffMessage) -> Result<Option<HotstuffMessage>, MempoolError> {
        let hash = message.content_hash()?;
        let Some(position) = self.entries.iter().position(|e| e.hash == hash) else {
            return Ok(None);
        };
        Ok(self.entries.remove(position).map(|entry| {
            self.total_bytes -= entry.size;
            entry.message
        }))
    }

    /// Whether a message with identical content is queued.
    pub fn contains(&self, message: &HotstuffMessage) -> Result<bool, MempoolError> {
        let hash = message.content_hash()?;
        Ok(self.entries.iter().any(|e| e.hash == hash))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_bytes = 0;
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn max_total_bytes(&self) -> usize {
        self.max_total_bytes
    }

    /// Raise the byte cap to at least `bytes`. Never shrinks, so nothing is
    /// evicted.
    pub fn ensure_capacity(&mut self, bytes: usize) {
        self.max_total_bytes = self.max_total_bytes.max(bytes);
    }

    /// All queued messages, oldest first.
    pub fn get_all(&self) -> Vec<&HotstuffMessage> {
        self.iter().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HotstuffMessage> {
        self.entries.iter().map(|e| &e.message)
    }

    fn pop_entry(&mut self) -> Option<Entry> {
        let entry = self.entries.pop_front()?;
        self.total_bytes -= entry.size;
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotstuff_types::test_utils::{test_block, test_key_pair};
    use hotstuff_types::HotstuffStep;

    fn vote(seed: u8, round: u64) -> HotstuffMessage {
        let key = test_key_pair(seed);
        let block = test_block(1, &test_key_pair(1));
        HotstuffMessage::vote(1, round, HotstuffStep::Prepare, &block, &key).unwrap()
    }

    fn size_of(msg: &HotstuffMessage) -> usize {
        msg.encoded_size().unwrap()
    }

    fn assert_consistent(fifo: &MessageFifo) {
        let all = fifo.get_all();
        assert_eq!(all.len(), fifo.size());
        let bytes: usize = all.iter().map(|m| size_of(m)).sum();
        assert_eq!(bytes, fifo.total_bytes());
        assert!(fifo.total_bytes() <= fifo.max_total_bytes());
    }

    #[test]
    fn test_push_pop_is_fifo() {
        let mut fifo = MessageFifo::new(1 << 20);
        let (a, b, c) = (vote(1, 0), vote(2, 0), vote(3, 0));
        fifo.push(a.clone()).unwrap();
        fifo.push(b.clone()).unwrap();
        fifo.push(c.clone()).unwrap();
        assert_consistent(&fifo);

        assert_eq!(fifo.pop(), Some(a));
        assert_eq!(fifo.pop(), Some(b));
        assert_eq!(fifo.pop(), Some(c));
        assert_eq!(fifo.pop(), None);
        assert_eq!(fifo.total_bytes(), 0);
    }

    #[test]
    fn test_exceeding_cap_evicts_oldest_first() {
        let messages: Vec<HotstuffMessage> = (1..=4).map(|s| vote(s, 0)).collect();
        // Votes from different signers encode to the same length.
        let one = size_of(&messages[0]);
        let mut fifo = MessageFifo::new(one * 3);

        for msg in &messages[..3] {
            assert!(fifo.push(msg.clone()).unwrap().is_empty());
        }
        assert_eq!(fifo.size(), 3);

        let evicted = fifo.push(messages[3].clone()).unwrap();
        assert_eq!(evicted, vec![messages[0].clone()]);
        assert_eq!(fifo.size(), 3);
        assert!(!fifo.contains(&messages[0]).unwrap());
        assert!(fifo.contains(&messages[3]).unwrap());
        assert_eq!(fifo.iter().next(), Some(&messages[1]));
        assert_consistent(&fifo);
    }

    #[test]
    fn test_oversized_message_is_rejected() {
        let msg = vote(1, 0);
        let mut fifo = MessageFifo::new(size_of(&msg) - 1);
        assert!(matches!(fifo.push(msg), Err(MempoolError::Full { .. })));
        assert!(fifo.is_empty());
        assert_eq!(fifo.total_bytes(), 0);
    }

    #[test]
    fn test_contains_and_remove_compare_by_content() {
        let mut fifo = MessageFifo::new(1 << 20);
        let original = vote(1, 0);
        fifo.push(original.clone()).unwrap();
        fifo.push(vote(2, 0)).unwrap();

        let retransmitted = original.clone();
        assert!(fifo.contains(&retransmitted).unwrap());
        assert!(!fifo.contains(&vote(1, 1)).unwrap());

        assert_eq!(fifo.remove(&retransmitted).unwrap(), Some(original));
        assert_eq!(fifo.remove(&vote(1, 0)).unwrap(), None);
        assert_eq!(fifo.size(), 1);
        assert_consistent(&fifo);
    }

    #[test]
    fn test_push_does_not_deduplicate() {
        let mut fifo = MessageFifo::new(1 << 20);
        let msg = vote(1, 0);
        fifo.push(msg.clone()).unwrap();
        fifo.push(msg).unwrap();
        assert_eq!(fifo.size(), 2);
        assert_consistent(&fifo);
    }

    #[test]
    fn test_sizes_stay_consistent_across_operations() {
        let mut fifo = MessageFifo::new(size_of(&vote(1, 0)) * 2 + 10);
        for seed in 1..=6 {
            fifo.push(vote(seed, 0)).unwrap();
            assert_consistent(&fifo);
        }
        fifo.pop();
        assert_consistent(&fifo);
        fifo.remove(&vote(6, 0)).unwrap();
        assert_consistent(&fifo);
        fifo.clear();
        assert_consistent(&fifo);
        assert!(fifo.is_empty());
    }

    #[test]
    fn test_ensure_capacity_only_grows() {
        let one = size_of(&vote(1, 0));
        let mut fifo = MessageFifo::new(one);
        fifo.push(vote(1, 0)).unwrap();

        fifo.ensure_capacity(one * 3);
        assert_eq!(fifo.max_total_bytes(), one * 3);
        assert!(fifo.push(vote(2, 0)).unwrap().is_empty());
        assert_eq!(fifo.size(), 2);

        fifo.ensure_capacity(one);
        assert_eq!(fifo.max_total_bytes(), one * 3);
        assert_consistent(&fifo);
    }
}
