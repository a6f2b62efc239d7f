//! Message Queue (§4.6): durable per-recipient FIFO of pending plaintexts.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::identity::Fingerprint;

/// A plaintext message waiting for its recipient to become reachable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    /// Who this message is for.
    pub recipient_fingerprint: Fingerprint,
    /// Which logical stream it belongs to.
    pub stream_id: u16,
    /// The plaintext payload, not yet encrypted.
    pub plaintext: Vec<u8>,
    /// Unix timestamp (seconds) the message was enqueued.
    pub enqueued_ts: u64,
}

/// Durable, per-recipient FIFO. The whole queue is persisted as one JSON
/// file; writes are atomic (write-temp + rename) per §4.6.
pub struct MessageQueue {
    by_recipient: HashMap<Fingerprint, VecDeque<QueuedMessage>>,
    path: PathBuf,
}

impl MessageQueue {
    /// Load the queue from `path`, or start empty if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Corrupt` if the file exists but cannot be
    /// parsed.
    pub fn load(path: &Path) -> Result<Self, QueueError> {
        let messages: Vec<QueuedMessage> = match std::fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data)
                .map_err(|e| QueueError::Corrupt(format!("parsing queue: {e}")))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(QueueError::Corrupt(format!("reading queue: {e}"))),
        };

        let mut by_recipient: HashMap<Fingerprint, VecDeque<QueuedMessage>> = HashMap::new();
        for message in messages {
            by_recipient
                .entry(message.recipient_fingerprint.clone())
                .or_default()
                .push_back(message);
        }

        Ok(Self {
            by_recipient,
            path: path.to_path_buf(),
        })
    }

    fn persist(&self) -> Result<(), QueueError> {
        let flat: Vec<&QueuedMessage> = self.by_recipient.values().flatten().collect();
        let json = serde_json::to_string_pretty(&flat)
            .map_err(|e| QueueError::PersistFailure(format!("serializing queue: {e}")))?;
        crate::persist::atomic_write(&self.path, json.as_bytes())
            .map_err(|e| QueueError::PersistFailure(e.to_string()))
    }

    /// Append a message to `recipient_fp`'s FIFO and persist.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::PersistFailure` if the atomic write fails.
    pub fn enqueue(
        &mut self,
        recipient_fp: &Fingerprint,
        stream_id: u16,
        plaintext: Vec<u8>,
    ) -> Result<(), QueueError> {
        let enqueued_ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.by_recipient
            .entry(recipient_fp.clone())
            .or_default()
            .push_back(QueuedMessage {
                recipient_fingerprint: recipient_fp.clone(),
                stream_id,
                plaintext,
                enqueued_ts,
            });
        self.persist()
    }

    /// Re-insert `message` at the head of its recipient's queue. Used when
    /// a drain fails partway through (§4.6).
    ///
    /// # Errors
    ///
    /// Returns `QueueError::PersistFailure` if the atomic write fails.
    pub fn requeue_at_head(&mut self, message: QueuedMessage) -> Result<(), QueueError> {
        self.by_recipient
            .entry(message.recipient_fingerprint.clone())
            .or_default()
            .push_front(message);
        self.persist()
    }

    /// Pop the next message for `recipient_fp`, in FIFO order, without
    /// persisting (the caller persists after a successful send via
    /// `enqueue`/`requeue_at_head`, or calls `commit` to flush the pop).
    pub fn pop_front(&mut self, recipient_fp: &Fingerprint) -> Option<QueuedMessage> {
        self.by_recipient.get_mut(recipient_fp).and_then(VecDeque::pop_front)
    }

    /// Flush the current in-memory state to disk. Call after a successful
    /// `pop_front` to durably remove the delivered message.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::PersistFailure` if the atomic write fails.
    pub fn commit(&self) -> Result<(), QueueError> {
        self.persist()
    }

    /// Number of messages pending for `recipient_fp`.
    #[must_use]
    pub fn count(&self, recipient_fp: &Fingerprint) -> usize {
        self.by_recipient.get(recipient_fp).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_and_drain_preserves_fifo_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = MessageQueue::load(&dir.path().join("queue.json")).unwrap();
        let fp = "recipient00001".to_string();
        queue.enqueue(&fp, 1, b"m1".to_vec()).unwrap();
        queue.enqueue(&fp, 1, b"m2".to_vec()).unwrap();
        queue.enqueue(&fp, 1, b"m3".to_vec()).unwrap();

        assert_eq!(queue.pop_front(&fp).unwrap().plaintext, b"m1");
        assert_eq!(queue.pop_front(&fp).unwrap().plaintext, b"m2");
        assert_eq!(queue.pop_front(&fp).unwrap().plaintext, b"m3");
        assert!(queue.pop_front(&fp).is_none());
    }

    #[test]
    fn requeue_at_head_puts_message_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = MessageQueue::load(&dir.path().join("queue.json")).unwrap();
        let fp = "recipient00001".to_string();
        queue.enqueue(&fp, 1, b"m1".to_vec()).unwrap();
        queue.enqueue(&fp, 1, b"m2".to_vec()).unwrap();

        let failed = queue.pop_front(&fp).unwrap();
        queue.requeue_at_head(failed).unwrap();

        assert_eq!(queue.pop_front(&fp).unwrap().plaintext, b"m1");
    }

    #[test]
    fn count_reflects_pending_messages() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = MessageQueue::load(&dir.path().join("queue.json")).unwrap();
        let fp = "recipient00001".to_string();
        assert_eq!(queue.count(&fp), 0);
        queue.enqueue(&fp, 1, b"m1".to_vec()).unwrap();
        assert_eq!(queue.count(&fp), 1);
    }

    #[test]
    fn reload_preserves_queued_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.json");
        let fp = "recipient00001".to_string();
        {
            let mut queue = MessageQueue::load(&path).unwrap();
            queue.enqueue(&fp, 1, b"m1".to_vec()).unwrap();
        }
        let mut reloaded = MessageQueue::load(&path).unwrap();
        assert_eq!(reloaded.count(&fp), 1);
        assert_eq!(reloaded.pop_front(&fp).unwrap().plaintext, b"m1");
    }

    #[test]
    fn independent_recipients_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = MessageQueue::load(&dir.path().join("queue.json")).unwrap();
        queue.enqueue(&"fp_a".to_string(), 1, b"a1".to_vec()).unwrap();
        queue.enqueue(&"fp_b".to_string(), 1, b"b1".to_vec()).unwrap();
        assert_eq!(queue.pop_front(&"fp_a".to_string()).unwrap().plaintext, b"a1");
        assert_eq!(queue.pop_front(&"fp_b".to_string()).unwrap().plaintext, b"b1");
    }
}
