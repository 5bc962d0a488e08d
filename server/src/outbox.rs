//! Per-player outbound queue
//!
//! The session publishes snapshots here and the player's send task drains
//! them. Publishing never blocks: when the queue is full the oldest entries
//! are dropped, since every snapshot supersedes the ones before it.
//!
//! Each publication carries the broadcast epoch it was built in. Snapshots are
//! built under the session lock but published after it is released, so two
//! broadcasts can race to the same queue; a publication older than one the
//! queue already accepted is discarded.

use parking_lot::Mutex;
use shared::ServerMessage;
use std::collections::VecDeque;
use tokio::sync::Notify;

/// Pending messages kept per player before the oldest are dropped.
pub const DEFAULT_CAPACITY: usize = 20;

#[derive(Debug)]
struct Pending {
    messages: VecDeque<ServerMessage>,
    last_epoch: Option<u64>,
    dropped: u64,
}

#[derive(Debug)]
pub struct Outbox {
    pending: Mutex<Pending>,
    ready: Notify,
    capacity: usize,
}

impl Outbox {
    /// Creates an empty queue. Capacity is rounded up to an even number of
    /// at least 2, so `GameStatus`/`PlayerStatus` pairs are evicted together.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        let capacity = capacity + capacity % 2;
        Self {
            pending: Mutex::new(Pending {
                messages: VecDeque::with_capacity(capacity),
                last_epoch: None,
                dropped: 0,
            }),
            ready: Notify::new(),
            capacity,
        }
    }

    /// Appends `messages` in order, stamped with `epoch`.
    ///
    /// Returns false if the publication was stale and discarded.
    pub fn publish<I>(&self, epoch: u64, messages: I) -> bool
    where
        I: IntoIterator<Item = ServerMessage>,
    {
        {
            let mut pending = self.pending.lock();
            if pending.last_epoch.is_some_and(|last| epoch <= last) {
                return false;
            }
            pending.last_epoch = Some(epoch);

            for message in messages {
                if pending.messages.len() >= self.capacity {
                    pending.messages.pop_front();
                    pending.dropped += 1;
                }
                pending.messages.push_back(message);
            }
        }

        self.ready.notify_one();
        true
    }

    /// Waits for the next message.
    ///
    /// Cancel safe: a message is only removed once it is returned.
    pub async fn recv(&self) -> ServerMessage {
        loop {
            if let Some(message) = self.try_recv() {
                return message;
            }
            self.ready.notified().await;
        }
    }

    pub fn try_recv(&self) -> Option<ServerMessage> {
        self.pending.lock().messages.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().messages.is_empty()
    }

    /// Number of messages discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.pending.lock().dropped
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{BuzzStatus, MessageType};
    use std::sync::Arc;
    use std::time::Duration;

    fn pair(score: i32) -> [ServerMessage; 2] {
        [
            ServerMessage::game_status(Vec::new()),
            ServerMessage::player_status(BuzzStatus {
                score,
                ..BuzzStatus::default()
            }),
        ]
    }

    fn score_of(message: ServerMessage) -> i32 {
        match message {
            ServerMessage::PlayerStatus(status) => status.status.score,
            other => panic!("Expected PlayerStatus, got {:?}", other),
        }
    }

    #[test]
    fn test_publish_preserves_order() {
        let outbox = Outbox::new(8);
        assert!(outbox.publish(1, pair(1)));
        assert!(outbox.publish(2, pair(2)));

        assert_eq!(outbox.len(), 4);
        assert_eq!(outbox.try_recv().unwrap().message_type(), MessageType::GameStatus);
        assert_eq!(score_of(outbox.try_recv().unwrap()), 1);
        assert_eq!(outbox.try_recv().unwrap().message_type(), MessageType::GameStatus);
        assert_eq!(score_of(outbox.try_recv().unwrap()), 2);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        let outbox = Outbox::new(4);
        for epoch in 1..=5 {
            outbox.publish(epoch, pair(epoch as i32));
        }

        assert_eq!(outbox.len(), 4);
        assert_eq!(outbox.dropped(), 6);

        // The two newest pairs survive, still paired.
        assert_eq!(outbox.try_recv().unwrap().message_type(), MessageType::GameStatus);
        assert_eq!(score_of(outbox.try_recv().unwrap()), 4);
        assert_eq!(outbox.try_recv().unwrap().message_type(), MessageType::GameStatus);
        assert_eq!(score_of(outbox.try_recv().unwrap()), 5);
    }

    #[test]
    fn test_stale_epoch_discarded() {
        let outbox = Outbox::new(8);
        assert!(outbox.publish(5, pair(5)));
        assert!(!outbox.publish(3, pair(3)));
        assert!(!outbox.publish(5, pair(5)));

        assert_eq!(outbox.len(), 2);
        outbox.try_recv();
        assert_eq!(score_of(outbox.try_recv().unwrap()), 5);
    }

    #[test]
    fn test_minimum_capacity() {
        let outbox = Outbox::new(0);
        assert_eq!(outbox.capacity(), 2);
        outbox.publish(1, pair(1));
        assert_eq!(outbox.len(), 2);
        assert_eq!(outbox.dropped(), 0);
    }

    #[test]
    fn test_odd_capacity_keeps_pairs_together() {
        let outbox = Outbox::new(5);
        assert_eq!(outbox.capacity(), 6);

        for epoch in 1..=7 {
            outbox.publish(epoch, pair(epoch as i32));
        }

        // Eviction never leaves a PlayerStatus at the head.
        assert_eq!(outbox.len(), 6);
        for score in 5..=7 {
            assert_eq!(outbox.try_recv().unwrap().message_type(), MessageType::GameStatus);
            assert_eq!(score_of(outbox.try_recv().unwrap()), score);
        }
        assert!(outbox.is_empty());
    }

    #[tokio::test]
    async fn test_recv_waits_for_publish() {
        let outbox = Arc::new(Outbox::new(4));

        let consumer = {
            let outbox = Arc::clone(&outbox);
            tokio::spawn(async move { outbox.recv().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        outbox.publish(1, [ServerMessage::ping()]);

        let received = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer woke up")
            .expect("consumer task finished");
        assert_eq!(received, ServerMessage::ping());
    }

    #[tokio::test]
    async fn test_recv_returns_already_queued() {
        let outbox = Outbox::new(4);
        outbox.publish(1, pair(9));

        let first = tokio_test::assert_ok!(
            tokio::time::timeout(Duration::from_millis(100), outbox.recv()).await
        );
        assert_eq!(first.message_type(), MessageType::GameStatus);
    }
}
