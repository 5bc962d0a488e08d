//! Capability interface shared by every game variant, plus the connection
//! handle a session keeps for each of its players.

use crate::outbox::Outbox;
use shared::PlayerId;
use std::sync::Arc;
use tokio::sync::watch;

/// What the session did with an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    /// A quit was processed and the named player removed.
    Quit(PlayerId),
    Ignored,
}

/// A game session that connections can join.
///
/// Implementations own their roster and lock; every method may be called
/// concurrently from any connection task.
pub trait Game: Send + Sync {
    /// Adds a player, or reactivates `requested_id` if it is on the roster.
    /// Returns the id the connection should use from now on.
    fn join(
        &self,
        requested_id: Option<PlayerId>,
        player_name: &str,
        connection: ConnectionHandle,
    ) -> PlayerId;

    /// Marks a player whose connection was lost. The record is kept.
    fn disable(&self, player_id: PlayerId);

    /// Deletes a player and closes its connection.
    fn remove(&self, player_id: PlayerId);

    /// Decodes one inbound text frame and applies it.
    fn process_message(&self, raw: &str) -> Dispatch;

    /// The queue the player's send task drains.
    fn outbound_queue(&self, player_id: PlayerId) -> Option<Arc<Outbox>>;
}

/// Session-side handle to a live connection.
///
/// Closing the handle, or dropping it when a reconnect replaces it, tells the
/// connection's tasks to shut down without disabling the player.
#[derive(Debug)]
pub struct ConnectionHandle {
    peer: String,
    shutdown: watch::Sender<bool>,
}

impl ConnectionHandle {
    pub fn new(peer: impl Into<String>) -> (Self, ShutdownSignal) {
        let (shutdown, receiver) = watch::channel(false);
        (
            Self {
                peer: peer.into(),
                shutdown,
            },
            ShutdownSignal(receiver),
        )
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn close(&self) {
        // No receiver means the connection is already gone.
        let _ = self.shutdown.send(true);
    }
}

/// Connection-side end of a [`ConnectionHandle`].
#[derive(Debug, Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    /// Resolves once the handle is closed or dropped.
    pub async fn wait(&mut self) {
        loop {
            if *self.0.borrow_and_update() {
                return;
            }
            if self.0.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        *self.0.borrow() || self.0.has_changed().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_close_wakes_signal() {
        let (handle, mut signal) = ConnectionHandle::new("127.0.0.1:9000");
        assert_eq!(handle.peer(), "127.0.0.1:9000");
        assert!(!signal.is_shut_down());

        handle.close();

        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .expect("signal resolves after close");
        assert!(signal.is_shut_down());
    }

    #[tokio::test]
    async fn test_drop_wakes_signal() {
        let (handle, mut signal) = ConnectionHandle::new("peer");
        drop(handle);

        tokio::time::timeout(Duration::from_millis(100), signal.wait())
            .await
            .expect("signal resolves after drop");
        assert!(signal.is_shut_down());
    }

    #[tokio::test]
    async fn test_open_handle_keeps_waiting() {
        let (_handle, mut signal) = ConnectionHandle::new("peer");
        let waited = tokio::time::timeout(Duration::from_millis(50), signal.wait()).await;
        assert!(waited.is_err());
    }

    #[test]
    fn test_close_without_receiver() {
        let (handle, signal) = ConnectionHandle::new("peer");
        drop(signal);
        handle.close();
    }
}
