//! Client sessions
//!
//! A [`ConnectionHandle`] is the room's view of one transport connection:
//! a bounded outbound queue drained by the connection's writer task, a
//! shared activity clock the reader task touches on every inbound packet,
//! and a close signal. A [`ClientSession`] wraps the handle inside a room
//! and carries the replication state of the player it currently controls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::game::state::EntityId;
use crate::net::replication::ReplicationState;

fn clock_origin() -> Instant {
    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    *ORIGIN.get_or_init(Instant::now)
}

fn now_millis() -> u64 {
    clock_origin().elapsed().as_millis() as u64
}

/// Last-inbound-packet timestamp shared between reader task and room
#[derive(Debug, Clone)]
pub struct Activity(Arc<AtomicU64>);

impl Activity {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(now_millis())))
    }

    #[inline]
    pub fn touch(&self) {
        self.0.store(now_millis(), Ordering::Relaxed);
    }

    pub fn idle_time(&self) -> Duration {
        Duration::from_millis(now_millis().saturating_sub(self.0.load(Ordering::Relaxed)))
    }
}

impl Default for Activity {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of queueing a packet for a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Queued,
    /// Queue full; this packet is dropped for this client only
    Dropped,
    /// Writer task is gone
    Closed,
}

/// Cloneable handle to one transport connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: Uuid,
    outbound: mpsc::Sender<Vec<u8>>,
    pub activity: Activity,
    close: Arc<Notify>,
}

impl ConnectionHandle {
    pub fn new(id: Uuid, outbound: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            id,
            outbound,
            activity: Activity::new(),
            close: Arc::new(Notify::new()),
        }
    }

    /// Non-blocking send into the outbound queue
    pub fn try_send(&self, packet: Vec<u8>) -> SendOutcome {
        match self.outbound.try_send(packet) {
            Ok(()) => SendOutcome::Queued,
            Err(TrySendError::Full(_)) => SendOutcome::Dropped,
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Ask the transport to drop the connection
    pub fn close(&self) {
        self.close.notify_one();
    }

    /// Resolves once `close` has been called
    pub async fn closed(&self) {
        self.close.notified().await;
    }
}

/// A connection attached to a room
pub struct ClientSession {
    handle: ConnectionHandle,
    pub name: String,
    /// Replication for the live player, `None` between death and respawn
    replication: Option<ReplicationState>,
    pub joined_at: Instant,
    pub frames_dropped: u64,
}

impl ClientSession {
    pub fn new(handle: ConnectionHandle, name: String) -> Self {
        Self {
            handle,
            name,
            replication: None,
            joined_at: Instant::now(),
            frames_dropped: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> Uuid {
        self.handle.id
    }

    #[inline]
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Player this connection currently controls
    pub fn player_id(&self) -> Option<EntityId> {
        self.replication.as_ref().map(ReplicationState::player_id)
    }

    /// Take control of a freshly spawned player; the next flush sends INIT
    pub fn attach(&mut self, player_id: EntityId) {
        self.replication = Some(ReplicationState::new(player_id));
    }

    /// Player died or was removed
    pub fn detach(&mut self) -> Option<EntityId> {
        self.replication.take().map(|r| r.player_id())
    }

    pub fn replication(&self) -> Option<&ReplicationState> {
        self.replication.as_ref()
    }

    pub fn replication_mut(&mut self) -> Option<&mut ReplicationState> {
        self.replication.as_mut()
    }

    pub fn idle_time(&self) -> Duration {
        self.handle.activity.idle_time()
    }

    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.idle_time() > timeout
    }

    pub fn send(&mut self, packet: Vec<u8>) -> SendOutcome {
        let outcome = self.handle.try_send(packet);
        if outcome == SendOutcome::Dropped {
            self.frames_dropped += 1;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(capacity: usize) -> (ClientSession, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ClientSession::new(ConnectionHandle::new(Uuid::new_v4(), tx), "tester".into()), rx)
    }

    #[test]
    fn test_attach_detach() {
        let (mut s, _rx) = session(4);
        assert_eq!(s.player_id(), None);
        s.attach(7);
        assert_eq!(s.player_id(), Some(7));
        assert!(s.replication().is_some_and(|r| r.needs_resync()));
        assert_eq!(s.detach(), Some(7));
        assert_eq!(s.player_id(), None);
    }

    #[test]
    fn test_full_queue_drops_frame() {
        let (mut s, mut rx) = session(1);
        assert_eq!(s.send(vec![1]), SendOutcome::Queued);
        assert_eq!(s.send(vec![2]), SendOutcome::Dropped);
        assert_eq!(s.frames_dropped, 1);
        assert_eq!(rx.try_recv().ok(), Some(vec![1]));
        drop(rx);
        assert_eq!(s.send(vec![3]), SendOutcome::Closed);
    }

    #[test]
    fn test_activity_touch_resets_idle() {
        let activity = Activity::new();
        std::thread::sleep(Duration::from_millis(20));
        assert!(activity.idle_time() >= Duration::from_millis(10));
        activity.touch();
        assert!(activity.idle_time() < Duration::from_millis(10));
    }

    #[test]
    fn test_fresh_session_not_stale() {
        let (s, _rx) = session(1);
        assert!(!s.is_stale(Duration::from_secs(15)));
    }

    #[tokio::test]
    async fn test_close_signal() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(Uuid::new_v4(), tx);
        let remote = handle.clone();
        remote.close();
        tokio::time::timeout(Duration::from_secs(1), handle.closed())
            .await
            .expect("close signal not delivered");
    }
}
