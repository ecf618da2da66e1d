//! Room actor
//!
//! One tokio task per room owns the `World` and every `ClientSession` of
//! the room. The outside talks to it through a command channel and the
//! shared input queue only, so the simulation never takes a lock.
//!
//! Per sim tick (60 Hz): drain commands, apply the latest input per
//! player, tick the world, send DEAD to sessions whose player died.
//! Every third tick: encode a packet per client (in parallel), queue it,
//! then clear dirty flags and the flushed events once. Once per second:
//! drop sessions idle past the stale timeout.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
#[cfg(feature = "parallel_encode")]
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GameConfig;
use crate::game::constants::physics::{DT, TICKS_PER_BROADCAST, TICK_DURATION_US, TICK_RATE};
use crate::game::input_buffer::{InputBuffer, InputSender};
use crate::game::state::EntityId;
use crate::game::tuning::TuningTables;
use crate::game::world::{World, WorldEvent};
use crate::metrics::Metrics;
use crate::net::aoi::AoiConfig;
use crate::net::protocol::{encode_dead, encode_hello_ack, RejectReason};
use crate::net::session::{ClientSession, ConnectionHandle, SendOutcome};

/// Commands buffered per room
const COMMAND_QUEUE: usize = 256;
/// Seconds between stats lines
#[cfg(feature = "metrics_extended")]
const STATS_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("room closed")]
    Closed,
    #[error("join rejected: {0:?}")]
    Rejected(RejectReason),
}

pub enum RoomCommand {
    /// Spawn a player for a connection (new or respawning after death)
    Join {
        conn: ConnectionHandle,
        name: String,
        reply: oneshot::Sender<Result<EntityId, RejectReason>>,
    },
    /// Connection closed
    Leave { conn_id: Uuid },
    /// Frame-desync report
    Ack { conn_id: Uuid, frame: u32 },
    Shutdown,
}

/// Cheap handle the transport and the manager hold on a running room
#[derive(Clone)]
pub struct RoomHandle {
    id: Uuid,
    commands: mpsc::Sender<RoomCommand>,
    inputs: InputSender,
    occupancy: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
    capacity: usize,
}

impl RoomHandle {
    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Connections currently attached
    pub fn occupancy(&self) -> usize {
        self.occupancy.load(Ordering::Relaxed)
    }

    pub fn has_capacity(&self) -> bool {
        self.is_running() && self.occupancy() < self.capacity
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed) && !self.commands.is_closed()
    }

    pub fn inputs(&self) -> &InputSender {
        &self.inputs
    }

    /// Join and wait for the spawn result. The room itself sends HELLO_ACK.
    pub async fn join(&self, conn: ConnectionHandle, name: String) -> Result<EntityId, RoomError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(RoomCommand::Join { conn, name, reply })
            .await
            .map_err(|_| RoomError::Closed)?;
        match response.await {
            Ok(Ok(id)) => Ok(id),
            Ok(Err(reason)) => Err(RoomError::Rejected(reason)),
            Err(_) => Err(RoomError::Closed),
        }
    }

    pub async fn leave(&self, conn_id: Uuid) {
        let _ = self.commands.send(RoomCommand::Leave { conn_id }).await;
    }

    /// Best effort; a lost ACK is re-sent by the client
    pub fn ack(&self, conn_id: Uuid, frame: u32) {
        let _ = self.commands.try_send(RoomCommand::Ack { conn_id, frame });
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(RoomCommand::Shutdown).await;
    }
}

/// Room settings
#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub game: GameConfig,
    pub stale_timeout: Duration,
}

/// Room actor state
pub struct GameRoom {
    id: Uuid,
    world: World,
    sessions: HashMap<Uuid, ClientSession>,
    /// Live player -> owning connection
    owners: FxHashMap<EntityId, Uuid>,
    commands: mpsc::Receiver<RoomCommand>,
    input_buffer: InputBuffer,
    aoi: AoiConfig,
    stale_timeout: Duration,
    occupancy: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
    metrics: Arc<Metrics>,
    /// Events since the last flush
    pending_events: Vec<WorldEvent>,
    tick_count: u64,
    reported_players: u64,
    reported_coins: u64,
    #[cfg(feature = "metrics_extended")]
    started_at: Instant,
}

impl GameRoom {
    /// Build a room and its handle without starting it
    pub fn new(config: RoomConfig, tuning: Arc<TuningTables>, metrics: Arc<Metrics>) -> (Self, RoomHandle) {
        Self::with_world(World::new(config.game.clone(), tuning), config, metrics)
    }

    /// Room around an existing world (seeded worlds in tests)
    pub fn with_world(world: World, config: RoomConfig, metrics: Arc<Metrics>) -> (Self, RoomHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        let input_buffer = InputBuffer::default();
        let occupancy = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(AtomicBool::new(true));
        let id = Uuid::new_v4();

        let handle = RoomHandle {
            id,
            commands: tx,
            inputs: input_buffer.sender(),
            occupancy: occupancy.clone(),
            running: running.clone(),
            capacity: config.game.max_players,
        };
        let room = Self {
            id,
            aoi: AoiConfig::from_game(&config.game),
            world,
            sessions: HashMap::new(),
            owners: FxHashMap::default(),
            commands: rx,
            input_buffer,
            stale_timeout: config.stale_timeout,
            occupancy,
            running,
            metrics,
            pending_events: Vec::new(),
            tick_count: 0,
            reported_players: 0,
            reported_coins: 0,
            #[cfg(feature = "metrics_extended")]
            started_at: Instant::now(),
        };
        (room, handle)
    }

    /// Start the actor on the tokio runtime
    pub fn spawn(config: RoomConfig, tuning: Arc<TuningTables>, metrics: Arc<Metrics>) -> (RoomHandle, JoinHandle<()>) {
        let (room, handle) = Self::new(config, tuning, metrics);
        (handle, tokio::spawn(room.run()))
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn session(&self, conn_id: Uuid) -> Option<&ClientSession> {
        self.sessions.get(&conn_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub async fn run(mut self) {
        let mut ticker = interval(Duration::from_micros(TICK_DURATION_US));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.metrics.rooms.fetch_add(1, Ordering::Relaxed);
        info!("Room {} started at {} Hz", self.id, TICK_RATE);

        loop {
            ticker.tick().await;
            if !self.step() {
                break;
            }
        }

        self.close();
        Metrics::adjust(&self.metrics.rooms, 1, 0);
        info!("Room {} stopped after {} ticks", self.id, self.tick_count);
    }

    /// One sim tick; false once the room should stop
    pub fn step(&mut self) -> bool {
        if !self.drain_commands() {
            return false;
        }

        for (player_id, angle) in self.input_buffer.drain_latest() {
            self.world.handle_input(player_id, angle);
        }

        let started = Instant::now();
        let result = self.world.tick(DT);
        self.metrics.record_tick_time(started.elapsed());
        self.tick_count += 1;

        self.handle_deaths(&result.events);
        self.pending_events.extend(result.events);

        if self.tick_count % TICKS_PER_BROADCAST == 0 {
            self.flush();
        }
        if self.tick_count % TICK_RATE as u64 == 0 {
            self.sweep_stale();
            self.report_gauges();
        }
        #[cfg(feature = "metrics_extended")]
        if self.tick_count % (TICK_RATE as u64 * STATS_INTERVAL_SECS) == 0 {
            self.log_stats();
        }
        true
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(RoomCommand::Join { conn, name, reply }) => {
                    let result = self.join(conn, name);
                    let _ = reply.send(result);
                }
                Ok(RoomCommand::Leave { conn_id }) => self.leave(conn_id),
                Ok(RoomCommand::Ack { conn_id, frame }) => {
                    if let Some(r) = self.sessions.get_mut(&conn_id).and_then(ClientSession::replication_mut) {
                        if r.on_ack(frame) {
                            debug!("Connection {} desynced at frame {}, resending INIT", conn_id, frame);
                        }
                    }
                }
                Ok(RoomCommand::Shutdown) => return false,
                Err(mpsc::error::TryRecvError::Empty) => return true,
                // Every handle dropped: nobody can reach this room again
                Err(mpsc::error::TryRecvError::Disconnected) => return !self.sessions.is_empty(),
            }
        }
    }

    /// Spawn a player for `conn`, creating its session on first join
    pub fn join(&mut self, conn: ConnectionHandle, name: String) -> Result<EntityId, RejectReason> {
        let conn_id = conn.id;
        if let Some(existing) = self.sessions.get(&conn_id) {
            if existing.player_id().is_some() {
                existing.handle().try_send(encode_hello_ack(Err(RejectReason::AlreadyJoined)));
                return Err(RejectReason::AlreadyJoined);
            }
        }

        let player_id = match self.world.add_player(name.clone()) {
            Ok(id) => id,
            Err(e) => {
                let reason = RejectReason::from(e);
                debug!("Join '{}' rejected in room {}: {}", name, self.id, e);
                conn.try_send(encode_hello_ack(Err(reason)));
                return Err(reason);
            }
        };

        let session = self
            .sessions
            .entry(conn_id)
            .or_insert_with(|| ClientSession::new(conn, name.clone()));
        session.name = name;
        session.attach(player_id);
        session.send(encode_hello_ack(Ok(())));
        self.owners.insert(player_id, conn_id);
        self.occupancy.store(self.sessions.len(), Ordering::Relaxed);

        info!("Player {} joined room {} ({} connected)", player_id, self.id, self.sessions.len());
        Ok(player_id)
    }

    /// Connection gone: remove its player immediately
    pub fn leave(&mut self, conn_id: Uuid) {
        let Some(mut session) = self.sessions.remove(&conn_id) else {
            return;
        };
        if let Some(player_id) = session.detach() {
            self.owners.remove(&player_id);
            self.world.remove_player(player_id);
        }
        self.occupancy.store(self.sessions.len(), Ordering::Relaxed);
        debug!("Connection {} left room {}", conn_id, self.id);
    }

    // ------------------------------------------------------------------
    // Tick helpers
    // ------------------------------------------------------------------

    fn handle_deaths(&mut self, events: &[WorldEvent]) {
        for event in events {
            match *event {
                WorldEvent::Kill {
                    victim,
                    killer,
                    kill_type,
                    ..
                } => {
                    self.metrics.kills.fetch_add(1, Ordering::Relaxed);
                    let Some(conn_id) = self.owners.remove(&victim) else {
                        continue;
                    };
                    if let Some(session) = self.sessions.get_mut(&conn_id) {
                        session.detach();
                        session.send(encode_dead(killer, kill_type));
                    }
                }
                WorldEvent::Capture { .. } => {
                    self.metrics.captures.fetch_add(1, Ordering::Relaxed);
                }
                _ => {}
            }
        }
    }

    /// Encode and queue one packet per attached client
    pub fn flush(&mut self) {
        let world = &self.world;
        let events = &self.pending_events;
        let aoi = &self.aoi;

        #[cfg(feature = "parallel_encode")]
        let packets: Vec<(Uuid, Vec<u8>)> = self
            .sessions
            .par_iter_mut()
            .filter_map(|(id, s)| {
                let packet = s.replication_mut()?.build_packet(world, events, aoi)?;
                Some((*id, packet))
            })
            .collect();

        #[cfg(not(feature = "parallel_encode"))]
        let packets: Vec<(Uuid, Vec<u8>)> = self
            .sessions
            .iter_mut()
            .filter_map(|(id, s)| {
                let packet = s.replication_mut()?.build_packet(world, events, aoi)?;
                Some((*id, packet))
            })
            .collect();

        for (conn_id, packet) in packets {
            let Some(session) = self.sessions.get_mut(&conn_id) else {
                continue;
            };
            match session.send(packet) {
                SendOutcome::Queued => {}
                SendOutcome::Dropped => {
                    self.metrics.frames_dropped.fetch_add(1, Ordering::Relaxed);
                    // The client misses this diff, so its next packet must be a full INIT
                    if let Some(r) = session.replication_mut() {
                        r.request_resync();
                    }
                }
                SendOutcome::Closed => debug!("Connection {} writer closed", conn_id),
            }
        }

        self.world.clear_dirty();
        self.pending_events.clear();
    }

    /// Disconnect sessions with no inbound traffic for the stale timeout
    fn sweep_stale(&mut self) {
        let stale: Vec<Uuid> = self
            .sessions
            .values()
            .filter(|s| s.is_stale(self.stale_timeout))
            .map(ClientSession::id)
            .collect();
        for conn_id in stale {
            if let Some(session) = self.sessions.get(&conn_id) {
                warn!("Connection {} idle for {:?}, disconnecting", conn_id, session.idle_time());
                session.handle().close();
            }
            self.leave(conn_id);
        }
    }

    fn report_gauges(&mut self) {
        let players = self.world.player_count() as u64;
        let coins = self.world.coin_count() as u64;
        Metrics::adjust(&self.metrics.players, self.reported_players, players);
        Metrics::adjust(&self.metrics.coins, self.reported_coins, coins);
        self.reported_players = players;
        self.reported_coins = coins;
    }

    #[cfg(feature = "metrics_extended")]
    fn log_stats(&self) {
        let (visible, total) = self
            .sessions
            .values()
            .filter_map(|s| s.replication())
            .map(|r| r.stats())
            .fold((0, 0), |(v, t), s| (v + s.visible_players, t + s.total_players));
        info!(
            "Room {}: {}s, tick {}, {} players, {} coins, {} connections, AOI {}/{} | tick p95 {}us",
            self.id,
            self.started_at.elapsed().as_secs(),
            self.world.frame(),
            self.world.player_count(),
            self.world.coin_count(),
            self.sessions.len(),
            visible,
            total,
            self.metrics.tick_time_p95_us.load(Ordering::Relaxed)
        );
    }

    fn close(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        for session in self.sessions.values() {
            session.handle().close();
        }
        let ids: Vec<Uuid> = self.sessions.keys().copied().collect();
        for id in ids {
            self.leave(id);
        }
        Metrics::adjust(&self.metrics.players, self.reported_players, 0);
        Metrics::adjust(&self.metrics.coins, self.reported_coins, 0);
        self.reported_players = 0;
        self.reported_coins = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::KillType;
    use crate::net::protocol::tags;
    use crate::util::vec2::Vec2;

    fn test_room(max_players: usize) -> (GameRoom, RoomHandle) {
        let game = GameConfig {
            max_coins: 0,
            ..GameConfig::default()
        }
        .with_max_players(max_players);
        let config = RoomConfig {
            game: game.clone(),
            stale_timeout: Duration::from_secs(15),
        };
        let world = World::with_seed(game, Arc::new(TuningTables::builtin()), 11);
        GameRoom::with_world(world, config, Arc::new(Metrics::new()))
    }

    fn connection() -> (ConnectionHandle, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(64);
        (ConnectionHandle::new(Uuid::new_v4(), tx), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<Vec<u8>>) -> Vec<Vec<u8>> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    #[test]
    fn test_join_sends_ack_then_init() {
        let (mut room, handle) = test_room(4);
        let (conn, mut rx) = connection();
        let id = room.join(conn.clone(), "alice".into()).unwrap();
        assert_eq!(handle.occupancy(), 1);
        assert_eq!(room.world().player_count(), 1);

        for _ in 0..TICKS_PER_BROADCAST {
            room.step();
        }
        let packets = drain(&mut rx);
        assert_eq!(packets[0], vec![tags::HELLO_ACK, 1]);
        assert_eq!(packets[1][0], tags::INIT);
        assert_eq!(&packets[1][1..5], &id.to_le_bytes());

        // Later flushes are FRAMEs
        for _ in 0..TICKS_PER_BROADCAST {
            room.step();
        }
        assert_eq!(drain(&mut rx)[0][0], tags::FRAME);
    }

    #[test]
    fn test_double_join_rejected() {
        let (mut room, _handle) = test_room(4);
        let (conn, mut rx) = connection();
        room.join(conn.clone(), "a".into()).unwrap();
        assert_eq!(room.join(conn, "a".into()), Err(RejectReason::AlreadyJoined));
        let packets = drain(&mut rx);
        assert_eq!(packets.last(), Some(&vec![tags::HELLO_ACK, 0, RejectReason::AlreadyJoined as u8]));
    }

    #[test]
    fn test_room_full_rejected() {
        let (mut room, handle) = test_room(1);
        let (a, _rx_a) = connection();
        let (b, mut rx_b) = connection();
        room.join(a, "a".into()).unwrap();
        assert!(!handle.has_capacity());
        assert_eq!(room.join(b, "b".into()), Err(RejectReason::RoomFull));
        assert_eq!(drain(&mut rx_b), vec![vec![tags::HELLO_ACK, 0, 1]]);
        assert_eq!(room.session_count(), 1);
    }

    #[test]
    fn test_leave_removes_player() {
        let (mut room, handle) = test_room(4);
        let (conn, _rx) = connection();
        let id = room.join(conn.clone(), "a".into()).unwrap();
        room.leave(conn.id);
        assert!(room.world().player(id).is_none());
        assert_eq!(handle.occupancy(), 0);
        room.leave(conn.id);
    }

    #[test]
    fn test_death_sends_dead_and_allows_respawn() {
        let (mut room, _handle) = test_room(4);
        let (conn, mut rx) = connection();
        let id = room.join(conn.clone(), "a".into()).unwrap();
        {
            let p = room.world.player_mut(id).unwrap();
            p.stamina = 0.0;
            p.hp = 0.01;
            p.position = Vec2::new(2500.0, 2500.0);
            p.in_territory = false;
        }
        room.step();
        let packets = drain(&mut rx);
        let dead = packets.iter().find(|p| p[0] == tags::DEAD).expect("no DEAD packet");
        assert_eq!(dead[5], KillType::Exhaustion.as_u8());
        assert_eq!(room.session(conn.id).and_then(ClientSession::player_id), None);

        let respawned = room.join(conn.clone(), "a".into()).unwrap();
        assert_ne!(respawned, id);
        assert_eq!(room.session_count(), 1);
    }

    #[test]
    fn test_full_queue_forces_resync() {
        let (mut room, _handle) = test_room(4);
        let (tx, mut rx) = mpsc::channel(1);
        let conn = ConnectionHandle::new(Uuid::new_v4(), tx);
        room.join(conn.clone(), "a".into()).unwrap();
        // HELLO_ACK fills the queue, so the INIT flush is dropped
        room.flush();
        let r = room.session(conn.id).and_then(ClientSession::replication).unwrap();
        assert!(r.needs_resync());
        assert_eq!(drain(&mut rx).len(), 1);
        room.flush();
        assert_eq!(drain(&mut rx)[0][0], tags::INIT);
    }

    #[test]
    fn test_stale_session_disconnected() {
        let (mut room, _handle) = test_room(4);
        room.stale_timeout = Duration::ZERO;
        let (conn, _rx) = connection();
        let id = room.join(conn.clone(), "a".into()).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        room.sweep_stale();
        assert_eq!(room.session_count(), 0);
        assert!(room.world().player(id).is_none());
    }

    #[tokio::test]
    async fn test_actor_join_and_shutdown() {
        let game = GameConfig::default();
        let config = RoomConfig {
            game,
            stale_timeout: Duration::from_secs(15),
        };
        let (handle, task) = GameRoom::spawn(config, Arc::new(TuningTables::builtin()), Arc::new(Metrics::new()));
        let (conn, _rx) = connection();
        let id = handle.join(conn, "alice".into()).await.unwrap();
        assert!(id > 0);
        assert_eq!(handle.occupancy(), 1);

        handle.shutdown().await;
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert!(!handle.is_running());
        let (late, _rx) = connection();
        assert_eq!(handle.join(late, "bob".into()).await, Err(RoomError::Closed));
    }
}
