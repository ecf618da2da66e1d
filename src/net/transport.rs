//! WebTransport server
//!
//! One task per connection. The client opens a single bidirectional
//! stream carrying length-framed packets both ways; INPUT may also arrive
//! as datagrams. Outbound packets go through a bounded queue drained by a
//! dedicated writer task, so a slow client never blocks its room.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;
use wtransport::endpoint::IncomingSession;
use wtransport::{Connection, Endpoint, RecvStream, SendStream};

use crate::config::ServerConfig;
use crate::game::constants::net::OUTBOUND_QUEUE;
use crate::game::input_buffer::InputSender;
use crate::game::state::EntityId;
use crate::lobby::manager::LobbyManager;
use crate::lobby::room::{RoomError, RoomHandle};
use crate::metrics::Metrics;
use crate::net::framing::{read_message_into, validate_datagram_size, write_message, FramingError};
use crate::net::protocol::{encode_hello_ack, encode_pong, sanitize_name, ClientPacket, RejectReason};
use crate::net::session::{Activity, ConnectionHandle};
use crate::net::tls::TlsConfig;

/// WebTransport server
pub struct WebTransportServer {
    config: ServerConfig,
    tls_config: TlsConfig,
    lobby_manager: Arc<RwLock<LobbyManager>>,
    metrics: Arc<Metrics>,
}

impl WebTransportServer {
    pub async fn new(
        config: ServerConfig,
        lobby_manager: Arc<RwLock<LobbyManager>>,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        let tls_config = TlsConfig::load(&config).await?;
        Ok(Self {
            config,
            tls_config,
            lobby_manager,
            metrics,
        })
    }

    /// Certificate hash for browser `serverCertificateHashes`
    pub fn cert_hash(&self) -> &str {
        self.tls_config.cert_hash()
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.config.bind_address, self.config.port)
    }

    /// Accept connections until the task is dropped
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.bind_addr();
        info!("Certificate hash: {}", self.tls_config.cert_hash);
        let server_config = wtransport::ServerConfig::builder()
            .with_bind_address(addr)
            .with_identity(self.tls_config.identity)
            .build();

        let server = Endpoint::server(server_config)?;

        info!("WebTransport server listening on {}", addr);

        loop {
            let incoming = server.accept().await;
            let lobby = self.lobby_manager.clone();
            let metrics = self.metrics.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(incoming, lobby, metrics).await {
                    warn!("Connection error: {}", e);
                }
            });
        }
    }
}

/// Current player and its room's input queue, shared with the datagram task
#[derive(Clone)]
struct Steering {
    player_id: EntityId,
    inputs: InputSender,
}

impl Steering {
    fn steer(&self, angle: f32) {
        // Full queue: this input is superseded by the next one anyway
        let _ = self.inputs.try_send(self.player_id, angle);
    }
}

/// Per-connection state owned by the reader task
struct ConnectionState {
    handle: ConnectionHandle,
    room: Option<RoomHandle>,
    steering: watch::Sender<Option<Steering>>,
}

impl ConnectionState {
    fn steer(&self, angle: f32) {
        if let Some(steering) = self.steering.borrow().as_ref() {
            steering.steer(angle);
        }
    }
}

async fn handle_connection(
    incoming: IncomingSession,
    lobby: Arc<RwLock<LobbyManager>>,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    let request = incoming.await?;
    debug!("New session from {:?}, path: {}", request.authority(), request.path());

    let connection = Arc::new(request.accept().await?);
    let (send, mut recv) = connection.accept_bi().await?;

    let conn_id = Uuid::new_v4();
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
    let handle = ConnectionHandle::new(conn_id, outbound_tx);
    metrics.connection_opened();
    debug!("Connection {} accepted", conn_id);

    let writer = tokio::spawn(write_loop(send, outbound_rx, metrics.clone()));
    let (steering_tx, steering_rx) = watch::channel(None);
    let datagrams = tokio::spawn(datagram_loop(
        connection.clone(),
        handle.activity.clone(),
        steering_rx,
        metrics.clone(),
    ));

    let mut state = ConnectionState {
        handle,
        room: None,
        steering: steering_tx,
    };
    let result = read_loop(&mut recv, &mut state, &lobby, &metrics).await;

    if let Some(room) = state.room.take() {
        room.leave(conn_id).await;
    }
    writer.abort();
    datagrams.abort();
    metrics.connection_closed();
    debug!("Connection {} closed", conn_id);
    result
}

async fn read_loop(
    recv: &mut RecvStream,
    state: &mut ConnectionState,
    lobby: &RwLock<LobbyManager>,
    metrics: &Metrics,
) -> anyhow::Result<()> {
    let mut buffer = Vec::with_capacity(256);
    loop {
        let len = tokio::select! {
            read = read_message_into(recv, &mut buffer) => match read {
                Ok(len) => len,
                Err(FramingError::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(e.into()),
            },
            _ = state.handle.closed() => {
                debug!("Connection {} closed by server", state.handle.id);
                return Ok(());
            }
        };

        state.handle.activity.touch();
        metrics.record_received(len);

        let packet = match ClientPacket::decode(&buffer[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Dropping packet from {}: {}", state.handle.id, e);
                continue;
            }
        };

        match packet {
            ClientPacket::Hello { name } => handle_hello(state, &name, lobby).await,
            ClientPacket::Input { angle } => state.steer(angle),
            ClientPacket::Ping { timestamp } => {
                state.handle.try_send(encode_pong(timestamp));
            }
            ClientPacket::Ack { frame } => {
                if let Some(room) = &state.room {
                    room.ack(state.handle.id, frame);
                }
            }
        }
    }
}

/// Join (or respawn in) a room. On success the room answers HELLO_ACK.
async fn handle_hello(state: &mut ConnectionState, raw_name: &str, lobby: &RwLock<LobbyManager>) {
    let name = match sanitize_name(raw_name) {
        Ok(name) => name,
        Err(e) => {
            debug!("Rejecting name from {}: {}", state.handle.id, e);
            state.handle.try_send(encode_hello_ack(Err(RejectReason::InvalidName)));
            return;
        }
    };

    // Respawns go back to the same room
    let room = match &state.room {
        Some(room) if room.is_running() => room.clone(),
        _ => match lobby.write().await.find_or_create_room() {
            Ok(room) => room,
            Err(e) => {
                warn!("No room for {}: {}", state.handle.id, e);
                state.handle.try_send(encode_hello_ack(Err(RejectReason::RoomFull)));
                return;
            }
        },
    };

    match room.join(state.handle.clone(), name).await {
        Ok(player_id) => {
            state.steering.send_replace(Some(Steering {
                player_id,
                inputs: room.inputs().clone(),
            }));
            state.room = Some(room);
        }
        Err(RoomError::Rejected(reason)) => {
            debug!("Join from {} rejected: {:?}", state.handle.id, reason);
        }
        Err(RoomError::Closed) => {
            state.room = None;
            state.handle.try_send(encode_hello_ack(Err(RejectReason::RoomFull)));
        }
    }
}

async fn write_loop(mut send: SendStream, mut outbound: mpsc::Receiver<Vec<u8>>, metrics: Arc<Metrics>) {
    while let Some(packet) = outbound.recv().await {
        if let Err(e) = write_message(&mut send, &packet).await {
            debug!("Stream write error: {}", e);
            break;
        }
        metrics.record_sent(packet.len());
    }
}

/// Unreliable INPUT path; everything else on a datagram is ignored
async fn datagram_loop(
    connection: Arc<Connection>,
    activity: Activity,
    steering: watch::Receiver<Option<Steering>>,
    metrics: Arc<Metrics>,
) {
    loop {
        let datagram = match connection.receive_datagram().await {
            Ok(datagram) => datagram,
            Err(e) => {
                debug!("Datagram receive error: {}", e);
                break;
            }
        };
        let payload: &[u8] = &datagram;
        if validate_datagram_size(payload).is_err() {
            continue;
        }

        activity.touch();
        metrics.record_received(payload.len());

        match ClientPacket::decode(payload) {
            Ok(ClientPacket::Input { angle }) => {
                if let Some(s) = steering.borrow().as_ref() {
                    s.steer(angle);
                }
            }
            Ok(_) => {}
            Err(e) => debug!("Failed to decode datagram: {}", e),
        }
    }
}
