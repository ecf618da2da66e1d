//! Prometheus-compatible metrics endpoint
//!
//! Rooms and connections update shared atomics; a tiny HTTP listener
//! serves them as Prometheus text on `/metrics` and as JSON on
//! `/metrics/json`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Tick samples kept for percentiles
const TICK_HISTORY: usize = 1000;

/// Metrics registry shared by every room and connection
#[derive(Debug)]
pub struct Metrics {
    // World gauges, summed over rooms
    pub players: AtomicU64,
    pub coins: AtomicU64,
    pub rooms: AtomicU64,

    // Tick timing
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    // Gameplay counters
    pub kills: AtomicU64,
    pub captures: AtomicU64,

    // Network
    pub connections_active: AtomicU64,
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    /// Frames skipped because a client's outbound queue was full
    pub frames_dropped: AtomicU64,

    tick_history: RwLock<VecDeque<u64>>,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            players: AtomicU64::new(0),
            coins: AtomicU64::new(0),
            rooms: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            kills: AtomicU64::new(0),
            captures: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY)),
            start_time: Instant::now(),
        }
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();
            let at = |q: f32| sorted[((sorted.len() as f32 * q) as usize).min(sorted.len() - 1)];
            self.tick_time_p95_us.store(at(0.95), Ordering::Relaxed);
            self.tick_time_p99_us.store(at(0.99), Ordering::Relaxed);
            self.tick_time_max_us.store(sorted[sorted.len() - 1], Ordering::Relaxed);
        }
    }

    /// Move a summed gauge from one room's old value to its new one
    pub fn adjust(gauge: &AtomicU64, previous: u64, current: u64) {
        if current > previous {
            gauge.fetch_add(current - previous, Ordering::Relaxed);
        } else if previous > current {
            let delta = previous - current;
            let _ = gauge.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(delta)));
        }
    }

    pub fn record_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        Self::adjust(&self.connections_active, 1, 0);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Prometheus text exposition
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP territory_arena_{0} {1}\n# TYPE territory_arena_{0} {2}\nterritory_arena_{0} {3}\n",
                    $name, $help, $type, $value
                ));
            };
        }

        metric!("players", "Players alive across all rooms", "gauge", self.players.load(Ordering::Relaxed));
        metric!("coins", "XP coins on the ground", "gauge", self.coins.load(Ordering::Relaxed));
        metric!("rooms", "Running rooms", "gauge", self.rooms.load(Ordering::Relaxed));

        metric!("tick_time_microseconds", "Last tick time", "gauge", self.tick_time_us.load(Ordering::Relaxed));
        metric!("tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("tick_time_max_microseconds", "Maximum recent tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("tick_count", "Ticks processed", "counter", self.tick_count.load(Ordering::Relaxed));

        metric!("kills_total", "Player deaths", "counter", self.kills.load(Ordering::Relaxed));
        metric!("captures_total", "Territory captures", "counter", self.captures.load(Ordering::Relaxed));

        metric!("connections_active", "Open WebTransport connections", "gauge",
            self.connections_active.load(Ordering::Relaxed));
        metric!("messages_sent_total", "Packets sent", "counter", self.messages_sent.load(Ordering::Relaxed));
        metric!("messages_received_total", "Packets received", "counter",
            self.messages_received.load(Ordering::Relaxed));
        metric!("bytes_sent_total", "Bytes sent", "counter", self.bytes_sent.load(Ordering::Relaxed));
        metric!("bytes_received_total", "Bytes received", "counter", self.bytes_received.load(Ordering::Relaxed));
        metric!("frames_dropped_total", "Frames dropped on full client queues", "counter",
            self.frames_dropped.load(Ordering::Relaxed));
        metric!("uptime_seconds", "Server uptime", "counter", self.uptime_seconds());

        output
    }

    pub fn to_json(&self) -> String {
        let load = |v: &AtomicU64| v.load(Ordering::Relaxed);
        serde_json::json!({
            "world": {
                "players": load(&self.players),
                "coins": load(&self.coins),
                "rooms": load(&self.rooms),
                "kills": load(&self.kills),
                "captures": load(&self.captures),
            },
            "performance": {
                "tick_time_us": load(&self.tick_time_us),
                "tick_time_p95_us": load(&self.tick_time_p95_us),
                "tick_time_p99_us": load(&self.tick_time_p99_us),
                "tick_time_max_us": load(&self.tick_time_max_us),
                "tick_count": load(&self.tick_count),
            },
            "network": {
                "connections": load(&self.connections_active),
                "messages_sent": load(&self.messages_sent),
                "messages_received": load(&self.messages_received),
                "bytes_sent": load(&self.bytes_sent),
                "bytes_received": load(&self.bytes_received),
                "frames_dropped": load(&self.frames_dropped),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Route one request line
fn respond(metrics: &Metrics, request: &str) -> String {
    if request.starts_with("GET /metrics/json") {
        http_response("application/json", &metrics.to_json())
    } else if request.starts_with("GET /metrics") {
        http_response("text/plain; version=0.0.4", &metrics.to_prometheus())
    } else if request.starts_with("GET /health") {
        http_response("text/plain", "OK")
    } else {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];
            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = respond(&metrics, &request);
                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => debug!("Failed to read from metrics socket {}: {}", peer, e),
            }
        });
    }
}
