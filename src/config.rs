use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use crate::game::constants::{aoi, coin, net, world};

/// Read `key` and parse it, keeping `current` when unset, unparsable or
/// rejected by `valid`
fn env_or<T, F>(key: &str, current: T, valid: F, rule: &str) -> T
where
    T: FromStr,
    F: Fn(&T) -> bool,
{
    let Ok(raw) = std::env::var(key) else {
        return current;
    };
    match raw.parse::<T>() {
        Ok(parsed) if valid(&parsed) => parsed,
        Ok(_) => {
            tracing::warn!("{} must be {}, using default", key, rule);
            current
        }
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", key, raw);
            current
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Maximum number of concurrent game rooms
    pub max_rooms: usize,
    /// Maximum players per room
    pub max_players_per_room: usize,
    /// Seconds without inbound traffic before a client is dropped
    pub stale_timeout_secs: u64,
    /// Port for the metrics HTTP endpoint (0 disables it)
    pub metrics_port: u16,
    /// Path to TLS certificate file (if not using self-signed)
    pub tls_cert_path: Option<String>,
    /// Path to TLS key file (if not using self-signed)
    pub tls_key_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 4433,
            max_rooms: 100,
            max_players_per_room: world::MAX_PLAYERS,
            stale_timeout_secs: net::STALE_TIMEOUT_SECS,
            metrics_port: 9090,
            tls_cert_path: None,
            tls_key_path: None,
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            } else {
                tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr);
            }
        }

        config.port = env_or("PORT", config.port, |p| *p > 0, "> 0");
        config.max_rooms = env_or("MAX_ROOMS", config.max_rooms, |n| (1..=10_000).contains(n), "1-10000");
        config.max_players_per_room = env_or(
            "MAX_PLAYERS_PER_ROOM",
            config.max_players_per_room,
            |n| (1..=500).contains(n),
            "1-500",
        );
        config.stale_timeout_secs = env_or(
            "STALE_TIMEOUT_SECS",
            config.stale_timeout_secs,
            |s| (1..=3600).contains(s),
            "1-3600",
        );
        config.metrics_port = env_or("METRICS_PORT", config.metrics_port, |_| true, "a port");

        if let Ok(cert_path) = std::env::var("TLS_CERT_PATH") {
            config.tls_cert_path = Some(cert_path);
        }

        if let Ok(key_path) = std::env::var("TLS_KEY_PATH") {
            config.tls_key_path = Some(key_path);
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.max_rooms == 0 {
            return Err("max_rooms must be at least 1".to_string());
        }
        if self.max_players_per_room == 0 {
            return Err("max_players_per_room must be at least 1".to_string());
        }
        if self.metrics_port != 0 && self.metrics_port == self.port {
            return Err("metrics_port cannot equal port".to_string());
        }
        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            return Err("TLS_CERT_PATH and TLS_KEY_PATH must be set together".to_string());
        }
        Ok(())
    }
}

/// Per-room simulation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    /// Side of the square map
    pub map_size: f32,
    pub max_players: usize,
    pub aoi_radius: f32,
    pub aoi_hysteresis: f32,
    /// Ambient coin population cap
    pub max_coins: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            map_size: world::MAP_SIZE,
            max_players: world::MAX_PLAYERS,
            aoi_radius: aoi::RADIUS,
            aoi_hysteresis: aoi::HYSTERESIS,
            max_coins: coin::MAX_COINS,
        }
    }
}

impl GameConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.map_size = env_or("MAP_SIZE", config.map_size, |s| (500.0..=20_000.0).contains(s), "500-20000");
        config.aoi_radius = env_or("AOI_RADIUS", config.aoi_radius, |r| *r > 0.0, "> 0");
        config.aoi_hysteresis = env_or("AOI_HYSTERESIS", config.aoi_hysteresis, |h| *h >= 0.0, ">= 0");
        config.max_coins = env_or("MAX_COINS", config.max_coins, |n| *n <= coin::HARD_CAP, "<= 600");
        config
    }

    pub fn with_max_players(mut self, max_players: usize) -> Self {
        self.max_players = max_players;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.map_size.is_finite() && self.map_size > 2.0 * world::SPAWN_MARGIN) {
            return Err("map_size too small for spawning".to_string());
        }
        if self.max_players == 0 {
            return Err("max_players must be at least 1".to_string());
        }
        if self.aoi_radius <= 0.0 || self.aoi_hysteresis < 0.0 {
            return Err("AOI radius must be positive and hysteresis non-negative".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 4433);
        assert_eq!(config.max_rooms, 100);
        assert_eq!(config.max_players_per_room, world::MAX_PLAYERS);
        assert_eq!(config.stale_timeout_secs, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default() {
        let config = ServerConfig::load_or_default();
        assert!(config.port > 0);
    }

    #[test]
    fn test_validate_rejects_half_tls() {
        let config = ServerConfig {
            tls_cert_path: Some("cert.pem".into()),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_or_rejects_out_of_range() {
        std::env::set_var("TERRITORY_TEST_ENV_OR", "0");
        assert_eq!(env_or("TERRITORY_TEST_ENV_OR", 5usize, |n| *n > 0, "> 0"), 5);
        std::env::set_var("TERRITORY_TEST_ENV_OR", "abc");
        assert_eq!(env_or("TERRITORY_TEST_ENV_OR", 5usize, |n| *n > 0, "> 0"), 5);
        std::env::set_var("TERRITORY_TEST_ENV_OR", "9");
        assert_eq!(env_or("TERRITORY_TEST_ENV_OR", 5usize, |n| *n > 0, "> 0"), 9);
        std::env::remove_var("TERRITORY_TEST_ENV_OR");
    }

    #[test]
    fn test_game_config_defaults_valid() {
        let config = GameConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.with_max_players(3).max_players, 3);
    }
}
