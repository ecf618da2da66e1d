//! Territory Arena Server Library
//!
//! Authoritative server for a real-time territory-capture arena over
//! WebTransport. Each room runs its own fixed-timestep simulation and
//! streams area-of-interest filtered binary deltas to its clients.
//!
//! # Features
//!
//! - `parallel_encode` - Encode per-client frames on the rayon pool (enabled by default)
//! - `metrics_extended` - Periodic per-room stats lines (enabled by default)
//! - `minimal` - Build without optional features for testing/debugging

pub mod config;
pub mod game;
pub mod lobby;
pub mod metrics;
pub mod net;
pub mod util;
