pub mod aoi;
pub mod codec;
pub mod framing;
pub mod protocol;
pub mod replication;
pub mod session;
pub mod tls;
pub mod transport;
