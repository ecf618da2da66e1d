use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use ring::digest::{digest, SHA256};
use std::path::Path;
use tracing::{info, warn};
use wtransport::tls::{Certificate, CertificateChain, PrivateKey};
use wtransport::Identity;

use crate::config::ServerConfig;

// Dev certificate paths
const DEV_CERT_FILE: &str = "certs/cert.pem";
const DEV_KEY_FILE: &str = "certs/key.pem";

/// Names the generated certificate is valid for
const SELF_SIGNED_NAMES: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

/// TLS identity for the WebTransport endpoint
pub struct TlsConfig {
    pub identity: Identity,
    /// Base64 SHA-256 of the leaf certificate (browser pinning)
    pub cert_hash: String,
}

impl TlsConfig {
    /// PEM files from the config, then `certs/`, otherwise an in-memory
    /// self-signed certificate
    pub async fn load(config: &ServerConfig) -> Result<Self> {
        if let (Some(cert_path), Some(key_path)) = (&config.tls_cert_path, &config.tls_key_path) {
            info!("Loading TLS certificate from {}", cert_path);
            return Self::load_from_paths(cert_path, key_path).await;
        }

        if Path::new(DEV_CERT_FILE).exists() && Path::new(DEV_KEY_FILE).exists() {
            info!("Loading dev certificate from certs/");
            return Self::load_from_paths(DEV_CERT_FILE, DEV_KEY_FILE).await;
        }

        warn!("No TLS certificate configured, generating a self-signed one");
        Self::generate_self_signed()
    }

    async fn load_from_paths(cert_path: &str, key_path: &str) -> Result<Self> {
        let identity = Identity::load_pemfiles(cert_path, key_path)
            .await
            .context("Failed to load certificate from PEM files")?;
        Ok(Self::from_identity(identity))
    }

    /// Fresh self-signed certificate, never written to disk
    pub fn generate_self_signed() -> Result<Self> {
        let names: Vec<String> = SELF_SIGNED_NAMES.iter().map(|s| s.to_string()).collect();
        let generated = rcgen::generate_simple_self_signed(names).context("Failed to generate certificate")?;

        let cert = Certificate::from_der(generated.cert.der().to_vec()).context("Generated certificate is invalid")?;
        let key = PrivateKey::from_der_pkcs8(generated.signing_key.serialize_der());
        let identity = Identity::new(CertificateChain::single(cert), key);
        Ok(Self::from_identity(identity))
    }

    fn from_identity(identity: Identity) -> Self {
        let cert_hash = compute_cert_hash(&identity);
        info!("Certificate hash: {}", cert_hash);
        Self { identity, cert_hash }
    }

    pub fn cert_hash(&self) -> &str {
        &self.cert_hash
    }
}

fn compute_cert_hash(identity: &Identity) -> String {
    identity
        .certificate_chain()
        .as_slice()
        .first()
        .map(|cert| STANDARD.encode(digest(&SHA256, cert.der()).as_ref()))
        .unwrap_or_default()
}
