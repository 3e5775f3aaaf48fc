//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so a single node can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::time::Duration;

use pop_shared::constants::{
    DEFAULT_CLIENT_PORT, DEFAULT_MAX_RUMOR_MESSAGES, DEFAULT_SERVER_PORT,
    DEFAULT_WORKER_POOL_SIZE, HEARTBEAT_INTERVAL_SECS, MONGER_STOP_PROBABILITY,
    RUMOR_INTERVAL_SECS, RUMOR_STATE_INTERVAL_SECS,
};
use tracing::warn;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Listen address for client connections.
    /// Env: `CLIENT_ADDR`
    /// Default: `0.0.0.0:9000`
    pub client_addr: SocketAddr,

    /// Listen address for server-to-server connections.
    /// Env: `SERVER_ADDR`
    /// Default: `0.0.0.0:9001`
    pub server_addr: SocketAddr,

    /// Client URL advertised to peers in `greet_server`.
    /// Env: `PUBLIC_CLIENT_URL`
    pub public_client_url: String,

    /// Server URL advertised to peers in `greet_server`.
    /// Env: `PUBLIC_SERVER_URL`
    pub public_server_url: String,

    /// Ed25519 secret key (hex-encoded, 64 chars).
    /// Env: `SERVER_SECRET_KEY`
    /// Default: none, a fresh identity is generated at startup.
    pub server_secret_key: Option<[u8; 32]>,

    /// Only this key (base64url) may create LAOs on the root channel.
    /// Env: `OWNER_PUBLIC_KEY`
    /// Default: none, anyone may.
    pub owner_public_key: Option<String>,

    /// Peer server URLs to dial at startup.
    /// Env: `PEERS` (comma-separated)
    pub peers: Vec<String>,

    /// Concurrent message handlers.
    /// Env: `WORKER_POOL_SIZE`
    pub worker_pool_size: usize,

    /// Env: `HEARTBEAT_INTERVAL_SECS`
    pub heartbeat_interval: Duration,

    /// Env: `RUMOR_INTERVAL_SECS`
    pub rumor_interval: Duration,

    /// Env: `RUMOR_STATE_INTERVAL_SECS`
    pub rumor_state_interval: Duration,

    /// Buffered local messages that flush the current rumor immediately.
    /// Env: `MAX_RUMOR_MESSAGES`
    pub max_rumor_messages: usize,

    /// Chance to stop propagating a rumor after a duplicate answer.
    pub monger_stop_probability: f64,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("client_addr", &self.client_addr)
            .field("server_addr", &self.server_addr)
            .field("public_client_url", &self.public_client_url)
            .field("public_server_url", &self.public_server_url)
            .field("server_secret_key", &self.server_secret_key.map(|_| "<redacted>"))
            .field("owner_public_key", &self.owner_public_key)
            .field("peers", &self.peers)
            .field("worker_pool_size", &self.worker_pool_size)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("rumor_interval", &self.rumor_interval)
            .field("rumor_state_interval", &self.rumor_state_interval)
            .field("max_rumor_messages", &self.max_rumor_messages)
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            client_addr: ([0, 0, 0, 0], DEFAULT_CLIENT_PORT).into(),
            server_addr: ([0, 0, 0, 0], DEFAULT_SERVER_PORT).into(),
            public_client_url: format!("ws://localhost:{DEFAULT_CLIENT_PORT}/client"),
            public_server_url: format!("ws://localhost:{DEFAULT_SERVER_PORT}/server"),
            server_secret_key: None,
            owner_public_key: None,
            peers: Vec::new(),
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            rumor_interval: Duration::from_secs(RUMOR_INTERVAL_SECS),
            rumor_state_interval: Duration::from_secs(RUMOR_STATE_INTERVAL_SECS),
            max_rumor_messages: DEFAULT_MAX_RUMOR_MESSAGES,
            monger_stop_probability: MONGER_STOP_PROBABILITY,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("CLIENT_ADDR") {
            parse_into(&mut config.client_addr, "CLIENT_ADDR", &addr);
        }
        if let Some(addr) = lookup("SERVER_ADDR") {
            parse_into(&mut config.server_addr, "SERVER_ADDR", &addr);
        }

        if let Some(url) = lookup("PUBLIC_CLIENT_URL") {
            config.public_client_url = url;
        }
        if let Some(url) = lookup("PUBLIC_SERVER_URL") {
            config.public_server_url = url;
        }

        if let Some(hex_key) = lookup("SERVER_SECRET_KEY") {
            match parse_hex_key(&hex_key) {
                Ok(key) => config.server_secret_key = Some(key),
                Err(e) => {
                    warn!(error = %e, "Invalid SERVER_SECRET_KEY, generating a fresh identity");
                }
            }
        }

        if let Some(key) = lookup("OWNER_PUBLIC_KEY") {
            if !key.is_empty() {
                config.owner_public_key = Some(key);
            }
        }

        if let Some(peers) = lookup("PEERS") {
            config.peers = peers
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(val) = lookup("WORKER_POOL_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.worker_pool_size = n,
                _ => warn!(value = %val, "Invalid WORKER_POOL_SIZE, using default"),
            }
        }

        if let Some(val) = lookup("HEARTBEAT_INTERVAL_SECS") {
            parse_secs(&mut config.heartbeat_interval, "HEARTBEAT_INTERVAL_SECS", &val);
        }
        if let Some(val) = lookup("RUMOR_INTERVAL_SECS") {
            parse_secs(&mut config.rumor_interval, "RUMOR_INTERVAL_SECS", &val);
        }
        if let Some(val) = lookup("RUMOR_STATE_INTERVAL_SECS") {
            parse_secs(&mut config.rumor_state_interval, "RUMOR_STATE_INTERVAL_SECS", &val);
        }

        if let Some(val) = lookup("MAX_RUMOR_MESSAGES") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_rumor_messages = n,
                _ => warn!(value = %val, "Invalid MAX_RUMOR_MESSAGES, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

fn parse_into<T: std::str::FromStr>(target: &mut T, name: &str, value: &str) {
    match value.parse::<T>() {
        Ok(parsed) => *target = parsed,
        Err(_) => warn!(value = %value, "Invalid {name}, using default"),
    }
}

fn parse_secs(target: &mut Duration, name: &str, value: &str) {
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => *target = Duration::from_secs(secs),
        _ => warn!(value = %value, "Invalid {name}, using default"),
    }
}

/// Parse a 64-character hex string into a 32-byte array.
fn parse_hex_key(value: &str) -> Result<[u8; 32], String> {
    let bytes = hex::decode(value.trim()).map_err(|e| e.to_string())?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| format!("expected 32 bytes, got {}", bytes.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.client_addr, ([0, 0, 0, 0], 9000).into());
        assert_eq!(config.worker_pool_size, 10);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.rumor_interval, Duration::from_secs(5));
        assert_eq!(config.monger_stop_probability, 0.5);
        assert!(config.server_secret_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("SERVER_ADDR", "127.0.0.1:7001"),
            ("PEERS", "ws://a:9001/server, ws://b:9001/server,,"),
            ("WORKER_POOL_SIZE", "4"),
            ("RUMOR_INTERVAL_SECS", "1"),
            ("SERVER_SECRET_KEY", &"ab".repeat(32)),
        ]);
        assert_eq!(config.server_addr, ([127, 0, 0, 1], 7001).into());
        assert_eq!(config.peers, vec!["ws://a:9001/server", "ws://b:9001/server"]);
        assert_eq!(config.worker_pool_size, 4);
        assert_eq!(config.rumor_interval, Duration::from_secs(1));
        assert_eq!(config.server_secret_key, Some([0xab; 32]));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = config_from(&[
            ("CLIENT_ADDR", "nowhere"),
            ("WORKER_POOL_SIZE", "0"),
            ("HEARTBEAT_INTERVAL_SECS", "soon"),
            ("SERVER_SECRET_KEY", "abcd"),
        ]);
        assert_eq!(config.client_addr, ([0, 0, 0, 0], 9000).into());
        assert_eq!(config.worker_pool_size, 10);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert!(config.server_secret_key.is_none());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = config_from(&[("SERVER_SECRET_KEY", &"ab".repeat(32))]);
        assert!(!format!("{config:?}").contains("171"));
    }
}
