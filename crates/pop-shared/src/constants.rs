/// JSON-RPC version carried by every frame
pub const JSONRPC_VERSION: &str = "2.0";

/// Path of the implicit root channel
pub const ROOT_CHANNEL: &str = "/root";

/// Maximum accepted frame size in bytes (1 MiB)
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Number of concurrent message-handling workers
pub const DEFAULT_WORKER_POOL_SIZE: usize = 10;

/// Heartbeat broadcast period in seconds
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Rumor flush period in seconds
pub const RUMOR_INTERVAL_SECS: u64 = 5;

/// Rumor-state sync period in seconds
pub const RUMOR_STATE_INTERVAL_SECS: u64 = 10;

/// Buffered local messages that force an immediate rumor flush
pub const DEFAULT_MAX_RUMOR_MESSAGES: usize = 1;

/// Probability of giving up on a rumor after a duplicate answer
pub const MONGER_STOP_PROBABILITY: f64 = 0.5;

/// Default client WebSocket port
pub const DEFAULT_CLIENT_PORT: u16 = 9000;

/// Default server-to-server WebSocket port
pub const DEFAULT_SERVER_PORT: u16 = 9001;

/// Outbound queue depth per socket
pub const SOCKET_QUEUE_SIZE: usize = 1024;

/// How long a sent query is remembered, answered or not
pub const QUERY_TTL_SECS: u64 = 120;

/// Messages kept waiting for their channel before the oldest is dropped
pub const MAX_DEFERRED_MESSAGES: usize = 1024;
