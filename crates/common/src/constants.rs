/// Keepalive ping interval on the relay side (30 seconds)
pub const PING_INTERVAL_SECS: u64 = 30;

/// Round-trip budget for a tunneled request (30 seconds)
pub const REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Fixed delay before the forwarder reconnects (5 seconds)
pub const RECONNECT_DELAY_MS: u64 = 5_000;

/// Budget for a single upstream exchange on the forwarder side (25 seconds)
///
/// Must stay below [`REQUEST_TIMEOUT_MS`] for a 504 to reach the caller.
pub const UPSTREAM_TIMEOUT_MS: u64 = 25_000;

/// Width of the correlation identifier on the wire (hyphenated UUID)
pub const CORRELATION_ID_LEN: usize = 36;

/// Maximum bytes buffered while waiting for the end of the HTTP header block (64 KiB)
pub const MAX_HEADER_BLOCK_BYTES: usize = 64 * 1024;

/// End of an HTTP header block
pub const HEADER_BLOCK_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Capacity of the outgoing WebSocket message queue
pub const OUTGOING_QUEUE_CAPACITY: usize = 100;

/// Default WebSocket listen host
pub const DEFAULT_WS_HOST: &str = "localhost";

/// Default WebSocket listen port
pub const DEFAULT_WS_PORT: u16 = 8083;

/// Default ingress listen address
pub const DEFAULT_SRC_ADDR: &str = "localhost";

/// Default ingress listen port
pub const DEFAULT_SRC_PORT: u16 = 8080;

/// Default destination host written into the Host header
pub const DEFAULT_DST_ADDR: &str = "localhost";

/// Default destination port written into the Host header
pub const DEFAULT_DST_PORT: u16 = 80;

/// Port that implies TLS to the upstream
pub const TLS_PORT: u16 = 443;

/// Name carried in the status line of tagged tunnel errors
pub const TUNNEL_ERROR_NAME: &str = "WebsocketTunnelError";

/// Body of the synthesized 408 response
pub const TIMEOUT_BODY: &str = "Request Timeout: The server timed out waiting for the request.";
