// Default pool limits and timeouts shared by both schemes
// TLS protocol names live in src/tls.rs

use std::time::Duration;

// Pool limits
pub const DEFAULT_MAX_TOTAL: usize = 50;
pub const DEFAULT_MAX_PER_DESTINATION: usize = 10;

// Timeouts
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

// Body decoding
pub const DEFAULT_CHARSET: &str = "utf-8";

// Requests
pub const MAX_REDIRECTS: usize = 10;
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";
