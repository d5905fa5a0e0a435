//! Pooled blocking HTTP client
//!
//! One process-wide [`HttpClient`] owns two bounded connection pools, one
//! for plain HTTP and one for TLS. Requests lease a connection slot from the
//! matching pool for the duration of a single request/response cycle and
//! return it on every exit path.
//!
//! ```no_run
//! use pooled_http::HttpClient;
//!
//! let client = HttpClient::shared();
//! if let Some(body) = client.get_with_auth("http://master:7180/api/v13/timeseries", "admin", "admin") {
//!     println!("{body}");
//! }
//! ```
//!
//! The shared client's TLS pool accepts any server certificate. Build a
//! client with [`HttpClient::new`] and a default [`ClientConfig`] to keep
//! certificate verification.

mod client;
mod config;
mod constants;
mod error;
mod executor;
mod pool;
#[cfg(test)]
mod test_support;
mod tls;

pub use client::HttpClient;
pub use config::{ClientConfig, PoolConfig};
pub use error::{HttpClientError, Result, TlsPolicyError};
pub use pool::{ConnectionPool, Destination, Scheme};
pub use tls::{DEFAULT_PROTOCOLS, TlsPolicy, TlsProtocol};
