//! Pool and client configuration
//!
//! The option set is fixed: pool limits, the three timeouts, the idle
//! timeout, the response charset, and the TLS policy. Defaults come from
//! `constants.rs`.

use std::time::Duration;

use crate::constants::{
    DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_CHARSET, DEFAULT_CONNECT_TIMEOUT, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_MAX_PER_DESTINATION, DEFAULT_MAX_TOTAL, DEFAULT_SOCKET_TIMEOUT,
};
use crate::pool::Scheme;
use crate::tls::TlsPolicy;

/// Limits and timeouts of one connection pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum connections in flight across all destinations
    pub max_total:           usize,
    /// Maximum connections in flight to a single destination
    pub max_per_destination: usize,
    /// Maximum time to establish a connection
    pub connect_timeout:     Duration,
    /// Maximum time for sending the request and reading the response
    ///
    /// Applied as the transport's whole-request timeout: it bounds the full
    /// exchange, body read included, not the gap between two reads. The
    /// blocking transport has no per-read inactivity timeout.
    pub socket_timeout:      Duration,
    /// Maximum time to wait for a free pool slot
    pub acquire_timeout:     Duration,
    /// Idle connections older than this are closed
    pub idle_timeout:        Duration,
    /// Charset used to decode bodies whose `Content-Type` names none
    pub charset:             String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total:           DEFAULT_MAX_TOTAL,
            max_per_destination: DEFAULT_MAX_PER_DESTINATION,
            connect_timeout:     DEFAULT_CONNECT_TIMEOUT,
            socket_timeout:      DEFAULT_SOCKET_TIMEOUT,
            acquire_timeout:     DEFAULT_ACQUIRE_TIMEOUT,
            idle_timeout:        DEFAULT_IDLE_TIMEOUT,
            charset:             DEFAULT_CHARSET.to_string(),
        }
    }
}

impl PoolConfig {
    /// Set both connection caps; each is raised to at least one
    #[must_use]
    pub fn with_limits(mut self, max_total: usize, max_per_destination: usize) -> Self {
        self.max_total = max_total.max(1);
        self.max_per_destination = max_per_destination.max(1);
        self
    }

    /// Set the connect timeout
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the socket (send and read) timeout
    #[must_use]
    pub const fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    /// Set the pool acquisition timeout
    #[must_use]
    pub const fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the idle connection timeout
    #[must_use]
    pub const fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the fallback response charset
    #[must_use]
    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }
}

/// Configuration of both pools of an [`HttpClient`](crate::HttpClient)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    /// Pool for plain requests
    pub plain:      PoolConfig,
    /// Pool for TLS requests
    pub tls:        PoolConfig,
    /// Trust policy of the TLS pool
    pub tls_policy: TlsPolicy,
}

impl ClientConfig {
    /// Use the same pool configuration for both schemes
    #[must_use]
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.plain = pool.clone();
        self.tls = pool;
        self
    }

    /// Replace the TLS policy
    #[must_use]
    pub fn with_tls_policy(mut self, policy: TlsPolicy) -> Self {
        self.tls_policy = policy;
        self
    }

    /// Accept any certificate on the TLS pool. **Insecure**, see
    /// [`TlsPolicy`].
    #[must_use]
    pub const fn insecure_skip_verify(mut self, skip: bool) -> Self {
        self.tls_policy.insecure_skip_verify = skip;
        self
    }

    /// Pool configuration for a scheme
    pub const fn pool(&self, scheme: Scheme) -> &PoolConfig {
        match scheme {
            Scheme::Plain => &self.plain,
            Scheme::Tls => &self.tls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_config() {
        let config = PoolConfig::default();
        assert_eq!(config.max_total, 50);
        assert_eq!(config.max_per_destination, 10);
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.socket_timeout, Duration::from_secs(30));
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
        assert_eq!(config.charset, "utf-8");
    }

    #[test]
    fn test_limits_are_at_least_one() {
        let config = PoolConfig::default().with_limits(0, 0);
        assert_eq!(config.max_total, 1);
        assert_eq!(config.max_per_destination, 1);
    }

    #[test]
    fn test_default_client_config_verifies_tls() {
        let config = ClientConfig::default();
        assert!(!config.tls_policy.insecure_skip_verify);
        assert_eq!(config.pool(Scheme::Plain), &PoolConfig::default());
        assert_eq!(config.pool(Scheme::Tls), &PoolConfig::default());
    }

    #[test]
    fn test_insecure_skip_verify_is_explicit() {
        let config = ClientConfig::default().insecure_skip_verify(true);
        assert!(config.tls_policy.insecure_skip_verify);
        assert_eq!(config.tls_policy.protocols.len(), 4);
    }

    #[test]
    fn test_with_pool_applies_to_both_schemes() {
        let pool = PoolConfig::default()
            .with_limits(4, 2)
            .with_acquire_timeout(Duration::from_millis(100));
        let config = ClientConfig::default().with_pool(pool.clone());
        assert_eq!(config.plain, pool);
        assert_eq!(config.tls, pool);
    }
}
