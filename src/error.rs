use std::time::Duration;

use thiserror::Error;

use crate::pool::Destination;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, HttpClientError>;

/// Failure of a single request, classified by the stage that failed
///
/// The public `get`/`post` methods collapse this to `None` after logging;
/// the `try_*` variants hand it to the caller unchanged.
#[derive(Error, Debug)]
pub enum HttpClientError {
    /// The URL could not be parsed or has no host
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The URL as passed by the caller
        url:    String,
        /// Why it was rejected
        reason: String,
    },

    /// No pool slot became free within the acquisition timeout
    #[error("Connection pool exhausted for {destination} after waiting {waited:?}")]
    PoolExhausted {
        /// Destination the lease was requested for
        destination: Destination,
        /// How long the caller waited
        waited:      Duration,
    },

    /// The pool's transport failed to build at construction time
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Connection could not be established
    #[error("Connection failed: {0}")]
    Connect(#[source] reqwest::Error),

    /// Connect, send or read exceeded its timeout
    #[error("Request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    /// Sending the request failed after the connection was established
    #[error("Request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// The response body could not be read or decoded
    #[error("Failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    /// The redirect chain was longer than the client follows
    #[error("Too many redirects, gave up at {url} after {hops} hops")]
    TooManyRedirects {
        /// Last redirect target
        url:  String,
        /// Redirects followed
        hops: usize,
    },

    /// A typed payload could not be serialized to JSON
    #[error("Failed to serialize request body: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<reqwest::Error> for HttpClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err)
        } else if err.is_connect() {
            Self::Connect(err)
        } else if err.is_body() || err.is_decode() {
            Self::Body(err)
        } else {
            Self::Request(err)
        }
    }
}

/// Failure to turn a [`TlsPolicy`](crate::TlsPolicy) into a working TLS transport
#[derive(Error, Debug)]
pub enum TlsPolicyError {
    /// None of the allowed protocols is supported by the TLS backend
    #[error("No supported protocol in TLS allow-list: {0:?}")]
    NoSupportedProtocol(Vec<crate::tls::TlsProtocol>),

    /// The TLS backend rejected the configuration
    #[error("TLS backend error: {0}")]
    Backend(#[source] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_exhausted_message_names_destination() {
        let error = HttpClientError::PoolExhausted {
            destination: Destination::new("http", "example.com", 80),
            waited:      Duration::from_millis(50),
        };
        let message = error.to_string();
        assert!(message.contains("http://example.com:80"));
        assert!(message.contains("50ms"));
    }

    #[test]
    fn test_invalid_url_message() {
        let error = HttpClientError::InvalidUrl {
            url:    "not a url".to_string(),
            reason: "relative URL without a base".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid URL not a url: relative URL without a base"
        );
    }
}
