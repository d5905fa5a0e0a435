//! Process-wide HTTP client facade
//!
//! [`HttpClient`] owns one [`ConnectionPool`] per scheme. The plain methods
//! (`get`, `post`, ...) never fail: any error is logged and turned into
//! `None`, so an empty body and a failed call look alike. The `try_*`
//! methods return the typed [`HttpClientError`] instead.

use std::sync::OnceLock;

use serde::Serialize;
use tracing::warn;

use crate::config::ClientConfig;
use crate::error::{HttpClientError, Result};
use crate::executor::{Credentials, Request, execute};
use crate::pool::{ConnectionPool, Scheme};

static SHARED_CLIENT: OnceLock<HttpClient> = OnceLock::new();

/// Pooled blocking HTTP client with one pool per scheme
#[derive(Debug)]
pub struct HttpClient {
    plain: ConnectionPool,
    tls:   ConnectionPool,
}

impl HttpClient {
    /// Build both pools from `config`
    ///
    /// A pool whose transport cannot be built is logged and kept; calls on it
    /// fail at request time.
    pub fn new(config: ClientConfig) -> Self {
        let ClientConfig {
            plain,
            tls,
            tls_policy,
        } = config;

        Self {
            plain: ConnectionPool::plain(plain),
            tls:   ConnectionPool::tls(tls, &tls_policy),
        }
    }

    /// The process-wide client, built on first use
    ///
    /// Its TLS pool accepts any server certificate
    /// ([`insecure_skip_verify`](ClientConfig::insecure_skip_verify)); build
    /// your own client with [`HttpClient::new`] when certificates must be
    /// verified.
    pub fn shared() -> &'static Self {
        SHARED_CLIENT.get_or_init(|| Self::new(ClientConfig::default().insecure_skip_verify(true)))
    }

    /// Pool serving `scheme`
    pub const fn pool(&self, scheme: Scheme) -> &ConnectionPool {
        match scheme {
            Scheme::Plain => &self.plain,
            Scheme::Tls => &self.tls,
        }
    }

    /// GET over the plain pool
    pub fn try_get(&self, url: &str) -> Result<String> {
        execute(&self.plain, &Request::get(url))
    }

    /// GET over the plain pool with basic auth
    pub fn try_get_with_auth(&self, url: &str, username: &str, password: &str) -> Result<String> {
        let request = Request::get(url).with_credentials(Credentials::new(username, password));
        execute(&self.plain, &request)
    }

    /// GET over the TLS pool
    pub fn try_get_tls(&self, url: &str) -> Result<String> {
        execute(&self.tls, &Request::get(url))
    }

    /// GET over the TLS pool with basic auth
    pub fn try_get_tls_with_auth(
        &self,
        url: &str,
        username: &str,
        password: &str,
    ) -> Result<String> {
        let request = Request::get(url).with_credentials(Credentials::new(username, password));
        execute(&self.tls, &request)
    }

    /// POST a JSON body over the plain pool
    pub fn try_post(&self, url: &str, json_body: &str) -> Result<String> {
        execute(&self.plain, &Request::post(url, json_body))
    }

    /// POST a JSON body over the plain pool with basic auth
    pub fn try_post_with_auth(
        &self,
        url: &str,
        json_body: &str,
        username: &str,
        password: &str,
    ) -> Result<String> {
        let request =
            Request::post(url, json_body).with_credentials(Credentials::new(username, password));
        execute(&self.plain, &request)
    }

    /// GET `url`, `None` on any failure
    pub fn get(&self, url: &str) -> Option<String> {
        collapse("GET", url, self.try_get(url))
    }

    /// GET `url` with basic auth, `None` on any failure
    pub fn get_with_auth(&self, url: &str, username: &str, password: &str) -> Option<String> {
        collapse("GET", url, self.try_get_with_auth(url, username, password))
    }

    /// GET `url` over the TLS pool, `None` on any failure
    pub fn get_tls(&self, url: &str) -> Option<String> {
        collapse("GET", url, self.try_get_tls(url))
    }

    /// GET `url` over the TLS pool with basic auth, `None` on any failure
    pub fn get_tls_with_auth(&self, url: &str, username: &str, password: &str) -> Option<String> {
        collapse("GET", url, self.try_get_tls_with_auth(url, username, password))
    }

    /// POST `json_body` to `url`, `None` on any failure
    pub fn post(&self, url: &str, json_body: &str) -> Option<String> {
        collapse("POST", url, self.try_post(url, json_body))
    }

    /// POST `json_body` to `url` with basic auth, `None` on any failure
    pub fn post_with_auth(
        &self,
        url: &str,
        json_body: &str,
        username: &str,
        password: &str,
    ) -> Option<String> {
        collapse(
            "POST",
            url,
            self.try_post_with_auth(url, json_body, username, password),
        )
    }

    /// Serialize `value` to JSON and POST it, `None` on any failure
    pub fn post_json<T: Serialize + ?Sized>(&self, url: &str, value: &T) -> Option<String> {
        let result = serde_json::to_string(value)
            .map_err(HttpClientError::from)
            .and_then(|body| self.try_post(url, &body));
        collapse("POST", url, result)
    }
}

fn collapse(method: &str, url: &str, result: Result<String>) -> Option<String> {
    match result {
        Ok(body) => Some(body),
        Err(e) => {
            warn!("{} {} failed: {}", method, url, e);
            None
        }
    }
}
