//! Single request/response cycle against a pool
//!
//! A call moves through build, acquire, send, read and release. The lease
//! taken at acquire is released when it drops, so every exit path, early
//! `?` returns included, hands the slot back. Nothing is retried.
//!
//! Redirects are followed here rather than by the transport, so every hop
//! holds a lease on its own destination.

use std::fmt;

use reqwest::blocking::Response;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Method, StatusCode, Url};
use tracing::debug;

use crate::constants::{JSON_CONTENT_TYPE, MAX_REDIRECTS};
use crate::error::{HttpClientError, Result};
use crate::pool::{ConnectionPool, Destination};

/// Basic-auth credentials for one request, valid for any host and port
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One GET or POST call
#[derive(Debug, Clone)]
pub struct Request<'a> {
    method:      Method,
    url:         &'a str,
    json_body:   Option<&'a str>,
    credentials: Option<Credentials>,
}

impl<'a> Request<'a> {
    /// GET `url`
    pub const fn get(url: &'a str) -> Self {
        Self {
            method: Method::GET,
            url,
            json_body: None,
            credentials: None,
        }
    }

    /// POST `json_body` to `url` as `application/json; charset=UTF-8`
    pub const fn post(url: &'a str, json_body: &'a str) -> Self {
        Self {
            method: Method::POST,
            url,
            json_body: Some(json_body),
            credentials: None,
        }
    }

    /// Attach basic-auth credentials to this request only
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// Run `request` on `pool` and return the decoded body
///
/// The body is decoded with the charset from the response `Content-Type`,
/// falling back to the pool's configured charset. Non-success statuses are
/// not errors; their body is returned like any other.
pub fn execute(pool: &ConnectionPool, request: &Request<'_>) -> Result<String> {
    let mut url = Url::parse(request.url).map_err(|e| HttpClientError::InvalidUrl {
        url:    request.url.to_string(),
        reason: e.to_string(),
    })?;
    let mut method = request.method.clone();
    let mut json_body = request.json_body;

    for _ in 0..=MAX_REDIRECTS {
        let destination = Destination::from_url(&url)?;

        // Acquire
        let lease = pool.acquire(&destination)?;

        // Build
        let mut builder = lease.transport()?.request(method.clone(), url.clone());
        if let Some(body) = json_body {
            builder = builder
                .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
                .body(body.to_owned());
        }
        if let Some(credentials) = &request.credentials {
            builder = builder.basic_auth(&credentials.username, Some(&credentials.password));
        }

        // Send
        let response = builder.send()?;
        let status = response.status();

        let Some(next) = redirect_target(&url, &response)? else {
            // Read
            let body = response.text_with_charset(&pool.config().charset)?;
            debug!(
                "{} {} via {} pool: status={}, {} bytes",
                method,
                lease.destination(),
                pool.scheme(),
                status,
                body.len()
            );

            // Release
            lease.release();
            return Ok(body);
        };

        debug!("{} {} redirected ({}) to {}", method, destination, status, next);
        drop(response);
        lease.release();

        // 301, 302 and 303 turn a POST into a bodiless GET
        if status != StatusCode::TEMPORARY_REDIRECT
            && status != StatusCode::PERMANENT_REDIRECT
            && method == Method::POST
        {
            method = Method::GET;
            json_body = None;
        }
        url = next;
    }

    Err(HttpClientError::TooManyRedirects {
        url:  url.to_string(),
        hops: MAX_REDIRECTS,
    })
}

/// Where a redirect response points, `None` for any other response
fn redirect_target(current: &Url, response: &Response) -> Result<Option<Url>> {
    let status = response.status();
    if !matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    ) {
        return Ok(None);
    }
    let Some(location) = response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
    else {
        return Ok(None);
    };

    current
        .join(location)
        .map(Some)
        .map_err(|e| HttpClientError::InvalidUrl {
            url:    location.to_string(),
            reason: e.to_string(),
        })
}
