//! Bounded connection pool, one per scheme
//!
//! Every destination is served by its own blocking `reqwest` transport, which
//! keeps idle sockets alive for reuse and closes them once they are broken or
//! have been idle longer than the idle timeout. The pool counts leased and
//! open sockets: a request holds a lease on its destination while it runs,
//! leases per destination are capped, and open sockets (leased or idle)
//! across destinations are capped by closing the least recently used idle
//! destination when a new socket is needed. Dropping a lease returns the
//! slot and wakes waiting callers.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use tracing::{debug, error};

use crate::config::PoolConfig;
use crate::error::{HttpClientError, Result, TlsPolicyError};
use crate::tls::TlsPolicy;

/// Transport a pool serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// Unencrypted HTTP
    Plain,
    /// HTTP over TLS
    Tls,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => f.write_str("plain"),
            Self::Tls => f.write_str("tls"),
        }
    }
}

/// Scheme, host and port a connection is made to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    scheme: String,
    host:   String,
    port:   u16,
}

impl Destination {
    /// Create a destination from its parts
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// Destination of an `http` or `https` URL, using the scheme's default
    /// port when none is given
    pub fn from_url(url: &Url) -> Result<Self> {
        let invalid = |reason: &str| HttpClientError::InvalidUrl {
            url:    url.to_string(),
            reason: reason.to_string(),
        };

        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("only http and https are supported"));
        }
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port"))?;

        Ok(Self::new(url.scheme(), host, port))
    }

    /// URL scheme, `http` or `https`
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host name or address
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port, explicit or the scheme default
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Bookkeeping of one destination
///
/// `open` bounds the sockets the destination's transport may hold, leased or
/// idle. The transport only opens a socket when every open one is leased, so
/// `open` is the peak of `leased` since the transport was built.
#[derive(Debug)]
struct Route {
    leased:    usize,
    open:      usize,
    last_used: Instant,
    transport: Option<Client>,
}

impl Route {
    fn new() -> Self {
        Self {
            leased:    0,
            open:      0,
            last_used: Instant::now(),
            transport: None,
        }
    }

    const fn is_idle(&self) -> bool {
        self.leased == 0
    }
}

/// Leased and open connection counts, guarded by the pool mutex
#[derive(Debug, Default)]
struct PoolState {
    leased: usize,
    open:   usize,
    routes: HashMap<Destination, Route>,
    /// Transport built at construction, handed to the first route
    spare:  Option<Client>,
}

impl PoolState {
    fn leased_for(&self, destination: &Destination) -> usize {
        self.routes.get(destination).map_or(0, |route| route.leased)
    }

    fn open_for(&self, destination: &Destination) -> usize {
        self.routes.get(destination).map_or(0, |route| route.open)
    }

    /// Idle routes other than `destination`, least recently used first,
    /// enough to free `needed` sockets. `None` when they cannot.
    fn eviction_candidates(&self, destination: &Destination, needed: usize) -> Option<Vec<Destination>> {
        let mut idle: Vec<(&Destination, &Route)> = self
            .routes
            .iter()
            .filter(|(candidate, route)| *candidate != destination && route.is_idle())
            .collect();
        idle.sort_by_key(|(_, route)| route.last_used);

        let mut freed = 0;
        let mut victims = Vec::new();
        for (candidate, route) in idle {
            if freed >= needed {
                break;
            }
            freed += route.open;
            victims.push(candidate.clone());
        }
        (freed >= needed).then_some(victims)
    }

    /// Lease a slot if both caps allow it, evicting idle routes to make room
    /// for a new socket. Returns the evicted transports, to be dropped once
    /// the lock is released.
    fn try_take(&mut self, destination: &Destination, config: &PoolConfig) -> Option<Vec<Client>> {
        let leased = self.leased_for(destination);
        if leased >= config.max_per_destination {
            return None;
        }

        let mut evicted = Vec::new();
        let needs_socket = leased >= self.open_for(destination);
        if needs_socket && self.open >= config.max_total {
            let needed = self.open + 1 - config.max_total;
            for victim in self.eviction_candidates(destination, needed)? {
                if let Some(route) = self.routes.remove(&victim) {
                    self.open -= route.open;
                    debug!("Evicting idle connections to {}", victim);
                    evicted.extend(route.transport);
                }
            }
        }

        let route = self
            .routes
            .entry(destination.clone())
            .or_insert_with(Route::new);
        route.leased += 1;
        route.last_used = Instant::now();
        if needs_socket {
            route.open += 1;
            self.open += 1;
        }
        self.leased += 1;
        Some(evicted)
    }

    fn give_back(&mut self, destination: &Destination) {
        self.leased = self.leased.saturating_sub(1);
        if let Some(route) = self.routes.get_mut(destination) {
            route.leased = route.leased.saturating_sub(1);
            route.last_used = Instant::now();
        }
    }
}

/// Connection pool of one scheme
///
/// Each destination gets its own transport, so its idle sockets can be closed
/// by dropping that transport when another destination needs room.
#[derive(Debug)]
pub struct ConnectionPool {
    scheme:      Scheme,
    config:      PoolConfig,
    policy:      Option<TlsPolicy>,
    unavailable: Option<String>,
    state:       Mutex<PoolState>,
    available:   Condvar,
}

impl ConnectionPool {
    /// Pool for plain HTTP
    pub fn plain(config: PoolConfig) -> Self {
        Self::new(Scheme::Plain, config, None)
    }

    /// Pool for TLS using the given trust policy
    pub fn tls(config: PoolConfig, policy: &TlsPolicy) -> Self {
        Self::new(Scheme::Tls, config, Some(policy.clone()))
    }

    /// Build the pool and validate its transport configuration
    ///
    /// A transport that fails to build is logged and leaves the pool in
    /// place; requests on it then fail with
    /// [`HttpClientError::TransportUnavailable`].
    fn new(scheme: Scheme, config: PoolConfig, policy: Option<TlsPolicy>) -> Self {
        let (spare, unavailable) = match build_transport(&config, policy.as_ref()) {
            Ok(client) => {
                debug!(
                    "Built {} pool: max_total={}, max_per_destination={}, connect_timeout={:?}, socket_timeout={:?}, acquire_timeout={:?}, idle_timeout={:?}",
                    scheme,
                    config.max_total,
                    config.max_per_destination,
                    config.connect_timeout,
                    config.socket_timeout,
                    config.acquire_timeout,
                    config.idle_timeout
                );
                (Some(client), None)
            }
            Err(e) => {
                error!("Failed to build {} transport: {}", scheme, e);
                (None, Some(e.to_string()))
            }
        };

        Self {
            scheme,
            config,
            policy,
            unavailable,
            state: Mutex::new(PoolState {
                spare,
                ..PoolState::default()
            }),
            available: Condvar::new(),
        }
    }

    /// Scheme this pool serves
    pub const fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Configuration the pool was built with
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Whether the transport was built successfully
    pub const fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }

    /// Lease a connection to `destination`
    ///
    /// Blocks until both caps allow another connection or the acquisition
    /// timeout elapses.
    pub(crate) fn acquire(&self, destination: &Destination) -> Result<Lease<'_>> {
        if let Some(reason) = &self.unavailable {
            return Err(HttpClientError::TransportUnavailable(format!(
                "{} pool: {reason}",
                self.scheme
            )));
        }

        let started = Instant::now();
        let deadline = started + self.config.acquire_timeout;

        let mut state = self.lock_state();
        let evicted = loop {
            if let Some(evicted) = state.try_take(destination, &self.config) {
                break evicted;
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(HttpClientError::PoolExhausted {
                    destination: destination.clone(),
                    waited:      started.elapsed(),
                });
            }
            state = self
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        };
        let existing = state
            .routes
            .get(destination)
            .and_then(|route| route.transport.clone())
            .or_else(|| state.spare.take());
        drop(state);
        // Closes the evicted routes' idle sockets
        drop(evicted);

        // The lease exists before the transport is built, so a failed build
        // still returns the slot
        let mut lease = Lease {
            pool:        self,
            destination: destination.clone(),
            transport:   None,
        };
        let transport = match existing {
            Some(client) => client,
            None => build_transport(&self.config, self.policy.as_ref())
                .map_err(|e| HttpClientError::TransportUnavailable(e.to_string()))?,
        };

        let mut state = self.lock_state();
        let transport = match state.routes.get_mut(destination) {
            Some(route) => route.transport.get_or_insert(transport).clone(),
            None => transport,
        };
        drop(state);

        lease.transport = Some(transport);
        Ok(lease)
    }

    /// Connections currently leased across all destinations
    pub fn in_flight(&self) -> usize {
        self.lock_state().leased
    }

    /// Connections currently leased to `destination`
    pub fn in_flight_for(&self, destination: &Destination) -> usize {
        self.lock_state().leased_for(destination)
    }

    /// Upper bound of open sockets, leased or idle, across all destinations
    pub fn open_connections(&self) -> usize {
        self.lock_state().open
    }

    fn release(&self, destination: &Destination) {
        self.lock_state().give_back(destination);
        self.available.notify_all();
    }

    // The state stays consistent across a panic in a holder, so poisoning is ignored
    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn build_transport(
    config: &PoolConfig,
    policy: Option<&TlsPolicy>,
) -> std::result::Result<Client, TlsPolicyError> {
    let builder = Client::builder()
        .no_proxy()
        .redirect(Policy::none())
        .connect_timeout(config.connect_timeout)
        .timeout(config.socket_timeout)
        .pool_idle_timeout(config.idle_timeout)
        .pool_max_idle_per_host(config.max_per_destination);

    let builder = match policy {
        Some(policy) => policy.apply(builder)?,
        None => builder,
    };

    builder.build().map_err(TlsPolicyError::Backend)
}

/// A leased connection
///
/// Held for exactly one request/response cycle. Dropping it returns the slot
/// to the pool; the socket itself stays with the destination's transport for
/// reuse.
#[derive(Debug)]
pub struct Lease<'a> {
    pool:        &'a ConnectionPool,
    destination: Destination,
    transport:   Option<Client>,
}

impl Lease<'_> {
    /// Destination this slot was leased for
    pub const fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Transport serving this destination
    pub fn transport(&self) -> Result<&Client> {
        self.transport.as_ref().ok_or_else(|| {
            HttpClientError::TransportUnavailable(format!("no transport for {}", self.destination))
        })
    }

    /// Return the slot to the pool now
    pub fn release(self) {}
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.transport = None;
        self.pool.release(&self.destination);
    }
}
