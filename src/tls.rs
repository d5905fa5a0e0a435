//! TLS trust policy for the TLS-scheme pool
//!
//! The policy decides two things: which protocol versions may be negotiated
//! and whether the server certificate is verified at all. Verification is on
//! unless `insecure_skip_verify` is set explicitly.
//!
//! # Security
//!
//! With `insecure_skip_verify` the transport accepts **any** certificate chain
//! and skips hostname verification. Any party on the network path can then
//! impersonate the server. Only use it against endpoints with self-signed or
//! otherwise unverifiable certificates that you control.

use reqwest::blocking::ClientBuilder;
use reqwest::tls::Version;

use crate::error::TlsPolicyError;

/// Protocol names a TLS pool may be restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TlsProtocol {
    /// SSLv2-compatible `ClientHello` framing
    SslV2Hello,
    /// SSL 3.0
    SslV3,
    /// TLS 1.0
    TlsV1,
    /// TLS 1.2
    TlsV1_2,
}

/// Allow-list used by the shared client
pub const DEFAULT_PROTOCOLS: [TlsProtocol; 4] = [
    TlsProtocol::SslV2Hello,
    TlsProtocol::SslV3,
    TlsProtocol::TlsV1,
    TlsProtocol::TlsV1_2,
];

impl TlsProtocol {
    /// Conventional protocol name, e.g. `TLSv1.2`
    pub const fn name(self) -> &'static str {
        match self {
            Self::SslV2Hello => "SSLv2Hello",
            Self::SslV3 => "SSLv3",
            Self::TlsV1 => "TLSv1",
            Self::TlsV1_2 => "TLSv1.2",
        }
    }

    /// Version understood by the TLS backend, `None` when the backend cannot
    /// speak this protocol at all
    pub const fn backend_version(self) -> Option<Version> {
        match self {
            Self::SslV2Hello | Self::SslV3 => None,
            Self::TlsV1 => Some(Version::TLS_1_0),
            Self::TlsV1_2 => Some(Version::TLS_1_2),
        }
    }
}

impl std::fmt::Display for TlsProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Trust and protocol policy applied to a TLS transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPolicy {
    /// Accept any server certificate and skip hostname checks. **Insecure.**
    pub insecure_skip_verify: bool,
    /// Protocols that may be negotiated
    pub protocols:            Vec<TlsProtocol>,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self {
            insecure_skip_verify: false,
            protocols:            DEFAULT_PROTOCOLS.to_vec(),
        }
    }
}

impl TlsPolicy {
    /// Accept-all policy over the default allow-list. **Insecure**, see the
    /// module docs.
    pub fn trust_all() -> Self {
        Self {
            insecure_skip_verify: true,
            ..Self::default()
        }
    }

    /// Lowest and highest allowed protocol the backend can negotiate
    ///
    /// The backend only takes a contiguous version range, so versions it
    /// supports that fall between the two bounds are negotiable as well.
    pub fn negotiable_range(&self) -> Result<(TlsProtocol, TlsProtocol), TlsPolicyError> {
        let supported = self
            .protocols
            .iter()
            .copied()
            .filter(|protocol| protocol.backend_version().is_some());

        match (supported.clone().min(), supported.max()) {
            (Some(min), Some(max)) => Ok((min, max)),
            _ => Err(TlsPolicyError::NoSupportedProtocol(self.protocols.clone())),
        }
    }

    /// Configure a transport builder with this policy
    pub(crate) fn apply(&self, builder: ClientBuilder) -> Result<ClientBuilder, TlsPolicyError> {
        let (min, max) = self.negotiable_range()?;

        let mut builder = builder;
        if let Some(version) = min.backend_version() {
            builder = builder.min_tls_version(version);
        }
        if let Some(version) = max.backend_version() {
            builder = builder.max_tls_version(version);
        }

        if self.insecure_skip_verify {
            builder = builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }

        Ok(builder)
    }
}
