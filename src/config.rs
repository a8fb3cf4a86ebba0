//! Configuration types for a transcoding session.
//!
//! Everything a session needs before it connects lives in [`SessionConfig`],
//! built via its [`SessionConfigBuilder`]. The resolver and the output
//! destination are *not* part of the config: they are per-run and are set on
//! the [`crate::session::Session`] itself.

use crate::error::TranscodeError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::time::Duration;

/// Default CTIP port.
pub const DEFAULT_PORT: u16 = 8099;

/// Default size of one DATA frame sent to the engine.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

const MIN_CHUNK_SIZE: usize = 1024;
const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Configuration for a transcoding session.
///
/// # Example
/// ```rust
/// use edgequake_html2pdf::SessionConfig;
///
/// let config = SessionConfig::builder()
///     .endpoint("ctip://localhost:8099/")
///     .user("user")
///     .password("kappa")
///     .property("output.pdf.version", "1.7")
///     .build()
///     .unwrap();
/// assert_eq!(config.endpoint.port, 8099);
/// ```
#[derive(Clone)]
pub struct SessionConfig {
    /// Parsed engine address.
    pub endpoint: Endpoint,

    /// User name sent during the handshake.
    pub user: String,

    /// Secret sent during the handshake. Never logged.
    pub password: String,

    /// TCP connect + handshake timeout in seconds. Default: 30.
    pub connect_timeout_secs: u64,

    /// Timeout for each read or write once connected, in seconds. Default: 300.
    ///
    /// `0` disables the timeout. The engine may legitimately stay silent
    /// while it lays out a long document, so keep this generous.
    pub io_timeout_secs: u64,

    /// Maximum payload of one DATA frame. Default: 16 KiB.
    ///
    /// Sessions use [`frame_size`](Self::frame_size), which keeps the value
    /// within 1 KiB to 1 MiB whatever is stored here.
    pub chunk_size: usize,

    /// Engine properties sent before every run, in insertion order.
    pub properties: Vec<(String, String)>,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint {
                host: "localhost".to_string(),
                port: DEFAULT_PORT,
            },
            user: String::new(),
            password: String::new(),
            connect_timeout_secs: 30,
            io_timeout_secs: 300,
            chunk_size: DEFAULT_CHUNK_SIZE,
            properties: Vec::new(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("endpoint", &self.endpoint)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("io_timeout_secs", &self.io_timeout_secs)
            .field("chunk_size", &self.chunk_size)
            .field("properties", &self.properties)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn TranscodeProgressCallback>"),
            )
            .finish()
    }
}

impl SessionConfig {
    /// Create a new builder for `SessionConfig`.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder {
            config: Self::default(),
            endpoint: None,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// DATA frame payload size actually used on the wire.
    pub fn frame_size(&self) -> usize {
        self.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE)
    }

    /// `None` when the I/O timeout is disabled.
    pub fn io_timeout(&self) -> Option<Duration> {
        (self.io_timeout_secs > 0).then(|| Duration::from_secs(self.io_timeout_secs))
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
    endpoint: Option<String>,
}

impl SessionConfigBuilder {
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.config.user = user.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = secs;
        self
    }

    pub fn io_timeout_secs(mut self, secs: u64) -> Self {
        self.config.io_timeout_secs = secs;
        self
    }

    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.config.chunk_size = bytes.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.properties.push((name.into(), value.into()));
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<SessionConfig, TranscodeError> {
        if let Some(raw) = self.endpoint.take() {
            self.config.endpoint = raw.parse()?;
        }
        let c = &self.config;
        if c.connect_timeout_secs == 0 {
            return Err(TranscodeError::InvalidConfig(
                "Connect timeout must be ≥ 1 second".into(),
            ));
        }
        if c.user.contains(char::is_whitespace) || c.password.contains(['\n', '\r']) {
            return Err(TranscodeError::InvalidConfig(
                "User must not contain whitespace and password must not contain line breaks"
                    .into(),
            ));
        }
        if c.properties.iter().any(|(name, _)| name.is_empty()) {
            return Err(TranscodeError::InvalidConfig(
                "Property names must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Endpoint ─────────────────────────────────────────────────────────────

/// Host and port of a transcoding engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// `host:port`, suitable for `TcpStream::connect`.
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctip://{}/", self.socket_addr())
    }
}

impl std::str::FromStr for Endpoint {
    type Err = TranscodeError;

    /// Accepts `ctip://host[:port][/]` or a bare `host[:port]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| TranscodeError::InvalidEndpoint {
            endpoint: s.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim();
        let rest = match trimmed.split_once("://") {
            Some(("ctip", rest)) => rest,
            Some(("ctips", _)) => return Err(invalid("TLS (ctips://) is not supported")),
            Some((scheme, _)) => {
                return Err(invalid(&format!("unsupported scheme '{scheme}'")));
            }
            None => trimmed,
        };

        let authority = rest.split('/').next().unwrap_or_default();
        if authority.is_empty() {
            return Err(invalid("missing host"));
        }

        // [v6]:port, host:port or host
        let (host, port) = if let Some(v6) = authority.strip_prefix('[') {
            let (host, after) = v6
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 literal"))?;
            match after.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if after.is_empty() => (host, None),
                None => return Err(invalid("garbage after IPv6 literal")),
            }
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port = match port {
            Some(p) => p
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| invalid(&format!("invalid port '{p}'")))?,
            None => DEFAULT_PORT,
        };

        Ok(Endpoint {
            host: host.to_string(),
            port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_with_scheme_and_default_port() {
        let ep: Endpoint = "ctip://cti.li/".parse().unwrap();
        assert_eq!(ep.host, "cti.li");
        assert_eq!(ep.port, DEFAULT_PORT);
        assert_eq!(ep.to_string(), "ctip://cti.li:8099/");
    }

    #[test]
    fn endpoint_bare_host_port() {
        let ep: Endpoint = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(ep.host, "127.0.0.1");
        assert_eq!(ep.port, 9000);
    }

    #[test]
    fn endpoint_ipv6() {
        let ep: Endpoint = "ctip://[::1]:8100/".parse().unwrap();
        assert_eq!(ep.host, "::1");
        assert_eq!(ep.socket_addr(), "[::1]:8100");
    }

    #[test]
    fn endpoint_rejects_tls_and_bad_ports() {
        assert!(matches!(
            "ctips://cti.li/".parse::<Endpoint>(),
            Err(TranscodeError::InvalidEndpoint { .. })
        ));
        assert!("http://cti.li/".parse::<Endpoint>().is_err());
        assert!("ctip://cti.li:0/".parse::<Endpoint>().is_err());
        assert!("ctip://cti.li:http/".parse::<Endpoint>().is_err());
        assert!("ctip:///".parse::<Endpoint>().is_err());
    }

    #[test]
    fn builder_clamps_chunk_size() {
        let c = SessionConfig::builder().chunk_size(1).build().unwrap();
        assert_eq!(c.chunk_size, 1024);
        let c = SessionConfig::builder().chunk_size(usize::MAX).build().unwrap();
        assert_eq!(c.chunk_size, 1024 * 1024);
    }

    #[test]
    fn frame_size_clamps_fields_set_directly() {
        let mut c = SessionConfig::default();
        assert_eq!(c.frame_size(), 16 * 1024);
        c.chunk_size = 0;
        assert_eq!(c.frame_size(), 1024);
        c.chunk_size = 64 * 1024 * 1024;
        assert_eq!(c.frame_size(), 1024 * 1024);
    }

    #[test]
    fn builder_validates() {
        assert!(SessionConfig::builder().connect_timeout_secs(0).build().is_err());
        assert!(SessionConfig::builder().user("two words").build().is_err());
        assert!(SessionConfig::builder().property("", "x").build().is_err());
    }

    #[test]
    fn io_timeout_zero_disables() {
        let c = SessionConfig::builder().io_timeout_secs(0).build().unwrap();
        assert!(c.io_timeout().is_none());
        let c = SessionConfig::default();
        assert_eq!(c.io_timeout(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn debug_redacts_password() {
        let c = SessionConfig::builder().password("kappa").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("kappa"));
        assert!(dbg.contains("<redacted>"));
    }
}
