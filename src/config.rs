//! Relay configuration loaded from environment variables.
//!
//! All settings come from environment variables (or a `.env` file via
//! `dotenvy`). Optional values fall back to defaults when missing or
//! unparsable; the API key and addresses are validated strictly.

use std::net::IpAddr;
use std::time::Duration;

use crate::auth::ApiKey;
use crate::error::RelayError;

/// Which side of the relay this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    /// Accept many peers and fan broadcasts out to them.
    Server,
    /// Dial one upstream server and forward broadcasts to it.
    Client,
}

/// A host/port pair to bind. Port `0` asks the OS for a free port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenAddress {
    /// Host name or IP literal, without brackets.
    pub host: String,
    /// Port number.
    pub port: u16,
}

impl ListenAddress {
    /// Loopback on an OS-assigned port.
    #[must_use]
    pub fn localhost() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 0,
        }
    }

    /// Parses `host:port`, accepting `[v6]:port`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidAddress`] if the port is missing or
    /// not a number, or the host is empty.
    pub fn parse(s: &str) -> Result<Self, RelayError> {
        let invalid = || RelayError::InvalidAddress(s.to_string());
        let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse().map_err(|_| invalid())?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// Returns `true` if only this machine can reach the address.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.host.eq_ignore_ascii_case("localhost")
            || self
                .host
                .parse::<IpAddr>()
                .is_ok_and(|ip| ip.is_loopback())
    }
}

impl std::fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// What the client supervisor does when the upstream link is lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamPolicy {
    /// Give up and report the error to the caller.
    Terminate,
    /// Dial again after `delay`, up to `max_attempts` consecutive failures
    /// (`None` retries forever).
    Reconnect {
        /// Pause before each attempt.
        delay: Duration,
        /// Consecutive failed attempts allowed.
        max_attempts: Option<u32>,
    },
}

/// Settings for [`crate::ws::server::RelayServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Where to listen.
    pub listen: ListenAddress,
    /// Shared secret; required unless `listen` is loopback.
    pub api_key: Option<ApiKey>,
    /// Replay the relay buffer to peers that do not say otherwise.
    pub replay: bool,
    /// Relay buffer capacity; `None` keeps every message.
    pub buffer_capacity: Option<usize>,
    /// Deadline for each write to a peer.
    pub write_timeout: Duration,
    /// Deadline for an upgrade request to complete.
    pub handshake_timeout: Duration,
    /// Reply `[good] ...` when a line is accepted.
    pub acknowledge: bool,
}

impl ServerConfig {
    /// Loopback server with defaults and the given key.
    #[must_use]
    pub fn local(api_key: Option<ApiKey>) -> Self {
        Self {
            listen: ListenAddress::localhost(),
            api_key,
            replay: true,
            buffer_capacity: None,
            write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            acknowledge: false,
        }
    }
}

/// Settings for [`crate::ws::client::RelayClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server URL, e.g. `ws://localhost:6266/`.
    pub url: String,
    /// Shared secret; the client refuses to start without one.
    pub api_key: Option<ApiKey>,
    /// Deadline for each write upstream.
    pub write_timeout: Duration,
    /// Deadline for dial plus handshake.
    pub handshake_timeout: Duration,
    /// Reply `[good] ...` when a line is accepted.
    pub acknowledge: bool,
}

impl ClientConfig {
    /// Client for `url` with defaults and the given key.
    #[must_use]
    pub fn new(url: impl Into<String>, api_key: Option<ApiKey>) -> Self {
        Self {
            url: url.into(),
            api_key,
            write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            acknowledge: false,
        }
    }
}

const DEFAULT_WRITE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Top-level relay configuration.
///
/// Loaded once at startup via [`RelayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// `RELAY_MODE`: `server` (default) or `client`.
    pub mode: RelayMode,
    /// `RELAY_LISTEN`: bind address, default `localhost:0`.
    pub listen: ListenAddress,
    /// `RELAY_CONNECT`: upstream URL for client mode.
    pub connect_url: Option<String>,
    /// `RELAY_API_KEY`: shared secret.
    pub api_key: Option<ApiKey>,
    /// `RELAY_REPLAY`: default `true`.
    pub replay: bool,
    /// `RELAY_BUFFER_CAPACITY`: `0` (default) is unbounded.
    pub buffer_capacity: Option<usize>,
    /// `RELAY_WRITE_TIMEOUT_MS`: default 5000.
    pub write_timeout: Duration,
    /// `RELAY_HANDSHAKE_TIMEOUT_MS`: default 10000.
    pub handshake_timeout: Duration,
    /// `RELAY_ACKNOWLEDGE`: default `false`.
    pub acknowledge: bool,
    /// `RELAY_ON_UPSTREAM_LOST` plus the `RELAY_RECONNECT_*` knobs.
    pub upstream_policy: UpstreamPolicy,
}

impl RelayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `RELAY_MODE` or `RELAY_LISTEN` is set but
    /// unparsable, or `RELAY_API_KEY` is not a valid header value.
    pub fn from_env() -> Result<Self, RelayError> {
        dotenvy::dotenv().ok();

        let mode = match std::env::var("RELAY_MODE").ok().as_deref() {
            None | Some("server") => RelayMode::Server,
            Some("client") => RelayMode::Client,
            Some(other) => {
                return Err(RelayError::InvalidSetting(format!(
                    "RELAY_MODE must be server or client, got {other:?}"
                )));
            }
        };

        let listen = match std::env::var("RELAY_LISTEN") {
            Ok(addr) => ListenAddress::parse(&addr)?,
            Err(_) => ListenAddress::localhost(),
        };

        let connect_url = std::env::var("RELAY_CONNECT").ok().filter(|u| !u.is_empty());
        let api_key = ApiKey::from_optional(std::env::var("RELAY_API_KEY").ok())?;

        let replay = parse_env_bool("RELAY_REPLAY", true);
        let buffer_capacity = Some(parse_env("RELAY_BUFFER_CAPACITY", 0_usize)).filter(|&c| c > 0);
        let write_timeout =
            Duration::from_millis(parse_env("RELAY_WRITE_TIMEOUT_MS", DEFAULT_WRITE_TIMEOUT_MS));
        let handshake_timeout = Duration::from_millis(parse_env(
            "RELAY_HANDSHAKE_TIMEOUT_MS",
            DEFAULT_HANDSHAKE_TIMEOUT_MS,
        ));
        let acknowledge = parse_env_bool("RELAY_ACKNOWLEDGE", false);

        let upstream_policy = match std::env::var("RELAY_ON_UPSTREAM_LOST").ok().as_deref() {
            Some("reconnect") => UpstreamPolicy::Reconnect {
                delay: Duration::from_millis(parse_env("RELAY_RECONNECT_DELAY_MS", 1_000)),
                max_attempts: Some(parse_env("RELAY_RECONNECT_ATTEMPTS", 0_u32))
                    .filter(|&n| n > 0),
            },
            _ => UpstreamPolicy::Terminate,
        };

        Ok(Self {
            mode,
            listen,
            connect_url,
            api_key,
            replay,
            buffer_capacity,
            write_timeout,
            handshake_timeout,
            acknowledge,
            upstream_policy,
        })
    }

    /// Settings for server mode.
    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            listen: self.listen.clone(),
            api_key: self.api_key.clone(),
            replay: self.replay,
            buffer_capacity: self.buffer_capacity,
            write_timeout: self.write_timeout,
            handshake_timeout: self.handshake_timeout,
            acknowledge: self.acknowledge,
        }
    }

    /// Settings for client mode.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MissingConnectUrl`] if `RELAY_CONNECT` was not
    /// set.
    pub fn client_config(&self) -> Result<ClientConfig, RelayError> {
        let url = self
            .connect_url
            .clone()
            .ok_or(RelayError::MissingConnectUrl)?;
        Ok(ClientConfig {
            url,
            api_key: self.api_key.clone(),
            write_timeout: self.write_timeout,
            handshake_timeout: self.handshake_timeout,
            acknowledge: self.acknowledge,
        })
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref() {
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => true,
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => false,
        _ => default,
    }
}
