use crate::core::errors::ClientError;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default connect and read timeout, matching the wrapped SDK's defaults
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A recognized HTTP client option.
///
/// Every option has a stable string key so that configuration sourced from
/// the environment (or any other string-typed source) can be bound through
/// [`ClientProperty::parse`] with the same validation as typed callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientProperty {
    /// Materialize the full request body before the first byte is sent
    Buffered(bool),
    /// Route every request over this Unix domain socket; `None` selects the
    /// network transport again
    SocketPath(Option<PathBuf>),
    ConnectTimeout(Duration),
    ReadTimeout(Duration),
    /// Retries for transport failures of replayable requests
    MaxRetries(u32),
    UserAgent(String),
    /// Honor `HTTP_PROXY`/`HTTPS_PROXY` for the network transport
    SystemProxy(bool),
    /// PEM bundle of root certificates trusted in addition to the system
    /// roots; `None` clears it
    TrustStore(Option<PathBuf>),
}

impl ClientProperty {
    pub const BUFFERED: &'static str = "buffered";
    pub const SOCKET_PATH: &'static str = "socketPath";
    pub const CONNECT_TIMEOUT: &'static str = "connectTimeout";
    pub const READ_TIMEOUT: &'static str = "readTimeout";
    pub const MAX_RETRIES: &'static str = "maxRetries";
    pub const USER_AGENT: &'static str = "userAgent";
    pub const SYSTEM_PROXY: &'static str = "systemProxy";
    pub const TRUST_STORE: &'static str = "trustStore";

    pub fn key(&self) -> &'static str {
        match self {
            Self::Buffered(_) => Self::BUFFERED,
            Self::SocketPath(_) => Self::SOCKET_PATH,
            Self::ConnectTimeout(_) => Self::CONNECT_TIMEOUT,
            Self::ReadTimeout(_) => Self::READ_TIMEOUT,
            Self::MaxRetries(_) => Self::MAX_RETRIES,
            Self::UserAgent(_) => Self::USER_AGENT,
            Self::SystemProxy(_) => Self::SYSTEM_PROXY,
            Self::TrustStore(_) => Self::TRUST_STORE,
        }
    }

    /// Parse a string-keyed option.
    ///
    /// Unknown keys and unparsable values are rejected immediately.
    /// Timeouts are given in milliseconds.
    pub fn parse(key: &str, value: &str) -> Result<Self, ClientError> {
        let value = value.trim();
        match key {
            Self::BUFFERED => parse_bool(key, value).map(Self::Buffered),
            Self::SOCKET_PATH => Ok(Self::SocketPath(
                (!value.is_empty()).then(|| PathBuf::from(value)),
            )),
            Self::CONNECT_TIMEOUT => parse_millis(key, value).map(Self::ConnectTimeout),
            Self::READ_TIMEOUT => parse_millis(key, value).map(Self::ReadTimeout),
            Self::MAX_RETRIES => value.parse::<u32>().map(Self::MaxRetries).map_err(|e| {
                ClientError::Configuration(format!("Invalid value '{}' for {}: {}", value, key, e))
            }),
            Self::USER_AGENT => Ok(Self::UserAgent(value.to_string())),
            Self::SYSTEM_PROXY => parse_bool(key, value).map(Self::SystemProxy),
            Self::TRUST_STORE => Ok(Self::TrustStore(
                (!value.is_empty()).then(|| PathBuf::from(value)),
            )),
            _ => Err(ClientError::Configuration(format!(
                "Unknown or unsupported HTTP client property '{}'",
                key
            ))),
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ClientError> {
    value.parse::<bool>().map_err(|_| {
        ClientError::Configuration(format!(
            "Invalid value '{}' for {}: expected true or false",
            value, key
        ))
    })
}

fn parse_millis(key: &str, value: &str) -> Result<Duration, ClientError> {
    value.parse::<u64>().map(Duration::from_millis).map_err(|e| {
        ClientError::Configuration(format!(
            "Invalid value '{}' for {} (milliseconds): {}",
            value, key, e
        ))
    })
}

/// Which transport a builder will freeze into its client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TransportSelector {
    #[default]
    Network,
    UnixSocket(PathBuf),
}

impl TransportSelector {
    pub const fn kind(&self) -> TransportKind {
        match self {
            Self::Network => TransportKind::Network,
            Self::UnixSocket(_) => TransportKind::UnixSocket,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Network,
    UnixSocket,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::UnixSocket => write!(f, "unix-socket"),
        }
    }
}

/// Serializer strategy selected at configuration time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SerializerKind {
    #[default]
    Default,
    Managed,
}

impl FromStr for SerializerKind {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(Self::Default),
            "managed" => Ok(Self::Managed),
            other => Err(ClientError::Configuration(format!(
                "Unknown serializer '{}', expected 'default' or 'managed'",
                other
            ))),
        }
    }
}

impl fmt::Display for SerializerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Managed => write!(f, "managed"),
        }
    }
}
