//! Error taxonomies for the broker.
//!
//! Two separate hierarchies exist on purpose: [`BrokerError`] covers the
//! broker's own operational failures (bind, config, log directory), while
//! [`ReplyErrorType`] is the wire-level vocabulary carried inside a
//! `Reply.error` and observed by clients. They must not be conflated: a
//! `BrokerError` never crosses the wire, and a `ReplyErrorType` never wraps
//! an `io::Error`.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Failures that can prevent the broker from starting or operating.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid listen address `{value}`: {source}")]
    InvalidListenAddress {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("invalid request_timeout `{value}`: must be a positive integer number of seconds")]
    InvalidRequestTimeout { value: String },

    #[error("failed to create log directory {path}: {source}")]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to format publish-log session timestamp: {0}")]
    LogSessionTimestamp(#[from] time::error::Format),
}

/// Decode/frame-level failures on a single connection. These terminate the
/// connection's read loop; they never propagate beyond it.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame of {len} bytes exceeds the {max}-byte ceiling")]
    FrameTooLarge { len: u32, max: u32 },

    #[error("failed to decode envelope: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("unknown message type tag {0}")]
    UnknownType(i32),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The error taxonomy carried in `Reply.error`, per §7 of the protocol spec.
/// `Custom` carries a free-form `what` string supplied by a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyErrorType {
    Timeout,
    NoSuchService,
    InvalidIdentification,
    NoSuchMethod,
    BadArguments,
    Custom(String),
}

impl ReplyErrorType {
    pub(crate) fn into_proto(self) -> crate::proto::reply::Error {
        use crate::proto::reply::ErrorType as WireType;
        let (kind, what) = match self {
            ReplyErrorType::Timeout => (WireType::Timeout, String::new()),
            ReplyErrorType::NoSuchService => (WireType::NoSuchService, String::new()),
            ReplyErrorType::InvalidIdentification => {
                (WireType::InvalidIdentification, String::new())
            }
            ReplyErrorType::NoSuchMethod => (WireType::NoSuchMethod, String::new()),
            ReplyErrorType::BadArguments => (WireType::BadArguments, String::new()),
            ReplyErrorType::Custom(what) => (WireType::Custom, what),
        };
        crate::proto::reply::Error {
            r#type: kind as i32,
            what,
        }
    }
}
