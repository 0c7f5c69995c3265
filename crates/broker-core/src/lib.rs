//! Core routing engine for the message broker: wire codec, registries,
//! router, introspection, and the per-connection task wiring. Transport
//! (binding a TCP listener) and the process entry point live in sibling
//! crates; this crate knows nothing about `main` or signal handling.

pub mod cellaserv;
pub mod client;
pub mod config;
pub mod connection;
pub mod disconnect;
pub mod error;
pub mod model;
pub mod proto;
pub mod publish_log;
pub mod registry;
pub mod router;
pub mod wire;

pub use client::{Client, ClientState};
pub use config::Config;
pub use connection::serve_connection;
pub use error::{BrokerError, ReplyErrorType, WireError};
pub use model::{ClientId, ServiceKey, CELLASERV_SERVICE_NAME};
pub use publish_log::PublishLog;
pub use registry::Registries;
pub use router::Router;
