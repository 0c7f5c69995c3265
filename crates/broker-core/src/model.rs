//! Core domain identifiers shared across registries.

use std::fmt;
use std::sync::Arc;

/// Stable identifier for a connection, derived from the peer address.
/// Distinct from the cosmetic, user-settable [`crate::client::Client::name`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(Arc<str>);

impl ClientId {
    pub fn new(raw: impl Into<Arc<str>>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Key identifying a registered service: `(name, identification)`. An empty
/// `identification` is a valid, common key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    pub name: Arc<str>,
    pub identification: Arc<str>,
}

impl ServiceKey {
    pub fn new(name: impl Into<Arc<str>>, identification: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            identification: identification.into(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.identification.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}[{}]", self.name, self.identification)
        }
    }
}

/// The pseudo-service name reserved for broker introspection (§4.8).
pub const CELLASERV_SERVICE_NAME: &str = "cellaserv";
