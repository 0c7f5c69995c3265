//! The four registries the router mutates (§2, §4.3–§4.6), plus the client
//! index. Each type owns its own concurrency discipline; the router and
//! disconnect protocol compose them without reaching into their internals.

pub mod clients;
pub mod pending;
pub mod service;
pub mod subscription;

pub use clients::ClientRegistry;
pub use pending::{PendingEntry, PendingRequests};
pub use service::{ServiceEntry, ServiceRegistry};
pub use subscription::SubscriptionRegistry;

use std::sync::Arc;

/// The registries a [`crate::router::Router`] owns, bundled so they can be
/// passed around (and into the disconnect protocol) as one unit.
pub struct Registries {
    pub clients: ClientRegistry,
    pub services: ServiceRegistry,
    pub subscriptions: SubscriptionRegistry,
    pub pending: PendingRequests,
}

impl Registries {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            clients: ClientRegistry::new(),
            services: ServiceRegistry::new(),
            subscriptions: SubscriptionRegistry::new(),
            pending: PendingRequests::new(),
        })
    }
}
