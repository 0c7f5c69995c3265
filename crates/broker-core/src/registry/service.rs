//! `name -> identification -> Service` registry (§4.3).

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::client::Client;
use crate::model::ServiceKey;

/// A registered service: an owning client plus the clients spying on it.
/// `spies` is its own reader/writer lock (§5), separate from the outer
/// registry lock, so fan-out reads never contend with registration of
/// unrelated services.
pub struct ServiceEntry {
    pub client: Arc<Client>,
    pub spies: RwLock<Vec<Arc<Client>>>,
}

impl ServiceEntry {
    fn new(client: Arc<Client>) -> Arc<Self> {
        Arc::new(Self {
            client,
            spies: RwLock::new(Vec::new()),
        })
    }

    /// Removes every occurrence of `client` from this service's spy list
    /// (§4.5 teardown side of the relation).
    pub fn remove_spy(&self, client: &Arc<Client>) {
        self.spies.write().retain(|spy| !Arc::ptr_eq(spy, client));
    }
}

#[derive(Default)]
pub struct ServiceRegistry {
    services: DashMap<ServiceKey, Arc<ServiceEntry>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `client` as the owner of `key`. If a service already
    /// occupies `key`, it is replaced and returned so the caller can run
    /// the lost-service/new-service publish sequence (§4.3) — the registry
    /// itself does not publish, to keep it free of routing concerns.
    pub fn register(&self, client: Arc<Client>, key: ServiceKey) -> (Arc<ServiceEntry>, Option<Arc<ServiceEntry>>) {
        self.warn_on_identification_mismatch(&key);
        let entry = ServiceEntry::new(client);
        let replaced = self.services.insert(key, entry.clone());
        (entry, replaced)
    }

    fn warn_on_identification_mismatch(&self, key: &ServiceKey) {
        let has_empty = self
            .services
            .iter()
            .any(|e| e.key().name == key.name && e.key().identification.is_empty());
        let has_non_empty = self
            .services
            .iter()
            .any(|e| e.key().name == key.name && !e.key().identification.is_empty());

        if key.identification.is_empty() && has_non_empty {
            tracing::warn!(
                service = %key.name,
                "new service has no identification but one with an identification is already registered"
            );
        } else if !key.identification.is_empty() && has_empty {
            tracing::warn!(
                service = %key.name,
                "new service has an identification but one without an identification is already registered"
            );
        }
    }

    pub fn lookup(&self, name: &str, identification: &str) -> Option<Arc<ServiceEntry>> {
        self.services
            .get(&ServiceKey::new(name, identification))
            .map(|entry| entry.clone())
    }

    pub fn remove(&self, key: &ServiceKey) -> Option<Arc<ServiceEntry>> {
        self.services.remove(key).map(|(_, entry)| entry)
    }

    /// Whether any identification is registered under `name`, regardless of
    /// which one. Distinguishes `NoSuchService` from `InvalidIdentification`
    /// when an exact lookup misses (§4.7).
    pub fn any_with_name(&self, name: &str) -> bool {
        self.services.iter().any(|entry| entry.key().name.as_ref() == name)
    }

    pub fn list(&self) -> Vec<(ServiceKey, Arc<ServiceEntry>)> {
        self.services
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
