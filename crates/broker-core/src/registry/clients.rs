//! The global client index: `ClientId -> Arc<Client>` (§5 "concurrent
//! lookup/insert/remove structure keyed by client id").

use std::sync::Arc;

use dashmap::DashMap;

use crate::client::Client;
use crate::model::ClientId;

#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<ClientId, Arc<Client>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, client: Arc<Client>) {
        self.clients.insert(client.id().clone(), client);
    }

    pub fn get(&self, id: &ClientId) -> Option<Arc<Client>> {
        self.clients.get(id).map(|entry| entry.clone())
    }

    pub fn remove(&self, id: &ClientId) -> Option<Arc<Client>> {
        self.clients.remove(id).map(|(_, client)| client)
    }

    pub fn list(&self) -> Vec<Arc<Client>> {
        self.clients.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
