//! Exact and glob subscription maps (§4.4). A pattern containing `*` is a
//! glob (shell-style `*`/`?`/`[...]` via `globset`); anything else is an
//! exact event name.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use globset::{Glob, GlobMatcher};
use parking_lot::RwLock;

use crate::client::Client;

struct GlobSubscribers {
    matcher: GlobMatcher,
    clients: RwLock<HashSet<Arc<Client>>>,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    exact: DashMap<String, RwLock<HashSet<Arc<Client>>>>,
    glob: DashMap<String, GlobSubscribers>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `client` to `pattern`. Idempotent: a repeat subscription
    /// from the same client returns `false` and mutates nothing further.
    pub fn subscribe(&self, client: &Arc<Client>, pattern: &str) -> bool {
        let is_new = {
            let mut sets = client.sets.lock();
            sets.subscribes.insert(pattern.to_owned())
        };
        if !is_new {
            return false;
        }

        if pattern.contains('*') {
            let glob = match Glob::new(pattern) {
                Ok(glob) => glob,
                Err(err) => {
                    tracing::warn!(%pattern, error = %err, "invalid glob pattern; treating as literal");
                    return self.insert_exact(client, pattern);
                }
            };
            self.glob
                .entry(pattern.to_owned())
                .or_insert_with(|| GlobSubscribers {
                    matcher: glob.compile_matcher(),
                    clients: RwLock::new(HashSet::new()),
                })
                .clients
                .write()
                .insert(client.clone());
        } else {
            self.insert_exact(client, pattern);
        }
        true
    }

    fn insert_exact(&self, client: &Arc<Client>, pattern: &str) -> bool {
        self.exact
            .entry(pattern.to_owned())
            .or_default()
            .write()
            .insert(client.clone())
    }

    /// Returns the deduplicated union of exact and glob subscribers
    /// matching `event` (§4.4 "a subscriber ... receives the publish
    /// exactly once").
    pub fn forward(&self, event: &str) -> Vec<Arc<Client>> {
        let mut matched: HashSet<Arc<Client>> = HashSet::new();
        if let Some(set) = self.exact.get(event) {
            matched.extend(set.read().iter().cloned());
        }
        for entry in self.glob.iter() {
            if entry.value().matcher.is_match(event) {
                matched.extend(entry.value().clients.read().iter().cloned());
            }
        }
        matched.into_iter().collect()
    }

    /// Removes `client` from the map keyed by `pattern`, deleting the key
    /// if it becomes empty. Used by the disconnect protocol, which has
    /// already taken the client's subscribed-pattern set out from under its
    /// own lock (§4.2) — this method only touches the pattern-keyed maps.
    pub fn remove_pattern_for_client(&self, pattern: &str, client: &Arc<Client>) {
        if pattern.contains('*') {
            let now_empty = match self.glob.get(pattern) {
                Some(entry) => {
                    entry.clients.write().remove(client);
                    entry.clients.read().is_empty()
                }
                None => false,
            };
            if now_empty {
                self.glob.remove(pattern);
            }
        } else {
            let now_empty = match self.exact.get(pattern) {
                Some(entry) => {
                    entry.write().remove(client);
                    entry.read().is_empty()
                }
                None => false,
            };
            if now_empty {
                self.exact.remove(pattern);
            }
        }
    }

    /// Snapshot for `cellaserv.list_events`: every known pattern paired with
    /// its current subscriber ids.
    pub fn list_events(&self) -> Vec<(String, Vec<Arc<Client>>)> {
        let mut events: Vec<(String, Vec<Arc<Client>>)> = self
            .exact
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().read().iter().cloned().collect()))
            .collect();
        events.extend(
            self.glob
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clients.read().iter().cloned().collect())),
        );
        events
    }
}
