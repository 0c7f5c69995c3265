//! Outstanding request tracking and timeouts (§4.6).
//!
//! Each pending request owns a `oneshot::Sender<()>` paired with its timer
//! task's receiver. Completing a request (reply arrives, or the sender
//! disconnects) is just a map removal; dropping the entry drops the sender,
//! which wakes the timer task's `select!` with a closed-channel error so it
//! exits without firing the timeout reply. No explicit cancellation message
//! is ever sent.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::client::Client;

/// One outstanding request: who asked, who is spying on the answering
/// service (so the timeout reply can be fanned out to them too, per the
/// recorded decision in SPEC_FULL.md §9), and the cancel handle for its
/// timer task.
pub struct PendingEntry {
    pub sender: Arc<Client>,
    pub spies: Vec<Arc<Client>>,
    cancel: oneshot::Sender<()>,
}

#[derive(Default)]
pub struct PendingRequests {
    pending: DashMap<u64, PendingEntry>,
}

/// What the caller should do once a pending request is resolved one way or
/// another.
pub enum Resolution {
    Found(PendingEntry),
    NotFound,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers request `id` as pending with the service's spy snapshot
    /// taken at dispatch time, and returns the cancellation receiver paired
    /// with this entry's timer. The caller spawns [`run_timeout`] with it.
    pub fn insert(&self, id: u64, sender: Arc<Client>, spies: Vec<Arc<Client>>, timeout: Duration) -> oneshot::Receiver<()> {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.pending.insert(
            id,
            PendingEntry {
                sender,
                spies,
                cancel: cancel_tx,
            },
        );
        cancel_rx
    }

    /// Completes request `id` (a reply arrived). Removing the entry drops
    /// its `cancel` sender, which is how the matching timer task learns to
    /// stand down.
    pub fn complete(&self, id: u64) -> Resolution {
        match self.pending.remove(&id) {
            Some((_, entry)) => Resolution::Found(entry),
            None => Resolution::NotFound,
        }
    }

    /// Removes every pending request whose sender is `client`, used by the
    /// disconnect protocol (the reply, once it eventually arrives, has
    /// nowhere to go). Returns the removed ids for diagnostics/logging.
    pub fn remove_by_sender(&self, client: &Arc<Client>) -> Vec<u64> {
        let ids: Vec<u64> = self
            .pending
            .iter()
            .filter(|entry| Arc::ptr_eq(&entry.sender, client) || entry.sender.id() == client.id())
            .map(|entry| *entry.key())
            .collect();
        for id in &ids {
            self.pending.remove(id);
        }
        ids
    }

    pub fn contains(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Races the request deadline against completion. Spawned by the router for
/// every pending request; returns `true` if the deadline won the race (the
/// caller should then synthesize and forward the timeout reply).
pub async fn run_timeout(deadline: Duration, cancel: oneshot::Receiver<()>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(deadline) => true,
        _ = cancel => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn test_client(id: &str) -> Arc<Client> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Client::new(id.into(), tx)
    }

    #[tokio::test]
    async fn completing_a_request_cancels_its_timer() {
        let pending = PendingRequests::new();
        let sender = test_client("a");
        let cancel_rx = pending.insert(1, sender, Vec::new(), Duration::from_secs(60));

        let timer = tokio::spawn(run_timeout(Duration::from_secs(60), cancel_rx));

        assert!(pending.contains(1));
        match pending.complete(1) {
            Resolution::Found(_) => {}
            Resolution::NotFound => panic!("expected entry"),
        }

        let timed_out = timer.await.unwrap();
        assert!(!timed_out, "completion should cancel the timer, not let it fire");
    }

    #[tokio::test]
    async fn uncompleted_request_times_out() {
        let pending = PendingRequests::new();
        let sender = test_client("a");
        let cancel_rx = pending.insert(1, sender, Vec::new(), Duration::from_millis(5));

        let timed_out = run_timeout(Duration::from_millis(5), cancel_rx).await;
        assert!(timed_out);
    }

    #[test]
    fn remove_by_sender_clears_only_that_senders_requests() {
        let pending = PendingRequests::new();
        let a = test_client("a");
        let b = test_client("b");
        let _ = pending.insert(1, a.clone(), Vec::new(), Duration::from_secs(60));
        let _ = pending.insert(2, b.clone(), Vec::new(), Duration::from_secs(60));

        let removed = pending.remove_by_sender(&a);
        assert_eq!(removed, vec![1]);
        assert!(!pending.contains(1));
        assert!(pending.contains(2));
    }
}
