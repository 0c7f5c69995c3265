//! The disconnect protocol (§4.2): runs once per client, exactly when its
//! read loop exits. Takes the client's own lock exactly once — via
//! `std::mem::take` — to snapshot and clear its `services`/`spying`/
//! `subscribes` sets, then releases it before touching any registry, so no
//! registry callback can ever try to reacquire a lock this call already
//! holds.

use std::mem;
use std::sync::Arc;

use serde_json::json;

use crate::client::{Client, ClientSets};
use crate::router::Router;

/// Runs the full teardown for `client`. Safe to call exactly once per
/// client; the registries and the client's own sets are left empty
/// afterward regardless of how many of the four steps found anything to do.
pub fn disconnect(router: &Router, client: Arc<Client>) {
    client.mark_draining();
    let ClientSets {
        services,
        spying,
        subscribes,
    } = mem::take(&mut *client.sets.lock());

    let registries = router.registries();

    // Step 1: services this client owned.
    for key in services {
        if registries.services.remove(&key).is_some() {
            tracing::info!(client = %client.describe(), service = %key, "service removed on disconnect");
            router.publish_event("log.cellaserv.lost-service", json!({ "service": key.to_string() }));
            // §9 open-question decision: spies of a vanished service keep
            // their connection open rather than being forcibly closed; their
            // `spying` entry simply now points at nothing live.
        }
    }

    // Step 2: subscriptions held by this client.
    for pattern in subscribes {
        registries.subscriptions.remove_pattern_for_client(&pattern, &client);
        tracing::info!(client = %client.describe(), pattern = %pattern, "subscriber removed on disconnect");
        router.publish_event(
            "log.cellaserv.lost-subscriber",
            json!({ "client": client.id().as_str(), "event": pattern }),
        );
    }

    // Step 3: services this client was spying on.
    for key in spying {
        if let Some(entry) = registries.services.lookup(&key.name, &key.identification) {
            entry.remove_spy(&client);
        }
    }

    // Pending requests sent by this client have nowhere to deliver their
    // eventual reply; drop them now rather than waiting for their timeout.
    // Not a literal step of §4.2's four, but required by §3's pending-request
    // lifecycle rule ("lives until reply, timeout, or sender disconnect").
    let abandoned = registries.pending.remove_by_sender(&client);
    if !abandoned.is_empty() {
        tracing::debug!(client = %client.describe(), count = abandoned.len(), "abandoned pending requests on disconnect");
    }

    // Step 4: the client itself.
    registries.clients.remove(client.id());
    client.mark_closed();
    tracing::info!(client = %client.describe(), "client disconnected");
    router.publish_event("log.cellaserv.lost-client", json!({ "client": client.id().as_str() }));
}
