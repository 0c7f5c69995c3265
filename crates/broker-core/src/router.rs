//! Message dispatch (§4.7): the Router owns no socket, only the registries
//! and the policies that tie them together. One [`Router`] is shared across
//! every connection.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use prost::Message as _;
use serde_json::json;
use tokio::sync::{mpsc, Notify};

use crate::cellaserv::{
    ClientInfo, EventInfo, GetLogsRequest, NameClientRequest, RegisterServiceRequest, ServiceInfo, SpyRequest,
    WhoamiResponse,
};
use crate::client::Client;
use crate::error::ReplyErrorType;
use crate::model::{ClientId, ServiceKey, CELLASERV_SERVICE_NAME};
use crate::proto;
use crate::publish_log::PublishLog;
use crate::registry::pending::{self, Resolution};
use crate::registry::Registries;
use crate::wire::{self, Envelope};

pub struct Router {
    registries: Arc<Registries>,
    publish_log: Option<Arc<PublishLog>>,
    request_timeout: Duration,
    shutdown: Arc<Notify>,
    version: &'static str,
}

impl Router {
    pub fn new(
        registries: Arc<Registries>,
        publish_log: Option<Arc<PublishLog>>,
        request_timeout: Duration,
        shutdown: Arc<Notify>,
    ) -> Self {
        let router = Self {
            registries,
            publish_log,
            request_timeout,
            shutdown,
            version: env!("CARGO_PKG_VERSION"),
        };
        router.register_internal_cellaserv_service();
        router
    }

    /// Registers `cellaserv` in the `ServiceRegistry` as if a client had
    /// done it (§4.8), so `list_services` reports it and duplicate-name
    /// bookkeeping sees it. Requests to it are short-circuited in
    /// [`Self::handle_request`] before any lookup, so this entry's outbound
    /// channel is never read.
    fn register_internal_cellaserv_service(&self) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let internal = Client::new(ClientId::new(CELLASERV_SERVICE_NAME), tx);
        self.registries
            .services
            .register(internal, ServiceKey::new(CELLASERV_SERVICE_NAME, ""));
        tracing::info!("cellaserv introspection service registered; broker fully started");
    }

    pub fn registries(&self) -> &Arc<Registries> {
        &self.registries
    }

    pub fn shutdown_signal(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    pub fn dispatch(&self, client: &Arc<Client>, raw: bytes::Bytes, envelope: Envelope) {
        match envelope {
            Envelope::Register(reg) => self.handle_register(client, reg),
            Envelope::Subscribe(sub) => self.handle_subscribe(client, sub),
            Envelope::Publish(publish) => self.handle_publish(client, &raw, publish),
            Envelope::Request(request) => self.handle_request(client, raw, request),
            Envelope::Reply(reply) => self.handle_reply(raw, reply),
        }
    }

    fn handle_register(&self, client: &Arc<Client>, reg: proto::Register) {
        self.do_register(client, reg.name, reg.identification);
    }

    fn do_register(&self, client: &Arc<Client>, name: String, identification: String) {
        let key = ServiceKey::new(name, identification);
        let (_, displaced) = self.registries.services.register(client.clone(), key.clone());
        client.sets.lock().services.insert(key.clone());

        if let Some(displaced) = displaced {
            displaced.client.sets.lock().services.remove(&key);
            tracing::info!(service = %key, former_owner = %displaced.client.describe(), "service displaced by re-registration");
            self.publish_event("log.cellaserv.lost-service", json!({ "service": key.to_string() }));
        }

        tracing::info!(service = %key, client = %client.describe(), "service registered");
        self.publish_event(
            "log.cellaserv.new-service",
            json!({ "service": key.to_string(), "client": client.id().as_str() }),
        );
    }

    fn handle_subscribe(&self, client: &Arc<Client>, sub: proto::Subscribe) {
        if self.registries.subscriptions.subscribe(client, &sub.event) {
            tracing::info!(client = %client.describe(), pattern = %sub.event, "new subscriber");
            self.publish_event(
                "log.cellaserv.new-subscriber",
                json!({ "client": client.id().as_str(), "event": sub.event }),
            );
        }
    }

    fn handle_publish(&self, client: &Arc<Client>, raw: &bytes::Bytes, publish: proto::Publish) {
        let subscribers = self.registries.subscriptions.forward(&publish.event);
        if !subscribers.is_empty() {
            let framed = wire::frame_bytes(raw);
            for subscriber in subscribers {
                subscriber.send_frame(framed.clone());
            }
        }
        tracing::trace!(client = %client.describe(), event = %publish.event, "publish routed");
        if let Some(log) = &self.publish_log {
            log.record(&publish.event, &publish.data);
        }
    }

    fn handle_request(&self, client: &Arc<Client>, raw: bytes::Bytes, request: proto::Request) {
        if request.service_name == CELLASERV_SERVICE_NAME {
            self.handle_cellaserv_request(client, request);
            return;
        }

        let entry = match self
            .registries
            .services
            .lookup(&request.service_name, &request.service_identification)
        {
            Some(entry) => entry,
            None => {
                let error = if self.registries.services.any_with_name(&request.service_name) {
                    ReplyErrorType::InvalidIdentification
                } else {
                    ReplyErrorType::NoSuchService
                };
                self.send_error_reply(client, request.id, error);
                return;
            }
        };

        if self.registries.pending.contains(request.id) {
            tracing::warn!(request_id = request.id, "duplicate in-flight request id; rejected");
            self.send_error_reply(client, request.id, ReplyErrorType::Custom("duplicate request id".into()));
            return;
        }

        let spies = entry.spies.read().clone();
        let framed = wire::frame_bytes(&raw);
        entry.client.send_frame(framed.clone());
        for spy in &spies {
            spy.send_frame(framed.clone());
        }

        let cancel_rx = self
            .registries
            .pending
            .insert(request.id, client.clone(), spies, self.request_timeout);

        let registries = self.registries.clone();
        let timeout = self.request_timeout;
        let request_id = request.id;
        tokio::spawn(async move {
            if pending::run_timeout(timeout, cancel_rx).await {
                if let Resolution::Found(entry) = registries.pending.complete(request_id) {
                    tracing::warn!(request_id, sender = %entry.sender.describe(), "request timed out");
                    let frame = wire::encode_message_frame(
                        proto::message::Type::Reply,
                        proto::Reply {
                            id: request_id,
                            data: Vec::new(),
                            error: Some(ReplyErrorType::Timeout.into_proto()),
                        }
                        .encode_to_vec(),
                    );
                    entry.sender.send_frame(frame.clone());
                    for spy in &entry.spies {
                        spy.send_frame(frame.clone());
                    }
                }
            }
        });
    }

    fn handle_reply(&self, raw: bytes::Bytes, reply: proto::Reply) {
        match self.registries.pending.complete(reply.id) {
            Resolution::Found(entry) => {
                let framed = wire::frame_bytes(&raw);
                entry.sender.send_frame(framed.clone());
                for spy in &entry.spies {
                    spy.send_frame(framed.clone());
                }
            }
            Resolution::NotFound => {
                tracing::debug!(request_id = reply.id, "reply for unknown or already-resolved request id; dropped");
            }
        }
    }

    fn send_error_reply(&self, client: &Arc<Client>, id: u64, error: ReplyErrorType) {
        let frame = wire::encode_message_frame(
            proto::message::Type::Reply,
            proto::Reply {
                id,
                data: Vec::new(),
                error: Some(error.into_proto()),
            }
            .encode_to_vec(),
        );
        client.send_frame(frame);
    }

    fn send_success_reply(&self, client: &Arc<Client>, id: u64, data: Vec<u8>) {
        let frame = wire::encode_message_frame(
            proto::message::Type::Reply,
            proto::Reply { id, data, error: None }.encode_to_vec(),
        );
        client.send_frame(frame);
    }

    pub(crate) fn publish_event(&self, event: &str, payload: serde_json::Value) {
        let data = serde_json::to_vec(&payload).unwrap_or_default();
        self.do_publish(event, &data);
    }

    fn do_publish(&self, event: &str, data: &[u8]) {
        let publish = proto::Publish {
            event: event.to_owned(),
            data: data.to_vec(),
        };
        let frame = wire::encode_message_frame(proto::message::Type::Publish, publish.encode_to_vec());
        for subscriber in self.registries.subscriptions.forward(event) {
            subscriber.send_frame(frame.clone());
        }
        if let Some(log) = &self.publish_log {
            log.record(event, data);
        }
    }

    fn handle_cellaserv_request(&self, client: &Arc<Client>, request: proto::Request) {
        let method = request.method.replace('-', "_");
        match self.dispatch_cellaserv_method(client, &method, &request.data) {
            Ok(data) => self.send_success_reply(client, request.id, data),
            Err(error) => self.send_error_reply(client, request.id, error),
        }
    }

    fn dispatch_cellaserv_method(
        &self,
        client: &Arc<Client>,
        method: &str,
        data: &[u8],
    ) -> Result<Vec<u8>, ReplyErrorType> {
        match method {
            "describe_conn" | "name_client" => {
                let req: NameClientRequest = parse_args(data)?;
                tracing::info!(client = %client.describe(), new_name = %req.name, "client renamed");
                client.set_name(req.name);
                Ok(Vec::new())
            }

            "list_services" => {
                let services: Vec<ServiceInfo> = self
                    .registries
                    .services
                    .list()
                    .into_iter()
                    .map(|(key, entry)| ServiceInfo {
                        client: entry.client.id().as_str().to_owned(),
                        name: key.name.to_string(),
                        identification: key.identification.to_string(),
                    })
                    .collect();
                to_json(&services)
            }

            "list_clients" | "list_connections" => {
                let clients: Vec<ClientInfo> = self
                    .registries
                    .clients
                    .list()
                    .into_iter()
                    .map(|c| ClientInfo {
                        id: c.id().as_str().to_owned(),
                        name: c.name(),
                    })
                    .collect();
                to_json(&clients)
            }

            "list_events" => {
                let events: Vec<EventInfo> = self
                    .registries
                    .subscriptions
                    .list_events()
                    .into_iter()
                    .map(|(event, subscribers)| EventInfo {
                        event,
                        subscribers: subscribers.iter().map(|c| c.id().as_str().to_owned()).collect(),
                    })
                    .collect();
                to_json(&events)
            }

            "get_logs" => {
                let req: GetLogsRequest = parse_args(data)?;
                let log = self
                    .publish_log
                    .as_ref()
                    .ok_or_else(|| ReplyErrorType::Custom("publish logging is disabled".into()))?;
                let logs = log.get_logs(&req.pattern)?;
                let as_strings: BTreeMap<String, String> = logs
                    .into_iter()
                    .map(|(name, contents)| (name, String::from_utf8_lossy(&contents).into_owned()))
                    .collect();
                to_json(&as_strings)
            }

            "spy" => {
                let req: SpyRequest = parse_args(data)?;
                self.add_spy(req)?;
                Ok(Vec::new())
            }

            "register_service" => {
                let req: RegisterServiceRequest = parse_args(data)?;
                self.do_register(client, req.name, req.identification);
                Ok(Vec::new())
            }

            "whoami" => to_json(&WhoamiResponse {
                id: client.id().as_str().to_owned(),
                name: client.name(),
            }),

            "version" => Ok(self.version.as_bytes().to_vec()),

            "shutdown" => {
                tracing::info!("shutdown requested via cellaserv");
                self.shutdown.notify_waiters();
                Ok(Vec::new())
            }

            _ => Err(ReplyErrorType::NoSuchMethod),
        }
    }

    fn add_spy(&self, req: SpyRequest) -> Result<(), ReplyErrorType> {
        let spy_client = self
            .registries
            .clients
            .get(&ClientId::new(req.client_id.as_str()))
            .ok_or_else(|| ReplyErrorType::Custom(format!("unknown client id {}", req.client_id)))?;

        let key = ServiceKey::new(req.service_name.clone(), req.service_identification.clone());
        if let Some(entry) = self
            .registries
            .services
            .lookup(&req.service_name, &req.service_identification)
        {
            entry.spies.write().push(spy_client.clone());
        }
        spy_client.sets.lock().spying.insert(key.clone());
        tracing::info!(spy = %spy_client.describe(), service = %key, "spy attached");
        Ok(())
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T, ReplyErrorType> {
    serde_json::from_slice(data).map_err(|err| {
        tracing::warn!(error = %err, "cellaserv request payload failed to decode");
        ReplyErrorType::BadArguments
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, ReplyErrorType> {
    serde_json::to_vec(value).map_err(|err| ReplyErrorType::Custom(format!("failed to encode response: {err}")))
}
