//! JSON payloads exchanged with the `cellaserv` introspection pseudo-service
//! (§4.8). Dispatch itself lives on [`crate::router::Router`]; this module
//! only holds the wire-level request/response shapes.

use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct NameClientRequest {
    pub name: String,
}

#[derive(Serialize)]
pub struct ServiceInfo {
    pub client: String,
    pub name: String,
    pub identification: String,
}

#[derive(Serialize)]
pub struct ClientInfo {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Serialize)]
pub struct EventInfo {
    pub event: String,
    pub subscribers: Vec<String>,
}

#[derive(Deserialize)]
pub struct GetLogsRequest {
    pub pattern: String,
}

#[derive(Deserialize)]
pub struct SpyRequest {
    pub service_name: String,
    #[serde(default)]
    pub service_identification: String,
    pub client_id: String,
}

#[derive(Deserialize)]
pub struct RegisterServiceRequest {
    pub name: String,
    #[serde(default)]
    pub identification: String,
}

#[derive(Serialize)]
pub struct WhoamiResponse {
    pub id: String,
    pub name: Option<String>,
}
