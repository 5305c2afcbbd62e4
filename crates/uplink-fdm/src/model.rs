//! Typed records for the FDM REST payloads.
//!
//! Only the fields uplink reads or writes are modelled; everything else in
//! the device's JSON is ignored on decode.

use serde::{Deserialize, Serialize};

/// Name of the one static route uplink manages.
pub const ROUTE_NAME: &str = "route_BACKUP";

/// Description stamped on every object uplink creates.
pub const OBJECT_DESCRIPTION: &str = "Created by ISP Failover automation";

/// Virtual router holding the routes uplink manages.
pub const GLOBAL_ROUTER: &str = "Global";

/// Terminal success state of a deployment task.
pub const DEPLOYED: &str = "DEPLOYED";

pub const ROUTE_METRIC: u32 = 1;

pub type VirtualRouterId = String;

/// Every collection endpoint wraps its records in `items`.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemList<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

// ── Auth ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PasswordGrant<'a> {
    pub grant_type: &'static str,
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

// ── Routing ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VirtualRouter {
    pub id: String,
    pub name: String,
}

/// Reference to another object, as embedded in routes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectRef {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
}

impl ObjectRef {
    pub fn new(id: impl Into<String>, kind: &str, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.to_string(),
            name: name.into(),
        }
    }
}

/// A static route as returned by the static-route collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StaticRouteEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub iface: Option<ObjectRef>,
    #[serde(default)]
    pub networks: Vec<ObjectRef>,
    #[serde(default)]
    pub gateway: Option<ObjectRef>,
    #[serde(default)]
    pub metric_value: Option<u32>,
}

/// Body of a static-route creation request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteDescriptor {
    pub name: String,
    pub description: String,
    pub iface: ObjectRef,
    pub networks: Vec<ObjectRef>,
    pub gateway: ObjectRef,
    pub metric_value: u32,
    pub ip_type: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Interface {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hardware_name: String,
}

// ── Network objects ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectKind {
    Host,
    Network,
}

/// Body of a network-object creation request.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewNetworkObject {
    pub name: String,
    pub description: String,
    pub sub_type: ObjectKind,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl NewNetworkObject {
    pub fn new(name: &str, sub_type: ObjectKind, value: &str) -> Self {
        Self {
            name: name.to_string(),
            description: OBJECT_DESCRIPTION.to_string(),
            sub_type,
            value: value.to_string(),
            kind: "networkobject",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkObject {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sub_type: Option<ObjectKind>,
    pub value: String,
}

// ── Deployment ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentTask {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub state: String,
}

// ── Errors ────────────────────────────────────────────────────────

/// Error body returned with 4xx/5xx responses.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ErrorBody {
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub messages: Vec<ErrorMessage>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ErrorMessage {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: String,
}
