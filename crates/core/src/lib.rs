//! Connector console core types: managed entities and the pagination model
//! shared by every list view.

#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod pagination;

pub use pagination::{OrderBy, PaginatedRequest, PaginatedResponse, RequestPatch, SearchQuery, SortDirection};

pub mod prelude {
    pub use super::{
        Cluster, Connector, ConnectorKind, ConnectorType, DesiredState, Entity, ErrorHandler,
        KafkaInstance, Namespace, NewConnector, ServiceAccount,
    };
    pub use super::pagination::{OrderBy, PaginatedRequest, PaginatedResponse, RequestPatch, SearchQuery, SortDirection};
}

/// Anything that can be listed and selected by id.
pub trait Entity: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    /// Labels matched by `SearchQuery::label`. Most entities carry none.
    fn labels(&self) -> &[String] { &[] }
    fn created_at(&self) -> Option<DateTime<Utc>> { None }
}

/// Desired lifecycle state requested for a connector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    Ready,
    Stopped,
    Deleted,
}

impl std::fmt::Display for DesiredState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DesiredState::Ready => "ready",
            DesiredState::Stopped => "stopped",
            DesiredState::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// How a running connector reacts to records it cannot process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandler {
    Stop {},
    Log {},
    DeadLetterQueue { topic: String },
}

impl Default for ErrorHandler {
    fn default() -> Self { ErrorHandler::Stop {} }
}

impl ErrorHandler {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorHandler::Stop {} => "stop",
            ErrorHandler::Log {} => "log",
            ErrorHandler::DeadLetterQueue { .. } => "dead_letter_queue",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceAccount {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

impl ServiceAccount {
    pub fn is_complete(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KafkaInstance {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub cloud_provider: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub bootstrap_server_host: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Entity for KafkaInstance {
    fn id(&self) -> &str { &self.id }
    fn name(&self) -> &str { &self.name }
    fn created_at(&self) -> Option<DateTime<Utc>> { self.created_at }
}

/// Compute environment that hosts namespaces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Entity for Cluster {
    fn id(&self) -> &str { &self.id }
    fn name(&self) -> &str { &self.name }
    fn created_at(&self) -> Option<DateTime<Utc>> { self.created_at }
}

/// Deployment target for connectors, owned by a cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Namespace {
    pub id: String,
    pub name: String,
    pub cluster_id: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub status: String,
    /// Evaluation namespaces expire.
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Entity for Namespace {
    fn id(&self) -> &str { &self.id }
    fn name(&self) -> &str { &self.name }
    fn created_at(&self) -> Option<DateTime<Utc>> { self.created_at }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorKind {
    Source,
    Sink,
}

/// Catalog entry describing a kind of connector and its configuration schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectorType {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Optional features of the connector type, e.g. `error_handler`.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// JSON schema of the connector-specific configuration.
    #[serde(default)]
    pub schema: serde_json::Value,
}

pub const CAPABILITY_ERROR_HANDLER: &str = "error_handler";

impl ConnectorType {
    pub fn kind(&self) -> ConnectorKind {
        if self.labels.iter().any(|l| l == "sink") { ConnectorKind::Sink } else { ConnectorKind::Source }
    }

    pub fn supports_error_handler(&self) -> bool {
        self.capabilities.iter().any(|c| c == CAPABILITY_ERROR_HANDLER)
    }
}

impl Entity for ConnectorType {
    fn id(&self) -> &str { &self.id }
    fn name(&self) -> &str { &self.name }
    fn labels(&self) -> &[String] { &self.labels }
}

/// A configured connector instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Connector {
    pub id: String,
    pub name: String,
    pub connector_type_id: String,
    pub kafka_id: String,
    pub namespace_id: String,
    pub desired_state: DesiredState,
    /// Observed state reported by the data plane (`ready`, `assigning`, `failed`...).
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub service_account: ServiceAccount,
    #[serde(default)]
    pub connector: serde_json::Value,
    #[serde(default)]
    pub error_handler: Option<ErrorHandler>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

impl Entity for Connector {
    fn id(&self) -> &str { &self.id }
    fn name(&self) -> &str { &self.name }
    fn created_at(&self) -> Option<DateTime<Utc>> { self.created_at }
}

/// Payload of the connector creation call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewConnector {
    pub name: String,
    pub connector_type_id: String,
    pub kafka_id: String,
    pub namespace_id: String,
    pub desired_state: DesiredState,
    pub service_account: ServiceAccount,
    pub connector: serde_json::Value,
    pub error_handler: Option<ErrorHandler>,
}
