//! Connector console API façade.
//!
//! This crate defines the traits and error types the state machines depend on.
//! Transport-backed clients live outside this workspace; `FixtureApi` is the
//! in-process implementation used by the CLI and tests.

#![forbid(unsafe_code)]

use kcon_core::prelude::*;
use serde::{Deserialize, Serialize};

mod fixture;

pub use fixture::{FixtureApi, Fixtures, ListKind};

/// API errors, serializable so they can be surfaced verbatim to the UI layer.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Supplies an access token; invoked lazily for every API call.
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> ApiResult<String>;
}

/// Fixed token, for local runs and tests.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait::async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> ApiResult<String> { Ok(self.0.clone()) }
}

/// Connector management API surface consumed by the console.
#[async_trait::async_trait]
pub trait ConnectorsApi: Send + Sync {
    async fn list_connectors(&self, request: &PaginatedRequest) -> ApiResult<PaginatedResponse<Connector>>;

    async fn list_kafka_instances(&self, request: &PaginatedRequest) -> ApiResult<PaginatedResponse<KafkaInstance>>;

    async fn list_clusters(&self, request: &PaginatedRequest) -> ApiResult<PaginatedResponse<Cluster>>;

    async fn list_namespaces(&self, request: &PaginatedRequest) -> ApiResult<PaginatedResponse<Namespace>>;

    async fn list_connector_types(&self, request: &PaginatedRequest) -> ApiResult<PaginatedResponse<ConnectorType>>;

    /// Fetch one connector by id.
    async fn get_connector(&self, id: &str) -> ApiResult<Connector>;

    /// Request `desired_state = ready`; returns the updated entity.
    async fn start_connector(&self, id: &str) -> ApiResult<Connector>;

    /// Request `desired_state = stopped`; returns the updated entity.
    async fn stop_connector(&self, id: &str) -> ApiResult<Connector>;

    /// Request deletion; returns the entity with `desired_state = deleted`.
    async fn delete_connector(&self, id: &str) -> ApiResult<Connector>;

    async fn create_connector(&self, connector: &NewConnector) -> ApiResult<Connector>;
}
