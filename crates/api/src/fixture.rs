//! In-memory implementation of [`ConnectorsApi`] backed by fixture data.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use kcon_core::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{ApiError, ApiResult, ConnectorsApi, StaticToken, TokenProvider};

const DEMO_FIXTURES: &str = include_str!("../fixtures/demo.json");

/// Seed data for [`FixtureApi`]. Loadable from YAML or JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixtures {
    #[serde(default)]
    pub connectors: Vec<Connector>,
    #[serde(default)]
    pub kafkas: Vec<KafkaInstance>,
    #[serde(default)]
    pub clusters: Vec<Cluster>,
    #[serde(default)]
    pub namespaces: Vec<Namespace>,
    #[serde(default)]
    pub connector_types: Vec<ConnectorType>,
}

impl Fixtures {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> { serde_yaml::from_str(text) }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> { serde_json::from_str(text) }

    /// Built-in demo data: `telegram-source` connector type, `badwords` Kafka,
    /// `megalord` cluster/namespace.
    pub fn demo() -> Result<Self, serde_json::Error> { Self::from_json(DEMO_FIXTURES) }
}

/// List endpoints, used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Connectors,
    Kafkas,
    Clusters,
    Namespaces,
    ConnectorTypes,
}

impl ListKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Connectors => "connectors",
            ListKind::Kafkas => "kafkas",
            ListKind::Clusters => "clusters",
            ListKind::Namespaces => "namespaces",
            ListKind::ConnectorTypes => "connector_types",
        }
    }
}

pub struct FixtureApi {
    data: Mutex<Fixtures>,
    auth: Arc<dyn TokenProvider>,
    latency: Option<Duration>,
    list_failures: Mutex<HashMap<ListKind, ApiError>>,
    action_failures: Mutex<HashSet<String>>,
    fail_create: Mutex<Option<ApiError>>,
}

impl FixtureApi {
    pub fn new(data: Fixtures) -> Self {
        Self::with_auth(data, Arc::new(StaticToken("fixture-token".into())))
    }

    pub fn with_auth(data: Fixtures, auth: Arc<dyn TokenProvider>) -> Self {
        Self {
            data: Mutex::new(data),
            auth,
            latency: None,
            list_failures: Mutex::new(HashMap::new()),
            action_failures: Mutex::new(HashSet::new()),
            fail_create: Mutex::new(None),
        }
    }

    /// Delay every call, to exercise cancellation and loading states.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make a list endpoint fail with `error` until cleared with `None`.
    pub fn set_list_failure(&self, kind: ListKind, error: Option<ApiError>) {
        let mut map = lock(&self.list_failures);
        match error {
            Some(e) => { map.insert(kind, e); }
            None => { map.remove(&kind); }
        }
    }

    /// Make start/stop/delete fail for one connector id.
    pub fn set_action_failure(&self, connector_id: &str, fail: bool) {
        let mut set = lock(&self.action_failures);
        if fail { set.insert(connector_id.to_string()); } else { set.remove(connector_id); }
    }

    pub fn set_create_failure(&self, error: Option<ApiError>) {
        *lock(&self.fail_create) = error;
    }

    /// Copy of the current data, including created/updated connectors.
    pub fn snapshot(&self) -> Fixtures {
        lock(&self.data).clone()
    }

    async fn authorize(&self) -> ApiResult<()> {
        let token = self.auth.token().await?;
        if token.trim().is_empty() {
            return Err(ApiError::Unauthorized("empty access token".into()));
        }
        if let Some(d) = self.latency {
            tokio::time::sleep(d).await;
        }
        Ok(())
    }

    async fn list<T: Entity>(
        &self,
        kind: ListKind,
        request: &PaginatedRequest,
        pick: impl FnOnce(&Fixtures) -> Vec<T>,
    ) -> ApiResult<PaginatedResponse<T>> {
        let t0 = Instant::now();
        self.authorize().await?;
        if let Some(e) = lock(&self.list_failures).get(&kind).cloned() {
            debug!(list = kind.as_str(), error = %e, "fixture: injected list failure");
            metrics::counter!("fixture_list_errors_total", 1);
            return Err(e);
        }
        let items = pick(&lock(&self.data));
        let resp = paginate(items, request);
        debug!(list = kind.as_str(), page = resp.page, total = resp.total, took_ms = %t0.elapsed().as_millis(), "fixture: list ok");
        Ok(resp)
    }

    async fn transition(&self, id: &str, desired: DesiredState) -> ApiResult<Connector> {
        self.authorize().await?;
        if lock(&self.action_failures).contains(id) {
            return Err(ApiError::Internal(format!("connector {} rejected {} request", id, desired)));
        }
        let mut data = lock(&self.data);
        let pos = data
            .connectors
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| ApiError::NotFound(format!("connector {}", id)))?;
        if desired == DesiredState::Deleted {
            let mut removed = data.connectors.remove(pos);
            removed.desired_state = DesiredState::Deleted;
            removed.state = "deleting".into();
            info!(id = %id, "fixture: connector deleted");
            return Ok(removed);
        }
        let c = &mut data.connectors[pos];
        c.desired_state = desired;
        c.state = match desired {
            DesiredState::Ready => "provisioning".into(),
            _ => "deprovisioning".into(),
        };
        c.modified_at = Some(chrono::Utc::now());
        info!(id = %id, desired = %desired, "fixture: connector desired state updated");
        Ok(c.clone())
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Filter, sort and slice `items` the way the remote API does.
pub(crate) fn paginate<T: Entity>(items: Vec<T>, request: &PaginatedRequest) -> PaginatedResponse<T> {
    let mut items: Vec<T> = match &request.query {
        Some(q) => {
            let name = q.name.as_deref().map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty());
            let label = q.label.as_deref().map(str::trim).filter(|s| !s.is_empty());
            items
                .into_iter()
                .filter(|it| name.as_deref().map(|n| it.name().to_lowercase().contains(n)).unwrap_or(true))
                .filter(|it| label.map(|l| it.labels().iter().any(|x| x == l)).unwrap_or(true))
                .collect()
        }
        None => items,
    };
    if let Some(order) = &request.order_by {
        match order.field.as_str() {
            "name" => items.sort_by(|a, b| a.name().cmp(b.name())),
            "created_at" => items.sort_by_key(|it| it.created_at()),
            _ => {}
        }
        if order.direction == SortDirection::Desc {
            items.reverse();
        }
    }
    let total = items.len() as u64;
    let size = request.size.max(1) as usize;
    let start = (request.page.max(1) as usize - 1).saturating_mul(size);
    let page_items: Vec<T> = items.into_iter().skip(start).take(size).collect();
    PaginatedResponse::new(page_items, request.page, request.size, total)
}

#[async_trait::async_trait]
impl ConnectorsApi for FixtureApi {
    async fn list_connectors(&self, request: &PaginatedRequest) -> ApiResult<PaginatedResponse<Connector>> {
        self.list(ListKind::Connectors, request, |d| d.connectors.clone()).await
    }

    async fn list_kafka_instances(&self, request: &PaginatedRequest) -> ApiResult<PaginatedResponse<KafkaInstance>> {
        self.list(ListKind::Kafkas, request, |d| d.kafkas.clone()).await
    }

    async fn list_clusters(&self, request: &PaginatedRequest) -> ApiResult<PaginatedResponse<Cluster>> {
        self.list(ListKind::Clusters, request, |d| d.clusters.clone()).await
    }

    async fn list_namespaces(&self, request: &PaginatedRequest) -> ApiResult<PaginatedResponse<Namespace>> {
        self.list(ListKind::Namespaces, request, |d| d.namespaces.clone()).await
    }

    async fn list_connector_types(&self, request: &PaginatedRequest) -> ApiResult<PaginatedResponse<ConnectorType>> {
        self.list(ListKind::ConnectorTypes, request, |d| d.connector_types.clone()).await
    }

    async fn get_connector(&self, id: &str) -> ApiResult<Connector> {
        self.authorize().await?;
        lock(&self.data)
            .connectors
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("connector {}", id)))
    }

    async fn start_connector(&self, id: &str) -> ApiResult<Connector> {
        self.transition(id, DesiredState::Ready).await
    }

    async fn stop_connector(&self, id: &str) -> ApiResult<Connector> {
        self.transition(id, DesiredState::Stopped).await
    }

    async fn delete_connector(&self, id: &str) -> ApiResult<Connector> {
        self.transition(id, DesiredState::Deleted).await
    }

    async fn create_connector(&self, connector: &NewConnector) -> ApiResult<Connector> {
        self.authorize().await?;
        if let Some(e) = lock(&self.fail_create).clone() {
            return Err(e);
        }
        let mut data = lock(&self.data);
        if data.connectors.iter().any(|c| c.name == connector.name) {
            return Err(ApiError::Conflict(format!("connector name '{}' already in use", connector.name)));
        }
        if !data.connector_types.iter().any(|t| t.id == connector.connector_type_id) {
            return Err(ApiError::Validation(format!("unknown connector type '{}'", connector.connector_type_id)));
        }
        let now = chrono::Utc::now();
        let created = Connector {
            id: uuid::Uuid::new_v4().to_string(),
            name: connector.name.clone(),
            connector_type_id: connector.connector_type_id.clone(),
            kafka_id: connector.kafka_id.clone(),
            namespace_id: connector.namespace_id.clone(),
            desired_state: connector.desired_state,
            state: "assigning".into(),
            service_account: ServiceAccount { client_id: connector.service_account.client_id.clone(), client_secret: String::new() },
            connector: connector.connector.clone(),
            error_handler: connector.error_handler.clone(),
            created_at: Some(now),
            modified_at: Some(now),
        };
        data.connectors.push(created.clone());
        info!(id = %created.id, name = %created.name, "fixture: connector created");
        Ok(created)
    }
}
