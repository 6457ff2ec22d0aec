//! Configurator resolution: which UI configures a connector type.
//!
//! A resolver either finds a custom configurator module (with its own list of
//! sub-steps), answers that none exists, or fails. The loader treats failure
//! exactly like "none exists" so the generic schema form is always reachable.

use std::sync::Arc;
use std::time::Instant;

use kcon_core::ConnectorType;
use kcon_query::CancelHandle;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Location of a remotely hosted configurator module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRef {
    pub remote_entry: String,
    pub scope: String,
    pub module: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfiguratorDescriptor {
    /// No custom UI; configure through the schema-driven form.
    Generic,
    Custom { steps: Vec<String>, module: ModuleRef },
}

impl ConfiguratorDescriptor {
    /// Named sub-steps, `None` for the generic form.
    pub fn steps(&self) -> Option<&[String]> {
        match self {
            ConfiguratorDescriptor::Generic => None,
            ConfiguratorDescriptor::Custom { steps, .. } => Some(steps),
        }
    }

    pub fn is_custom(&self) -> bool { matches!(self, ConfiguratorDescriptor::Custom { .. }) }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Unavailable {
    #[error("configurator for {connector_type} failed to load: {reason}")]
    Load { connector_type: String, reason: String },
    #[error("configurator for {0} declares no steps")]
    NoSteps(String),
}

#[async_trait::async_trait]
pub trait ComponentResolver: Send + Sync {
    async fn resolve(&self, connector_type: &ConnectorType) -> Result<ConfiguratorDescriptor, Unavailable>;
}

/// Resolves every connector type to the generic form.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericResolver;

#[async_trait::async_trait]
impl ComponentResolver for GenericResolver {
    async fn resolve(&self, _connector_type: &ConnectorType) -> Result<ConfiguratorDescriptor, Unavailable> {
        Ok(ConfiguratorDescriptor::Generic)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Exact connector type id, or a prefix ending in `*`.
    pub connector_type: String,
    #[serde(default)]
    pub steps: Vec<String>,
    pub module: ModuleRef,
    #[serde(default)]
    pub broken: bool,
}

impl RegistryEntry {
    fn matches(&self, id: &str) -> bool {
        match self.connector_type.strip_suffix('*') {
            Some(prefix) => id.starts_with(prefix),
            None => self.connector_type == id,
        }
    }
}

/// Registry of custom configurators, typically loaded from YAML:
///
/// ```yaml
/// configurators:
///   - connector_type: "debezium-*"
///     steps: [connection, tables]
///     module: { remote_entry: "https://cdn/debezium/remoteEntry.js", scope: debezium, module: "./config" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryResolver {
    #[serde(default)]
    pub configurators: Vec<RegistryEntry>,
}

impl RegistryResolver {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> { serde_yaml::from_str(text) }

    pub fn lookup(&self, connector_type_id: &str) -> Option<&RegistryEntry> {
        self.configurators.iter().find(|e| e.matches(connector_type_id))
    }
}

#[async_trait::async_trait]
impl ComponentResolver for RegistryResolver {
    async fn resolve(&self, connector_type: &ConnectorType) -> Result<ConfiguratorDescriptor, Unavailable> {
        let Some(entry) = self.lookup(&connector_type.id) else {
            return Ok(ConfiguratorDescriptor::Generic);
        };
        if entry.broken {
            return Err(Unavailable::Load {
                connector_type: connector_type.id.clone(),
                reason: format!("remote entry {} unreachable", entry.module.remote_entry),
            });
        }
        if entry.steps.is_empty() {
            return Err(Unavailable::NoSteps(connector_type.id.clone()));
        }
        Ok(ConfiguratorDescriptor::Custom { steps: entry.steps.clone(), module: entry.module.clone() })
    }
}

/// Single-shot resolution of one connector type's configurator.
pub struct ConfiguratorLoader {
    rx: Option<oneshot::Receiver<ConfiguratorDescriptor>>,
    handle: Option<CancelHandle>,
    result: Option<ConfiguratorDescriptor>,
}

impl std::fmt::Debug for ConfiguratorLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfiguratorLoader").field("result", &self.result).finish_non_exhaustive()
    }
}

impl ConfiguratorLoader {
    pub fn start(resolver: Arc<dyn ComponentResolver>, connector_type: ConnectorType) -> Self {
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            warn!(connector_type = %connector_type.id, "configurator: no runtime, using generic form");
            return Self { rx: None, handle: None, result: Some(ConfiguratorDescriptor::Generic) };
        };
        let (tx, rx) = oneshot::channel();
        let task = rt.spawn(async move {
            let t0 = Instant::now();
            let descriptor = match resolver.resolve(&connector_type).await {
                Ok(d) => {
                    info!(connector_type = %connector_type.id, custom = d.is_custom(), took_ms = %t0.elapsed().as_millis(), "configurator: resolved");
                    d
                }
                Err(e) => {
                    warn!(connector_type = %connector_type.id, error = %e, "configurator: load failed, using generic form");
                    counter!("kcon_configurator_fallback_total", 1u64);
                    ConfiguratorDescriptor::Generic
                }
            };
            let _ = tx.send(descriptor);
        });
        Self { rx: Some(rx), handle: Some(CancelHandle::from_task(task)), result: None }
    }

    /// Resolved descriptor, once available.
    pub fn poll(&mut self) -> Option<&ConfiguratorDescriptor> {
        if self.result.is_none() {
            if let Some(rx) = self.rx.as_mut() {
                match rx.try_recv() {
                    Ok(d) => self.finish(d),
                    Err(oneshot::error::TryRecvError::Empty) => {}
                    Err(oneshot::error::TryRecvError::Closed) => self.finish(ConfiguratorDescriptor::Generic),
                }
            }
        }
        self.result.as_ref()
    }

    pub async fn settle(&mut self) {
        if self.result.is_some() {
            return;
        }
        if let Some(rx) = self.rx.as_mut() {
            let d = rx.await.unwrap_or(ConfiguratorDescriptor::Generic);
            self.finish(d);
        }
    }

    pub fn cancel(&mut self) {
        if let Some(h) = self.handle.take() {
            h.cancel();
        }
        self.rx = None;
    }

    fn finish(&mut self, d: ConfiguratorDescriptor) {
        self.result = Some(d);
        self.rx = None;
        self.handle = None;
    }
}

impl Drop for ConfiguratorLoader {
    fn drop(&mut self) { self.cancel(); }
}
