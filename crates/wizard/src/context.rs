//! Accumulated wizard state. Owned by the orchestrator; steps receive
//! projections of it and hand results back on confirm.

use kcon_core::prelude::*;
use serde_json::Value;

use crate::configurator::ConfiguratorDescriptor;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfiguratorState {
    #[default]
    NotLoaded,
    Loaded(ConfiguratorDescriptor),
}

impl ConfiguratorState {
    pub fn descriptor(&self) -> Option<&ConfiguratorDescriptor> {
        match self {
            ConfiguratorState::NotLoaded => None,
            ConfiguratorState::Loaded(d) => Some(d),
        }
    }
}

/// Pre-fill supplied when the wizard is mounted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitialValues {
    pub connector_type: Option<ConnectorType>,
    pub kafka: Option<KafkaInstance>,
    pub namespace: Option<Namespace>,
    pub name: Option<String>,
    pub service_account: Option<ServiceAccount>,
    pub configuration: Option<Value>,
    pub error_handler: Option<ErrorHandler>,
    pub duplicate: bool,
}

impl InitialValues {
    /// Pre-fill for creating a near-copy of `source`. The copy gets a new
    /// name and must be given its service account secret again.
    pub fn duplicate_of(
        source: &Connector,
        connector_type: ConnectorType,
        kafka: KafkaInstance,
        namespace: Namespace,
    ) -> Self {
        Self {
            connector_type: Some(connector_type),
            kafka: Some(kafka),
            namespace: Some(namespace),
            name: Some(format!("{}-copy", source.name)),
            service_account: Some(ServiceAccount { client_id: source.service_account.client_id.clone(), client_secret: String::new() }),
            configuration: Some(source.connector.clone()),
            error_handler: source.error_handler.clone(),
            duplicate: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WizardContext {
    pub connector_type: Option<ConnectorType>,
    pub kafka: Option<KafkaInstance>,
    pub namespace: Option<Namespace>,
    pub name: String,
    pub service_account: ServiceAccount,
    pub configurator: ConfiguratorState,
    pub active_configuration_step: usize,
    /// Highest configurator sub-step reached by advancing through the ones before it.
    pub furthest_configuration_step: usize,
    pub configuration: Option<Value>,
    /// Configuration as last confirmed on the final configure sub-step.
    pub confirmed_configuration: Option<Value>,
    pub error_handler: Option<ErrorHandler>,
    pub confirmed_error_handler: Option<ErrorHandler>,
    pub review_payload: Option<Value>,
    pub duplicate: bool,
}

impl WizardContext {
    pub fn new(initial: InitialValues) -> Self {
        Self {
            connector_type: initial.connector_type,
            kafka: initial.kafka,
            namespace: initial.namespace,
            name: initial.name.unwrap_or_default(),
            service_account: initial.service_account.unwrap_or_default(),
            configurator: ConfiguratorState::NotLoaded,
            active_configuration_step: 0,
            furthest_configuration_step: 0,
            configuration: initial.configuration,
            confirmed_configuration: None,
            error_handler: initial.error_handler,
            confirmed_error_handler: None,
            review_payload: None,
            duplicate: initial.duplicate,
        }
    }

    pub fn core_configured(&self) -> bool {
        crate::steps::core_config::validate_name(&self.name).is_ok() && self.service_account.is_complete()
    }

    /// The configure phase was completed and nothing was edited since.
    pub fn configuration_confirmed(&self) -> bool {
        self.confirmed_configuration.is_some() && self.confirmed_configuration == self.configuration
    }

    pub fn error_handler_confirmed(&self) -> bool {
        self.confirmed_error_handler.is_some() && self.confirmed_error_handler == self.error_handler
    }

    /// Everything the review step needs has been confirmed.
    pub fn ready_for_review(&self) -> bool {
        self.core_configured()
            && self.configuration_confirmed()
            && (!self.error_step_applies() || self.error_handler_confirmed())
    }

    /// False when the connector type has no error-handler capability and the
    /// error configuration step is skipped.
    pub fn error_step_applies(&self) -> bool {
        self.connector_type.as_ref().map(ConnectorType::supports_error_handler).unwrap_or(true)
    }

    /// Record the confirmed connector type. A different type invalidates
    /// everything derived from the previous one.
    pub fn set_connector_type(&mut self, ct: ConnectorType) {
        let changed = self.connector_type.as_ref().map(|c| c.id != ct.id).unwrap_or(true);
        if changed && self.connector_type.is_some() {
            self.configurator = ConfiguratorState::NotLoaded;
            self.configuration = None;
            self.active_configuration_step = 0;
            self.furthest_configuration_step = 0;
            self.confirmed_configuration = None;
            self.error_handler = None;
            self.confirmed_error_handler = None;
            self.review_payload = None;
        }
        self.connector_type = Some(ct);
    }

    pub fn new_connector(&self, configuration: Value) -> Option<NewConnector> {
        Some(NewConnector {
            name: self.name.clone(),
            connector_type_id: self.connector_type.as_ref()?.id.clone(),
            kafka_id: self.kafka.as_ref()?.id.clone(),
            namespace_id: self.namespace.as_ref()?.id.clone(),
            desired_state: DesiredState::Ready,
            service_account: self.service_account.clone(),
            connector: configuration,
            error_handler: if self.error_step_applies() { self.error_handler.clone() } else { None },
        })
    }
}
