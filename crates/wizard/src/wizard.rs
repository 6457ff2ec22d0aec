//! Connector creation wizard.
//!
//! The orchestrator owns the [`WizardContext`] and exactly one active child
//! machine. Entering a step creates its child from a projection of the
//! context; leaving drops it, which cancels whatever the child had in flight.
//! Children report validity through signals and hand their result back on
//! confirm; the orchestrator never re-validates on their behalf.

use std::sync::Arc;

use kcon_api::ConnectorsApi;
use kcon_core::prelude::*;
use kcon_query::{fetch, QueryOptions};
use metrics::counter;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::configurator::{ComponentResolver, ConfiguratorDescriptor, ConfiguratorLoader};
use crate::configure::ConfigureStep;
use crate::context::{ConfiguratorState, InitialValues, WizardContext};
use crate::review::{ReviewDone, ReviewMachine, ReviewState};
use crate::steps::{
    ConnectorTypeStep, CoreConfigurationStep, CoreDone, ErrorConfigurationStep, KafkaStep, NamespaceStep,
    SelectionDone, SelectionStep, StepSignal,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    SelectConnector,
    SelectKafka,
    SelectNamespace,
    CoreConfiguration,
    ConfigureConnector,
    ErrorConfiguration,
    ReviewConfiguration,
    Saved,
}

impl WizardStep {
    /// Steps shown in the step indicator, in order.
    pub const NAVIGABLE: [WizardStep; 7] = [
        WizardStep::SelectConnector,
        WizardStep::SelectKafka,
        WizardStep::SelectNamespace,
        WizardStep::CoreConfiguration,
        WizardStep::ConfigureConnector,
        WizardStep::ErrorConfiguration,
        WizardStep::ReviewConfiguration,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WizardStep::SelectConnector => "select_connector",
            WizardStep::SelectKafka => "select_kafka",
            WizardStep::SelectNamespace => "select_namespace",
            WizardStep::CoreConfiguration => "core_configuration",
            WizardStep::ConfigureConnector => "configure_connector",
            WizardStep::ErrorConfiguration => "error_configuration",
            WizardStep::ReviewConfiguration => "review_configuration",
            WizardStep::Saved => "saved",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WizardStep::SelectConnector => "Connector",
            WizardStep::SelectKafka => "Kafka instance",
            WizardStep::SelectNamespace => "Namespace",
            WizardStep::CoreConfiguration => "Core configuration",
            WizardStep::ConfigureConnector => "Connector configuration",
            WizardStep::ErrorConfiguration => "Error handling",
            WizardStep::ReviewConfiguration => "Review",
            WizardStep::Saved => "Saved",
        }
    }
}

/// Deep-link targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpTarget {
    SelectConnector,
    SelectKafka,
    SelectNamespace,
    CoreConfiguration,
    ConfigureConnector { sub_step: usize },
    ErrorConfiguration,
    ReviewConfiguration,
}

impl JumpTarget {
    pub fn step(self) -> WizardStep {
        match self {
            JumpTarget::SelectConnector => WizardStep::SelectConnector,
            JumpTarget::SelectKafka => WizardStep::SelectKafka,
            JumpTarget::SelectNamespace => WizardStep::SelectNamespace,
            JumpTarget::CoreConfiguration => WizardStep::CoreConfiguration,
            JumpTarget::ConfigureConnector { .. } => WizardStep::ConfigureConnector,
            JumpTarget::ErrorConfiguration => WizardStep::ErrorConfiguration,
            JumpTarget::ReviewConfiguration => WizardStep::ReviewConfiguration,
        }
    }

    fn for_step(step: WizardStep) -> Option<Self> {
        Some(match step {
            WizardStep::SelectConnector => JumpTarget::SelectConnector,
            WizardStep::SelectKafka => JumpTarget::SelectKafka,
            WizardStep::SelectNamespace => JumpTarget::SelectNamespace,
            WizardStep::CoreConfiguration => JumpTarget::CoreConfiguration,
            WizardStep::ConfigureConnector => JumpTarget::ConfigureConnector { sub_step: 0 },
            WizardStep::ErrorConfiguration => JumpTarget::ErrorConfiguration,
            WizardStep::ReviewConfiguration => JumpTarget::ReviewConfiguration,
            WizardStep::Saved => return None,
        })
    }
}

/// One entry of the step indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepIndicator {
    pub step: WizardStep,
    pub label: &'static str,
    pub sub_steps: Vec<String>,
    pub active: bool,
    pub active_sub_step: Option<usize>,
    pub skipped: bool,
    pub can_jump: bool,
}

enum ActiveStep {
    SelectConnector(ConnectorTypeStep),
    SelectKafka(KafkaStep),
    SelectNamespace(NamespaceStep),
    Core(CoreConfigurationStep),
    LoadConfigurator(ConfiguratorLoader),
    Configure(ConfigureStep),
    ErrorConfiguration(ErrorConfigurationStep),
    Review(ReviewMachine),
    /// The step could not be started; left via `retry` or `prev`.
    Failed(String),
    Saved,
    Closed,
}

/// What a confirmed child handed back.
enum Advance {
    ConnectorType(SelectionDone<ConnectorType>),
    Kafka(SelectionDone<KafkaInstance>),
    Namespace(SelectionDone<Namespace>),
    Core(CoreDone),
    SubStep(usize),
    Configuration(Value),
    ErrorHandler(ErrorHandler),
    Saving,
}

type SaveCallback = Box<dyn FnMut(&str) + Send>;
type CloseCallback = Box<dyn FnMut() + Send>;

pub struct Wizard {
    api: Arc<dyn ConnectorsApi>,
    resolver: Arc<dyn ComponentResolver>,
    options: QueryOptions,
    context: WizardContext,
    step: WizardStep,
    active: ActiveStep,
    child_valid: bool,
    on_save: Option<SaveCallback>,
    on_close: Option<CloseCallback>,
}

impl std::fmt::Debug for Wizard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wizard")
            .field("step", &self.step)
            .field("child_valid", &self.child_valid)
            .field("error", &self.error())
            .finish_non_exhaustive()
    }
}

impl Wizard {
    pub fn new(
        api: Arc<dyn ConnectorsApi>,
        resolver: Arc<dyn ComponentResolver>,
        options: QueryOptions,
        initial: InitialValues,
    ) -> Self {
        let mut w = Self {
            api,
            resolver,
            options,
            context: WizardContext::new(initial),
            step: WizardStep::SelectConnector,
            active: ActiveStep::Closed,
            child_valid: false,
            on_save: None,
            on_close: None,
        };
        w.enter(WizardStep::SelectConnector);
        w
    }

    /// Called once with the created connector's name.
    pub fn on_save(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_save = Some(Box::new(f));
        self
    }

    pub fn on_close(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }

    pub fn context(&self) -> &WizardContext { &self.context }
    pub fn step(&self) -> WizardStep { self.step }
    pub fn is_saved(&self) -> bool { matches!(self.active, ActiveStep::Saved) }
    pub fn is_closed(&self) -> bool { matches!(self.active, ActiveStep::Closed) }
    pub fn is_loading_configurator(&self) -> bool { matches!(self.active, ActiveStep::LoadConfigurator(_)) }

    /// Message of the error substate, when the current step failed to start.
    pub fn error(&self) -> Option<&str> {
        match &self.active {
            ActiveStep::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// The active child has signalled that it is valid.
    pub fn can_next(&self) -> bool { self.child_valid }

    /// Active configuration sub-step, while in the configure phase.
    pub fn sub_step(&self) -> Option<usize> {
        match &self.active {
            ActiveStep::Configure(c) => Some(c.sub_step()),
            _ => None,
        }
    }

    pub fn connector_types(&self) -> Option<&ConnectorTypeStep> {
        match &self.active { ActiveStep::SelectConnector(s) => Some(s), _ => None }
    }
    pub fn connector_types_mut(&mut self) -> Option<&mut ConnectorTypeStep> {
        match &mut self.active { ActiveStep::SelectConnector(s) => Some(s), _ => None }
    }
    pub fn kafkas(&self) -> Option<&KafkaStep> {
        match &self.active { ActiveStep::SelectKafka(s) => Some(s), _ => None }
    }
    pub fn kafkas_mut(&mut self) -> Option<&mut KafkaStep> {
        match &mut self.active { ActiveStep::SelectKafka(s) => Some(s), _ => None }
    }
    pub fn namespaces(&self) -> Option<&NamespaceStep> {
        match &self.active { ActiveStep::SelectNamespace(s) => Some(s), _ => None }
    }
    pub fn namespaces_mut(&mut self) -> Option<&mut NamespaceStep> {
        match &mut self.active { ActiveStep::SelectNamespace(s) => Some(s), _ => None }
    }
    pub fn core_mut(&mut self) -> Option<&mut CoreConfigurationStep> {
        match &mut self.active { ActiveStep::Core(s) => Some(s), _ => None }
    }
    pub fn configure(&self) -> Option<&ConfigureStep> {
        match &self.active { ActiveStep::Configure(s) => Some(s), _ => None }
    }
    pub fn configure_mut(&mut self) -> Option<&mut ConfigureStep> {
        match &mut self.active { ActiveStep::Configure(s) => Some(s), _ => None }
    }
    pub fn error_configuration_mut(&mut self) -> Option<&mut ErrorConfigurationStep> {
        match &mut self.active { ActiveStep::ErrorConfiguration(s) => Some(s), _ => None }
    }
    pub fn review(&self) -> Option<&ReviewMachine> {
        match &self.active { ActiveStep::Review(s) => Some(s), _ => None }
    }
    pub fn review_mut(&mut self) -> Option<&mut ReviewMachine> {
        match &mut self.active { ActiveStep::Review(s) => Some(s), _ => None }
    }

    /// Push a configuration change into the configure step and the context.
    pub fn change_configuration(&mut self, configuration: Value, valid: Option<bool>) -> bool {
        let ActiveStep::Configure(c) = &mut self.active else { return false };
        c.change(configuration, valid);
        record_configuration(&mut self.context, c);
        self.drain_child();
        true
    }

    /// Confirm the active child and advance. Ignored until the child has
    /// signalled validity.
    pub fn next(&mut self) -> bool {
        self.drain_child();
        if !self.child_valid {
            debug!(step = self.step.as_str(), "wizard: next ignored, step not valid");
            return false;
        }
        let advance = match &mut self.active {
            ActiveStep::SelectConnector(s) => s.confirm().map(Advance::ConnectorType),
            ActiveStep::SelectKafka(s) => s.confirm().map(Advance::Kafka),
            ActiveStep::SelectNamespace(s) => s.confirm().map(Advance::Namespace),
            ActiveStep::Core(s) => s.confirm().map(Advance::Core),
            ActiveStep::Configure(c) if !c.is_last_sub_step() => {
                if c.next_sub_step() { Some(Advance::SubStep(c.sub_step())) } else { None }
            }
            ActiveStep::Configure(c) => c.confirm().map(Advance::Configuration),
            ActiveStep::ErrorConfiguration(s) => s.confirm().map(Advance::ErrorHandler),
            ActiveStep::Review(r) => r.confirm().then_some(Advance::Saving),
            ActiveStep::LoadConfigurator(_) | ActiveStep::Failed(_) | ActiveStep::Saved | ActiveStep::Closed => None,
        };
        let Some(advance) = advance else { return false };
        match advance {
            Advance::ConnectorType(done) => {
                self.context.set_connector_type(done.selected);
                self.context.duplicate = done.duplicate;
                self.enter(WizardStep::SelectKafka);
            }
            Advance::Kafka(done) => {
                self.context.kafka = Some(done.selected);
                self.enter(WizardStep::SelectNamespace);
            }
            Advance::Namespace(done) => {
                self.context.namespace = Some(done.selected);
                self.enter(WizardStep::CoreConfiguration);
            }
            Advance::Core(done) => {
                self.context.name = done.name;
                self.context.service_account = done.service_account;
                self.context.active_configuration_step = 0;
                self.enter(WizardStep::ConfigureConnector);
            }
            Advance::SubStep(n) => {
                self.context.active_configuration_step = n;
                self.context.furthest_configuration_step = self.context.furthest_configuration_step.max(n);
                info!(sub_step = n, "wizard: configuration sub-step entered");
                self.drain_child();
            }
            Advance::Configuration(cfg) => {
                self.context.confirmed_configuration = Some(cfg.clone());
                self.context.configuration = Some(cfg);
                let next = if self.context.error_step_applies() {
                    WizardStep::ErrorConfiguration
                } else {
                    WizardStep::ReviewConfiguration
                };
                self.enter(next);
            }
            Advance::ErrorHandler(h) => {
                self.context.confirmed_error_handler = Some(h.clone());
                self.context.error_handler = Some(h);
                self.enter(WizardStep::ReviewConfiguration);
            }
            Advance::Saving => self.drain_child(),
        }
        true
    }

    /// Step back. Within the configure phase this first walks back through
    /// the configurator's sub-steps.
    pub fn prev(&mut self) -> bool {
        match &mut self.active {
            ActiveStep::Saved | ActiveStep::Closed => return false,
            ActiveStep::Review(r) if r.state() == ReviewState::Saving => return false,
            ActiveStep::Configure(c) if c.sub_step() > 0 => {
                if c.prev_sub_step() {
                    self.context.active_configuration_step = c.sub_step();
                    self.drain_child();
                    return true;
                }
                return false;
            }
            _ => {}
        }
        let Some(target) = self.previous_step() else { return false };
        self.leave();
        self.enter(target);
        true
    }

    /// Re-invoke the current step after it failed to start.
    pub fn retry(&mut self) -> bool {
        if !matches!(self.active, ActiveStep::Failed(_)) {
            return false;
        }
        info!(step = self.step.as_str(), "wizard: retrying step");
        self.enter(self.step);
        true
    }

    pub fn can_jump(&self, target: JumpTarget) -> bool {
        if matches!(self.active, ActiveStep::Saved | ActiveStep::Closed) {
            return false;
        }
        if let ActiveStep::Review(r) = &self.active {
            if r.state() == ReviewState::Saving {
                return false;
            }
        }
        let c = &self.context;
        let has_type = c.connector_type.is_some();
        let has_kafka = has_type && c.kafka.is_some();
        let has_namespace = has_kafka && c.namespace.is_some();
        let configured = has_namespace && c.core_configured() && c.configuration_confirmed();
        match target {
            JumpTarget::SelectConnector => true,
            JumpTarget::SelectKafka => has_type,
            JumpTarget::SelectNamespace => has_kafka,
            JumpTarget::CoreConfiguration => has_namespace,
            JumpTarget::ConfigureConnector { sub_step } => has_namespace && sub_step <= c.furthest_configuration_step,
            JumpTarget::ErrorConfiguration => configured && c.error_step_applies(),
            JumpTarget::ReviewConfiguration => has_namespace && c.ready_for_review(),
        }
    }

    /// Move straight to `target` when its prerequisites are in the context.
    pub fn jump(&mut self, target: JumpTarget) -> bool {
        // Gate on the outgoing step's current edits, not on what was last pumped.
        self.leave();
        if !self.can_jump(target) {
            debug!(target = target.step().as_str(), "wizard: jump refused");
            return false;
        }
        if let JumpTarget::ConfigureConnector { sub_step } = target {
            self.context.active_configuration_step = sub_step;
        }
        self.enter(target.step());
        true
    }

    pub fn steps(&self) -> Vec<StepIndicator> {
        let sub_steps: Vec<String> = self
            .context
            .configurator
            .descriptor()
            .and_then(ConfiguratorDescriptor::steps)
            .map(<[String]>::to_vec)
            .unwrap_or_default();
        WizardStep::NAVIGABLE
            .iter()
            .map(|&step| {
                let active = step == self.step && !self.is_closed();
                let is_configure = step == WizardStep::ConfigureConnector;
                StepIndicator {
                    step,
                    label: step.label(),
                    sub_steps: if is_configure { sub_steps.clone() } else { Vec::new() },
                    active,
                    active_sub_step: if active && is_configure { self.sub_step() } else { None },
                    skipped: step == WizardStep::ErrorConfiguration && !self.context.error_step_applies(),
                    can_jump: JumpTarget::for_step(step).map(|t| self.can_jump(t)).unwrap_or(false),
                }
            })
            .collect()
    }

    /// Apply whatever the active child has received. Returns true when the
    /// wizard moved to another phase.
    pub fn pump(&mut self) -> bool {
        let mut loaded: Option<ConfiguratorDescriptor> = None;
        let mut saved: Option<ReviewDone> = None;
        match &mut self.active {
            ActiveStep::SelectConnector(s) => { s.pump(); }
            ActiveStep::SelectKafka(s) => { s.pump(); }
            ActiveStep::SelectNamespace(s) => { s.pump(); }
            ActiveStep::LoadConfigurator(l) => loaded = l.poll().cloned(),
            ActiveStep::Configure(c) => record_configuration(&mut self.context, c),
            ActiveStep::Review(r) => {
                r.pump();
                if let Some(data) = r.data() {
                    self.context.review_payload = Some(data.clone());
                }
                saved = r.done().cloned();
            }
            _ => {}
        }
        let mut moved = false;
        if let Some(d) = loaded {
            self.context.configurator = ConfiguratorState::Loaded(d);
            self.active = self.configure_child();
            self.child_valid = false;
            if let ActiveStep::Failed(e) = &self.active {
                warn!(step = self.step.as_str(), error = %e, "wizard: configure step failed to start");
            }
            moved = true;
        }
        if let Some(done) = saved {
            self.context.review_payload = Some(done.payload);
            self.enter(WizardStep::Saved);
            if let Some(cb) = self.on_save.as_mut() {
                cb(&done.connector.name);
            }
            moved = true;
        }
        self.drain_child();
        moved
    }

    /// Wait for the active child's outstanding work and apply it, following
    /// any phase changes it causes.
    pub async fn settle(&mut self) {
        loop {
            match &mut self.active {
                ActiveStep::SelectConnector(s) => s.settle().await,
                ActiveStep::SelectKafka(s) => s.settle().await,
                ActiveStep::SelectNamespace(s) => s.settle().await,
                ActiveStep::LoadConfigurator(l) => l.settle().await,
                ActiveStep::Review(r) => r.settle().await,
                _ => {}
            }
            if !self.pump() {
                break;
            }
        }
    }

    /// Stop every child and notify the caller.
    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.leave();
        self.active = ActiveStep::Closed;
        self.child_valid = false;
        info!(step = self.step.as_str(), "wizard: closed");
        if let Some(cb) = self.on_close.as_mut() {
            cb();
        }
    }

    fn previous_step(&self) -> Option<WizardStep> {
        Some(match self.step {
            WizardStep::SelectConnector | WizardStep::Saved => return None,
            WizardStep::SelectKafka => WizardStep::SelectConnector,
            WizardStep::SelectNamespace => WizardStep::SelectKafka,
            WizardStep::CoreConfiguration => WizardStep::SelectNamespace,
            WizardStep::ConfigureConnector => WizardStep::CoreConfiguration,
            WizardStep::ErrorConfiguration => WizardStep::ConfigureConnector,
            WizardStep::ReviewConfiguration if self.context.error_step_applies() => WizardStep::ErrorConfiguration,
            WizardStep::ReviewConfiguration => WizardStep::ConfigureConnector,
        })
    }

    /// Keep unconfirmed edits of the outgoing step in the context.
    fn leave(&mut self) {
        match &self.active {
            ActiveStep::Core(c) => {
                self.context.name = c.name().to_string();
                self.context.service_account = c.service_account().clone();
            }
            ActiveStep::Configure(c) => {
                record_configuration(&mut self.context, c);
                self.context.active_configuration_step = c.sub_step();
            }
            ActiveStep::ErrorConfiguration(e) => self.context.error_handler = Some(e.handler().clone()),
            ActiveStep::Review(r) => {
                let Some(data) = r.data() else { return };
                if self.context.configuration.as_ref() == Some(data) {
                    return;
                }
                // Schema-valid review edits count as a confirmed configuration.
                if r.is_valid() {
                    self.context.confirmed_configuration = Some(data.clone());
                }
                self.context.configuration = Some(data.clone());
            }
            _ => {}
        }
    }

    fn enter(&mut self, step: WizardStep) {
        // Drop the outgoing child first so its tasks are cancelled before new ones start.
        self.active = ActiveStep::Closed;
        self.step = step;
        self.child_valid = false;
        let ctx = &self.context;
        self.active = match step {
            WizardStep::SelectConnector => ActiveStep::SelectConnector(SelectionStep::new(
                "connector_types",
                fetch::connector_types(self.api.clone()),
                self.options,
                ctx.connector_type.clone(),
                ctx.duplicate,
            )),
            WizardStep::SelectKafka => ActiveStep::SelectKafka(SelectionStep::new(
                "kafkas",
                fetch::kafka_instances(self.api.clone()),
                self.options,
                ctx.kafka.clone(),
                ctx.duplicate,
            )),
            WizardStep::SelectNamespace => ActiveStep::SelectNamespace(SelectionStep::new(
                "namespaces",
                fetch::namespaces(self.api.clone()),
                self.options,
                ctx.namespace.clone(),
                ctx.duplicate,
            )),
            WizardStep::CoreConfiguration => {
                ActiveStep::Core(CoreConfigurationStep::new(ctx.name.clone(), ctx.service_account.clone()))
            }
            WizardStep::ConfigureConnector => match (&ctx.connector_type, &ctx.configurator) {
                (None, _) => ActiveStep::Failed("no connector type selected".into()),
                (Some(_), ConfiguratorState::Loaded(_)) => self.configure_child(),
                (Some(ct), ConfiguratorState::NotLoaded) => {
                    ActiveStep::LoadConfigurator(ConfiguratorLoader::start(self.resolver.clone(), ct.clone()))
                }
            },
            WizardStep::ErrorConfiguration => {
                ActiveStep::ErrorConfiguration(ErrorConfigurationStep::new(ctx.error_handler.clone()))
            }
            WizardStep::ReviewConfiguration => self.review_child(),
            WizardStep::Saved => ActiveStep::Saved,
        };
        if let ActiveStep::Failed(e) = &self.active {
            warn!(step = step.as_str(), error = %e, "wizard: step failed to start");
            counter!("kcon_wizard_step_errors_total", 1u64, "step" => step.as_str());
        } else {
            info!(step = step.as_str(), "wizard: step entered");
        }
        counter!("kcon_wizard_steps_total", 1u64, "step" => step.as_str());
        self.drain_child();
        if self.is_loading_configurator() {
            // Resolvers can answer synchronously (no runtime); apply that now.
            self.pump();
        }
    }

    fn configure_child(&self) -> ActiveStep {
        let (Some(ct), Some(d)) = (&self.context.connector_type, self.context.configurator.descriptor()) else {
            return ActiveStep::Failed("configurator not loaded".into());
        };
        match ConfigureStep::new(ct, d, self.context.active_configuration_step, self.context.configuration.clone()) {
            Ok(c) => ActiveStep::Configure(c),
            Err(e) => ActiveStep::Failed(e.to_string()),
        }
    }

    fn review_child(&self) -> ActiveStep {
        let Some(ct) = &self.context.connector_type else {
            return ActiveStep::Failed("no connector type selected".into());
        };
        let configuration = self.context.configuration.clone().unwrap_or_else(|| Value::Object(Map::new()));
        let Some(template) = self.context.new_connector(configuration) else {
            return ActiveStep::Failed("kafka instance and namespace are required".into());
        };
        match ReviewMachine::new(self.api.clone(), ct, template) {
            Ok(r) => ActiveStep::Review(r),
            Err(e) => ActiveStep::Failed(e.to_string()),
        }
    }

    fn drain_child(&mut self) {
        let signals = match &mut self.active {
            ActiveStep::SelectConnector(s) => s.drain_signals(),
            ActiveStep::SelectKafka(s) => s.drain_signals(),
            ActiveStep::SelectNamespace(s) => s.drain_signals(),
            ActiveStep::Core(s) => s.drain_signals(),
            ActiveStep::Configure(s) => s.drain_signals(),
            ActiveStep::ErrorConfiguration(s) => s.drain_signals(),
            ActiveStep::Review(s) => s.drain_signals(),
            _ => Vec::new(),
        };
        if let Some(last) = signals.last() {
            self.child_valid = *last == StepSignal::IsValid;
            debug!(step = self.step.as_str(), valid = self.child_valid, "wizard: step validity changed");
        }
    }
}

/// Write the configure step's edits into the context. After an edit on one
/// sub-step the ones following it have to be walked again.
fn record_configuration(context: &mut WizardContext, step: &ConfigureStep) {
    if context.configuration.as_ref() == Some(step.configuration()) {
        return;
    }
    context.furthest_configuration_step = context.furthest_configuration_step.min(step.sub_step());
    context.configuration = Some(step.configuration().clone());
}
