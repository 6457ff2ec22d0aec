//! Connector-specific configuration: either the generic schema-driven form or
//! a custom configurator with named sub-steps.

use kcon_core::ConnectorType;
use kcon_schema::{ConnectorSchema, SchemaError, ValidationReport};
use serde_json::{Map, Value};
use tracing::debug;

use crate::configurator::{ConfiguratorDescriptor, ModuleRef};
use crate::steps::{Signals, StepSignal};

enum Mode {
    Generic { schema: ConnectorSchema, report: ValidationReport },
    /// Validity is whatever the configurator last reported for the current sub-step.
    Custom { steps: Vec<String>, module: ModuleRef, sub_step: usize, valid: bool },
}

pub struct ConfigureStep {
    mode: Mode,
    configuration: Value,
    done: bool,
    signals: Signals,
}

impl std::fmt::Debug for ConfigureStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigureStep")
            .field("custom", &self.is_custom())
            .field("sub_step", &self.sub_step())
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}

impl ConfigureStep {
    /// Custom configurators begin at `sub_step`, clamped to their last step.
    pub fn new(
        connector_type: &ConnectorType,
        descriptor: &ConfiguratorDescriptor,
        sub_step: usize,
        initial: Option<Value>,
    ) -> Result<Self, SchemaError> {
        let mut step = match descriptor {
            ConfiguratorDescriptor::Generic => {
                let schema = ConnectorSchema::compile(&connector_type.schema)?;
                let configuration = initial.unwrap_or_else(|| schema.defaults());
                let report = schema.validate(&configuration);
                Self { mode: Mode::Generic { schema, report }, configuration, done: false, signals: Signals::default() }
            }
            ConfiguratorDescriptor::Custom { steps, module } => {
                let sub_step = sub_step.min(steps.len().saturating_sub(1));
                Self {
                    mode: Mode::Custom { steps: steps.clone(), module: module.clone(), sub_step, valid: false },
                    configuration: initial.unwrap_or_else(|| Value::Object(Map::new())),
                    done: false,
                    signals: Signals::default(),
                }
            }
        };
        step.verify();
        Ok(step)
    }

    pub fn configuration(&self) -> &Value { &self.configuration }
    pub fn is_custom(&self) -> bool { matches!(self.mode, Mode::Custom { .. }) }

    pub fn module(&self) -> Option<&ModuleRef> {
        match &self.mode {
            Mode::Custom { module, .. } => Some(module),
            Mode::Generic { .. } => None,
        }
    }

    pub fn sub_steps(&self) -> &[String] {
        match &self.mode {
            Mode::Custom { steps, .. } => steps,
            Mode::Generic { .. } => &[],
        }
    }

    pub fn sub_step(&self) -> usize {
        match &self.mode {
            Mode::Custom { sub_step, .. } => *sub_step,
            Mode::Generic { .. } => 0,
        }
    }

    pub fn is_last_sub_step(&self) -> bool {
        match &self.mode {
            Mode::Custom { steps, sub_step, .. } => *sub_step + 1 >= steps.len(),
            Mode::Generic { .. } => true,
        }
    }

    /// Schema findings for the generic form.
    pub fn report(&self) -> Option<&ValidationReport> {
        match &self.mode {
            Mode::Generic { report, .. } => Some(report),
            Mode::Custom { .. } => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        match &self.mode {
            Mode::Generic { report, .. } => report.valid,
            Mode::Custom { valid, .. } => *valid,
        }
    }

    /// Replace the configuration. `valid` is the custom configurator's own
    /// verdict and is ignored by the generic form, which validates itself.
    pub fn change(&mut self, configuration: Value, valid: Option<bool>) {
        self.configuration = configuration;
        match &mut self.mode {
            Mode::Generic { schema, report } => *report = schema.validate(&self.configuration),
            Mode::Custom { valid: v, .. } => *v = valid.unwrap_or(false),
        }
        self.verify();
    }

    /// Set one top-level field of the generic form.
    pub fn set_field(&mut self, key: &str, value: Value) {
        let mut obj = match self.configuration.take() {
            Value::Object(m) => m,
            _ => Map::new(),
        };
        obj.insert(key.to_string(), value);
        let valid = self.is_valid();
        self.change(Value::Object(obj), Some(valid));
    }

    /// Advance within a custom configurator. Requires the current sub-step
    /// to be valid; the next one starts unvalidated.
    pub fn next_sub_step(&mut self) -> bool {
        let Mode::Custom { steps, sub_step, valid, .. } = &mut self.mode else { return false };
        if !*valid || *sub_step + 1 >= steps.len() {
            return false;
        }
        *sub_step += 1;
        *valid = false;
        debug!(sub_step = *sub_step, "configure: next sub-step");
        self.verify();
        true
    }

    pub fn prev_sub_step(&mut self) -> bool {
        let Mode::Custom { sub_step, valid, .. } = &mut self.mode else { return false };
        if *sub_step == 0 {
            return false;
        }
        *sub_step -= 1;
        // Revisited steps were valid when left.
        *valid = true;
        self.verify();
        true
    }

    /// Final configuration, only from a valid last sub-step.
    pub fn confirm(&mut self) -> Option<Value> {
        if self.done || !self.is_valid() || !self.is_last_sub_step() {
            return None;
        }
        self.done = true;
        Some(self.configuration.clone())
    }

    pub fn drain_signals(&mut self) -> Vec<StepSignal> { self.signals.drain() }

    fn verify(&mut self) {
        let valid = self.is_valid();
        self.signals.set(valid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn telegram() -> ConnectorType {
        serde_json::from_value(json!({
            "id": "telegram-source",
            "name": "Telegram source",
            "schema": {
                "type": "object",
                "required": ["authorizationToken"],
                "properties": {
                    "authorizationToken": { "type": "string" },
                    "pollingInterval": { "type": "integer", "minimum": 1 }
                }
            }
        }))
        .unwrap()
    }

    fn custom(steps: &[&str]) -> ConfiguratorDescriptor {
        ConfiguratorDescriptor::Custom {
            steps: steps.iter().map(|s| s.to_string()).collect(),
            module: ModuleRef { remote_entry: "https://cdn.example/x.js".into(), scope: "x".into(), module: "./config".into() },
        }
    }

    #[test]
    fn generic_form_validates_against_schema() {
        let mut step = ConfigureStep::new(&telegram(), &ConfiguratorDescriptor::Generic, 0, None).unwrap();
        assert!(!step.is_valid());
        assert_eq!(step.configuration(), &json!({}));
        step.set_field("pollingInterval", json!("fast"));
        assert!(!step.is_valid());
        step.set_field("pollingInterval", json!(5));
        step.set_field("authorizationToken", json!("some-token"));
        assert!(step.is_valid());
        assert_eq!(step.drain_signals(), vec![StepSignal::IsInvalid, StepSignal::IsValid]);
        assert_eq!(step.confirm(), Some(json!({ "pollingInterval": 5, "authorizationToken": "some-token" })));
    }

    #[test]
    fn custom_sub_steps_need_reported_validity() {
        let mut step = ConfigureStep::new(&telegram(), &custom(&["connection", "tables"]), 0, None).unwrap();
        assert!(!step.next_sub_step());
        step.change(json!({ "host": "db" }), Some(true));
        assert!(step.confirm().is_none(), "not on the last sub-step");
        assert!(step.next_sub_step());
        assert_eq!(step.sub_step(), 1);
        assert!(!step.is_valid());
        assert!(step.prev_sub_step());
        assert!(!step.prev_sub_step());
        assert!(step.next_sub_step());
        step.change(json!({ "host": "db", "tables": ["t"] }), Some(true));
        assert_eq!(step.confirm(), Some(json!({ "host": "db", "tables": ["t"] })));
    }

    #[test]
    fn custom_sub_step_is_clamped() {
        let step = ConfigureStep::new(&telegram(), &custom(&["a", "b"]), 7, None).unwrap();
        assert_eq!(step.sub_step(), 1);
        assert!(step.is_last_sub_step());
    }
}
