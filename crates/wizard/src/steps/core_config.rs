use kcon_core::ServiceAccount;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{Signals, StepSignal};

pub const MAX_NAME_LEN: usize = 32;

static NAME_RE: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(r"^[a-z]([-a-z0-9]*[a-z0-9])?$"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("name is required")]
    Empty,
    #[error("name is longer than 32 characters")]
    TooLong,
    /// Lowercase letters, digits and `-`; starts with a letter, ends alphanumeric.
    #[error("name must be lowercase letters, digits and '-', starting with a letter")]
    Format,
}

pub fn validate_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(NameError::TooLong);
    }
    match NAME_RE.as_ref() {
        Ok(re) if re.is_match(name) => Ok(()),
        _ => Err(NameError::Format),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreDone {
    pub name: String,
    pub service_account: ServiceAccount,
}

/// Connector name and service account.
#[derive(Debug)]
pub struct CoreConfigurationStep {
    name: String,
    service_account: ServiceAccount,
    done: bool,
    signals: Signals,
}

impl CoreConfigurationStep {
    pub fn new(name: impl Into<String>, service_account: ServiceAccount) -> Self {
        let mut step = Self { name: name.into(), service_account, done: false, signals: Signals::default() };
        step.verify();
        step
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn service_account(&self) -> &ServiceAccount { &self.service_account }
    pub fn name_error(&self) -> Option<NameError> { validate_name(&self.name).err() }

    pub fn is_valid(&self) -> bool {
        self.name_error().is_none() && self.service_account.is_complete()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.verify();
    }

    pub fn set_client_id(&mut self, client_id: impl Into<String>) {
        self.service_account.client_id = client_id.into();
        self.verify();
    }

    pub fn set_client_secret(&mut self, client_secret: impl Into<String>) {
        self.service_account.client_secret = client_secret.into();
        self.verify();
    }

    pub fn confirm(&mut self) -> Option<CoreDone> {
        if self.done || !self.is_valid() {
            return None;
        }
        self.done = true;
        Some(CoreDone { name: self.name.clone(), service_account: self.service_account.clone() })
    }

    pub fn drain_signals(&mut self) -> Vec<StepSignal> { self.signals.drain() }

    fn verify(&mut self) {
        let valid = self.is_valid();
        self.signals.set(valid);
    }
}
