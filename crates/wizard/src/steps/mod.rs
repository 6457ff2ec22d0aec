//! Step machines the wizard invokes. Each one reports validity upward with
//! [`StepSignal`]s and hands back its result from `confirm`.

pub mod core_config;
pub mod error_config;
pub mod selection;

pub use core_config::{CoreConfigurationStep, CoreDone, NameError};
pub use error_config::ErrorConfigurationStep;
pub use selection::{
    ConnectorTypeStep, KafkaStep, NamespaceStep, SelectionDone, SelectionState, SelectionStep,
};

/// Validity notifications a step sends its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSignal {
    IsValid,
    IsInvalid,
}

/// Emits a signal only when validity actually changes.
#[derive(Debug, Default)]
pub(crate) struct Signals {
    last: Option<bool>,
    pending: Vec<StepSignal>,
}

impl Signals {
    pub(crate) fn set(&mut self, valid: bool) {
        if self.last == Some(valid) {
            return;
        }
        self.last = Some(valid);
        self.pending.push(if valid { StepSignal::IsValid } else { StepSignal::IsInvalid });
    }

    pub(crate) fn drain(&mut self) -> Vec<StepSignal> { std::mem::take(&mut self.pending) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_state_is_not_resignalled() {
        let mut s = Signals::default();
        s.set(false);
        s.set(false);
        s.set(true);
        s.set(true);
        s.set(false);
        assert_eq!(s.drain(), vec![StepSignal::IsInvalid, StepSignal::IsValid, StepSignal::IsInvalid]);
        assert!(s.drain().is_empty());
    }
}
