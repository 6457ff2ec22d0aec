use kcon_core::ErrorHandler;

use super::{Signals, StepSignal};

/// Error-handler choice. A dead letter queue needs a topic.
#[derive(Debug)]
pub struct ErrorConfigurationStep {
    handler: ErrorHandler,
    done: bool,
    signals: Signals,
}

impl ErrorConfigurationStep {
    pub fn new(initial: Option<ErrorHandler>) -> Self {
        let mut step = Self { handler: initial.unwrap_or_default(), done: false, signals: Signals::default() };
        step.verify();
        step
    }

    pub fn handler(&self) -> &ErrorHandler { &self.handler }

    pub fn is_valid(&self) -> bool {
        match &self.handler {
            ErrorHandler::DeadLetterQueue { topic } => !topic.trim().is_empty(),
            _ => true,
        }
    }

    pub fn set_handler(&mut self, handler: ErrorHandler) {
        self.handler = handler;
        self.verify();
    }

    /// Switches to a dead letter queue when another handler is selected.
    pub fn set_topic(&mut self, topic: impl Into<String>) {
        self.handler = ErrorHandler::DeadLetterQueue { topic: topic.into() };
        self.verify();
    }

    pub fn confirm(&mut self) -> Option<ErrorHandler> {
        if self.done || !self.is_valid() {
            return None;
        }
        self.done = true;
        Some(self.handler.clone())
    }

    pub fn drain_signals(&mut self) -> Vec<StepSignal> { self.signals.drain() }

    fn verify(&mut self) {
        let valid = self.is_valid();
        self.signals.set(valid);
    }
}
