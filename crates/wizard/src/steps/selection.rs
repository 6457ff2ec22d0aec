//! Single-selection step over one paginated list.

use std::sync::Arc;

use kcon_core::prelude::*;
use kcon_query::{ListFetcher, ListView, QueryMachine, QueryNotice, QueryOptions};
use tracing::debug;

use super::{Signals, StepSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    Selecting,
    Valid,
    Done,
}

/// Result handed to the wizard when the step is confirmed.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionDone<T> {
    pub selected: T,
    pub duplicate: bool,
}

pub struct SelectionStep<T: Entity> {
    query: QueryMachine<T>,
    selected: Option<T>,
    state: SelectionState,
    duplicate: bool,
    signals: Signals,
}

pub type ConnectorTypeStep = SelectionStep<ConnectorType>;
pub type KafkaStep = SelectionStep<KafkaInstance>;
pub type NamespaceStep = SelectionStep<Namespace>;

impl<T: Entity> SelectionStep<T> {
    /// Starts fetching immediately. `preselected` comes from the wizard
    /// context and is kept even when it is not on the first page.
    pub fn new(
        label: &'static str,
        fetcher: Arc<dyn ListFetcher<T>>,
        options: QueryOptions,
        preselected: Option<T>,
        duplicate: bool,
    ) -> Self {
        let mut query = QueryMachine::new(label, fetcher, options);
        query.start();
        let mut step = Self { query, selected: preselected, state: SelectionState::Selecting, duplicate, signals: Signals::default() };
        step.verify();
        step
    }

    pub fn state(&self) -> SelectionState { self.state }
    pub fn is_valid(&self) -> bool { self.state == SelectionState::Valid }
    pub fn selected(&self) -> Option<&T> { self.selected.as_ref() }
    pub fn selected_id(&self) -> Option<&str> { self.selected.as_ref().map(|s| s.id()) }
    pub fn view(&self) -> ListView<'_, T> { self.query.view() }
    pub fn items(&self) -> &[T] { self.query.items() }

    /// Ignored unless `id` is among the last fetched items.
    pub fn select(&mut self, id: &str) -> bool {
        if self.state == SelectionState::Done {
            return false;
        }
        let Some(found) = self.query.items().iter().find(|it| it.id() == id).cloned() else {
            debug!(list = %self.query.label(), id, "selection: id not in current items");
            return false;
        };
        self.selected = Some(found);
        self.verify();
        true
    }

    pub fn deselect(&mut self) {
        if self.state == SelectionState::Done {
            return;
        }
        self.selected = None;
        self.verify();
    }

    /// Honoured only in `Valid`; the step is final afterwards.
    pub fn confirm(&mut self) -> Option<SelectionDone<T>> {
        if self.state != SelectionState::Valid {
            return None;
        }
        let selected = self.selected.clone()?;
        self.state = SelectionState::Done;
        self.query.stop();
        Some(SelectionDone { selected, duplicate: self.duplicate })
    }

    pub fn query(&mut self, patch: RequestPatch) { self.query.query(patch); }
    pub fn next_page(&mut self) -> bool { self.query.next_page() }
    pub fn prev_page(&mut self) -> bool { self.query.prev_page() }
    pub fn refresh(&mut self) { self.query.refresh(); }

    pub fn drain_signals(&mut self) -> Vec<StepSignal> { self.signals.drain() }
    pub fn drain_notices(&mut self) -> Vec<QueryNotice> { self.query.drain_notices() }

    pub fn pump(&mut self) -> usize { self.query.pump() }
    pub async fn settle(&mut self) { self.query.settle().await; }

    fn verify(&mut self) {
        self.state = if self.selected.is_some() { SelectionState::Valid } else { SelectionState::Selecting };
        self.signals.set(self.state == SelectionState::Valid);
    }
}

impl<T: Entity> std::fmt::Debug for SelectionStep<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionStep")
            .field("list", &self.query.label())
            .field("state", &self.state)
            .field("selected", &self.selected_id())
            .finish()
    }
}
