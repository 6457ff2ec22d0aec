//! Connectors list: a query engine whose rows are live action machines.

use std::sync::{Arc, Mutex};

use kcon_api::ConnectorsApi;
use kcon_core::{Connector, RequestPatch};
use tracing::{debug, info};

use crate::action::{ActionNotice, ActionRunner, ApiActionRunner, ConnectorAction, ConnectorMachine};
use crate::engine::QueryMachine;
use crate::fetch::{self, ListFetcher};
use crate::model::{ListView, QueryNotice, QueryOptions};

#[derive(Debug, Clone, PartialEq)]
pub enum ListNotice {
    Query(QueryNotice),
    Selected(Connector),
    ActionSuccess { action: ConnectorAction, connector: Connector },
    ActionFailure { action: ConnectorAction, connector_id: String, error: String },
}

/// Rows with an action in flight, parked while a new response is applied.
type Parked = Arc<Mutex<Vec<ConnectorMachine>>>;

pub struct ConnectorsList {
    query: QueryMachine<Connector, ConnectorMachine>,
    parked: Parked,
    /// Busy rows that are no longer part of the current page. Kept until
    /// their action reports.
    detached: Vec<ConnectorMachine>,
    notices: Vec<ListNotice>,
}

impl ConnectorsList {
    pub fn new(api: Arc<dyn ConnectorsApi>, options: QueryOptions) -> Self {
        let runner: Arc<dyn ActionRunner> = Arc::new(ApiActionRunner::new(api.clone()));
        Self::with_parts(fetch::connectors(api), runner, options)
    }

    pub fn with_parts(fetcher: Arc<dyn ListFetcher<Connector>>, runner: Arc<dyn ActionRunner>, options: QueryOptions) -> Self {
        let parked: Parked = Arc::default();
        let carried = parked.clone();
        let outgoing = parked.clone();
        let query = QueryMachine::with_transformer("connectors", fetcher, options, move |c: Connector| {
            let kept = carried.lock().ok().and_then(|mut rows| {
                let i = rows.iter().position(|r| r.id() == c.id)?;
                Some(rows.swap_remove(i))
            });
            match kept {
                Some(row) => {
                    debug!(id = %c.id, "connectors: row with action in flight kept");
                    row
                }
                None => ConnectorMachine::new(c, runner.clone()),
            }
        })
        .on_before_set_response(move |rows: Vec<ConnectorMachine>| {
            let mut busy = Vec::new();
            for mut row in rows {
                if row.is_busy() {
                    busy.push(row);
                } else {
                    row.dispose();
                }
            }
            if let Ok(mut p) = outgoing.lock() {
                p.extend(busy);
            }
        });
        Self { query, parked, detached: Vec::new(), notices: Vec::new() }
    }

    pub fn start(&mut self) { self.query.start(); }
    pub fn query(&mut self, patch: RequestPatch) { self.query.query(patch); }
    pub fn refresh(&mut self) { self.query.refresh(); }
    pub fn next_page(&mut self) -> bool { self.query.next_page() }
    pub fn prev_page(&mut self) -> bool { self.query.prev_page() }
    pub fn enable_polling(&mut self) { self.query.enable_polling(); }
    pub fn disable_polling(&mut self) { self.query.disable_polling(); }
    pub fn poll_tick(&mut self) { self.query.poll_tick(); }

    pub fn view(&self) -> ListView<'_, ConnectorMachine> { self.query.view() }
    pub fn rows(&self) -> &[ConnectorMachine] { self.query.items() }
    pub fn engine(&self) -> &QueryMachine<Connector, ConnectorMachine> { &self.query }

    pub fn row(&self, id: &str) -> Option<&ConnectorMachine> {
        self.query.items().iter().find(|r| r.id() == id)
    }

    /// Any row, on the current page or not, still waiting for its action.
    pub fn any_busy(&self) -> bool {
        self.query.items().iter().chain(self.detached.iter()).any(ConnectorMachine::is_busy)
    }

    /// Row-level actions return false when the id is unknown or the
    /// transition is not valid from the row's state.
    pub fn start_connector(&mut self, id: &str) -> bool { self.with_row(id, ConnectorMachine::start) }
    pub fn stop_connector(&mut self, id: &str) -> bool { self.with_row(id, ConnectorMachine::stop) }
    pub fn delete_connector(&mut self, id: &str) -> bool { self.with_row(id, ConnectorMachine::remove) }

    pub fn select(&mut self, id: &str) -> bool {
        self.with_row(id, |r| {
            r.select();
            true
        })
    }

    pub fn drain_notices(&mut self) -> Vec<ListNotice> {
        self.collect();
        std::mem::take(&mut self.notices)
    }

    /// Apply delivered list and action results; a successful action refreshes the list.
    pub fn pump(&mut self) {
        self.query.pump();
        self.detach_parked();
        let mut refresh = false;
        for row in self.query.items_mut().iter_mut().chain(self.detached.iter_mut()) {
            row.pump();
            for n in row.drain_notices() {
                match n {
                    ActionNotice::Selected(c) => self.notices.push(ListNotice::Selected(c)),
                    ActionNotice::ActionSuccess { action, connector } => {
                        refresh = true;
                        self.notices.push(ListNotice::ActionSuccess { action, connector });
                    }
                    ActionNotice::ActionFailure { action, connector_id, error } => {
                        self.notices.push(ListNotice::ActionFailure { action, connector_id, error });
                    }
                }
            }
        }
        self.detached.retain(ConnectorMachine::is_busy);
        let busy = self.any_busy();
        self.query.pause_polling(busy);
        if refresh {
            info!("connectors: action succeeded, refreshing");
            self.query.refresh();
        }
        self.collect();
    }

    /// Wait for the list fetch and every row action, including refreshes they trigger.
    pub async fn settle(&mut self) {
        loop {
            self.query.settle().await;
            self.detach_parked();
            for row in self.query.items_mut().iter_mut().chain(self.detached.iter_mut()) {
                if row.is_busy() {
                    row.settle().await;
                }
            }
            self.pump();
            if self.query.is_idle() && !self.any_busy() {
                break;
            }
            debug!("connectors: settle continuing");
        }
    }

    pub fn stop(&mut self) {
        for row in self.query.items_mut().iter_mut().chain(self.detached.iter_mut()) {
            row.dispose();
        }
        self.detached.clear();
        self.query.stop();
    }

    fn with_row(&mut self, id: &str, f: impl FnOnce(&mut ConnectorMachine) -> bool) -> bool {
        let changed = match self.query.items_mut().iter_mut().find(|r| r.id() == id) {
            Some(row) => f(row),
            None => false,
        };
        if changed {
            self.pump();
        }
        changed
    }

    /// Parked rows the new response did not take back left the page.
    fn detach_parked(&mut self) {
        if let Ok(mut p) = self.parked.lock() {
            if !p.is_empty() {
                debug!(rows = p.len(), "connectors: busy rows left the page");
                self.detached.append(&mut p);
            }
        }
    }

    fn collect(&mut self) {
        for n in self.query.drain_notices() {
            self.notices.push(ListNotice::Query(n));
        }
    }
}

impl Drop for ConnectorsList {
    fn drop(&mut self) { self.stop(); }
}
