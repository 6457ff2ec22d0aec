//! Per-connector lifecycle machine: start/stop/delete with transient states.

use std::sync::Arc;
use std::time::Instant;

use kcon_api::{ApiResult, ConnectorsApi};
use kcon_core::{Connector, DesiredState};
use metrics::counter;
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::cancel::CancelHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorAction {
    Start,
    Stop,
    Delete,
}

impl ConnectorAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectorAction::Start => "start",
            ConnectorAction::Stop => "stop",
            ConnectorAction::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    Ready,
    Stopped,
    Deleted,
    Starting,
    Stopping,
    Deleting,
}

impl ActionState {
    /// Settled state for a desired state.
    pub fn verify(desired: DesiredState) -> Self {
        match desired {
            DesiredState::Ready => ActionState::Ready,
            DesiredState::Stopped => ActionState::Stopped,
            DesiredState::Deleted => ActionState::Deleted,
        }
    }

    pub fn is_busy(self) -> bool {
        matches!(self, ActionState::Starting | ActionState::Stopping | ActionState::Deleting)
    }
}

#[derive(Debug)]
pub(crate) enum ActionMsg {
    Success(Connector),
    Failure(String),
}

/// Completion side of one action call.
pub struct ActionReply {
    tx: UnboundedSender<ActionMsg>,
    id: String,
}

impl ActionReply {
    pub fn success(self, connector: Connector) {
        if self.tx.send(ActionMsg::Success(connector)).is_err() {
            debug!(id = %self.id, "action: reply after machine dropped");
        }
    }

    pub fn error(self, error: impl Into<String>) {
        if self.tx.send(ActionMsg::Failure(error.into())).is_err() {
            debug!(id = %self.id, "action: error after machine dropped");
        }
    }

    pub fn complete(self, result: ApiResult<Connector>) {
        match result {
            Ok(c) => self.success(c),
            Err(e) => self.error(e.to_string()),
        }
    }
}

/// Runs one action against the backend and reports through `reply`.
pub trait ActionRunner: Send + Sync {
    fn run(&self, action: ConnectorAction, connector: &Connector, reply: ActionReply) -> CancelHandle;
}

pub struct ApiActionRunner {
    api: Arc<dyn ConnectorsApi>,
}

impl ApiActionRunner {
    pub fn new(api: Arc<dyn ConnectorsApi>) -> Self { Self { api } }
}

impl ActionRunner for ApiActionRunner {
    fn run(&self, action: ConnectorAction, connector: &Connector, reply: ActionReply) -> CancelHandle {
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            reply.error("no async runtime available");
            return CancelHandle::noop();
        };
        let api = self.api.clone();
        let id = connector.id.clone();
        CancelHandle::from_task(rt.spawn(async move {
            let res = match action {
                ConnectorAction::Start => api.start_connector(&id).await,
                ConnectorAction::Stop => api.stop_connector(&id).await,
                ConnectorAction::Delete => api.delete_connector(&id).await,
            };
            reply.complete(res);
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionNotice {
    /// Open a detail view for this connector.
    Selected(Connector),
    ActionSuccess { action: ConnectorAction, connector: Connector },
    ActionFailure { action: ConnectorAction, connector_id: String, error: String },
}

pub struct ConnectorMachine {
    connector: Connector,
    state: ActionState,
    runner: Arc<dyn ActionRunner>,
    tx: UnboundedSender<ActionMsg>,
    rx: UnboundedReceiver<ActionMsg>,
    inflight: Option<(ConnectorAction, CancelHandle, Instant)>,
    notices: Vec<ActionNotice>,
}

impl std::fmt::Debug for ConnectorMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorMachine")
            .field("id", &self.connector.id)
            .field("state", &self.state)
            .field("in_flight", &self.inflight.as_ref().map(|(a, _, _)| *a))
            .finish()
    }
}

impl ConnectorMachine {
    pub fn new(connector: Connector, runner: Arc<dyn ActionRunner>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = ActionState::verify(connector.desired_state);
        Self { connector, state, runner, tx, rx, inflight: None, notices: Vec::new() }
    }

    pub fn connector(&self) -> &Connector { &self.connector }
    pub fn id(&self) -> &str { &self.connector.id }
    pub fn state(&self) -> ActionState { self.state }
    pub fn is_busy(&self) -> bool { self.inflight.is_some() }

    pub fn can_start(&self) -> bool { self.state == ActionState::Stopped }
    pub fn can_stop(&self) -> bool { self.state == ActionState::Ready }
    pub fn can_delete(&self) -> bool { matches!(self.state, ActionState::Ready | ActionState::Stopped) }

    /// Returns false, changing nothing, when the connector cannot be started.
    pub fn start(&mut self) -> bool {
        if !self.can_start() { return false; }
        self.run(ConnectorAction::Start, ActionState::Starting);
        true
    }

    pub fn stop(&mut self) -> bool {
        if !self.can_stop() { return false; }
        self.run(ConnectorAction::Stop, ActionState::Stopping);
        true
    }

    pub fn remove(&mut self) -> bool {
        if !self.can_delete() { return false; }
        self.run(ConnectorAction::Delete, ActionState::Deleting);
        true
    }

    pub fn select(&mut self) {
        self.notices.push(ActionNotice::Selected(self.connector.clone()));
    }

    pub fn drain_notices(&mut self) -> Vec<ActionNotice> { std::mem::take(&mut self.notices) }

    pub fn pump(&mut self) -> usize {
        let mut n = 0;
        while let Ok(msg) = self.rx.try_recv() {
            self.handle(msg);
            n += 1;
        }
        n
    }

    pub async fn settle(&mut self) {
        while self.inflight.is_some() {
            match self.rx.recv().await {
                Some(msg) => self.handle(msg),
                None => break,
            }
        }
    }

    /// Cancel any in-flight action. The machine stays readable.
    pub fn dispose(&mut self) {
        if let Some((action, handle, _)) = self.inflight.take() {
            debug!(id = %self.connector.id, action = action.as_str(), "action: cancelled on dispose");
            handle.cancel();
            self.state = ActionState::verify(self.connector.desired_state);
        }
    }

    fn run(&mut self, action: ConnectorAction, transient: ActionState) {
        self.state = transient;
        info!(id = %self.connector.id, name = %self.connector.name, action = action.as_str(), "action: start");
        let reply = ActionReply { tx: self.tx.clone(), id: self.connector.id.clone() };
        let handle = self.runner.run(action, &self.connector, reply);
        self.inflight = Some((action, handle, Instant::now()));
    }

    fn handle(&mut self, msg: ActionMsg) {
        let Some((action, _, t0)) = self.inflight.take() else {
            debug!(id = %self.connector.id, "action: reply without action in flight");
            return;
        };
        match msg {
            ActionMsg::Success(updated) => {
                info!(id = %updated.id, action = action.as_str(), desired = %updated.desired_state, took_ms = %t0.elapsed().as_millis(), "action: ok");
                counter!("kcon_action_total", 1u64, "action" => action.as_str(), "outcome" => "ok");
                self.state = ActionState::verify(updated.desired_state);
                self.connector = updated;
                self.notices.push(ActionNotice::ActionSuccess { action, connector: self.connector.clone() });
            }
            ActionMsg::Failure(error) => {
                warn!(id = %self.connector.id, action = action.as_str(), error = %error, "action: failed");
                counter!("kcon_action_total", 1u64, "action" => action.as_str(), "outcome" => "error");
                self.state = ActionState::verify(self.connector.desired_state);
                self.notices.push(ActionNotice::ActionFailure { action, connector_id: self.connector.id.clone(), error });
            }
        }
    }
}

impl Drop for ConnectorMachine {
    fn drop(&mut self) {
        if let Some((_, handle, _)) = self.inflight.take() {
            handle.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct HeldRunner {
        replies: Mutex<Vec<(ConnectorAction, ActionReply)>>,
    }

    impl ActionRunner for HeldRunner {
        fn run(&self, action: ConnectorAction, _c: &Connector, reply: ActionReply) -> CancelHandle {
            self.replies.lock().unwrap().push((action, reply));
            CancelHandle::noop()
        }
    }

    fn connector(desired: DesiredState) -> Connector {
        serde_json::from_value(serde_json::json!({
            "id": "c1", "name": "one", "connector_type_id": "t", "kafka_id": "k",
            "namespace_id": "n", "desired_state": desired.to_string()
        }))
        .unwrap()
    }

    #[test]
    fn invalid_transitions_do_not_change_state() {
        let runner = Arc::new(HeldRunner::default());
        let mut m = ConnectorMachine::new(connector(DesiredState::Stopped), runner.clone());
        assert!(!m.stop());
        assert_eq!(m.state(), ActionState::Stopped);
        assert!(runner.replies.lock().unwrap().is_empty());
        assert!(m.remove());
        assert_eq!(m.state(), ActionState::Deleting);
        assert!(!m.start());
        assert!(!m.can_delete());
    }

    #[test]
    fn failure_restores_state_and_notifies() {
        let runner = Arc::new(HeldRunner::default());
        let mut m = ConnectorMachine::new(connector(DesiredState::Ready), runner.clone());
        assert!(m.stop());
        let (action, reply) = runner.replies.lock().unwrap().remove(0);
        assert_eq!(action, ConnectorAction::Stop);
        reply.error("conflict");
        m.pump();
        assert_eq!(m.state(), ActionState::Ready);
        assert!(m.can_stop());
        let notices = m.drain_notices();
        assert_eq!(
            notices,
            vec![ActionNotice::ActionFailure { action: ConnectorAction::Stop, connector_id: "c1".into(), error: "conflict".into() }]
        );
    }

    #[test]
    fn reply_after_machine_dropped_is_ignored() {
        let runner = Arc::new(HeldRunner::default());
        let mut m = ConnectorMachine::new(connector(DesiredState::Stopped), runner.clone());
        assert!(m.start());
        drop(m);
        let (_, reply) = runner.replies.lock().unwrap().remove(0);
        reply.success(connector(DesiredState::Ready));
    }

    #[test]
    fn select_only_notifies() {
        let runner = Arc::new(HeldRunner::default());
        let mut m = ConnectorMachine::new(connector(DesiredState::Ready), runner);
        m.select();
        assert_eq!(m.state(), ActionState::Ready);
        assert!(matches!(m.drain_notices().as_slice(), [ActionNotice::Selected(c)] if c.id == "c1"));
    }
}
