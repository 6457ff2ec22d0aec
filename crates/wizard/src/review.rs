//! Final review: edit the configuration as JSON text, validate it against
//! the connector type's schema, then create the connector.

use std::sync::Arc;
use std::time::Instant;

use kcon_api::{ApiResult, ConnectorsApi};
use kcon_core::{Connector, ConnectorType, NewConnector};
use kcon_query::CancelHandle;
use kcon_schema::{ConnectorSchema, SchemaError, ValidationDetail};
use metrics::{counter, histogram};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::steps::{Signals, StepSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewState {
    Reviewing,
    Valid,
    Saving,
    Configured,
}

/// Output of a successful save.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewDone {
    pub connector: Connector,
    pub payload: Value,
}

pub struct ReviewMachine {
    api: Arc<dyn ConnectorsApi>,
    schema: ConnectorSchema,
    /// Everything but the configuration; filled in on save.
    template: NewConnector,
    text: String,
    data: Option<Value>,
    error: Option<String>,
    warnings: Vec<ValidationDetail>,
    save_error: Option<String>,
    state: ReviewState,
    saving: Option<(oneshot::Receiver<ApiResult<Connector>>, CancelHandle, Instant)>,
    done: Option<ReviewDone>,
    signals: Signals,
}

impl std::fmt::Debug for ReviewMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewMachine")
            .field("state", &self.state)
            .field("error", &self.error)
            .field("warnings", &self.warnings.len())
            .finish_non_exhaustive()
    }
}

impl ReviewMachine {
    pub fn new(
        api: Arc<dyn ConnectorsApi>,
        connector_type: &ConnectorType,
        template: NewConnector,
    ) -> Result<Self, SchemaError> {
        let schema = ConnectorSchema::compile(&connector_type.schema)?;
        let text = serde_json::to_string_pretty(&template.connector).unwrap_or_else(|_| "{}".into());
        let mut m = Self {
            api,
            schema,
            template,
            text: String::new(),
            data: None,
            error: None,
            warnings: Vec::new(),
            save_error: None,
            state: ReviewState::Reviewing,
            saving: None,
            done: None,
            signals: Signals::default(),
        };
        m.change(text);
        Ok(m)
    }

    pub fn state(&self) -> ReviewState { self.state }
    pub fn is_valid(&self) -> bool { self.state == ReviewState::Valid }
    pub fn text(&self) -> &str { &self.text }
    /// Parsed payload, present while the text is valid JSON.
    pub fn data(&self) -> Option<&Value> { self.data.as_ref() }
    pub fn error(&self) -> Option<&str> { self.error.as_deref() }
    pub fn warnings(&self) -> &[ValidationDetail] { &self.warnings }
    pub fn save_error(&self) -> Option<&str> { self.save_error.as_deref() }
    pub fn done(&self) -> Option<&ReviewDone> { self.done.as_ref() }

    /// Re-parse and re-validate edited JSON text.
    pub fn change(&mut self, text: impl Into<String>) {
        if matches!(self.state, ReviewState::Saving | ReviewState::Configured) {
            return;
        }
        self.text = text.into();
        match serde_json::from_str::<Value>(&self.text) {
            Ok(v) => self.validate(v),
            Err(e) => {
                self.data = None;
                self.error = Some(e.to_string());
                self.warnings.clear();
                self.set_state(ReviewState::Reviewing);
            }
        }
    }

    pub fn change_value(&mut self, value: Value) {
        let text = serde_json::to_string_pretty(&value).unwrap_or_default();
        self.change(text);
    }

    /// Start the create call. Only from `Valid`.
    pub fn confirm(&mut self) -> bool {
        if self.state != ReviewState::Valid {
            return false;
        }
        let Some(data) = self.data.clone() else { return false };
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            self.save_error = Some("no async runtime available".into());
            return false;
        };
        let mut new = self.template.clone();
        new.connector = data;
        let api = self.api.clone();
        let (tx, rx) = oneshot::channel();
        info!(name = %new.name, connector_type = %new.connector_type_id, "review: saving connector");
        let task = rt.spawn(async move {
            let _ = tx.send(api.create_connector(&new).await);
        });
        self.save_error = None;
        self.saving = Some((rx, CancelHandle::from_task(task), Instant::now()));
        self.set_state(ReviewState::Saving);
        true
    }

    pub fn pump(&mut self) -> bool {
        let Some((rx, _, _)) = self.saving.as_mut() else { return false };
        match rx.try_recv() {
            Ok(res) => {
                self.finish_save(res);
                true
            }
            Err(oneshot::error::TryRecvError::Empty) => false,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.finish_save(Err(kcon_api::ApiError::Internal("save task ended without a result".into())));
                true
            }
        }
    }

    pub async fn settle(&mut self) {
        let Some((rx, _, _)) = self.saving.as_mut() else { return };
        let res = match rx.await {
            Ok(res) => res,
            Err(_) => Err(kcon_api::ApiError::Internal("save task ended without a result".into())),
        };
        self.finish_save(res);
    }

    pub fn cancel(&mut self) {
        if let Some((_, handle, _)) = self.saving.take() {
            handle.cancel();
            if self.state == ReviewState::Saving {
                self.state = ReviewState::Valid;
            }
        }
    }

    pub fn drain_signals(&mut self) -> Vec<StepSignal> { self.signals.drain() }

    fn validate(&mut self, v: Value) {
        let report = self.schema.validate(&v);
        self.error = None;
        self.warnings = report.details;
        self.data = Some(v);
        self.set_state(if report.valid { ReviewState::Valid } else { ReviewState::Reviewing });
    }

    fn finish_save(&mut self, res: ApiResult<Connector>) {
        let Some((_, _, t0)) = self.saving.take() else { return };
        histogram!("kcon_review_save_ms", t0.elapsed().as_secs_f64() * 1000.0);
        match res {
            Ok(connector) => {
                info!(id = %connector.id, name = %connector.name, took_ms = %t0.elapsed().as_millis(), "review: connector created");
                counter!("kcon_review_save_total", 1u64, "outcome" => "ok");
                let payload = self.data.clone().unwrap_or(Value::Null);
                self.done = Some(ReviewDone { connector, payload });
                self.state = ReviewState::Configured;
            }
            Err(e) => {
                warn!(error = %e, "review: save failed");
                counter!("kcon_review_save_total", 1u64, "outcome" => "error");
                self.save_error = Some(e.to_string());
                self.set_state(ReviewState::Valid);
            }
        }
    }

    fn set_state(&mut self, state: ReviewState) {
        self.state = state;
        match state {
            ReviewState::Valid => self.signals.set(true),
            ReviewState::Reviewing => self.signals.set(false),
            ReviewState::Saving | ReviewState::Configured => {}
        }
    }
}

impl Drop for ReviewMachine {
    fn drop(&mut self) { self.cancel(); }
}
