//! The paginated query engine.
//!
//! One engine owns one list: the current request, the last applied response,
//! and at most one foreground fetch in flight. Fetch results come back as
//! messages on the engine's own channel and are applied by `pump`/`settle`,
//! so every mutation is serialized through `&mut self`.
//!
//! A second region polls: on each tick the current request is re-issued
//! without touching the foreground classification. Any foreground dispatch
//! supersedes a poll fetch.

use std::sync::Arc;
use std::time::Instant;

use kcon_core::{PaginatedRequest, PaginatedResponse, RequestPatch};
use metrics::{counter, histogram};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::cancel::CancelHandle;
use crate::fetch::{FetchReply, ListFetcher};
use crate::model::{classify, FetchOrigin, ListView, QueryMsg, QueryNotice, QueryOptions, QueryStatus};

type Transformer<R, T> = Box<dyn FnMut(R) -> T + Send>;
type BeforeSetResponse<T> = Box<dyn FnMut(Vec<T>) + Send>;

pub struct QueryMachine<R, T = R> {
    label: &'static str,
    fetcher: Arc<dyn ListFetcher<R>>,
    options: QueryOptions,
    request: PaginatedRequest,
    response: Option<PaginatedResponse<T>>,
    status: QueryStatus,
    error: Option<String>,
    seq: u64,
    inflight: Option<CancelHandle>,
    poll_seq: u64,
    poll_inflight: Option<CancelHandle>,
    poll_timer: Option<CancelHandle>,
    polling: bool,
    polling_paused: bool,
    issued_at: Option<Instant>,
    tx: UnboundedSender<QueryMsg<R>>,
    rx: UnboundedReceiver<QueryMsg<R>>,
    transform: Transformer<R, T>,
    before_set_response: Option<BeforeSetResponse<T>>,
    notices: Vec<QueryNotice>,
}

impl<R: Send + 'static> QueryMachine<R, R> {
    pub fn new(label: &'static str, fetcher: Arc<dyn ListFetcher<R>>, options: QueryOptions) -> Self {
        Self::with_transformer(label, fetcher, options, |r| r)
    }
}

impl<R, T> QueryMachine<R, T>
where
    R: Send + 'static,
    T: Send + 'static,
{
    /// Engine whose raw items are mapped through `transform` when a response
    /// is applied, not when it is fetched.
    pub fn with_transformer(
        label: &'static str,
        fetcher: Arc<dyn ListFetcher<R>>,
        options: QueryOptions,
        transform: impl FnMut(R) -> T + Send + 'static,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            label,
            fetcher,
            request: options.first_page(),
            options,
            response: None,
            status: QueryStatus::Idle,
            error: None,
            seq: 0,
            inflight: None,
            poll_seq: 0,
            poll_inflight: None,
            poll_timer: None,
            polling: false,
            polling_paused: false,
            issued_at: None,
            tx,
            rx,
            transform: Box::new(transform),
            before_set_response: None,
            notices: vec![QueryNotice::Ready],
        }
    }

    /// Called with the outgoing items right before a new response replaces them.
    pub fn on_before_set_response(mut self, hook: impl FnMut(Vec<T>) + Send + 'static) -> Self {
        self.before_set_response = Some(Box::new(hook));
        self
    }

    /// Replace the initial request before `start`.
    pub fn with_request(mut self, request: PaginatedRequest) -> Self {
        self.request = request;
        self
    }

    pub fn label(&self) -> &'static str { self.label }
    pub fn options(&self) -> &QueryOptions { &self.options }
    pub fn request(&self) -> &PaginatedRequest { &self.request }
    pub fn response(&self) -> Option<&PaginatedResponse<T>> { self.response.as_ref() }
    pub fn status(&self) -> QueryStatus { self.status }
    pub fn error(&self) -> Option<&str> { self.error.as_deref() }
    pub fn is_loading(&self) -> bool { self.status == QueryStatus::Loading }
    pub fn is_polling(&self) -> bool { self.polling }

    /// No foreground or poll fetch outstanding.
    pub fn is_idle(&self) -> bool { self.inflight.is_none() && self.poll_inflight.is_none() }

    pub fn items(&self) -> &[T] {
        self.response.as_ref().map(|r| r.items.as_slice()).unwrap_or(&[])
    }

    pub fn items_mut(&mut self) -> &mut [T] {
        self.response.as_mut().map(|r| r.items.as_mut_slice()).unwrap_or(&mut [])
    }

    pub fn view(&self) -> ListView<'_, T> {
        ListView::new(&self.request, self.response.as_ref(), self.status, self.error.as_deref())
    }

    pub fn drain_notices(&mut self) -> Vec<QueryNotice> { std::mem::take(&mut self.notices) }

    /// Issue the first fetch for the current request.
    pub fn start(&mut self) { self.dispatch(); }

    /// Merge `patch` into the current request and fetch it.
    pub fn query(&mut self, patch: RequestPatch) {
        self.request.merge(&patch);
        self.dispatch();
    }

    pub fn refresh(&mut self) { self.dispatch(); }

    /// Returns false when already on the last page or nothing has loaded yet.
    pub fn next_page(&mut self) -> bool {
        let Some(resp) = &self.response else { return false };
        let last = kcon_core::pagination::last_page(resp.total, self.request.size);
        if self.request.page >= last {
            debug!(list = %self.label, page = self.request.page, last, "query: next_page at last page");
            return false;
        }
        let page = self.request.page + 1;
        self.query(RequestPatch::page(page));
        true
    }

    pub fn prev_page(&mut self) -> bool {
        if self.request.page <= 1 {
            return false;
        }
        let page = self.request.page - 1;
        self.query(RequestPatch::page(page));
        true
    }

    /// Start the poll timer at `options.poll_interval`. Ticks are delivered
    /// through the engine channel; without a runtime only `poll_tick` works.
    pub fn enable_polling(&mut self) {
        self.polling = true;
        if self.poll_timer.is_some() {
            return;
        }
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            warn!(list = %self.label, "query: no runtime, poll timer not started");
            return;
        };
        let tx = self.tx.clone();
        let every = self.options.poll_interval;
        let task = rt.spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if tx.send(QueryMsg::PollTick).is_err() {
                    break;
                }
            }
        });
        self.poll_timer = Some(CancelHandle::from_task(task));
        info!(list = %self.label, every_ms = %every.as_millis(), "query: polling enabled");
    }

    pub fn disable_polling(&mut self) {
        self.polling = false;
        if let Some(t) = self.poll_timer.take() {
            t.cancel();
        }
        if let Some(p) = self.poll_inflight.take() {
            p.cancel();
        }
    }

    /// Skip poll ticks while paused; the timer keeps running.
    pub fn pause_polling(&mut self, paused: bool) {
        if self.polling_paused != paused {
            debug!(list = %self.label, paused, "query: polling pause changed");
        }
        self.polling_paused = paused;
    }

    /// Handle one poll tick immediately.
    pub fn poll_tick(&mut self) { self.handle(QueryMsg::PollTick); }

    /// Apply every message already delivered. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut n = 0;
        while let Ok(msg) = self.rx.try_recv() {
            self.handle(msg);
            n += 1;
        }
        n
    }

    /// Wait until no fetch is outstanding, applying results as they arrive.
    pub async fn settle(&mut self) {
        while !self.is_idle() {
            match self.rx.recv().await {
                Some(msg) => self.handle(msg),
                None => break,
            }
        }
        self.pump();
    }

    /// Cancel every outstanding task. The last response stays readable.
    pub fn stop(&mut self) { self.cancel_all(); }

    fn dispatch(&mut self) {
        if let Some(prev) = self.inflight.take() {
            prev.cancel();
            counter!("kcon_query_cancelled_total", 1u64, "list" => self.label);
        }
        if let Some(poll) = self.poll_inflight.take() {
            debug!(list = %self.label, "query: poll fetch superseded");
            poll.cancel();
        }
        self.seq += 1;
        self.status = QueryStatus::Loading;
        self.error = None;
        self.notices.push(QueryNotice::Loading(self.request.clone()));
        debug!(list = %self.label, page = self.request.page, size = self.request.size, "query: fetch start");
        counter!("kcon_query_fetch_total", 1u64, "list" => self.label);
        self.issued_at = Some(Instant::now());
        let reply = FetchReply::new(self.tx.clone(), FetchOrigin::Foreground, self.seq, self.request.page);
        let handle = self.fetcher.fetch(&self.request, reply);
        self.inflight = Some(handle);
    }

    fn dispatch_poll(&mut self) {
        self.poll_seq += 1;
        debug!(list = %self.label, page = self.request.page, "query: poll fetch start");
        let reply = FetchReply::new(self.tx.clone(), FetchOrigin::Poll, self.poll_seq, self.request.page);
        let handle = self.fetcher.fetch(&self.request, reply);
        self.poll_inflight = Some(handle);
    }

    fn handle(&mut self, msg: QueryMsg<R>) {
        match msg {
            QueryMsg::SetResponse { origin: FetchOrigin::Foreground, seq, response } => {
                if self.inflight.is_none() || seq != self.seq || response.page != self.request.page {
                    self.drop_stale(response.page);
                    return;
                }
                self.inflight = None;
                if let Some(t0) = self.issued_at.take() {
                    histogram!("kcon_query_fetch_ms", t0.elapsed().as_secs_f64() * 1000.0);
                }
                self.apply(response);
            }
            QueryMsg::SetResponse { origin: FetchOrigin::Poll, seq, response } => {
                if self.poll_inflight.is_none() || seq != self.poll_seq || self.inflight.is_some() {
                    self.drop_stale(response.page);
                    return;
                }
                self.poll_inflight = None;
                self.apply(response);
            }
            QueryMsg::SetError { origin: FetchOrigin::Foreground, seq, page, error } => {
                if self.inflight.is_none() || seq != self.seq || page != self.request.page {
                    self.drop_stale(page);
                    return;
                }
                self.inflight = None;
                self.issued_at = None;
                warn!(list = %self.label, page, error = %error, "query: fetch failed");
                counter!("kcon_query_errors_total", 1u64, "list" => self.label);
                self.status = QueryStatus::Error;
                self.error = Some(error.clone());
                self.notices.push(QueryNotice::Error(error));
            }
            QueryMsg::SetError { origin: FetchOrigin::Poll, seq, page, error } => {
                if seq == self.poll_seq {
                    self.poll_inflight = None;
                }
                warn!(list = %self.label, page, error = %error, "query: poll fetch failed");
            }
            QueryMsg::PollTick => {
                if !self.polling {
                    return;
                }
                if self.polling_paused || !self.is_idle() {
                    debug!(list = %self.label, paused = self.polling_paused, "query: poll tick skipped");
                    return;
                }
                self.dispatch_poll();
            }
        }
    }

    fn drop_stale(&self, page: u32) {
        debug!(list = %self.label, page, current = self.request.page, "query: stale reply dropped");
        counter!("kcon_query_stale_dropped_total", 1u64, "list" => self.label);
    }

    fn apply(&mut self, response: PaginatedResponse<R>) {
        if let Some(prev) = self.response.take() {
            if let Some(hook) = self.before_set_response.as_mut() {
                hook(prev.items);
            }
        }
        let transform = &mut self.transform;
        let response = response.map(|r| transform(r));
        self.status = classify(&self.request, response.total);
        self.error = None;
        debug!(list = %self.label, page = response.page, total = response.total, status = ?self.status, "query: response applied");
        self.notices.push(QueryNotice::Success { page: response.page, size: response.size, total: response.total });
        self.response = Some(response);
    }
}

impl<R, T> QueryMachine<R, T> {
    fn cancel_all(&mut self) {
        for h in [self.inflight.take(), self.poll_inflight.take(), self.poll_timer.take()].into_iter().flatten() {
            h.cancel();
        }
        self.polling = false;
    }
}

impl<R, T> Drop for QueryMachine<R, T> {
    fn drop(&mut self) { self.cancel_all(); }
}

impl<R, T> std::fmt::Debug for QueryMachine<R, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryMachine")
            .field("label", &self.label)
            .field("request", &self.request)
            .field("status", &self.status)
            .field("error", &self.error)
            .field("in_flight", &self.inflight.is_some())
            .field("polling", &self.polling)
            .finish_non_exhaustive()
    }
}
