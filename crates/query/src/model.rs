use std::time::Duration;

use kcon_core::{PaginatedRequest, PaginatedResponse};
use serde::Serialize;

/// Exactly one holds at any instant for a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Idle,
    Loading,
    Results,
    Empty,
    QueryResults,
    QueryEmpty,
    Error,
}

/// Settled classification of a response for `request`.
pub fn classify(request: &PaginatedRequest, total: u64) -> QueryStatus {
    match (request.query.is_some(), total == 0) {
        (true, true) => QueryStatus::QueryEmpty,
        (true, false) => QueryStatus::QueryResults,
        (false, true) => QueryStatus::Empty,
        (false, false) => QueryStatus::Results,
    }
}

/// Read-only projection of a list sufficient to pick one UI state.
#[derive(Debug, Clone, Copy)]
pub struct ListView<'a, T> {
    pub request: &'a PaginatedRequest,
    pub response: Option<&'a PaginatedResponse<T>>,
    pub status: QueryStatus,
    pub loading: bool,
    pub query_empty: bool,
    pub query_results: bool,
    pub no_results: bool,
    pub results: bool,
    pub error: Option<&'a str>,
    /// No response has settled yet for this list.
    pub first_request: bool,
}

impl<'a, T> ListView<'a, T> {
    pub(crate) fn new(
        request: &'a PaginatedRequest,
        response: Option<&'a PaginatedResponse<T>>,
        status: QueryStatus,
        error: Option<&'a str>,
    ) -> Self {
        Self {
            request,
            response,
            status,
            loading: status == QueryStatus::Loading,
            query_empty: status == QueryStatus::QueryEmpty,
            query_results: status == QueryStatus::QueryResults,
            no_results: status == QueryStatus::Empty,
            results: status == QueryStatus::Results,
            error: if status == QueryStatus::Error { error } else { None },
            first_request: response.is_none(),
        }
    }

    pub fn items(&self) -> &'a [T] {
        self.response.map(|r| r.items.as_slice()).unwrap_or(&[])
    }
}

/// Lifecycle notifications a query engine emits to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNotice {
    Ready,
    Loading(PaginatedRequest),
    Success { page: u32, size: u32, total: u64 },
    Error(String),
}

/// Which region issued a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrigin {
    Foreground,
    Poll,
}

/// Messages delivered to a query engine by fetch tasks and the poll timer.
/// `seq` identifies the dispatch a reply belongs to.
#[derive(Debug)]
pub(crate) enum QueryMsg<T> {
    SetResponse { origin: FetchOrigin, seq: u64, response: PaginatedResponse<T> },
    SetError { origin: FetchOrigin, seq: u64, page: u32, error: String },
    PollTick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub page_size: u32,
    pub poll_interval: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { page_size: 10, poll_interval: Duration::from_millis(5000) }
    }
}

impl QueryOptions {
    /// Defaults overridden by `KCON_PAGE_SIZE` and `KCON_POLL_INTERVAL_MS`.
    pub fn from_env() -> Self {
        let d = Self::default();
        let page_size = std::env::var("KCON_PAGE_SIZE")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(d.page_size);
        let poll_interval = std::env::var("KCON_POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|n| *n > 0)
            .map(Duration::from_millis)
            .unwrap_or(d.poll_interval);
        Self { page_size, poll_interval }
    }

    pub fn first_page(&self) -> PaginatedRequest {
        PaginatedRequest::new(1, self.page_size)
    }
}
