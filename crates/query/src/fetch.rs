//! Fetch adapters: the callback contract a query engine drives, plus
//! helpers that turn `ConnectorsApi` list calls into spawned, abortable tasks.

use std::fmt::Display;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use kcon_api::{ApiResult, ConnectorsApi};
use kcon_core::prelude::*;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::cancel::CancelHandle;
use crate::model::{FetchOrigin, QueryMsg};

/// Completion side of one fetch. Exactly one of `success`/`error` should be
/// called unless the fetch was cancelled first.
pub struct FetchReply<T> {
    tx: UnboundedSender<QueryMsg<T>>,
    origin: FetchOrigin,
    seq: u64,
    page: u32,
}

impl<T> std::fmt::Debug for FetchReply<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchReply").field("origin", &self.origin).field("page", &self.page).finish()
    }
}

impl<T> FetchReply<T> {
    pub(crate) fn new(tx: UnboundedSender<QueryMsg<T>>, origin: FetchOrigin, seq: u64, page: u32) -> Self {
        Self { tx, origin, seq, page }
    }

    /// Page of the request this reply was issued for.
    pub fn page(&self) -> u32 { self.page }

    pub fn origin(&self) -> FetchOrigin { self.origin }

    pub fn success(self, response: PaginatedResponse<T>) {
        if self.tx.send(QueryMsg::SetResponse { origin: self.origin, seq: self.seq, response }).is_err() {
            debug!(page = self.page, "query: reply after engine stopped");
        }
    }

    pub fn error(self, error: impl Into<String>) {
        let page = self.page;
        if self.tx.send(QueryMsg::SetError { origin: self.origin, seq: self.seq, page, error: error.into() }).is_err() {
            debug!(page, "query: error after engine stopped");
        }
    }

    pub fn complete<E: Display>(self, result: Result<PaginatedResponse<T>, E>) {
        match result {
            Ok(resp) => self.success(resp),
            Err(e) => self.error(e.to_string()),
        }
    }
}

/// `(request, reply) -> cancel` list-fetch contract.
pub trait ListFetcher<T>: Send + Sync {
    fn fetch(&self, request: &PaginatedRequest, reply: FetchReply<T>) -> CancelHandle;
}

/// Synchronous closure fetcher; tests use it to hold replies and resolve later.
pub struct FnFetcher<F>(F);

pub fn from_fn<T, F>(f: F) -> FnFetcher<F>
where
    F: Fn(&PaginatedRequest, FetchReply<T>) -> CancelHandle + Send + Sync,
{
    FnFetcher(f)
}

impl<T, F> ListFetcher<T> for FnFetcher<F>
where
    F: Fn(&PaginatedRequest, FetchReply<T>) -> CancelHandle + Send + Sync,
{
    fn fetch(&self, request: &PaginatedRequest, reply: FetchReply<T>) -> CancelHandle {
        (self.0)(request, reply)
    }
}

/// Fetcher backed by a future factory; every fetch runs as its own tokio task
/// and cancelling aborts that task.
pub struct TaskFetcher<F>(F);

pub fn from_api<T, F>(f: F) -> TaskFetcher<F>
where
    T: Send + 'static,
    F: Fn(PaginatedRequest) -> BoxFuture<'static, ApiResult<PaginatedResponse<T>>> + Send + Sync,
{
    TaskFetcher(f)
}

impl<T, F> ListFetcher<T> for TaskFetcher<F>
where
    T: Send + 'static,
    F: Fn(PaginatedRequest) -> BoxFuture<'static, ApiResult<PaginatedResponse<T>>> + Send + Sync,
{
    fn fetch(&self, request: &PaginatedRequest, reply: FetchReply<T>) -> CancelHandle {
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            reply.error("no async runtime available");
            return CancelHandle::noop();
        };
        let fut = (self.0)(request.clone());
        CancelHandle::from_task(rt.spawn(async move {
            reply.complete(fut.await);
        }))
    }
}

pub fn connectors(api: Arc<dyn ConnectorsApi>) -> Arc<dyn ListFetcher<Connector>> {
    Arc::new(from_api(move |req: PaginatedRequest| {
        let api = api.clone();
        async move { api.list_connectors(&req).await }.boxed()
    }))
}

pub fn kafka_instances(api: Arc<dyn ConnectorsApi>) -> Arc<dyn ListFetcher<KafkaInstance>> {
    Arc::new(from_api(move |req: PaginatedRequest| {
        let api = api.clone();
        async move { api.list_kafka_instances(&req).await }.boxed()
    }))
}

pub fn clusters(api: Arc<dyn ConnectorsApi>) -> Arc<dyn ListFetcher<Cluster>> {
    Arc::new(from_api(move |req: PaginatedRequest| {
        let api = api.clone();
        async move { api.list_clusters(&req).await }.boxed()
    }))
}

pub fn namespaces(api: Arc<dyn ConnectorsApi>) -> Arc<dyn ListFetcher<Namespace>> {
    Arc::new(from_api(move |req: PaginatedRequest| {
        let api = api.clone();
        async move { api.list_namespaces(&req).await }.boxed()
    }))
}

pub fn connector_types(api: Arc<dyn ConnectorsApi>) -> Arc<dyn ListFetcher<ConnectorType>> {
    Arc::new(from_api(move |req: PaginatedRequest| {
        let api = api.clone();
        async move { api.list_connector_types(&req).await }.boxed()
    }))
}
