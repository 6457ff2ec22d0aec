//! List state machinery for the connector console.
//!
//! `QueryMachine` owns one paginated list; `ConnectorMachine` owns the
//! lifecycle of one connector row; `ConnectorsList` composes the two.

#![forbid(unsafe_code)]

pub mod action;
pub mod cancel;
pub mod connectors;
pub mod engine;
pub mod fetch;
pub mod model;

pub use action::{ActionNotice, ActionReply, ActionRunner, ActionState, ApiActionRunner, ConnectorAction, ConnectorMachine};
pub use cancel::CancelHandle;
pub use connectors::{ConnectorsList, ListNotice};
pub use engine::QueryMachine;
pub use fetch::{from_api, from_fn, FetchReply, ListFetcher};
pub use model::{classify, FetchOrigin, ListView, QueryNotice, QueryOptions, QueryStatus};
