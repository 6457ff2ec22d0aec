#![forbid(unsafe_code)]

use std::sync::Arc;

use kcon_api::{ApiError, ConnectorsApi, FixtureApi, Fixtures, ListKind, StaticToken};
use kcon_core::prelude::*;
use serde_json::json;

const TELEGRAM: &str = "c9kn8i3ha1lsnd2lcc5g";
const S3: &str = "c9kn8q3ha1lsnd2lcc60";

fn api() -> FixtureApi {
    FixtureApi::new(Fixtures::demo().unwrap())
}

fn new_connector(name: &str, connector_type_id: &str) -> NewConnector {
    NewConnector {
        name: name.into(),
        connector_type_id: connector_type_id.into(),
        kafka_id: "c9kn3p0a5dqg2oue8rv0".into(),
        namespace_id: "c9kn6hrha1lsnd2lcc3g".into(),
        desired_state: DesiredState::Ready,
        service_account: ServiceAccount { client_id: "id".into(), client_secret: "secret".into() },
        connector: json!({ "authorizationToken": "t" }),
        error_handler: Some(ErrorHandler::Log {}),
    }
}

#[tokio::test]
async fn empty_token_is_rejected() {
    let api = FixtureApi::with_auth(Fixtures::demo().unwrap(), Arc::new(StaticToken("  ".into())));
    let err = api.list_connectors(&PaginatedRequest::default()).await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized(_)));
    assert!(api.start_connector(S3).await.is_err());
}

#[tokio::test]
async fn list_failures_are_injected_per_kind() {
    let api = api();
    api.set_list_failure(ListKind::Namespaces, Some(ApiError::Internal("boom".into())));
    let err = api.list_namespaces(&PaginatedRequest::default()).await.unwrap_err();
    assert_eq!(err.to_string(), "internal: boom");
    assert_eq!(api.list_kafka_instances(&PaginatedRequest::default()).await.unwrap().total, 2);

    api.set_list_failure(ListKind::Namespaces, None);
    assert_eq!(api.list_namespaces(&PaginatedRequest::default()).await.unwrap().total, 2);
}

#[tokio::test]
async fn label_search_filters_connector_types() {
    let api = api();
    let req = PaginatedRequest::new(1, 10).with_query(SearchQuery::label("sink"));
    let resp = api.list_connector_types(&req).await.unwrap();
    assert_eq!(resp.total, 1);
    assert_eq!(resp.items[0].id, "aws-s3-sink");
}

#[tokio::test]
async fn start_and_stop_update_desired_state() {
    let api = api();
    let started = api.start_connector(S3).await.unwrap();
    assert_eq!(started.desired_state, DesiredState::Ready);
    let stopped = api.stop_connector(TELEGRAM).await.unwrap();
    assert_eq!(stopped.desired_state, DesiredState::Stopped);

    api.set_action_failure(TELEGRAM, true);
    assert!(matches!(api.start_connector(TELEGRAM).await, Err(ApiError::Internal(_))));
    assert!(matches!(api.get_connector("missing").await, Err(ApiError::NotFound(_))));
}

#[tokio::test]
async fn create_rejects_duplicate_names_and_unknown_types() {
    let api = api();
    let created = api.create_connector(&new_connector("fresh", "telegram-source")).await.unwrap();
    assert_eq!(created.state, "assigning");
    assert!(created.service_account.client_secret.is_empty());
    assert_eq!(created.error_handler, Some(ErrorHandler::Log {}));

    let dup = api.create_connector(&new_connector("fresh", "telegram-source")).await.unwrap_err();
    assert!(matches!(dup, ApiError::Conflict(_)));
    let unknown = api.create_connector(&new_connector("other", "nope")).await.unwrap_err();
    assert!(matches!(unknown, ApiError::Validation(_)));
    assert_eq!(api.snapshot().connectors.len(), 3);
}

#[tokio::test]
async fn delete_removes_connector() {
    let api = api();
    let removed = api.delete_connector(TELEGRAM).await.unwrap();
    assert_eq!(removed.desired_state, DesiredState::Deleted);
    let resp = api.list_connectors(&PaginatedRequest::default()).await.unwrap();
    assert_eq!(resp.total, 1);
    assert_eq!(resp.items[0].id, S3);
}
