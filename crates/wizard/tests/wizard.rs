#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use kcon_api::{ApiError, FixtureApi, Fixtures, ListKind};
use kcon_core::{ConnectorType, ErrorHandler};
use kcon_query::QueryOptions;
use kcon_wizard::{
    ComponentResolver, GenericResolver, InitialValues, JumpTarget, RegistryResolver, ReviewState, Wizard, WizardStep,
};
use serde_json::json;

const BADWORDS: &str = "c9kn3p0a5dqg2oue8rv0";
const MEGALORD_NS: &str = "c9kn6hrha1lsnd2lcc3g";
const TELEGRAM_CONNECTOR: &str = "c9kn8i3ha1lsnd2lcc5g";

const REGISTRY: &str = r#"
configurators:
  - connector_type: "debezium-*"
    steps: [connection, tables]
    module: { remote_entry: "https://cdn.example/debezium/remoteEntry.js", scope: debezium, module: "./config" }
  - connector_type: telegram-source
    broken: true
    steps: [bot]
    module: { remote_entry: "https://cdn.example/telegram/remoteEntry.js", scope: telegram, module: "./config" }
"#;

fn fixture() -> Arc<FixtureApi> {
    Arc::new(FixtureApi::new(Fixtures::demo().unwrap()))
}

fn wizard_with(api: Arc<FixtureApi>, resolver: Arc<dyn ComponentResolver>, initial: InitialValues) -> Wizard {
    Wizard::new(api, resolver, QueryOptions::default(), initial)
}

fn wizard(api: Arc<FixtureApi>) -> Wizard {
    wizard_with(api, Arc::new(GenericResolver), InitialValues::default())
}

/// Select `type_id`, the badwords instance and the megalord namespace.
async fn walk_to_core(w: &mut Wizard, type_id: &str) {
    w.settle().await;
    assert!(w.connector_types_mut().unwrap().select(type_id));
    assert!(w.next());
    assert_eq!(w.step(), WizardStep::SelectKafka);
    w.settle().await;
    assert!(w.kafkas_mut().unwrap().select(BADWORDS));
    assert!(w.next());
    assert_eq!(w.step(), WizardStep::SelectNamespace);
    w.settle().await;
    assert!(w.namespaces_mut().unwrap().select(MEGALORD_NS));
    assert!(w.next());
    assert_eq!(w.step(), WizardStep::CoreConfiguration);
}

fn fill_core(w: &mut Wizard, name: &str) {
    let core = w.core_mut().unwrap();
    core.set_name(name);
    core.set_client_id("srvc-acct-9");
    core.set_client_secret("s3cr3t");
}

#[tokio::test]
async fn creates_telegram_connector_end_to_end() {
    let api = fixture();
    let saved = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = saved.clone();
    let mut w = wizard(api.clone()).on_save(move |name| sink.lock().unwrap().push(name.to_string()));

    walk_to_core(&mut w, "telegram-source").await;
    assert!(!w.can_next());
    fill_core(&mut w, "telegram-bot");
    assert!(w.next());

    w.settle().await;
    assert_eq!(w.step(), WizardStep::ConfigureConnector);
    assert!(!w.configure().unwrap().is_custom());
    assert!(!w.can_next(), "authorizationToken is required");
    assert!(w.change_configuration(json!({ "authorizationToken": "some-token" }), None));
    assert!(w.can_next());
    assert!(w.next());

    assert_eq!(w.step(), WizardStep::ErrorConfiguration);
    assert!(w.can_next(), "stop is the default handler");
    assert!(w.next());

    assert_eq!(w.step(), WizardStep::ReviewConfiguration);
    assert!(w.review().unwrap().is_valid());
    assert!(w.next());
    assert_eq!(w.review().unwrap().state(), ReviewState::Saving);
    w.settle().await;

    assert_eq!(w.step(), WizardStep::Saved);
    assert!(w.is_saved());
    assert_eq!(w.context().review_payload, Some(json!({ "authorizationToken": "some-token" })));
    assert_eq!(*saved.lock().unwrap(), vec!["telegram-bot".to_string()]);

    let created = api.snapshot().connectors.into_iter().find(|c| c.name == "telegram-bot").unwrap();
    assert_eq!(created.kafka_id, BADWORDS);
    assert_eq!(created.namespace_id, MEGALORD_NS);
    assert_eq!(created.error_handler, Some(ErrorHandler::Stop {}));
    assert!(!w.prev());
    assert!(!w.jump(JumpTarget::SelectConnector));
}

#[tokio::test]
async fn selection_needs_an_item_from_the_list() {
    let mut w = wizard(fixture());
    w.settle().await;
    assert!(!w.connector_types_mut().unwrap().select("no-such-type"));
    w.pump();
    assert!(!w.can_next());
    assert!(!w.next());

    assert!(w.connector_types_mut().unwrap().select("aws-s3-sink"));
    w.pump();
    assert!(w.can_next());
    w.connector_types_mut().unwrap().deselect();
    assert!(!w.next());
    assert_eq!(w.step(), WizardStep::SelectConnector);
}

#[tokio::test]
async fn jumps_are_gated_on_completed_prerequisites() {
    let mut w = wizard(fixture());
    w.settle().await;
    assert!(!w.jump(JumpTarget::ConfigureConnector { sub_step: 0 }));
    assert!(!w.jump(JumpTarget::SelectKafka));
    assert_eq!(w.step(), WizardStep::SelectConnector);

    walk_to_core(&mut w, "telegram-source").await;
    assert!(!w.can_jump(JumpTarget::ReviewConfiguration), "core configuration not done");
    assert!(w.jump(JumpTarget::ConfigureConnector { sub_step: 0 }));
    w.settle().await;
    assert_eq!(w.step(), WizardStep::ConfigureConnector);

    assert!(w.jump(JumpTarget::SelectKafka));
    w.settle().await;
    assert_eq!(w.kafkas().unwrap().selected_id(), Some(BADWORDS));
    assert!(w.can_next(), "previous selection is kept");

    let steps = w.steps();
    assert!(steps[1].active);
    assert!(steps[4].can_jump);
    assert!(!steps[6].can_jump);
}

#[tokio::test]
async fn kafka_list_error_blocks_until_refresh_succeeds() {
    let api = fixture();
    api.set_list_failure(ListKind::Kafkas, Some(ApiError::NotFound("kafkas".into())));
    let mut w = wizard(api.clone());
    w.settle().await;
    assert!(w.connector_types_mut().unwrap().select("telegram-source"));
    assert!(w.next());
    w.settle().await;

    let view = w.kafkas().unwrap().view();
    assert_eq!(view.error, Some("not_found: kafkas"));
    assert!(view.items().is_empty());
    assert!(!w.kafkas_mut().unwrap().select(BADWORDS));
    assert!(!w.next());

    api.set_list_failure(ListKind::Kafkas, None);
    w.kafkas_mut().unwrap().refresh();
    w.settle().await;
    assert!(w.kafkas().unwrap().view().results);
    assert!(!w.can_next());
    assert!(w.kafkas_mut().unwrap().select(BADWORDS));
    assert!(w.next());
    assert_eq!(w.step(), WizardStep::SelectNamespace);
}

#[tokio::test]
async fn custom_configurator_walks_sub_steps_and_skips_error_step() {
    let resolver = Arc::new(RegistryResolver::from_yaml(REGISTRY).unwrap());
    let mut w = wizard_with(fixture(), resolver, InitialValues::default());
    walk_to_core(&mut w, "debezium-postgres-1.9.0.Final").await;
    fill_core(&mut w, "pg-cdc");
    assert!(w.next());
    assert!(w.is_loading_configurator() || w.configure().is_some());
    w.settle().await;

    assert!(w.configure().unwrap().is_custom());
    assert_eq!(w.sub_step(), Some(0));
    let steps = w.steps();
    assert_eq!(steps[4].sub_steps, vec!["connection".to_string(), "tables".to_string()]);
    assert_eq!(steps[4].active_sub_step, Some(0));
    assert!(steps[5].skipped);

    assert!(!w.next(), "configurator has not reported validity");
    w.change_configuration(json!({ "database.hostname": "db", "database.user": "cdc" }), Some(true));
    assert!(w.next());
    assert_eq!(w.step(), WizardStep::ConfigureConnector);
    assert_eq!(w.sub_step(), Some(1));
    assert_eq!(w.context().active_configuration_step, 1);
    assert!(!w.can_next());

    assert!(w.prev());
    assert_eq!(w.sub_step(), Some(0));
    assert!(w.can_next(), "revisited sub-step stays valid");
    assert!(w.next());

    w.change_configuration(json!({ "database.hostname": "db", "database.user": "cdc", "tables": ["public.orders"] }), Some(true));
    assert!(w.next());
    assert_eq!(w.step(), WizardStep::ReviewConfiguration);
    assert!(w.review().unwrap().is_valid());

    assert!(w.prev());
    assert_eq!(w.step(), WizardStep::ConfigureConnector);
    assert_eq!(w.sub_step(), Some(1));
}

#[tokio::test]
async fn broken_configurator_falls_back_to_generic_form() {
    let resolver = Arc::new(RegistryResolver::from_yaml(REGISTRY).unwrap());
    let mut w = wizard_with(fixture(), resolver, InitialValues::default());
    walk_to_core(&mut w, "telegram-source").await;
    fill_core(&mut w, "telegram-bot");
    assert!(w.next());
    w.settle().await;
    let configure = w.configure().unwrap();
    assert!(!configure.is_custom());
    assert!(configure.report().is_some());
}

#[tokio::test]
async fn duplicate_prefills_every_step_but_the_secret() {
    let api = fixture();
    let fx = api.snapshot();
    let source = fx.connectors.iter().find(|c| c.id == TELEGRAM_CONNECTOR).unwrap();
    let ct = fx.connector_types.iter().find(|c| c.id == source.connector_type_id).cloned().unwrap();
    let kafka = fx.kafkas.iter().find(|k| k.id == source.kafka_id).cloned().unwrap();
    let ns = fx.namespaces.iter().find(|n| n.id == source.namespace_id).cloned().unwrap();
    let initial = InitialValues::duplicate_of(source, ct, kafka, ns);

    let mut w = wizard_with(api.clone(), Arc::new(GenericResolver), initial);
    assert!(w.can_next());
    assert!(w.next());
    assert!(w.next());
    assert!(w.next());
    assert_eq!(w.step(), WizardStep::CoreConfiguration);
    assert!(!w.can_next(), "secret must be entered again");
    assert_eq!(w.core_mut().unwrap().name(), "telegram-badwords-copy");
    w.core_mut().unwrap().set_client_secret("new-secret");
    assert!(w.next());

    w.settle().await;
    assert_eq!(w.configure().unwrap().configuration(), &json!({ "authorizationToken": "redacted" }));
    assert!(w.next());
    assert!(w.next());
    assert!(w.next());
    w.settle().await;
    assert!(w.is_saved());
    assert!(api.snapshot().connectors.iter().any(|c| c.name == "telegram-badwords-copy"));
}

#[tokio::test]
async fn changing_connector_type_drops_its_configuration() {
    let mut w = wizard(fixture());
    walk_to_core(&mut w, "telegram-source").await;
    fill_core(&mut w, "telegram-bot");
    assert!(w.next());
    w.settle().await;
    w.change_configuration(json!({ "authorizationToken": "t" }), None);

    assert!(w.jump(JumpTarget::SelectConnector));
    w.settle().await;
    assert!(w.connector_types_mut().unwrap().select("aws-s3-sink"));
    assert!(w.next());
    assert!(w.context().configuration.is_none());
    assert!(!w.can_jump(JumpTarget::ReviewConfiguration));
    assert_eq!(w.context().name, "telegram-bot");
}

#[tokio::test]
async fn step_that_fails_to_start_can_be_retried_or_left() {
    let mut fx = Fixtures::demo().unwrap();
    let broken: ConnectorType = serde_json::from_value(json!({
        "id": "broken-schema",
        "name": "Broken",
        "capabilities": ["error_handler"],
        "schema": { "type": 12 }
    }))
    .unwrap();
    fx.connector_types.push(broken);
    let mut w = wizard(Arc::new(FixtureApi::new(fx)));

    walk_to_core(&mut w, "broken-schema").await;
    fill_core(&mut w, "broken-one");
    assert!(w.next());
    w.settle().await;
    assert_eq!(w.step(), WizardStep::ConfigureConnector);
    assert!(w.error().is_some());
    assert!(!w.can_next());
    assert!(!w.next());

    assert!(w.retry());
    assert!(w.error().is_some());

    assert!(w.prev());
    assert_eq!(w.step(), WizardStep::CoreConfiguration);
    assert!(w.error().is_none());
    assert!(w.can_next(), "core values survive the round trip");
}

#[tokio::test]
async fn close_stops_the_wizard() {
    let closed = Arc::new(AtomicUsize::new(0));
    let hits = closed.clone();
    let mut w = wizard(fixture()).on_close(move || {
        hits.fetch_add(1, Ordering::SeqCst);
    });
    w.settle().await;
    w.close();
    assert!(w.is_closed());
    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert!(w.steps().iter().all(|s| !s.active && !s.can_jump));
    assert!(w.connector_types_mut().is_none());
}

#[tokio::test]
async fn later_steps_need_a_confirmed_configuration() {
    let api = fixture();
    let mut w = wizard(api.clone());
    walk_to_core(&mut w, "telegram-source").await;
    fill_core(&mut w, "telegram-bot");
    assert!(w.next());
    w.settle().await;
    assert!(!w.can_next());
    assert!(!w.can_jump(JumpTarget::ErrorConfiguration));
    assert!(!w.jump(JumpTarget::ReviewConfiguration));
    assert_eq!(w.step(), WizardStep::ConfigureConnector);

    w.change_configuration(json!({ "authorizationToken": "some-token" }), None);
    assert!(!w.can_jump(JumpTarget::ReviewConfiguration), "configuration not confirmed yet");
    assert!(w.next());
    assert_eq!(w.step(), WizardStep::ErrorConfiguration);
    assert!(!w.can_jump(JumpTarget::ReviewConfiguration), "error handler not confirmed yet");
    w.error_configuration_mut().unwrap().set_handler(ErrorHandler::Log {});
    assert!(w.next());
    assert_eq!(w.step(), WizardStep::ReviewConfiguration);

    assert!(w.jump(JumpTarget::ConfigureConnector { sub_step: 0 }));
    w.change_configuration(json!({}), None);
    assert!(!w.can_jump(JumpTarget::ErrorConfiguration));
    assert!(!w.can_jump(JumpTarget::ReviewConfiguration));
    w.change_configuration(json!({ "authorizationToken": "some-token" }), None);
    assert!(w.jump(JumpTarget::ReviewConfiguration), "back to the confirmed configuration");

    assert!(w.next());
    w.settle().await;
    assert!(w.is_saved());
    let created = api.snapshot().connectors.into_iter().find(|c| c.name == "telegram-bot").unwrap();
    assert_eq!(created.error_handler, Some(ErrorHandler::Log {}));
}

#[tokio::test]
async fn configurator_sub_steps_cannot_be_skipped_by_jumping() {
    let resolver = Arc::new(RegistryResolver::from_yaml(REGISTRY).unwrap());
    let mut w = wizard_with(fixture(), resolver, InitialValues::default());
    walk_to_core(&mut w, "debezium-postgres-1.9.0.Final").await;
    fill_core(&mut w, "pg-cdc");
    assert!(w.next());
    w.settle().await;
    assert_eq!(w.sub_step(), Some(0));
    assert!(!w.can_jump(JumpTarget::ConfigureConnector { sub_step: 1 }));
    assert!(!w.jump(JumpTarget::ConfigureConnector { sub_step: 1 }));
    assert_eq!(w.sub_step(), Some(0));

    w.change_configuration(json!({ "database.hostname": "db" }), Some(true));
    assert!(w.next());
    assert_eq!(w.sub_step(), Some(1));
    assert!(w.jump(JumpTarget::CoreConfiguration));
    assert!(w.jump(JumpTarget::ConfigureConnector { sub_step: 1 }));
    w.settle().await;
    assert_eq!(w.sub_step(), Some(1));

    assert!(w.prev());
    assert_eq!(w.sub_step(), Some(0));
    w.change_configuration(json!({ "database.hostname": "other" }), Some(true));
    assert!(!w.can_jump(JumpTarget::ConfigureConnector { sub_step: 1 }), "edited sub-step must be confirmed again");
}

#[tokio::test]
async fn review_edits_survive_leaving_the_review_step() {
    let mut w = wizard(fixture());
    walk_to_core(&mut w, "telegram-source").await;
    fill_core(&mut w, "telegram-bot");
    assert!(w.next());
    w.settle().await;
    w.change_configuration(json!({ "authorizationToken": "some-token" }), None);
    assert!(w.next());
    assert!(w.next());
    assert_eq!(w.step(), WizardStep::ReviewConfiguration);

    w.review_mut().unwrap().change(r#"{ "authorizationToken": "edited-token" }"#);
    assert!(w.prev());
    assert_eq!(w.step(), WizardStep::ErrorConfiguration);
    assert_eq!(w.context().configuration, Some(json!({ "authorizationToken": "edited-token" })));
    assert!(w.next());
    assert_eq!(w.review().unwrap().data(), Some(&json!({ "authorizationToken": "edited-token" })));

    assert!(w.jump(JumpTarget::ConfigureConnector { sub_step: 0 }));
    assert_eq!(w.configure().unwrap().configuration(), &json!({ "authorizationToken": "edited-token" }));
    assert!(w.can_jump(JumpTarget::ReviewConfiguration), "valid review edits count as confirmed");
}
