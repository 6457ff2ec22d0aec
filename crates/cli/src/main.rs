use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use kcon_api::{ConnectorsApi, FixtureApi, Fixtures, StaticToken};
use kcon_core::prelude::*;
use kcon_query::{
    fetch, ActionNotice, ApiActionRunner, ConnectorAction, ConnectorMachine, ConnectorsList, ListFetcher, ListNotice,
    QueryMachine, QueryNotice, QueryOptions,
};
use kcon_schema::ConnectorSchema;
use kcon_wizard::{ComponentResolver, GenericResolver, InitialValues, RegistryResolver, SelectionStep, Wizard, WizardStep};
use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "kconctl", version, about = "Connector console CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Fixture data (YAML or JSON); built-in demo data when absent
    #[arg(long, env = "KCON_FIXTURES", global = true)]
    fixtures: Option<PathBuf>,

    /// YAML registry of custom configurators
    #[arg(long, env = "KCON_CONFIGURATORS", global = true)]
    configurators: Option<PathBuf>,

    /// Access token presented on every API call
    #[arg(long, env = "KCON_TOKEN", global = true, default_value = "local-dev", hide_env_values = true)]
    token: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ListTarget { Connectors, Kafkas, Clusters, Namespaces, ConnectorTypes }

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum HandlerArg { Stop, Log, DeadLetterQueue }

#[derive(Subcommand, Debug)]
enum Commands {
    /// List one page of connectors, Kafka instances, clusters, namespaces or connector types
    Ls {
        target: ListTarget,
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Page size (default: KCON_PAGE_SIZE or 10)
        #[arg(long)]
        size: Option<u32>,
        /// Case-insensitive name filter
        #[arg(long)]
        search: Option<String>,
        /// Exact label filter
        #[arg(long)]
        label: Option<String>,
    },
    /// Request a stopped connector to start
    Start { id: String },
    /// Request a running connector to stop
    Stop { id: String },
    /// Delete a connector
    Delete { id: String },
    /// Run the creation wizard non-interactively
    Create(CreateArgs),
    /// Check a configuration against a connector type's schema
    Validate {
        /// Connector type id
        #[arg(long = "type")]
        connector_type: String,
        /// Inline JSON, or @path to a JSON file
        #[arg(long)]
        config: String,
    },
    /// Print the connectors list every time a poll refresh lands
    Watch {
        /// Poll interval (default: KCON_POLL_INTERVAL_MS or 5000)
        #[arg(long)]
        interval_ms: Option<u64>,
        #[arg(long)]
        search: Option<String>,
    },
}

#[derive(Args, Debug)]
struct CreateArgs {
    /// Connector type id
    #[arg(long = "type")]
    connector_type: Option<String>,
    /// Kafka instance id
    #[arg(long)]
    kafka: Option<String>,
    /// Namespace id
    #[arg(long)]
    namespace: Option<String>,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    client_id: Option<String>,
    #[arg(long, env = "KCON_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,
    /// Inline JSON, or @path to a JSON file
    #[arg(long)]
    config: Option<String>,
    #[arg(long, value_enum)]
    error_handler: Option<HandlerArg>,
    #[arg(long)]
    dlq_topic: Option<String>,
    /// Pre-fill every step from an existing connector
    #[arg(long)]
    duplicate: Option<String>,
}

fn init_tracing() {
    let env = std::env::var("KCON_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KCON_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid KCON_METRICS_ADDR; expected host:port");
        }
    }
}

fn load_api(cli: &Cli) -> Result<Arc<FixtureApi>> {
    let fixtures = match &cli.fixtures {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading fixtures {}", path.display()))?;
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                Fixtures::from_json(&text).with_context(|| format!("parsing {}", path.display()))?
            } else {
                Fixtures::from_yaml(&text).with_context(|| format!("parsing {}", path.display()))?
            }
        }
        None => Fixtures::demo().context("parsing built-in fixtures")?,
    };
    Ok(Arc::new(FixtureApi::with_auth(fixtures, Arc::new(StaticToken(cli.token.clone())))))
}

fn load_resolver(path: Option<&Path>) -> Result<Arc<dyn ComponentResolver>> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading configurators {}", path.display()))?;
            let registry = RegistryResolver::from_yaml(&text).with_context(|| format!("parsing {}", path.display()))?;
            info!(entries = registry.configurators.len(), "configurator registry loaded");
            Ok(Arc::new(registry))
        }
        None => Ok(Arc::new(GenericResolver)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let api = load_api(&cli)?;
    let options = QueryOptions::from_env();

    match &cli.command {
        Commands::Ls { target, page, size, search, label } => {
            counter!("kcon_cli_commands_total", 1u64, "command" => "ls");
            let query = SearchQuery { name: search.clone(), label: label.clone() };
            let request = PaginatedRequest::new(*page, size.unwrap_or(options.page_size)).with_query(query);
            info!(list = ?target, page = request.page, size = request.size, "ls invoked");
            let api: Arc<dyn ConnectorsApi> = api;
            match target {
                ListTarget::Connectors => {
                    let resp = list_once("connectors", fetch::connectors(api), options, request).await?;
                    print_list(&resp, cli.output, "STATE", |c| c.state.clone())?;
                }
                ListTarget::Kafkas => {
                    let resp = list_once("kafkas", fetch::kafka_instances(api), options, request).await?;
                    print_list(&resp, cli.output, "STATUS", |k| format!("{} {}/{}", k.status, k.cloud_provider, k.region))?;
                }
                ListTarget::Clusters => {
                    let resp = list_once("clusters", fetch::clusters(api), options, request).await?;
                    print_list(&resp, cli.output, "STATUS", |c| c.status.clone())?;
                }
                ListTarget::Namespaces => {
                    let resp = list_once("namespaces", fetch::namespaces(api), options, request).await?;
                    print_list(&resp, cli.output, "STATUS", |n| n.status.clone())?;
                }
                ListTarget::ConnectorTypes => {
                    let resp = list_once("connector_types", fetch::connector_types(api), options, request).await?;
                    print_list(&resp, cli.output, "VERSION", |t| t.version.clone())?;
                }
            }
        }
        Commands::Start { id } => run_action(api, id, ConnectorAction::Start, cli.output).await?,
        Commands::Stop { id } => run_action(api, id, ConnectorAction::Stop, cli.output).await?,
        Commands::Delete { id } => run_action(api, id, ConnectorAction::Delete, cli.output).await?,
        Commands::Create(args) => {
            counter!("kcon_cli_commands_total", 1u64, "command" => "create");
            let resolver = load_resolver(cli.configurators.as_deref())?;
            create(api, resolver, options, args, cli.output).await?;
        }
        Commands::Validate { connector_type, config } => {
            counter!("kcon_cli_commands_total", 1u64, "command" => "validate");
            let api: Arc<dyn ConnectorsApi> = api;
            let ct = find_entity("connector_types", fetch::connector_types(api), options, connector_type).await?;
            let config = read_config(config)?;
            let schema = ConnectorSchema::compile(&ct.schema)?;
            let report = schema.validate(&config);
            match cli.output {
                Output::Human => {
                    if report.valid {
                        println!("{}: configuration is valid", ct.id);
                    }
                    for d in &report.details {
                        let path = if d.instance_path.is_empty() { "/" } else { d.instance_path.as_str() };
                        match &d.hint {
                            Some(h) => println!("{:<24} {} ({})", path, d.message, h),
                            None => println!("{:<24} {}", path, d.message),
                        }
                    }
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            }
            if !report.valid {
                bail!("configuration is not valid for {}", ct.id);
            }
        }
        Commands::Watch { interval_ms, search } => {
            counter!("kcon_cli_commands_total", 1u64, "command" => "watch");
            let mut options = options;
            if let Some(ms) = interval_ms {
                options.poll_interval = Duration::from_millis((*ms).max(1));
            }
            watch(api, options, search.clone(), cli.output).await?;
        }
    }

    Ok(())
}

/// Fetch one page through a query machine and wait for it to settle.
async fn list_once<T: Entity>(
    label: &'static str,
    fetcher: Arc<dyn ListFetcher<T>>,
    options: QueryOptions,
    request: PaginatedRequest,
) -> Result<PaginatedResponse<T>> {
    let mut query = QueryMachine::new(label, fetcher, options).with_request(request);
    query.start();
    query.settle().await;
    if let Some(e) = query.error() {
        bail!("{}: {}", label, e);
    }
    query.response().cloned().ok_or_else(|| anyhow!("{}: no response", label))
}

async fn find_entity<T: Entity>(
    label: &'static str,
    fetcher: Arc<dyn ListFetcher<T>>,
    options: QueryOptions,
    id: &str,
) -> Result<T> {
    let mut page = 1;
    loop {
        let resp = list_once(label, fetcher.clone(), options, PaginatedRequest::new(page, 100)).await?;
        if let Some(found) = resp.items.iter().find(|it| it.id() == id) {
            return Ok(found.clone());
        }
        if page >= resp.last_page() {
            bail!("{}: no item with id {}", label, id);
        }
        page += 1;
    }
}

fn print_list<T: Entity + Serialize>(
    resp: &PaginatedResponse<T>,
    output: Output,
    detail_header: &str,
    detail: impl Fn(&T) -> String,
) -> Result<()> {
    match output {
        Output::Human => {
            println!("{:<22} {:<30} {:<24} AGE", "ID", "NAME", detail_header);
            for item in &resp.items {
                println!("{:<22} {:<30} {:<24} {}", item.id(), item.name(), detail(item), render_age(item.created_at()));
            }
            println!("page {}/{} ({} total)", resp.page, resp.last_page(), resp.total);
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(resp)?),
    }
    Ok(())
}

async fn run_action(api: Arc<FixtureApi>, id: &str, action: ConnectorAction, output: Output) -> Result<()> {
    counter!("kcon_cli_commands_total", 1u64, "command" => action.as_str());
    let connector = api.get_connector(id).await.with_context(|| format!("loading connector {}", id))?;
    let mut machine = ConnectorMachine::new(connector, Arc::new(ApiActionRunner::new(api)));
    let accepted = match action {
        ConnectorAction::Start => machine.start(),
        ConnectorAction::Stop => machine.stop(),
        ConnectorAction::Delete => machine.remove(),
    };
    if !accepted {
        bail!("cannot {} connector {} in state {:?}", action.as_str(), id, machine.state());
    }
    machine.settle().await;
    for notice in machine.drain_notices() {
        match notice {
            ActionNotice::ActionSuccess { action, connector } => {
                info!(id = %connector.id, action = action.as_str(), "action succeeded");
                match output {
                    Output::Human => println!("{} {}: desired state {}", action.as_str(), connector.name, connector.desired_state),
                    Output::Json => println!("{}", serde_json::to_string_pretty(&connector)?),
                }
            }
            ActionNotice::ActionFailure { action, connector_id, error } => {
                bail!("{} {} failed: {}", action.as_str(), connector_id, error);
            }
            ActionNotice::Selected(_) => {}
        }
    }
    Ok(())
}

fn read_config(arg: &str) -> Result<Value> {
    let text = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading configuration {}", path))?,
        None => arg.to_string(),
    };
    serde_json::from_str(&text).context("configuration is not valid JSON")
}

/// Confirm the current wizard step or explain why it cannot be confirmed.
fn advance(wizard: &mut Wizard, what: &str) -> Result<()> {
    if let Some(e) = wizard.error() {
        bail!("{}: {}", what, e);
    }
    if !wizard.next() {
        bail!("{}: step is incomplete", what);
    }
    info!(step = wizard.step().as_str(), "create: advanced");
    Ok(())
}

/// Select `id` in a selection step, paging forward until it is found.
async fn pick<T, F>(wizard: &mut Wizard, step: F, id: &str) -> Result<()>
where
    T: Entity,
    F: Fn(&mut Wizard) -> Option<&mut SelectionStep<T>>,
{
    loop {
        let s = step(wizard).ok_or_else(|| anyhow!("wizard is not on a selection step"))?;
        if s.select(id) {
            return Ok(());
        }
        if let Some(e) = s.view().error {
            bail!("{}", e);
        }
        if !s.next_page() {
            bail!("no item with id {}", id);
        }
        wizard.settle().await;
    }
}

async fn create(
    api: Arc<FixtureApi>,
    resolver: Arc<dyn ComponentResolver>,
    options: QueryOptions,
    args: &CreateArgs,
    output: Output,
) -> Result<()> {
    let initial = match &args.duplicate {
        Some(id) => {
            let source = api.get_connector(id).await.with_context(|| format!("loading connector {}", id))?;
            let dyn_api: Arc<dyn ConnectorsApi> = api.clone();
            let ct = find_entity("connector_types", fetch::connector_types(dyn_api.clone()), options, &source.connector_type_id).await?;
            let kafka = find_entity("kafkas", fetch::kafka_instances(dyn_api.clone()), options, &source.kafka_id).await?;
            let ns = find_entity("namespaces", fetch::namespaces(dyn_api), options, &source.namespace_id).await?;
            info!(source = %source.id, "create: duplicating connector");
            InitialValues::duplicate_of(&source, ct, kafka, ns)
        }
        None => InitialValues::default(),
    };

    let saved = Arc::new(Mutex::new(None::<String>));
    let sink = saved.clone();
    let mut wizard = Wizard::new(api, resolver, options, initial).on_save(move |name| {
        if let Ok(mut slot) = sink.lock() {
            *slot = Some(name.to_string());
        }
    });
    wizard.settle().await;

    if let Some(id) = &args.connector_type {
        pick(&mut wizard, Wizard::connector_types_mut, id).await.context("connector type")?;
    }
    advance(&mut wizard, "connector type")?;
    wizard.settle().await;
    if let Some(id) = &args.kafka {
        pick(&mut wizard, Wizard::kafkas_mut, id).await.context("kafka instance")?;
    }
    advance(&mut wizard, "kafka instance")?;
    wizard.settle().await;
    if let Some(id) = &args.namespace {
        pick(&mut wizard, Wizard::namespaces_mut, id).await.context("namespace")?;
    }
    advance(&mut wizard, "namespace")?;

    if let Some(core) = wizard.core_mut() {
        if let Some(name) = &args.name {
            core.set_name(name.as_str());
        }
        if let Some(client_id) = &args.client_id {
            core.set_client_id(client_id.as_str());
        }
        if let Some(secret) = &args.client_secret {
            core.set_client_secret(secret.as_str());
        }
        if let Some(e) = core.name_error() {
            bail!("core configuration: {}", e);
        }
        if !core.service_account().is_complete() {
            bail!("core configuration: service account client id and secret are required");
        }
    }
    advance(&mut wizard, "core configuration")?;
    wizard.settle().await;

    let config = args.config.as_deref().map(read_config).transpose()?;
    while wizard.step() == WizardStep::ConfigureConnector {
        if let Some(e) = wizard.error() {
            bail!("connector configuration: {}", e);
        }
        let custom = wizard.configure().map(|c| c.is_custom()).unwrap_or(false);
        if let Some(cfg) = &config {
            wizard.change_configuration(cfg.clone(), custom.then_some(true));
        }
        if !wizard.next() {
            let details = wizard
                .configure()
                .and_then(|c| c.report())
                .map(|r| r.details.iter().map(|d| format!("{} {}", d.instance_path, d.message)).collect::<Vec<_>>().join("; "))
                .unwrap_or_default();
            bail!("connector configuration is not valid: {}", details);
        }
    }

    if wizard.step() == WizardStep::ErrorConfiguration {
        if let Some(step) = wizard.error_configuration_mut() {
            match args.error_handler {
                Some(HandlerArg::Stop) => step.set_handler(ErrorHandler::Stop {}),
                Some(HandlerArg::Log) => step.set_handler(ErrorHandler::Log {}),
                Some(HandlerArg::DeadLetterQueue) => step.set_topic(args.dlq_topic.clone().unwrap_or_default()),
                None => {
                    if let Some(topic) = &args.dlq_topic {
                        step.set_topic(topic.as_str());
                    }
                }
            }
        }
        advance(&mut wizard, "error handling")?;
    } else if args.error_handler.is_some() {
        warn!("connector type has no error handler; --error-handler ignored");
    }

    if let Some(review) = wizard.review() {
        if let Some(e) = review.error() {
            bail!("review: {}", e);
        }
        if !review.is_valid() {
            let details: Vec<String> = review.warnings().iter().map(|d| format!("{} {}", d.instance_path, d.message)).collect();
            bail!("review: configuration is not valid: {}", details.join("; "));
        }
    }
    advance(&mut wizard, "review")?;
    wizard.settle().await;

    if !wizard.is_saved() {
        let reason = wizard.review().and_then(|r| r.save_error()).unwrap_or("save did not complete").to_string();
        bail!("create failed: {}", reason);
    }
    let name = saved.lock().ok().and_then(|s| s.clone()).unwrap_or_default();
    let ctx = wizard.context();
    match output {
        Output::Human => println!("created connector {}", name),
        Output::Json => {
            #[derive(Serialize)]
            struct Created<'a> {
                name: &'a str,
                connector_type: Option<&'a str>,
                kafka: Option<&'a str>,
                namespace: Option<&'a str>,
                configuration: Option<&'a Value>,
            }
            let created = Created {
                name: &name,
                connector_type: ctx.connector_type.as_ref().map(|c| c.id.as_str()),
                kafka: ctx.kafka.as_ref().map(|k| k.id.as_str()),
                namespace: ctx.namespace.as_ref().map(|n| n.id.as_str()),
                configuration: ctx.review_payload.as_ref(),
            };
            println!("{}", serde_json::to_string_pretty(&created)?);
        }
    }
    Ok(())
}

async fn watch(api: Arc<FixtureApi>, options: QueryOptions, search: Option<String>, output: Output) -> Result<()> {
    info!(interval_ms = %options.poll_interval.as_millis(), "watch invoked");
    let mut list = ConnectorsList::new(api, options);
    match search {
        Some(s) => list.query(RequestPatch::search(SearchQuery::name(s))),
        None => list.start(),
    }
    list.enable_polling();
    let mut tick = tokio::time::interval(Duration::from_millis(100));
    loop {
        tokio::select! {
            _ = tick.tick() => {
                list.pump();
                for notice in list.drain_notices() {
                    match notice {
                        ListNotice::Query(QueryNotice::Success { page, total, .. }) => print_rows(&list, page, total, output)?,
                        ListNotice::Query(QueryNotice::Error(e)) => warn!(error = %e, "watch: list fetch failed"),
                        _ => {}
                    }
                }
            }
            _ = signal::ctrl_c() => {
                info!("Ctrl-C received; shutting down watch loop");
                break;
            }
        }
    }
    list.stop();
    Ok(())
}

fn print_rows(list: &ConnectorsList, page: u32, total: u64, output: Output) -> Result<()> {
    match output {
        Output::Human => {
            println!("-- page {} ({} total) at {}", page, total, Utc::now().format("%H:%M:%S"));
            for row in list.rows() {
                let c = row.connector();
                println!("{:<22} {:<30} {:<14} {}", c.id, c.name, c.state, c.desired_state);
            }
        }
        Output::Json => {
            let connectors: Vec<&Connector> = list.rows().iter().map(ConnectorMachine::connector).collect();
            println!("{}", serde_json::to_string(&connectors)?);
        }
    }
    Ok(())
}

fn render_age(created_at: Option<DateTime<Utc>>) -> String {
    let Some(ts) = created_at else { return "-".to_string() };
    let mut secs = (Utc::now() - ts).num_seconds().max(0) as u64;
    let days = secs / 86_400; secs %= 86_400;
    let hours = secs / 3600; secs %= 3600;
    let mins = secs / 60; secs %= 60;
    if days > 0 { format!("{}d{}h", days, hours) }
    else if hours > 0 { format!("{}h{}m", hours, mins) }
    else if mins > 0 { format!("{}m", mins) }
    else { format!("{}s", secs) }
}
