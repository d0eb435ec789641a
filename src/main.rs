//! Cosmolink CLI Entry Point
//!
//! Subcommands:
//! - `accounts` - list configured federated accounts
//! - `servers` - list configured servers
//! - `add-server` - save a direct or federated server profile
//! - `locate` - resolve an account name to its resource id
//! - `connect` - open a data-plane connection and list databases
//! - `overview` - describe a federated account through the management plane
//!
//! All output to stdout is JSON-only. Logs go to stderr (`COSMOLINK_LOG`).

use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cosmolink::config::{self, ConfigLocation, FederatedTarget, ServerAuth, ServerCatalog, ServerProfile};
use cosmolink::credential::{ClientSecretAccountStore, CredentialProvider};
use cosmolink::engine::{ApiKind, RoutingDataPlane};
use cosmolink::management::overview::{collect_metrics, describe_account, DEFAULT_METRICS};
use cosmolink::management::{ArmConnector, ManagementClientFactory};
use cosmolink::output::{ErrorEnvelope, Metadata, SuccessEnvelope};
use cosmolink::registry::ConnectionRegistry;
use cosmolink::resource::{ResourceGraphExecutor, ResourceLocator};
use cosmolink::selector::DialoguerChooser;
use cosmolink::{CosmoError, Pipeline};

/// Cosmolink - credential and connection resolution for database accounts
#[derive(Parser)]
#[command(name = "cosmolink")]
#[command(about = "Resolve credentials and connect to Mongo-API and NoSQL-API database accounts")]
#[command(version)]
struct Cli {
    /// Debug logging on stderr (overrides COSMOLINK_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured federated accounts
    Accounts,

    /// List configured servers
    Servers,

    /// Save a server profile
    AddServer {
        name: String,

        #[arg(long)]
        api: ApiKind,

        #[command(flatten)]
        auth: AuthArgs,

        /// Save to the per-user config instead of `.cosmolink/config.json`
        #[arg(long)]
        global: bool,
    },

    /// Resolve an account name to its resource id
    Locate {
        #[arg(long)]
        account_id: String,

        /// Defaults to the account's home tenant
        #[arg(long)]
        tenant_id: Option<String>,

        #[arg(long)]
        account_name: String,
    },

    /// Connect to a configured server and list its databases
    Connect {
        /// Server name (defaults to the configured default)
        server: Option<String>,
    },

    /// Describe a federated server's account
    Overview {
        server: Option<String>,

        /// Also fetch account metrics
        #[arg(long)]
        metrics: bool,
    },
}

#[derive(Args)]
struct AuthArgs {
    /// Direct: literal connection string
    #[arg(long, conflicts_with_all = ["connection_string_env", "account_id"])]
    connection_string: Option<String>,

    /// Direct: environment variable holding the connection string
    #[arg(long, conflicts_with = "account_id")]
    connection_string_env: Option<String>,

    /// Federated: account id from the `accounts` section
    #[arg(long, requires_all = ["tenant_id", "account_name"])]
    account_id: Option<String>,

    #[arg(long)]
    tenant_id: Option<String>,

    #[arg(long)]
    account_name: Option<String>,

    /// Federated: skip discovery with a known resource id
    #[arg(long)]
    resource_id: Option<String>,
}

impl AuthArgs {
    fn into_auth(self) -> Result<ServerAuth, CosmoError> {
        match (self.account_id, self.tenant_id, self.account_name) {
            (Some(account_id), Some(tenant_id), Some(account_name)) => Ok(ServerAuth::Federated(FederatedTarget {
                account_id,
                tenant_id,
                account_name,
                resource_id: self.resource_id,
            })),
            (None, ..) if self.connection_string.is_some() || self.connection_string_env.is_some() => {
                Ok(ServerAuth::Direct {
                    connection_string: self.connection_string,
                    connection_string_env: self.connection_string_env,
                })
            }
            _ => Err(CosmoError::invalid_input(
                "Give --connection-string, --connection-string-env, \
                 or --account-id with --tenant-id and --account-name",
            )),
        }
    }
}

/// What a command reports on success
struct Outcome {
    api: String,
    data: Value,
    items: Option<usize>,
}

impl Outcome {
    fn new(api: impl Into<String>, data: Value) -> Self {
        Self { api: api.into(), data, items: None }
    }

    fn with_items(mut self, items: usize) -> Self {
        self.items = Some(items);
        self
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("failed to initialize logging: {e:#}");
    }

    let command = command_name(&cli.command);
    let started = Instant::now();
    let result = run(cli.command).await;
    let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let (rendered, code) = match result {
        Ok(outcome) => {
            let meta = match outcome.items {
                Some(n) => Metadata::with_items(elapsed, n),
                None => Metadata::new(elapsed),
            };
            (serde_json::to_string(&SuccessEnvelope::new(outcome.api, command, outcome.data, meta)), ExitCode::SUCCESS)
        }
        Err(err) => {
            tracing::debug!(code = err.error_code(), "command failed");
            (serde_json::to_string(&ErrorEnvelope::from_error("", command, &err)), ExitCode::FAILURE)
        }
    };

    match rendered {
        Ok(line) => {
            println!("{line}");
            code
        }
        Err(e) => {
            eprintln!("failed to serialize output: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let filter = if verbose {
        EnvFilter::new("cosmolink=debug")
    } else {
        EnvFilter::try_from_env("COSMOLINK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()?;
    Ok(())
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Accounts => "accounts",
        Commands::Servers => "servers",
        Commands::AddServer { .. } => "add-server",
        Commands::Locate { .. } => "locate",
        Commands::Connect { .. } => "connect",
        Commands::Overview { .. } => "overview",
    }
}

async fn run(command: Commands) -> Result<Outcome, CosmoError> {
    match command {
        Commands::Accounts => {
            let catalog = config::load_with_precedence()?;
            let accounts = credential_provider(&catalog)?.list_accounts().await?;
            let count = accounts.len();
            Ok(Outcome::new("", json!({ "accounts": accounts })).with_items(count))
        }
        Commands::Servers => {
            let servers: Vec<Value> = config::list_servers()?
                .into_iter()
                .map(|(name, api, auth)| json!({ "name": name, "api": api, "auth": auth }))
                .collect();
            let count = servers.len();
            Ok(Outcome::new("", json!({ "servers": servers })).with_items(count))
        }
        Commands::AddServer { name, api, auth, global } => {
            let profile = ServerProfile { api, auth: auth.into_auth()? };
            let location = if global { ConfigLocation::Global } else { ConfigLocation::Local };
            config::save_server(name.clone(), profile, location)?;
            let path = config::config_path(location)?;
            Ok(Outcome::new(api.as_str(), json!({ "name": name, "path": path.display().to_string() })))
        }
        Commands::Locate { account_id, tenant_id, account_name } => {
            let catalog = config::load_with_precedence()?;
            let factory = management_factory(&catalog)?;
            let tenant_id = match tenant_id {
                Some(t) => t,
                None => factory.credentials().find_account(&account_id).await?.tenant_id,
            };
            let (account, resource) = factory.resolve(&account_id, &tenant_id, None, &account_name).await?;
            let portal_url = factory.credentials().portal_resource_url(&account, &resource).ok();
            Ok(Outcome::new("", json!({ "resource": resource, "portal_url": portal_url })))
        }
        Commands::Connect { server } => {
            let catalog = config::load_with_precedence()?;
            let (server_id, profile) = catalog.resolve_server(server.as_deref())?;
            let pipeline = build_pipeline(&catalog)?;

            let result = async {
                let connection = pipeline.connect_profile(&server_id, &profile).await?;
                let databases = connection.list_databases().await?;
                let info = connection.info().clone();
                Ok::<_, CosmoError>((info, databases))
            }
            .await;
            pipeline.registry().shutdown().await;

            let (info, databases) = result?;
            let count = databases.len();
            let data = json!({ "server": server_id, "connection": info, "databases": databases });
            Ok(Outcome::new(info.api.as_str(), data).with_items(count))
        }
        Commands::Overview { server, metrics } => {
            let catalog = config::load_with_precedence()?;
            let (server_id, profile) = catalog.resolve_server(server.as_deref())?;
            let ServerAuth::Federated(target) = &profile.auth else {
                return Err(CosmoError::invalid_input(format!(
                    "Server '{server_id}' uses direct auth; overview needs a federated server"
                )));
            };
            let factory = management_factory(&catalog)?;

            let client = factory
                .build_management_client(
                    &target.account_id,
                    &target.tenant_id,
                    target.resource_id.as_deref(),
                    &target.account_name,
                    profile.api,
                )
                .await?;
            let overview = describe_account(client.plane.as_ref(), &client.resource, profile.api).await?;
            let portal_url = factory.credentials().portal_resource_url(&client.account, &client.resource).ok();

            let metric_values = if metrics {
                let metrics_client = factory
                    .build_metrics_client(
                        &target.account_id,
                        &target.tenant_id,
                        Some(client.resource.resource_id.as_str()),
                        &target.account_name,
                    )
                    .await?;
                let uris = [metrics_client.resource.resource_id.clone()];
                Some(collect_metrics(metrics_client.plane.as_ref(), &uris, None, DEFAULT_METRICS).await?)
            } else {
                None
            };

            let count = overview.databases.len();
            Ok(Outcome::new(
                profile.api.as_str(),
                json!({
                    "server": server_id,
                    "overview": overview,
                    "portal_url": portal_url,
                    "metrics": metric_values,
                }),
            )
            .with_items(count))
        }
    }
}

fn credential_provider(catalog: &ServerCatalog) -> Result<CredentialProvider, CosmoError> {
    let store = ClientSecretAccountStore::new(catalog.accounts.clone())?;
    Ok(CredentialProvider::new(Arc::new(store)))
}

fn management_factory(catalog: &ServerCatalog) -> Result<ManagementClientFactory, CosmoError> {
    let locator = ResourceLocator::new(Arc::new(ResourceGraphExecutor::new()?));
    Ok(ManagementClientFactory::new(credential_provider(catalog)?, locator, Arc::new(ArmConnector::new()?)))
}

fn build_pipeline(catalog: &ServerCatalog) -> Result<Pipeline, CosmoError> {
    let registry = Arc::new(ConnectionRegistry::new(Arc::new(RoutingDataPlane::new()?)));
    Ok(Pipeline::new(management_factory(catalog)?, Arc::new(DialoguerChooser::new()), registry))
}
