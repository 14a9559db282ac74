use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use r_fleet::api::{AppState, FleetServer};
use r_fleet::backend::{ClusterBackend, DockerBackend, InMemoryBackend};
use r_fleet::config::{BackendKind, FleetConfig, LoggingConfig};
use r_fleet::poller::Poller;
use r_fleet::registry::{ResourceNaming, TaskDefinitionRegistry};
use r_fleet::services::{AppDefinition, ServiceManager};
use r_fleet::tasks::{SpecBuilder, TaskInput};
use r_fleet::teardown::ClusterTeardown;
use r_fleet::{ReconcileError, Result};

#[derive(Parser)]
#[command(name = "r_fleet")]
#[command(about = "Reconciles container services and task definitions on a cluster")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "FLEET_CONFIG")]
    config: Option<String>,

    /// Cluster backend, overrides the configuration file
    #[arg(long, env = "FLEET_BACKEND")]
    backend: Option<BackendKind>,

    #[arg(long, env = "FLEET_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve {
        #[arg(short, long)]
        listen: Option<SocketAddr>,
    },
    /// Register every task and start a service for it, then wait until ready
    Deploy {
        #[arg(long)]
        cluster: String,
        #[arg(long)]
        service: String,
        /// Task family or JSON task definition; repeat for several tasks
        #[arg(long = "task", required = true)]
        tasks: Vec<String>,
    },
    /// Describe every service on a cluster
    Status {
        #[arg(long)]
        cluster: String,
    },
    /// Stop and delete every service on a cluster
    Teardown {
        #[arg(long)]
        cluster: String,
    },
    /// Register a task definition
    Register {
        /// Task family or JSON task definition
        task: String,
    },
    /// Deregister a task definition if it is still active
    Deregister { reference: String },
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let mut config = FleetConfig::load(cli.config.as_deref())?;
    if let Some(kind) = cli.backend {
        config.backend.kind = kind;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;
    init_tracing(&config.logging);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling");
                cancel.cancel();
            }
        });
    }

    let backend = connect(&config)?;
    let registry = Arc::new(TaskDefinitionRegistry::new(
        backend.clone(),
        SpecBuilder::new(config.memory.policy()),
        ResourceNaming::new(config.naming.resource_prefix.clone()),
    ));
    let poller = Poller::new(config.poller.policy()).with_cancellation(cancel);
    let services = Arc::new(ServiceManager::new(backend, registry.clone(), poller));
    let teardown = Arc::new(ClusterTeardown::new(
        services.clone(),
        config.teardown.policy,
    ));

    match cli.command {
        Command::Serve { listen } => {
            let listen_addr = listen.unwrap_or(config.server.listen_addr);
            let state = Arc::new(AppState { services, teardown });
            FleetServer::new(state, listen_addr).start_server().await?;
        }
        Command::Deploy {
            cluster,
            service,
            tasks,
        } => {
            let tasks = tasks
                .iter()
                .map(String::as_str)
                .map(parse_task)
                .collect::<Result<Vec<_>>>()?;
            let app = AppDefinition::new(tasks);
            let deployed = services
                .create_all_for_cluster(&cluster, &service, &app)?
                .await?;
            print_json(&deployed)?;
        }
        Command::Status { cluster } => {
            print_json(&services.describe_all(&cluster)?.await?)?;
        }
        Command::Teardown { cluster } => {
            let report = teardown.stop_and_destroy_cluster(&cluster)?.await?;
            print_json(&report)?;
        }
        Command::Register { task } => {
            let handle = registry.register(parse_task(&task)?)?.await?;
            print_json(&handle)?;
        }
        Command::Deregister { reference } => {
            let outcome = registry.find_and_deregister(&reference)?.await?;
            println!("{outcome}");
        }
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.level.clone().into());

    if logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn connect(config: &FleetConfig) -> Result<Arc<dyn ClusterBackend>> {
    let backend: Arc<dyn ClusterBackend> = match config.backend.kind {
        BackendKind::Memory => Arc::new(InMemoryBackend::from_config(&config.backend)),
        BackendKind::Docker => Arc::new(DockerBackend::connect()?),
    };
    info!(backend = backend.name(), "cluster backend ready");
    Ok(backend)
}

/// A bare word is a family name; anything starting with `{` is a JSON task.
fn parse_task(raw: &str) -> Result<TaskInput> {
    let raw = raw.trim();
    if raw.starts_with('{') {
        serde_json::from_str(raw)
            .map_err(|err| ReconcileError::InvalidSpec(format!("task is not valid JSON: {err}")))
    } else {
        Ok(TaskInput::from(raw))
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| ReconcileError::Config(format!("cannot render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
