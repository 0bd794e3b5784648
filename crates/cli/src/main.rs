//! `geoflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`: start the API server with an in-process dispatcher.
//! - `worker`: run the dispatcher loop on its own (`--once` drains and exits).
//! - `migrate`: run pending database migrations.
//! - `validate`: validate a workflow YAML file.
//! - `recompute`: re-derive a workflow's status and final report.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use db::{MemoryStore, PgStore, Store};
use engine::{
    dag::validate_definition, Dispatcher, DispatcherConfig, SystemClock, TaskRunner,
    WorkflowDefinition, WorkflowFactory,
};
use handlers::HandlerRegistry;

#[derive(Parser)]
#[command(
    name = "geoflow",
    about = "Dependency-aware workflow engine for geospatial analysis tasks",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct DbArgs {
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "GEOFLOW_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,
}

#[derive(Args)]
struct PollArgs {
    /// Delay between two dispatcher polls, in milliseconds.
    #[arg(long, env = "GEOFLOW_POLL_INTERVAL_MS", default_value_t = 5000)]
    poll_interval_ms: u64,
}

impl PollArgs {
    fn config(&self) -> DispatcherConfig {
        DispatcherConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server and a dispatcher in the same process.
    Serve {
        #[arg(long, env = "GEOFLOW_BIND", default_value = "0.0.0.0:8080")]
        bind: String,

        /// Keep everything in memory instead of connecting to Postgres.
        #[arg(long)]
        in_memory: bool,

        #[command(flatten)]
        db: DbArgs,

        #[command(flatten)]
        poll: PollArgs,
    },
    /// Run the dispatcher loop until interrupted.
    Worker {
        /// Run every ready task once, then exit instead of polling.
        #[arg(long)]
        once: bool,

        #[command(flatten)]
        db: DbArgs,

        #[command(flatten)]
        poll: PollArgs,
    },
    /// Run pending database migrations.
    Migrate {
        #[command(flatten)]
        db: DbArgs,
    },
    /// Validate a workflow definition YAML file.
    Validate {
        /// Path to the workflow YAML file.
        path: PathBuf,
    },
    /// Recompute the status and final report of a workflow.
    Recompute {
        workflow_id: Uuid,

        #[command(flatten)]
        db: DbArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind, in_memory, db, poll } => {
            let store: Arc<dyn Store> = if in_memory {
                warn!("running with the in-memory store; state is lost on exit");
                Arc::new(MemoryStore::new())
            } else {
                connect(&db).await?
            };

            let clock = Arc::new(SystemClock);
            let factory = WorkflowFactory::new(store.clone(), clock.clone())
                .with_registry(HandlerRegistry::with_builtins());
            let dispatcher = Dispatcher::new(
                store.clone(),
                HandlerRegistry::with_builtins(),
                clock,
                poll.config(),
            );

            let cancel = shutdown_on_ctrl_c();
            let worker = {
                let cancel = cancel.clone();
                tokio::spawn(async move { dispatcher.run(cancel).await })
            };

            info!("Starting API server on {bind}");
            let served = api::serve(&bind, api::AppState::new(store, factory), cancel.clone()).await;
            cancel.cancel();
            worker.await.context("dispatcher task panicked")?;
            served.with_context(|| format!("api server on {bind} failed"))?;
        }
        Command::Worker { once, db, poll } => {
            let store = connect(&db).await?;
            let dispatcher = Dispatcher::new(
                store,
                HandlerRegistry::with_builtins(),
                Arc::new(SystemClock),
                poll.config(),
            );
            if once {
                let ran = dispatcher.drain().await?;
                info!(ran, "no ready task left");
            } else {
                dispatcher.run(shutdown_on_ctrl_c()).await;
            }
        }
        Command::Migrate { db } => {
            let pool = db::pool::create_pool(database_url(&db)?, 2)
                .await
                .context("failed to connect to database")?;
            db::pool::run_migrations(&pool).await.context("migration failed")?;
            info!("Migrations applied successfully");
        }
        Command::Validate { path } => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read file {}", path.display()))?;
            let definition = WorkflowDefinition::from_yaml(&content)?;
            let graph = validate_definition(&definition)?;

            let missing = HandlerRegistry::with_builtins().missing(definition.task_types());
            if !missing.is_empty() {
                bail!("no handler registered for task types: {}", missing.join(", "));
            }

            let order: Vec<String> = graph
                .order
                .iter()
                .map(|&i| definition.steps[i].label(i))
                .collect();
            println!("Workflow '{}' is valid. Dependency order: {}", definition.name, order.join(" -> "));
        }
        Command::Recompute { workflow_id, db } => {
            let store = connect(&db).await?;
            let runner = TaskRunner::new(store, HandlerRegistry::with_builtins(), Arc::new(SystemClock));
            let status = runner.refresh_workflow(workflow_id).await?;
            println!("{workflow_id}: {status}");
        }
    }

    Ok(())
}

fn database_url(db: &DbArgs) -> anyhow::Result<&str> {
    db.database_url
        .as_deref()
        .context("DATABASE_URL is not set (use --database-url or the environment)")
}

async fn connect(db: &DbArgs) -> anyhow::Result<Arc<dyn Store>> {
    let pool = db::pool::create_pool(database_url(db)?, db.max_connections)
        .await
        .context("failed to connect to database")?;
    Ok(Arc::new(PgStore::new(pool)))
}

/// A token cancelled on the first Ctrl-C.
fn shutdown_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            trigger.cancel();
        }
    });
    cancel
}
