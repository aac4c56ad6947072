//! Quarry Runner
//!
//! Submits one or more statements, waits for admission, and follows each query
//! through the status cache until it finishes or the runner is interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use quarry_cache::AutoRefreshCache;
use quarry_client::StatementClient;
use quarry_core::domain::job::{CacheItem, JobKey};
use quarry_core::domain::phase::PluginPhase;
use quarry_core::domain::query::QuerySpec;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use quarry_runner::config::Config;
use quarry_runner::context::JobContext;
use quarry_runner::scheduler::Reconciler;
use quarry_runner::service::{PooledAdmissionController, QueryExecutor, ResourceSyncer};

#[derive(Parser)]
#[command(name = "quarry-runner")]
#[command(about = "Run queries on a remote engine and track them to completion", long_about = None)]
struct Cli {
    /// Statement to run (repeatable)
    #[arg(short, long = "statement")]
    statements: Vec<String>,

    /// File of `;`-separated statements to run
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Routing group the queries are admitted into
    #[arg(short, long, env = "QUARRY_ROUTING_GROUP", default_value = "")]
    routing_group: String,

    /// Default catalog
    #[arg(long, default_value = "")]
    catalog: String,

    /// Default schema
    #[arg(long, default_value = "")]
    schema: String,

    /// Print the outcome of every job as JSON on exit
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quarry_runner=info,quarry_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let statements = collect_statements(&cli)?;
    if statements.is_empty() {
        anyhow::bail!("nothing to run, pass --statement or --file");
    }

    info!("Starting Quarry Runner");

    let config = load_config()?;
    info!(
        "Loaded configuration: backend_url={}, routing_groups={}",
        config.backend_url,
        config
            .routing_groups
            .iter()
            .map(|g| format!("{}:{}", g.name, g.limit))
            .collect::<Vec<_>>()
            .join(",")
    );

    let backend = Arc::new(
        StatementClient::new(config.backend_url.clone()).with_user(config.backend_user.clone()),
    );
    let admission = Arc::new(PooledAdmissionController::from_config(&config));
    let cache = AutoRefreshCache::<CacheItem>::new(
        config.cache_config(),
        Arc::new(ResourceSyncer::new(backend.clone())),
    )
    .context("Failed to create status cache")?;
    let refresh = cache.start();

    let executor = QueryExecutor::new(backend, admission, cache, &config);
    let mut reconciler = Reconciler::new(Arc::new(executor), &config);

    for statement in statements {
        let query = QuerySpec {
            statement,
            routing_group: cli.routing_group.clone(),
            catalog: cli.catalog.clone(),
            schema: cli.schema.clone(),
            ..Default::default()
        };
        let key = JobKey::new(Uuid::new_v4().to_string());
        reconciler.track(JobContext::new(key, query, &config));
    }

    let outcomes = reconciler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    refresh.shutdown().await;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcomes).context("Failed to serialize outcomes")?
        );
    }

    let mut failed = 0;
    for outcome in &outcomes {
        let query_id = outcome.state.command_id().unwrap_or("-");
        match outcome.info.phase {
            PluginPhase::Success => info!("{} ({}) succeeded", outcome.key, query_id),
            phase if outcome.aborted => {
                failed += 1;
                warn!("{} ({}) aborted while {:?}", outcome.key, query_id, phase);
            }
            phase => {
                failed += 1;
                error!(
                    "{} ({}) ended {:?}: {}",
                    outcome.key,
                    query_id,
                    phase,
                    outcome.info.reason.as_deref().unwrap_or("no reason given")
                );
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} queries did not succeed", failed, outcomes.len());
    }

    info!("All {} queries succeeded", outcomes.len());
    Ok(())
}

/// Gathers statements from the command line and the statement file
fn collect_statements(cli: &Cli) -> Result<Vec<String>> {
    let mut statements: Vec<String> = cli
        .statements
        .iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if let Some(path) = &cli.file {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        statements.extend(
            contents
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
    }

    Ok(statements)
}

/// Loads configuration from environment variables
///
/// Defaults apply only when BACKEND_URL is unset; anything malformed is fatal.
fn load_config() -> Result<Config> {
    Config::load().context("Invalid configuration")
}
