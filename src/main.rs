use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use skein_blueprint::BlueprintDef;
use skein_engine::WorkflowEngine;
use skein_server::ServerState;
use skein_store::{RedisStore, WorkflowStatus, WorkflowStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Skein - a workflow engine executing DAGs of shell, HTTP, and email tasks
#[derive(Parser)]
#[command(name = "skein")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Redis URL backing run state, events, and the result cache
  #[arg(
    long,
    global = true,
    env = "REDIS_URL",
    default_value = "redis://127.0.0.1:6379"
  )]
  redis_url: String,

  /// Directory holding per-workflow run directories
  #[arg(long, global = true, default_value = "runs")]
  runs_root: PathBuf,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a blueprint to completion and print its results
  Run {
    /// Path to the blueprint JSON file
    blueprint: PathBuf,

    /// Execute tasks one at a time instead of in parallel
    #[arg(long)]
    serial: bool,
  },

  /// Serve the WebSocket control API
  Serve {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: String,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let cli = Cli::parse();
  let rt = tokio::runtime::Runtime::new()?;

  match cli.command {
    Commands::Run { blueprint, serial } => rt.block_on(run_blueprint(
      blueprint,
      serial,
      cli.redis_url,
      cli.runs_root,
    )),
    Commands::Serve { bind } => rt.block_on(serve(bind, cli.redis_url, cli.runs_root)),
  }
}

async fn run_blueprint(
  blueprint: PathBuf,
  serial: bool,
  redis_url: String,
  runs_root: PathBuf,
) -> Result<()> {
  let text = tokio::fs::read_to_string(&blueprint)
    .await
    .with_context(|| format!("failed to read blueprint file: {}", blueprint.display()))?;
  let def = BlueprintDef::from_json(&text)
    .with_context(|| format!("failed to load blueprint: {}", blueprint.display()))?;

  let store = connect_store(&redis_url).await?;
  let engine = Arc::new(
    WorkflowEngine::new(def, store, &runs_root)
      .await
      .context("failed to create workflow engine")?,
  );

  let results = if serial {
    engine.run().await?
  } else {
    let workers = engine.estimate_max_workers();
    info!(workers, "running parallel driver");
    Arc::clone(&engine).run_parallel(workers).await?
  };

  println!("{}", serde_json::to_string_pretty(&results)?);

  if engine.status() == WorkflowStatus::Failed {
    anyhow::bail!("workflow finished with failed tasks");
  }
  Ok(())
}

async fn serve(bind: String, redis_url: String, runs_root: PathBuf) -> Result<()> {
  let store = connect_store(&redis_url).await?;
  let state = Arc::new(ServerState::new(store, runs_root));

  skein_server::serve(state, &bind)
    .await
    .with_context(|| format!("server error on {bind}"))?;
  Ok(())
}

async fn connect_store(redis_url: &str) -> Result<Arc<dyn WorkflowStore>> {
  let store = RedisStore::connect(redis_url)
    .await
    .with_context(|| format!("failed to connect to redis at {redis_url}"))?;
  Ok(Arc::new(store))
}
