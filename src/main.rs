//! Graph RAG CLI - main entry point
//!
//! Runs the HTTP API by default; `index`, `query` and `clear` run one
//! pipeline operation in the foreground and exit.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use graphrag_pipeline::config::StoreBackend;
use graphrag_pipeline::graphrag::LouvainPartitioner;
use graphrag_pipeline::server::{self, AppState};
use graphrag_pipeline::{
    Config, HttpRateLimiter, JobRegistry, MemoryStore, Neo4jStore, OpenAIClient,
    PipelineController, RateLimitedGateway, Store,
};

#[derive(Parser)]
#[command(name = "graphrag")]
#[command(about = "Incremental Graph RAG pipeline", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the YAML config file (defaults to ./config.yml when present)
    #[arg(short, long, env = "GRAPHRAG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Bind address, overrides the config value
        #[arg(long, env = "BIND_ADDR")]
        bind: Option<String>,

        /// Keep job records in memory only
        #[arg(long, default_value_t = false)]
        ephemeral_jobs: bool,
    },

    /// Run the document stage over a folder
    Index {
        /// Documents folder, overrides the config value
        #[arg(short, long)]
        folder: Option<PathBuf>,
    },

    /// Answer a question over a folder
    Query {
        /// The question
        query: String,

        /// Documents folder, overrides the config value
        #[arg(short, long)]
        folder: Option<PathBuf>,
    },

    /// Delete every cached artifact from the store
    Clear,
}

async fn build_store(backend: &StoreBackend) -> anyhow::Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Neo4j {
            uri,
            username,
            password,
        } => Arc::new(
            Neo4jStore::connect(uri, username, password)
                .await
                .context("Failed to connect to Neo4j")?,
        ),
    };
    info!(backend = store.backend(), "Store ready");
    Ok(store)
}

async fn build_controller(config: &Config) -> anyhow::Result<Arc<PipelineController>> {
    let store = build_store(&config.store).await?;
    let backend = OpenAIClient::from_config(&config.inference)
        .context("Failed to create inference client")?;
    let limiter = HttpRateLimiter::from_config(&config.rate_limit)
        .context("Failed to create rate limiter client")?;
    let gateway = RateLimitedGateway::new(Arc::new(backend), Arc::new(limiter), &config.rate_limit);

    Ok(Arc::new(PipelineController::from_config(
        config,
        store,
        Arc::new(gateway),
        Arc::new(LouvainPartitioner::new()),
    )))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("graphrag_pipeline=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path),
        None => Config::new(),
    }
    .context("Failed to load configuration")?;

    let controller = build_controller(&config).await?;
    let folder_or_default =
        |folder: Option<PathBuf>| folder.unwrap_or_else(|| PathBuf::from(&config.server.documents_folder));

    match cli.command.unwrap_or(Commands::Serve {
        bind: None,
        ephemeral_jobs: false,
    }) {
        Commands::Serve {
            bind,
            ephemeral_jobs,
        } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let addr: SocketAddr = bind
                .parse()
                .with_context(|| format!("Invalid bind address: {}", bind))?;

            let jobs = if ephemeral_jobs {
                JobRegistry::new(controller)
            } else {
                JobRegistry::with_persistence(controller)
            };
            let state = Arc::new(AppState::new(
                Arc::new(jobs),
                config.server.documents_folder.clone(),
            ));
            server::serve(addr, state).await?;
        }
        Commands::Index { folder } => {
            let folder = folder_or_default(folder);
            let processed = controller.index_folder(&folder).await?;
            println!("Indexed {} documents from {}", processed, folder.display());
        }
        Commands::Query { query, folder } => {
            let folder = folder_or_default(folder);
            let answer = controller.query_folder(&query, &folder).await?;
            println!("{}", answer);
        }
        Commands::Clear => {
            controller.store().clear_all().await?;
            println!("All cached data cleared");
        }
    }

    Ok(())
}
