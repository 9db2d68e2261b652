use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trawler::config::Config;
use trawler::frontier::Frontier;
use trawler::index::{DocumentSink, SearchIndex};
use trawler::storage::MetadataStore;
use trawler::url_utils;
use trawler::worker::Worker;

#[derive(Parser)]
#[command(
    name = "trawler",
    version,
    about = "Distributed web crawler feeding a full-text search index",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a crawl job and seed the frontier
    Submit {
        /// Seed URL to start from
        url: String,

        /// Maximum traversal depth for this job
        #[arg(short, long, default_value = "3")]
        max_depth: i32,

        /// Job priority (larger runs sooner)
        #[arg(short, long, default_value = "5")]
        priority: i32,

        /// Restrict the crawl to these domains (repeatable)
        #[arg(short, long = "domain")]
        domains: Vec<String>,
    },

    /// Run the crawl worker until interrupted
    Worker,

    /// Show frontier and job-queue statistics
    Stats,

    /// Query the full-text index
    Search {
        /// Search query
        query: String,

        /// Number of results to return
        #[arg(short, long, default_value = "10")]
        k: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    let config = Config::load()?;

    match cli.command {
        Commands::Submit {
            url,
            max_depth,
            priority,
            domains,
        } => submit(config, &url, max_depth, priority, domains).await,
        Commands::Worker => run_worker(config).await,
        Commands::Stats => show_stats(config).await,
        Commands::Search { query, k } => run_search(config, &query, k).await,
    }
}

async fn submit(
    config: Config,
    url: &str,
    max_depth: i32,
    priority: i32,
    domains: Vec<String>,
) -> Result<()> {
    let normalized = url_utils::normalize(url, None)
        .with_context(|| format!("Seed URL is not a valid web URL: {url}"))?;

    let store = MetadataStore::connect(&config.database).await?;
    store.init_schema().await?;
    let frontier = Frontier::new(store.pool());

    let job = store
        .create_job(&normalized, max_depth, &domains, priority)
        .await?;
    frontier
        .enqueue(&normalized, None, 0, priority, Some(job.id))
        .await?;

    println!("Submitted crawl job {}", job.id);
    println!("  seed:      {normalized}");
    println!("  max depth: {max_depth}");
    if !domains.is_empty() {
        println!("  domains:   {}", domains.join(", "));
    }
    Ok(())
}

async fn run_worker(config: Config) -> Result<()> {
    let worker = Worker::connect(config).await?;

    let shutdown = worker.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received; shutting down");
            let _ = shutdown.send(true);
        }
    });

    worker.run().await?;
    Ok(())
}

async fn show_stats(config: Config) -> Result<()> {
    let store = MetadataStore::connect(&config.database).await?;
    let frontier = Frontier::new(store.pool());

    let stats = frontier.stats().await?;
    println!("{stats}");
    Ok(())
}

async fn run_search(config: Config, query: &str, k: usize) -> Result<()> {
    let sink = SearchIndex::new(&config.search)?;
    let hits = sink.search(query, k).await?;

    if hits.is_empty() {
        println!("No results");
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        println!("{:2}. [{:.2}] {}", rank + 1, hit.score, hit.title);
        println!("    {}", hit.url);
    }
    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    Ok(())
}
