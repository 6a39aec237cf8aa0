mod replay;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use syndic_client::{HtmdCleaner, ReqwestFetcher, default_registry};
use syndic_core::config::PipelineConfig;
use syndic_core::pipeline::{Pipeline, PipelineParts};
use syndic_core::signatures::SignatureTable;
use syndic_core::{Provider, RunOutcome};

#[derive(Parser)]
#[command(
    name = "syndic",
    version,
    about = "Trace syndicated job postings back to their ATS"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded capture session through the pipeline
    Replay {
        /// JSON-lines file with one captured exchange per line
        #[arg(short, long)]
        input: PathBuf,

        /// Stop collecting after this many candidates
        #[arg(long, env = "SYNDIC_MAX_CANDIDATES")]
        max_candidates: Option<usize>,

        /// Maximum ATS fetches in flight
        #[arg(long, env = "SYNDIC_MAX_CONCURRENT_FETCHES")]
        max_concurrent: Option<usize>,

        /// Per-request timeout for ATS fetches, in seconds
        #[arg(long, env = "SYNDIC_FETCH_TIMEOUT_SECS")]
        timeout: Option<u64>,
    },

    /// Identify the ATS behind an apply URL
    Identify {
        /// Apply URL to classify
        url: String,
    },

    /// Fetch postings straight from a provider
    Fetch {
        /// Provider name (e.g., "greenhouse", "lever")
        #[arg(short, long)]
        provider: Provider,

        /// Company identifier on that provider
        #[arg(short, long)]
        company: String,

        /// Fetch a single posting instead of the whole board
        #[arg(short, long)]
        job: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("syndic=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            input,
            max_candidates,
            max_concurrent,
            timeout,
        } => {
            let mut config = load_config()?;
            if max_candidates.is_some() {
                config.max_candidates = max_candidates;
            }
            if let Some(n) = max_concurrent {
                config.max_concurrent_fetches = n;
            }
            if let Some(secs) = timeout {
                config.fetch_timeout = Duration::from_secs(secs);
            }
            cmd_replay(&input, config).await?;
        }
        Commands::Identify { url } => cmd_identify(&url)?,
        Commands::Fetch {
            provider,
            company,
            job,
        } => cmd_fetch(provider, &company, job.as_deref()).await?,
    }

    Ok(())
}

fn load_config() -> Result<PipelineConfig> {
    PipelineConfig::from_env()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Invalid SYNDIC_* configuration")
}

fn build_registry(config: &PipelineConfig) -> Result<syndic_core::registry::AdapterRegistry> {
    let fetcher = ReqwestFetcher::with_timeout(config.fetch_timeout)
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to build HTTP client")?;
    Ok(default_registry(fetcher, HtmdCleaner::new(), config))
}

async fn cmd_replay(input: &std::path::Path, config: PipelineConfig) -> Result<()> {
    let registry = build_registry(&config)?;
    let parts = PipelineParts::linkedin(registry).map_err(|e| anyhow::anyhow!(e))?;
    let pipeline = Pipeline::new(config, parts).map_err(|e| anyhow::anyhow!(e))?;

    let run = replay::replay(input, pipeline).await?;
    let outcome = run.outcome();
    let report = json!({
        "outcome": outcome,
        "stats": run.stats(),
        "run": run,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let RunOutcome::Aborted { reason, finalized } = outcome {
        anyhow::bail!("Session blocked ({reason}) after {finalized} finalized records");
    }
    Ok(())
}

fn cmd_identify(url: &str) -> Result<()> {
    let table = SignatureTable::builtin().map_err(|e| anyhow::anyhow!(e))?;
    let config = PipelineConfig::default();
    let supported = build_registry(&config)?;

    let found = table.identify(url);
    let report = json!({
        "url": url,
        "match": found,
        "supported": found.as_ref().is_some_and(|m| supported.supports(m.provider)),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_fetch(provider: Provider, company: &str, job: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let registry = build_registry(&config)?;
    let adapter = registry
        .get(provider)
        .with_context(|| format!("No adapter for {provider}"))?;

    let output = match job {
        Some(id) => {
            let record = adapter
                .fetch_detail(company, id)
                .await
                .map_err(|e| anyhow::anyhow!(e))
                .with_context(|| format!("Failed to fetch {provider} posting {company}/{id}"))?;
            serde_json::to_value(record)?
        }
        None => {
            let records = adapter
                .list_postings(company)
                .await
                .map_err(|e| anyhow::anyhow!(e))
                .with_context(|| format!("Failed to list {provider} postings for {company}"))?;
            tracing::info!(count = records.len(), %provider, company, "Listed postings");
            serde_json::to_value(records)?
        }
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
