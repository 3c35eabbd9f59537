mod harness;
mod scenarios;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use common::utils::config::{get_config, StorageKind};
use tokio::runtime::Builder;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
enum Scenario {
    S1,
    S2,
    S3,
    S4,
    S5,
    S6,
}

/// Runs the expediente-platform acceptance scenarios against the in-memory harness.
#[derive(Debug, Parser)]
struct Cli {
    /// Scenario to run; omit to run all six in order.
    #[arg(long)]
    scenario: Option<Scenario>,
}

fn main() -> Result<()> {
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .thread_name("eval-scenario-worker")
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = fmt()
        .with_env_filter(EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    let cli = Cli::parse();

    let mut config = get_config().context("loading configuration")?;
    config.storage = StorageKind::Memory;

    let selected: Vec<Scenario> = match cli.scenario {
        Some(s) => vec![s],
        None => vec![
            Scenario::S1,
            Scenario::S2,
            Scenario::S3,
            Scenario::S4,
            Scenario::S5,
            Scenario::S6,
        ],
    };

    let mut failures = 0usize;
    for scenario in selected {
        let harness = harness::Harness::new(config.clone())
            .await
            .context("building scenario harness")?;

        let result = match scenario {
            Scenario::S1 => scenarios::s1_ingest_pdf(&harness).await,
            Scenario::S2 => scenarios::s2_ingest_audio_with_chunking(&harness).await,
            Scenario::S3 => scenarios::s3_cancel_mid_ingestion(&harness).await,
            Scenario::S4 => scenarios::s4_query_general(&harness).await,
            Scenario::S5 => scenarios::s5_query_per_expediente(&harness).await,
            Scenario::S6 => scenarios::s6_session_ownership(&harness).await,
        };

        match result {
            Ok(()) => info!(scenario = ?scenario, "passed"),
            Err(err) => {
                error!(scenario = ?scenario, error = %err, "failed");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} scenario(s) failed");
    }

    println!("All scenarios passed");
    Ok(())
}
