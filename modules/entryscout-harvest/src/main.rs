use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use entryscout_common::{load_subjects, HarvestConfig};
use entryscout_harvest::{output, BatchScheduler, BrowserlessRenderer};

#[derive(Parser, Debug)]
#[command(name = "entryscout", about = "Harvest the latest forum entries for a list of subjects")]
struct Cli {
    /// Subject list (keyed `{"companies": {...}}` or a plain list).
    #[arg(long, env = "SUBJECTS_FILE", default_value = "companies.json")]
    subjects: PathBuf,

    /// CSV output path.
    #[arg(long, env = "OUTPUT_FILE", default_value = "eksi_latest_entries.csv")]
    output: PathBuf,

    #[arg(long, env = "BROWSERLESS_URL", default_value = "http://localhost:3000")]
    browserless_url: String,

    #[arg(long, env = "BROWSERLESS_TOKEN", hide_env_values = true)]
    browserless_token: Option<String>,

    /// Skip subjects flagged inactive.
    #[arg(long)]
    active_only: bool,

    /// Only harvest the first N subjects.
    #[arg(long)]
    max_subjects: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("entryscout=info".parse()?))
        .init();

    let cli = Cli::parse();
    info!("entryscout starting...");

    let config = HarvestConfig::from_env().context("invalid harvest configuration")?;
    config.log_summary();

    let mut subjects = load_subjects(&cli.subjects)
        .with_context(|| format!("failed to load subjects from {}", cli.subjects.display()))?;
    if cli.active_only {
        subjects.retain(|s| s.is_active);
    }
    if let Some(max) = cli.max_subjects {
        subjects.truncate(max);
    }
    info!(count = subjects.len(), "Subjects queued");

    let renderer = Arc::new(BrowserlessRenderer::new(
        &cli.browserless_url,
        cli.browserless_token.as_deref(),
    ));
    let scheduler = BatchScheduler::new(renderer, config);
    let report = scheduler.run_all(&subjects).await;

    output::write_csv(&cli.output, &report.records)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;

    info!("{report}");
    info!(
        records = report.records.len(),
        elapsed_secs = format!("{:.1}", report.elapsed.as_secs_f64()),
        records_per_sec = format!("{:.2}", report.records_per_second()),
        "Done"
    );

    Ok(())
}
