use anyhow::Context;
use clap::Parser;
use cms_hospital_sync::config::Config;
use cms_hospital_sync::logging;
use cms_hospital_sync::pipeline::{Pipeline, RunOutcome, SyncSummary};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "cms_hospital_sync")]
#[command(about = "Incrementally sync hospital datasets from the CMS provider-data catalog")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (defaults to ./config.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of concurrent downloads
    #[arg(long)]
    workers: Option<usize>,

    /// Directory receiving the normalized CSV files
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn print_summary(summary: &SyncSummary) {
    println!("\n📊 Sync results:");
    println!("   Total records retrieved: {}", summary.catalog_size);
    if summary.outcome == RunOutcome::EmptyCatalog {
        println!("   No datasets available, watermark unchanged");
        return;
    }
    println!("   Hospitals processed: {}", summary.selected);
    println!(
        "   Downloads: {} dispatched, {} downloaded, {} normalized, {} failed",
        summary.dispatch.dispatched,
        summary.dispatch.downloaded,
        summary.dispatch.transformed,
        summary.dispatch.failed
    );
    println!("   Theme counts:");
    for (theme, count) in summary.themes.iter() {
        println!("   - {}: {}", theme, count);
    }
    match (summary.watermark, summary.watermark_saved) {
        (Some(wm), true) => println!("   Watermark: {}", wm),
        (Some(wm), false) => println!("⚠️  Watermark {} could not be saved; the next run repeats this window", wm),
        (None, _) => println!("⚠️  Watermark held back"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let rejected_env = config.apply_env();
    if let Some(workers) = cli.workers {
        config.workers = workers.max(1);
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }

    logging::init_logging(&config.log_dir);
    for message in &rejected_env {
        warn!("{}", message);
    }
    info!(catalog = %config.catalog_url, output_dir = %config.output_dir.display(), "🔄 Starting sync");

    let pipeline = Pipeline::from_config(&config).context("building HTTP client")?;
    match pipeline.run().await {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            error!("Sync failed: {}", e);
            Err(e).context("sync run aborted")
        }
    }
}
