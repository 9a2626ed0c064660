//! deal-harvester CLI - main entry point

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use deal_harvester::{Config, Harvester, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

/// Harvest car deals into a CSV file and a per-deal image tree
#[derive(Debug, Parser)]
#[command(name = "deal-harvester", version, about)]
struct Cli {
    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of deals to harvest
    #[arg(long)]
    deal_count: Option<usize>,

    /// Deals per persisted CSV window
    #[arg(long)]
    window: Option<usize>,

    /// Total image URLs allowed in flight at once
    #[arg(long)]
    capacity: Option<usize>,

    /// Output directory for data.csv and images/
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Don't draw the progress bar
    #[arg(long)]
    no_progress: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        if let Some(deal_count) = self.deal_count {
            config.harvest.deal_count = deal_count;
        }
        if let Some(window) = self.window {
            config.harvest.window_size = window;
        }
        if let Some(capacity) = self.capacity {
            config.download.capacity = capacity;
        }
        if let Some(output) = &self.output {
            config.download.output_dir = output.clone();
        }
        Ok(config)
    }
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose {
        "deal_harvester=debug"
    } else {
        "deal_harvester=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_bar(hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} deals ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    bar.set_style(style);
    bar
}

async fn run(cli: &Cli) -> Result<()> {
    let config = cli.load_config()?;
    let harvester = Harvester::new(config)?.with_progress(progress_bar(cli.no_progress));

    let report = harvester.run().await?;
    if !report.is_complete() {
        tracing::warn!(
            received = report.received,
            expected = report.expected,
            "Crawl ended before the requested number of deals"
        );
    }
    println!("{}", report.stats);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Harvest failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
