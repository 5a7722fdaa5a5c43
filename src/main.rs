use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use textbook_dl::{Config, Event, Format, Pipeline, UnresolvedPolicy, run_until_signal};

/// Download every book listed in a textbook catalogue
#[derive(Parser, Debug)]
#[command(name = "textbook-dl", version, about)]
struct Cli {
    /// CSV catalogue to read [default: csv/Free+English+textbooks.csv]
    #[arg(long)]
    filepath: Option<PathBuf>,

    /// Format to download: pdf or epub [default: pdf]
    #[arg(long)]
    format: Option<Format>,

    /// Directory files are written to [default: output]
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Number of concurrent workers [default: 100]
    #[arg(long)]
    workers: Option<usize>,

    /// What to do when a book has no link for the format: skip or abort [default: skip]
    #[arg(long)]
    on_unresolved: Option<UnresolvedPolicy>,

    /// Retry attempts for every operation, overriding the configured policies
    #[arg(long)]
    max_attempts: Option<u32>,

    /// JSON configuration file; flags override its values
    #[arg(long, env = "TEXTBOOK_DL_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)
                .with_context(|| format!("Failed to load config from {:?}", path))?,
            None => Config::default(),
        };

        if let Some(filepath) = self.filepath {
            config.input_path = filepath;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(output_dir) = self.output_dir {
            config.output_dir = output_dir;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(policy) = self.on_unresolved {
            config.on_unresolved = policy;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.set_max_attempts(max_attempts);
        }

        config.validate().context("Configuration validation failed")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Cli::parse().into_config()?;
    info!(
        input = %config.input_path.display(),
        format = config.format.name(),
        workers = config.workers,
        "Configuration loaded"
    );

    let pipeline = Pipeline::new(config).context("Failed to create pipeline")?;
    let printer = tokio::spawn(print_progress(pipeline.subscribe()));

    let result = run_until_signal(&pipeline).await;

    // Closing the last sender lets the printer drain and exit
    drop(pipeline);
    printer.await.ok();

    let summary = result.context("Download run failed")?;
    info!(
        records = summary.records,
        downloaded = summary.downloaded,
        unresolved = summary.unresolved,
        failed = summary.failed,
        "Done"
    );
    Ok(())
}

/// Print download start and completion lines to stdout
async fn print_progress(mut events: broadcast::Receiver<Event>) {
    loop {
        match events.recv().await {
            Ok(Event::DownloadStarted { path, .. }) => {
                println!("Download begins:\t{}", path.display());
            }
            Ok(Event::DownloadComplete { path, .. }) => {
                println!("Download complete:\t{}", path.display());
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Progress output fell behind, events dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
