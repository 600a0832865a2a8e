use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dnb_statements::config::ResolvedConfig;
use dnb_statements::extract::ExtractionDriver;
use dnb_statements::merge::merge_account;
use dnb_statements::portal::DnbPortal;
use dnb_statements::reconcile::sweep;

#[derive(Parser)]
#[command(name = "dnb-statements")]
#[command(about = "Download and merge monthly DNB account statements")]
struct Cli {
    /// Path to the extraction config file
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Forgetting the argument is ordinary user input, not a failed run.
    let Some(config_path) = cli.config else {
        println!("You need to pass the path to the extraction config file.");
        println!("Usage: dnb-statements <extraction.toml>");
        return Ok(());
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let config = ResolvedConfig::load(&config_path)?;
    run(config).await
}

async fn run(config: ResolvedConfig) -> Result<()> {
    let mut portal = DnbPortal::launch(&config.browser, &config.download_dir).await?;
    portal.login(config.ssn.clone()).await?;
    portal.open_archive().await?;

    let mut driver = ExtractionDriver::new(
        portal,
        config.download_dir.clone(),
        config.driver.max_passes,
    );

    for entry in &config.extraction {
        for account in &entry.accounts {
            match driver.run_account(account, entry.from, entry.to).await {
                Ok(report) if report.is_complete() => {
                    info!(
                        account = %account,
                        downloaded = report.downloaded.len(),
                        unavailable = report.unavailable.len(),
                        "account complete"
                    );
                    if let Err(err) = merge_account(&config.download_dir, account) {
                        error!(account = %account, error = %err, "failed to merge statements");
                    }
                }
                Ok(report) => {
                    // Nothing gets merged for a partial account; the per-month
                    // files are left for the final sweep.
                    warn!(
                        account = %account,
                        unresolved = %report
                            .unresolved
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", "),
                        "months still unresolved after retry budget"
                    );
                }
                Err(err) => {
                    error!(account = %account, error = %err, "extraction failed, moving on");
                }
            }
        }
    }

    let removed = sweep(&config.download_dir)?;
    if removed > 0 {
        info!(removed, "swept leftover statement files");
    }

    driver.into_portal().close().await?;
    Ok(())
}
