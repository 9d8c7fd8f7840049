//! # HDB Atlas
//!
//! Builds two analysis tables of Singapore public-housing (HDB) resale data:
//!
//! - **records**: every resale transaction published in the government
//!   open-data collection, from 2000 onwards
//! - **listings**: flats currently advertised for sale on a listings site
//!
//! ## Usage
//!
//! ```sh
//! hdb_atlas records
//! hdb_atlas listings -n 250
//! ```
//!
//! ## Architecture
//!
//! Both runs follow the same pipeline:
//! 1. **Paginate**: request pages until the source is exhausted
//! 2. **Extract**: turn each page into flat records
//! 3. **Clean**: coerce types, derive fields, drop incomplete rows
//! 4. **Geocode**: resolve each distinct address once
//! 5. **Join**: assign the town whose boundary contains the point
//! 6. **Write**: replace the CSV table under the data directory

use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod clean;
mod cli;
mod config;
mod error;
mod extract;
mod fetch;
mod geocode;
mod models;
mod output;
mod paginate;
mod pipeline;
mod progress;
mod region;

use cli::{Cli, Command};
use config::PipelineConfig;
use error::FailurePolicy;
use fetch::HttpFetcher;
use pipeline::listings::REQUIREMENTS_HINT;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("hdb_atlas starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let mut config = PipelineConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    debug!(?config, "Effective configuration");

    let fetcher = HttpFetcher::new()?;

    match args.command {
        Command::Records { .. } => {
            let rows = pipeline::records::run(&fetcher, &config).await?;
            info!(rows, "Resale records written");
        }
        Command::Listings { .. } => match pipeline::listings::run(&fetcher, &config).await {
            Ok(rows) => info!(rows, "Listings written"),
            Err(e) => {
                error!(error = %e, policy = ?FailurePolicy::Abort, "Listings pipeline failed");
                eprintln!("{e}");
                eprintln!("{REQUIREMENTS_HINT}");
                std::process::exit(1);
            }
        },
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}
