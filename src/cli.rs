//! Command-line interface definitions.
//!
//! Every flag overrides the matching value from the YAML configuration,
//! which in turn overrides the built-in defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::PipelineConfig;

/// Fetch, clean, geocode and town-tag HDB resale data.
///
/// # Examples
///
/// ```sh
/// # Resale transactions from data.gov.sg
/// hdb_atlas records
///
/// # Listings, at most 50 pages, custom output directory
/// hdb_atlas --data-dir ./out listings -n 50
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output directory for the CSV tables
    #[arg(short, long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Town boundary file (GeoJSON)
    #[arg(short, long, global = true)]
    pub towns: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Resale transactions from the government open-data API
    Records {
        /// Collection holding the resale datasets
        #[arg(long)]
        collection_id: Option<u32>,

        /// Records requested per page
        #[arg(long)]
        page_size: Option<u64>,
    },
    /// Resale listings scraped from the listings site
    Listings {
        /// Maximum number of result pages to request
        #[arg(short = 'n', long)]
        pages: Option<u64>,

        /// Stop after this many empty pages in a row
        #[arg(long)]
        empty_page_limit: Option<u32>,

        /// Seconds to wait after each page with listings
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

impl Cli {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(towns) = &self.towns {
            config.towns_path = towns.clone();
        }
        match &self.command {
            Command::Records {
                collection_id,
                page_size,
            } => {
                if let Some(id) = collection_id {
                    config.resale.collection_id = *id;
                }
                if let Some(size) = page_size {
                    config.resale.page_size = *size;
                }
            }
            Command::Listings {
                pages,
                empty_page_limit,
                interval_secs,
            } => {
                if let Some(pages) = pages {
                    config.listings.max_pages = *pages;
                }
                if let Some(limit) = empty_page_limit {
                    config.listings.empty_page_limit = *limit;
                }
                if let Some(secs) = interval_secs {
                    config.listings.interval_secs = *secs;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["hdb_atlas", "records"]);
        assert_eq!(
            cli.command,
            Command::Records {
                collection_id: None,
                page_size: None
            }
        );
        assert_eq!(cli.data_dir, None);
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "hdb_atlas",
            "listings",
            "-n",
            "10",
            "--empty-page-limit",
            "2",
            "--data-dir",
            "/tmp/out",
            "--towns",
            "/tmp/towns.json",
        ]);
        let mut config = PipelineConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.listings.max_pages, 10);
        assert_eq!(config.listings.empty_page_limit, 2);
        assert_eq!(config.listings.interval_secs, 1);
        assert_eq!(config.data_dir, Path::new("/tmp/out"));
        assert_eq!(config.towns_path, Path::new("/tmp/towns.json"));
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let cli = Cli::parse_from(["hdb_atlas", "records", "--page-size", "100"]);
        let mut config = PipelineConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.resale.page_size, 100);
        assert_eq!(config.resale.collection_id, 189);
        assert_eq!(config.data_dir, PipelineConfig::default().data_dir);
    }
}
