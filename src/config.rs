//! Run configuration: endpoints, domain constants and pagination limits.
//!
//! Values come from built-in defaults, optionally overlaid by a YAML file
//! (`--config`), then by command-line flags.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::error::Result;

/// Fixed leasehold for HDB flats, in years.
pub const DEFAULT_LEASE_TERM_YEARS: i32 = 99;
/// Square metres to square feet.
pub const SQM_TO_SQFT: f64 = 10.7639;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory the CSV outputs are written to.
    pub data_dir: PathBuf,
    /// Region boundary file (GeoJSON feature collection, `name` per feature).
    pub towns_path: PathBuf,
    pub endpoints: Endpoints,
    pub resale: ResaleConfig,
    pub listings: ListingsConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Endpoints {
    /// v1 API root, serves `datastore_search`.
    pub data_gov_v1: String,
    /// v2 API root, serves collection metadata.
    pub data_gov_v2: String,
    pub geocoder: String,
    pub listings: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResaleConfig {
    pub collection_id: u32,
    pub page_size: u64,
    pub lease_term_years: i32,
    /// Transactions dated before this year are discarded.
    pub min_year: i32,
    pub sqm_to_sqft: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ListingsConfig {
    pub max_pages: u64,
    pub empty_page_limit: u32,
    /// Pause after each page that produced listings.
    pub interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            towns_path: PathBuf::from("towns.json"),
            endpoints: Endpoints::default(),
            resale: ResaleConfig::default(),
            listings: ListingsConfig::default(),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            data_gov_v1: "https://data.gov.sg/api/action/".into(),
            data_gov_v2: "https://api-production.data.gov.sg/v2/public/api/".into(),
            geocoder: "https://www.onemap.gov.sg/api/common/elastic/search".into(),
            listings: "https://www.edgeprop.sg/hdb-for-sale".into(),
        }
    }
}

impl Default for ResaleConfig {
    fn default() -> Self {
        Self {
            collection_id: 189,
            page_size: 14_500,
            lease_term_years: DEFAULT_LEASE_TERM_YEARS,
            min_year: 2000,
            sqm_to_sqft: SQM_TO_SQFT,
        }
    }
}

impl Default for ListingsConfig {
    fn default() -> Self {
        Self {
            max_pages: 250,
            empty_page_limit: 5,
            interval_secs: 1,
        }
    }
}

impl PipelineConfig {
    /// Load from a YAML file, or fall back to defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                let config = Self::from_yaml(&text)?;
                info!(path = %path.display(), "Loaded configuration");
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }
}
