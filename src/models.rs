//! Record types flowing through the pipeline.
//!
//! - [`RawResale`] / [`RawListing`]: one source item as extracted from a page
//! - [`CleanedResale`] / [`CleanedListing`]: coerced rows with derived fields
//! - [`GeoResult`]: geocoder answer for one address key
//! - [`ResaleRow`] / [`ListingRow`]: final, region-tagged CSV rows
//!
//! Output field names follow the column names of the published CSV files,
//! hence the `rename`s.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One resale transaction as served by `datastore_search`.
///
/// Every field is optional here; presence is enforced by the cleaner, which
/// drops rows with any missing value.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawResale {
    /// Transaction month as `YYYY-MM`.
    #[serde(deserialize_with = "scalar_text")]
    pub month: Option<String>,
    #[serde(deserialize_with = "scalar_text")]
    pub town: Option<String>,
    #[serde(deserialize_with = "scalar_text")]
    pub flat_type: Option<String>,
    #[serde(deserialize_with = "scalar_text")]
    pub block: Option<String>,
    #[serde(deserialize_with = "scalar_text")]
    pub street_name: Option<String>,
    #[serde(deserialize_with = "scalar_text")]
    pub storey_range: Option<String>,
    #[serde(deserialize_with = "scalar_text")]
    pub floor_area_sqm: Option<String>,
    #[serde(deserialize_with = "scalar_text")]
    pub flat_model: Option<String>,
    #[serde(deserialize_with = "scalar_text")]
    pub lease_commence_date: Option<String>,
    #[serde(deserialize_with = "scalar_text")]
    pub resale_price: Option<String>,
}

/// One listing scraped from a results page, already geocoded.
#[derive(Debug, Clone, PartialEq)]
pub struct RawListing {
    /// Listing name; doubles as the geocoding key.
    pub name: String,
    /// `Property Type` attribute, `"0"` when absent.
    pub hdb_type: String,
    pub bathrooms: Option<String>,
    pub rooms: Option<String>,
    /// Floor size as printed, e.g. `"1,001"`.
    pub floor_size: String,
    /// Price per square foot, `0` when absent.
    pub psf: i64,
    pub price: Option<String>,
    pub url: String,
    pub geo: GeoResult,
}

/// Geocoder answer for one address key. All three are `None` when the
/// lookup failed or matched nothing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeoResult {
    pub key: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub postal: Option<String>,
}

impl GeoResult {
    pub fn unresolved(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.lng?, self.lat?))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanedResale {
    pub year: i32,
    pub month: u32,
    pub flat_type: String,
    pub block: String,
    pub street_name: String,
    pub storey_range: String,
    pub floor_area_sqm: f64,
    pub flat_model: String,
    pub lease_commence_date: i32,
    pub remaining_lease: i32,
    pub resale_price: f64,
    pub sqft: i64,
    pub psf: i64,
    pub date: NaiveDate,
    /// `block + " " + street_name`.
    pub coord_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanedListing {
    pub raw: RawListing,
    pub sqft: i64,
    pub flat_type: &'static str,
    pub postal: u32,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResaleRow {
    pub month: u32,
    pub year: i32,
    pub flat_type: String,
    pub street_name: String,
    pub storey_range: String,
    pub floor_area_sqm: f64,
    pub flat_model: String,
    pub lease_commence_date: i32,
    pub remaining_lease: i32,
    pub resale_price: f64,
    #[serde(rename = "Sqft")]
    pub sqft: i64,
    #[serde(rename = "Psf")]
    pub psf: i64,
    pub date: NaiveDate,
    pub lat: f64,
    pub lng: f64,
    pub postal: u32,
    pub address: String,
    pub town: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingRow {
    #[serde(rename = "Address")]
    pub name: String,
    #[serde(rename = "HDBType")]
    pub hdb_type: String,
    #[serde(rename = "Bathrooms")]
    pub bathrooms: Option<String>,
    #[serde(rename = "UtilityRooms")]
    pub rooms: Option<String>,
    #[serde(rename = "Sqft")]
    pub sqft: i64,
    #[serde(rename = "Psf")]
    pub psf: i64,
    #[serde(rename = "Price")]
    pub price: Option<String>,
    #[serde(rename = "Postal")]
    pub postal: u32,
    #[serde(rename = "Lat")]
    pub lat: f64,
    #[serde(rename = "Lon")]
    pub lng: f64,
    #[serde(rename = "URL")]
    pub url: String,
    pub flat_type: &'static str,
    pub address: String,
    pub town: String,
}

/// Accept a JSON string or number as text; `null` becomes `None`.
///
/// The open-data API is not consistent about quoting numeric columns, and
/// the listings markup mixes both styles.
pub fn scalar_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}
