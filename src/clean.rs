//! Per-row coercion, derived fields and filtering.
//!
//! Rows with gaps are dropped; values that are present but cannot be
//! coerced abort the run.

use chrono::NaiveDate;
use tracing::{info, instrument};

use crate::config::ResaleConfig;
use crate::error::{PipelineError, Result};
use crate::models::{CleanedListing, CleanedResale, RawListing, RawResale};

/// Listing `Property Type` codes and the resale flat type they correspond to.
/// Codes not listed map to [`OTHER_FLAT_TYPE`].
pub const FLAT_TYPES: [(&str, &str); 28] = [
    ("EA (Exec Apartment)", "EXECUTIVE"),
    ("4A", "4 ROOM"),
    ("3A", "3 ROOM"),
    ("4I (Improved)", "4 ROOM"),
    ("5I", "5 ROOM"),
    ("2A", "2 ROOM"),
    ("EM (Exec Maisonette)", "EXECUTIVE"),
    ("3NG", "3 ROOM"),
    ("3NG (Modified)", "3 ROOM"),
    ("3I (Improved)", "3 ROOM"),
    ("4NG (New Generation)", "4 ROOM"),
    ("3STD (Standard)", "3 ROOM"),
    ("4STD (Standard)", "4 ROOM"),
    ("5A", "5 ROOM"),
    ("4S (Simplified)", "4 ROOM"),
    ("5S", "5 ROOM"),
    ("Premium Apartment", "OTHERS"),
    ("3S (Simplified)", "3 ROOM"),
    ("3I (Modified)", "3 ROOM"),
    ("2I (Improved)", "2 ROOM"),
    ("3NG (New Generation)", "3 ROOM"),
    ("Jumbo", "OTHERS"),
    ("MG (Multi-Generation)", "MULTI GENERATION"),
    ("2S (Standard)", "2 ROOM"),
    ("2-Room", "2 ROOM"),
    ("3A (MODIFIED)", "3 ROOM"),
    ("Terrace", "TERRACE"),
    ("5PA", "5 ROOM"),
];

pub const OTHER_FLAT_TYPE: &str = "OTHERS";

const POSTAL_MISSING: &str = "NIL";

/* ---------------- resale transactions ---------------- */

/// Clean resale transactions.
///
/// Rows missing any field, and rows dated before `config.min_year`, are
/// dropped.
#[instrument(level = "info", skip_all, fields(rows = raw.len()))]
pub fn clean_resale(raw: Vec<RawResale>, config: &ResaleConfig) -> Result<Vec<CleanedResale>> {
    let total = raw.len();
    let mut incomplete = 0usize;
    let mut too_old = 0usize;
    let mut cleaned = Vec::with_capacity(total);

    for row in raw {
        match clean_resale_row(row, config)? {
            None => incomplete += 1,
            Some(row) if row.year < config.min_year => too_old += 1,
            Some(row) => cleaned.push(row),
        }
    }

    info!(
        total,
        kept = cleaned.len(),
        incomplete,
        too_old,
        "Cleaned resale transactions"
    );
    Ok(cleaned)
}

/// `Ok(None)` when a field is missing.
fn clean_resale_row(row: RawResale, config: &ResaleConfig) -> Result<Option<CleanedResale>> {
    let RawResale {
        month: Some(period),
        // Required, but the region join supplies the output town.
        town: Some(_),
        flat_type: Some(flat_type),
        block: Some(block),
        street_name: Some(street_name),
        storey_range: Some(storey_range),
        floor_area_sqm: Some(floor_area_sqm),
        flat_model: Some(flat_model),
        lease_commence_date: Some(lease_commence_date),
        resale_price: Some(resale_price),
    } = row
    else {
        return Ok(None);
    };

    let (year, month) = split_period(&period)?;
    let lease_commence_date: i32 = parse_field("lease_commence_date", &lease_commence_date)?;
    let floor_area_sqm: f64 = parse_field("floor_area_sqm", &floor_area_sqm)?;
    let resale_price: f64 = parse_field("resale_price", &resale_price)?;
    if !floor_area_sqm.is_finite() || floor_area_sqm <= 0.0 {
        return Err(PipelineError::parse(
            "floor_area_sqm",
            floor_area_sqm.to_string(),
            "floor area must be a positive number",
        ));
    }

    let date = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| PipelineError::parse("month", period.as_str(), "no such calendar month"))?;
    let area_sqft = floor_area_sqm * config.sqm_to_sqft;

    Ok(Some(CleanedResale {
        year,
        month,
        flat_type: canonical_resale_flat_type(flat_type),
        coord_key: format!("{block} {street_name}"),
        block,
        street_name,
        storey_range,
        floor_area_sqm,
        flat_model: flat_model.to_uppercase(),
        lease_commence_date,
        remaining_lease: remaining_lease(config.lease_term_years, year, lease_commence_date),
        resale_price,
        sqft: round_half_even(area_sqft),
        // From the unrounded area.
        psf: round_half_even(resale_price / area_sqft),
        date,
    }))
}

/// `"2017-01"` -> `(2017, 1)`.
pub fn split_period(period: &str) -> Result<(i32, u32)> {
    let (year, month) = period
        .split_once('-')
        .ok_or_else(|| PipelineError::parse("month", period, "expected YYYY-MM"))?;
    Ok((parse_field("year", year)?, parse_field("month", month)?))
}

/// Years left on the lease, counted in whole years only.
pub fn remaining_lease(lease_term_years: i32, year: i32, lease_commence_year: i32) -> i32 {
    lease_term_years - (year - lease_commence_year)
}

fn canonical_resale_flat_type(flat_type: String) -> String {
    if flat_type == "MULTI-GENERATION" {
        "MULTI GENERATION".to_string()
    } else {
        flat_type
    }
}

/* ---------------- listings ---------------- */

/// Clean scraped listings.
///
/// Drops listings without a usable postal code or without coordinates.
#[instrument(level = "info", skip_all, fields(rows = raw.len()))]
pub fn clean_listings(raw: Vec<RawListing>) -> Result<Vec<CleanedListing>> {
    let total = raw.len();
    let mut no_postal = 0usize;
    let mut no_coordinates = 0usize;
    let mut cleaned = Vec::with_capacity(total);

    for listing in raw {
        let sqft = parse_floor_size(&listing.floor_size)?;
        let flat_type = canonical_flat_type(&listing.hdb_type);
        let Some(postal) = normalize_postal(listing.geo.postal.as_deref())? else {
            no_postal += 1;
            continue;
        };
        if listing.geo.coordinates().is_none() {
            no_coordinates += 1;
            continue;
        }
        cleaned.push(CleanedListing {
            address: postal_address(&listing.name, postal),
            raw: listing,
            sqft,
            flat_type,
            postal,
        });
    }

    info!(
        total,
        kept = cleaned.len(),
        no_postal,
        no_coordinates,
        "Cleaned listings"
    );
    Ok(cleaned)
}

/// Map a listing `Property Type` code onto a resale flat type.
pub fn canonical_flat_type(code: &str) -> &'static str {
    FLAT_TYPES
        .iter()
        .find(|(known, _)| *known == code)
        .map_or(OTHER_FLAT_TYPE, |(_, label)| *label)
}

/// `"1,001"` -> `1001`; blank -> `0`.
pub fn parse_floor_size(text: &str) -> Result<i64> {
    let digits = text.replace([',', ' '], "");
    if digits.is_empty() {
        return Ok(0);
    }
    parse_field("floorSize", &digits)
}

/* ---------------- shared ---------------- */

/// Postal code as an integer. `None`, blank and `"NIL"` mean missing.
///
/// Accepts float renderings such as `"123.0"`.
pub fn normalize_postal(raw: Option<&str>) -> Result<Option<u32>> {
    let Some(text) = raw.map(str::trim) else {
        return Ok(None);
    };
    if text.is_empty() || text == POSTAL_MISSING {
        return Ok(None);
    }
    let value: f64 = parse_field("postal", text)?;
    if value < 0.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return Err(PipelineError::parse("postal", text, "not a whole non-negative number"));
    }
    Ok(Some(value as u32))
}

/// Human-readable address, `"<street part> SINGAPORE <postal>"`.
pub fn postal_address(street: &str, postal: u32) -> String {
    format!("{street} SINGAPORE {postal}")
}

/// Round to nearest, ties to even.
pub fn round_half_even(value: f64) -> i64 {
    value.round_ties_even() as i64
}

fn parse_field<T>(field: &'static str, text: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    text.trim().parse().map_err(|e| PipelineError::parse(field, text, e))
}
