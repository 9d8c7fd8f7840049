//! Resale transactions from the government open-data API.
//!
//! collection metadata -> dataset ids -> paged `datastore_search` ->
//! clean -> geocode distinct `block street` keys -> postal/address ->
//! town join -> `resale.csv`

use std::collections::HashMap;
use std::time::Instant;
use tracing::{info, instrument};

use crate::clean::{self, normalize_postal, postal_address};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::extract;
use crate::fetch::Fetcher;
use crate::geocode::Geocoder;
use crate::models::{CleanedResale, GeoResult, RawResale, ResaleRow};
use crate::output::{self, RESALE_FILE};
use crate::paginate::{Page, PageSource, Paginator, StopPolicy};
use crate::progress::TracingProgress;
use crate::region::RegionIndex;

/// One `datastore_search` dataset, paged by offset.
pub struct DatasetSource<'a, F> {
    fetcher: &'a F,
    url: String,
    resource_id: String,
    limit: u64,
}

impl<'a, F: Fetcher> DatasetSource<'a, F> {
    pub fn new(fetcher: &'a F, config: &PipelineConfig, resource_id: impl Into<String>) -> Self {
        Self {
            fetcher,
            url: format!("{}datastore_search", config.endpoints.data_gov_v1),
            resource_id: resource_id.into(),
            limit: config.resale.page_size,
        }
    }
}

impl<F: Fetcher> PageSource for DatasetSource<'_, F> {
    type Item = RawResale;

    async fn fetch_page(&mut self, cursor: u64) -> Result<Page<RawResale>> {
        let query = [
            ("resource_id", self.resource_id.clone()),
            ("offset", cursor.to_string()),
            ("limit", self.limit.to_string()),
        ];
        let body = self.fetcher.get_json(&self.url, &query).await?;
        extract::dataset_page(body)
    }
}

/// Ids of the datasets making up the configured collection.
#[instrument(level = "info", skip_all, fields(collection = config.resale.collection_id))]
pub async fn dataset_ids<F: Fetcher>(fetcher: &F, config: &PipelineConfig) -> Result<Vec<String>> {
    let url = format!(
        "{}collections/{}/metadata",
        config.endpoints.data_gov_v2, config.resale.collection_id
    );
    let body = fetcher.get_json(&url, &[]).await?;
    let ids = extract::dataset_ids(&body)?;
    info!(datasets = ids.len(), "Resolved collection datasets");
    Ok(ids)
}

/// Every record of every dataset in the collection.
#[instrument(level = "info", skip_all)]
pub async fn fetch_resale<F: Fetcher>(fetcher: &F, config: &PipelineConfig) -> Result<Vec<RawResale>> {
    let mut records = Vec::new();
    for id in dataset_ids(fetcher, config).await? {
        let source = DatasetSource::new(fetcher, config, id.as_str());
        let pager = Paginator::new(source, StopPolicy::StopOnEmpty, TracingProgress::new(format!("dataset {id}")));
        records.extend(pager.collect_all().await?);
    }
    info!(records = records.len(), "Fetched resale records");
    Ok(records)
}

/// Geocoded fields attached to a cleaned transaction.
struct Located {
    lat: f64,
    lng: f64,
    postal: u32,
    address: String,
}

/// Merge geocodes onto transactions and assign towns.
///
/// Transactions whose address has no usable postal code or no coordinates
/// are dropped, as are those outside every town.
pub fn enrich_resale(
    rows: Vec<CleanedResale>,
    geocodes: &HashMap<String, GeoResult>,
    regions: &RegionIndex,
) -> Result<Vec<ResaleRow>> {
    let total = rows.len();
    let mut located = Vec::with_capacity(total);
    for row in rows {
        let Some(geo) = geocodes.get(&row.coord_key) else {
            continue;
        };
        let Some(postal) = normalize_postal(geo.postal.as_deref())? else {
            continue;
        };
        let Some((lng, lat)) = geo.coordinates() else {
            continue;
        };
        let address = postal_address(&format!("{} {}", row.block, row.street_name), postal);
        located.push((row, Located { lat, lng, postal, address }));
    }
    info!(total, kept = located.len(), dropped = total - located.len(), "Merged geocodes");

    let joined = regions.join(located, |(_, at)| (at.lng, at.lat));
    Ok(joined
        .into_iter()
        .map(|((row, at), town)| ResaleRow {
            month: row.month,
            year: row.year,
            flat_type: row.flat_type,
            street_name: row.street_name,
            storey_range: row.storey_range,
            floor_area_sqm: row.floor_area_sqm,
            flat_model: row.flat_model,
            lease_commence_date: row.lease_commence_date,
            remaining_lease: row.remaining_lease,
            resale_price: row.resale_price,
            sqft: row.sqft,
            psf: row.psf,
            date: row.date,
            lat: at.lat,
            lng: at.lng,
            postal: at.postal,
            address: at.address,
            town,
        })
        .collect())
}

/// Run the whole resale pipeline and write `resale.csv`.
///
/// Returns the number of rows written.
#[instrument(level = "info", skip_all)]
pub async fn run<F: Fetcher>(fetcher: &F, config: &PipelineConfig) -> Result<usize> {
    let t0 = Instant::now();
    output::ensure_writable_dir(&config.data_dir).await?;
    let regions = RegionIndex::load(&config.towns_path)?;

    let raw = fetch_resale(fetcher, config).await?;
    let cleaned = clean::clean_resale(raw, &config.resale)?;

    let mut geocoder = Geocoder::new(config.endpoints.geocoder.as_str());
    let geocodes = geocoder
        .resolve_all(fetcher, cleaned.iter().map(|row| row.coord_key.as_str()))
        .await?;

    let rows = enrich_resale(cleaned, &geocodes, &regions)?;
    output::write_table(&rows, &config.data_dir.join(RESALE_FILE)).await?;

    info!(
        rows = rows.len(),
        geocode_lookups = geocoder.lookups(),
        elapsed_secs = t0.elapsed().as_secs(),
        "Resale pipeline complete"
    );
    Ok(rows.len())
}
