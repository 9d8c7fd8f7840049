//! HDB resale listings scraped from the listings site.
//!
//! Pages are requested by number until too many come back empty in a row.
//! A page the site answers with a non-2xx status carries no listings and
//! counts as empty. Each listing is geocoded by name while its page is
//! processed, through the same [`Geocoder`] the resale pipeline uses.

use itertools::Itertools;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use crate::clean;
use crate::config::PipelineConfig;
use crate::error::{FailurePolicy, PipelineError, Result};
use crate::extract;
use crate::fetch::Fetcher;
use crate::geocode::Geocoder;
use crate::models::{CleanedListing, ListingRow, RawListing};
use crate::output::{self, LISTINGS_FILE};
use crate::paginate::{Page, PageSource, Paginator, StopPolicy};
use crate::progress::TracingProgress;
use crate::region::RegionIndex;

/// Printed when the listings run fails.
pub const REQUIREMENTS_HINT: &str =
    "ensure the following is available: towns.json, access to edgeprop.sg and onemap.gov.sg";

/// Listing result pages, cursor = page number.
pub struct ListingSource<'a, F> {
    fetcher: &'a F,
    geocoder: &'a mut Geocoder,
    url: String,
    interval: Duration,
    /// What a non-2xx page does to the run.
    status_policy: FailurePolicy,
}

impl<'a, F: Fetcher> ListingSource<'a, F> {
    pub fn new(fetcher: &'a F, geocoder: &'a mut Geocoder, config: &PipelineConfig) -> Self {
        Self {
            fetcher,
            geocoder,
            url: config.endpoints.listings.clone(),
            interval: Duration::from_secs(config.listings.interval_secs),
            status_policy: FailurePolicy::Degrade,
        }
    }
}

impl<F: Fetcher> PageSource for ListingSource<'_, F> {
    type Item = RawListing;

    async fn fetch_page(&mut self, cursor: u64) -> Result<Page<RawListing>> {
        let html = match self.fetcher.get_text(&self.url, &[("page", cursor.to_string())]).await {
            Ok(html) => html,
            Err(e @ PipelineError::Status { .. }) => self.status_policy.on_error(e, |e| {
                warn!(page = cursor, error = %e, "Listing page unavailable; counting it as empty");
                String::new()
            })?,
            Err(e) => return Err(e),
        };
        let elements = extract::listing_elements(&html)?;
        debug!(page = cursor, elements = elements.len(), "Extracted listings");

        let mut records = Vec::with_capacity(elements.len());
        for element in elements {
            let geo = self.geocoder.lookup(self.fetcher, &element.name).await?;
            records.push(element.into_listing(geo)?);
        }

        if !records.is_empty() && !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }
        Ok(Page {
            records,
            next: Some(cursor + 1),
            total: None,
        })
    }
}

/// Scrape listing pages until the empty-page limit or the page cap.
#[instrument(level = "info", skip_all, fields(max_pages = config.listings.max_pages))]
pub async fn fetch_listings<F: Fetcher>(
    fetcher: &F,
    geocoder: &mut Geocoder,
    config: &PipelineConfig,
) -> Result<Vec<RawListing>> {
    let source = ListingSource::new(fetcher, geocoder, config);
    let pager = Paginator::new(
        source,
        StopPolicy::EmptyStreak(config.listings.empty_page_limit),
        TracingProgress::new("listings"),
    )
    .with_max_pages(config.listings.max_pages);
    let listings = pager.collect_all().await?;
    info!(listings = listings.len(), "Scraped listings");
    Ok(listings)
}

/// Assign towns and drop repeated listings (same URL, first one kept).
pub fn enrich_listings(rows: Vec<CleanedListing>, regions: &RegionIndex) -> Vec<ListingRow> {
    let joined = regions.join(rows, |row| {
        row.raw.geo.coordinates().unwrap_or((f64::NAN, f64::NAN))
    });
    let total = joined.len();
    let rows: Vec<ListingRow> = joined
        .into_iter()
        .filter_map(|(row, town)| {
            let (lng, lat) = row.raw.geo.coordinates()?;
            Some(ListingRow {
                name: row.raw.name,
                hdb_type: row.raw.hdb_type,
                bathrooms: row.raw.bathrooms,
                rooms: row.raw.rooms,
                sqft: row.sqft,
                psf: row.raw.psf,
                price: row.raw.price,
                postal: row.postal,
                lat,
                lng,
                url: row.raw.url,
                flat_type: row.flat_type,
                address: row.address,
                town,
            })
        })
        .unique_by(|row| row.url.clone())
        .collect();
    info!(total, kept = rows.len(), duplicates = total - rows.len(), "Removed duplicate listings");
    rows
}

/// Run the whole listings pipeline and write `edgeprop.csv`.
///
/// Returns the number of rows written.
#[instrument(level = "info", skip_all)]
pub async fn run<F: Fetcher>(fetcher: &F, config: &PipelineConfig) -> Result<usize> {
    let t0 = Instant::now();
    output::ensure_writable_dir(&config.data_dir).await?;
    let regions = RegionIndex::load(&config.towns_path)?;

    let mut geocoder = Geocoder::new(config.endpoints.geocoder.as_str());
    let raw = fetch_listings(fetcher, &mut geocoder, config).await?;
    let cleaned = clean::clean_listings(raw)?;
    let rows = enrich_listings(cleaned, &regions);
    output::write_table(&rows, &config.data_dir.join(LISTINGS_FILE)).await?;

    info!(
        rows = rows.len(),
        geocode_lookups = geocoder.lookups(),
        geocode_misses = geocoder.misses(),
        elapsed_secs = t0.elapsed().as_secs(),
        "Listings pipeline complete"
    );
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::fetch::testing::{query_value, FnFetcher};
    use crate::fetch::Query;

    const TOWNS: &str = r#"{"type": "FeatureCollection", "features": [
        {"type": "Feature", "properties": {"name": "TAMPINES"},
         "geometry": {"type": "Polygon", "coordinates": [[[103.9,1.3],[104.0,1.3],[104.0,1.4],[103.9,1.4],[103.9,1.3]]]}}
    ]}"#;

    fn element(name: &str, url: &str) -> String {
        format!(
            r#"{{"name": "{name}", "url": "{url}", "price": 520000,
                "itemOffered": {{"numberOfBathroomsTotal": 2, "numberOfRooms": 4, "floorSize": {{"value": "1,098"}}}},
                "additionalProperty": [
                    {{"name": "Property Type", "value": "4NG (New Generation)"}},
                    {{"name": "Price per Square Foot", "value": "S$ 474 psf"}}
                ]}}"#
        )
    }

    fn page(elements: &[String]) -> String {
        format!(
            r#"<html><head><script type="application/ld+json">
            {{"@context": "https://schema.org", "mainEntity": {{"@type": "ItemList", "itemListElement": [{}]}},
              "publisher": {{"@type": "Organization"}}}}
            </script></head><body></body></html>"#,
            elements.join(",")
        )
    }

    /// `pages[n]` lists the listing names on page `n`; later pages are empty.
    fn site(url: &str, query: &Query<'_>, pages: &[&[&str]]) -> Result<String> {
        if url.starts_with("https://listings.test") {
            let n: usize = query_value(query, "page").unwrap().parse().unwrap();
            return Ok(match pages.get(n) {
                Some(names) if !names.is_empty() => page(
                    &names
                        .iter()
                        .map(|name| element(name, &format!("https://listings.test/{}", name.replace(' ', "-"))))
                        .collect::<Vec<_>>(),
                ),
                _ => "<html><body>No results</body></html>".to_string(),
            });
        }
        match query_value(query, "searchVal") {
            Some("1 Tampines St 11") => Ok(r#"{"results": [{"POSTAL": "521001", "LATITUDE": "1.35", "LONGITUDE": "103.95"}]}"#.into()),
            Some("5 Jurong West St 1") => Ok(r#"{"results": [{"POSTAL": "640005", "LATITUDE": "1.34", "LONGITUDE": "103.70"}]}"#.into()),
            Some("Down Street") => Err(PipelineError::Status { url: url.to_string(), status: 503 }),
            _ => Ok(r#"{"results": []}"#.into()),
        }
    }

    fn config(dir: &std::path::Path) -> PipelineConfig {
        let towns = dir.join("towns.json");
        std::fs::write(&towns, TOWNS).unwrap();
        let mut config = PipelineConfig::default();
        config.data_dir = dir.join("data");
        config.towns_path = towns;
        config.endpoints.listings = "https://listings.test/hdb-for-sale".into();
        config.endpoints.geocoder = "https://geo.test/search".into();
        config.listings.interval_secs = 0;
        config
    }

    fn page_requests<F>(fetcher: &FnFetcher<F>) -> usize {
        fetcher
            .calls
            .borrow()
            .iter()
            .filter(|(url, _)| url.starts_with("https://listings.test"))
            .count()
    }

    #[tokio::test]
    async fn test_stops_after_consecutive_empty_pages() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let pages: &[&[&str]] = &[
            &["1 Tampines St 11"],
            &["5 Jurong West St 1"],
            &[],
            &[],
            &[],
            &[],
            &[],
            &["1 Tampines St 11"],
        ];
        let fetcher = FnFetcher::new(|url, query| site(url, query, pages));
        let mut geocoder = Geocoder::new(config.endpoints.geocoder.as_str());

        let listings = fetch_listings(&fetcher, &mut geocoder, &config).await.unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(page_requests(&fetcher), 7);
    }

    #[tokio::test]
    async fn test_geocode_failures_degrade_and_repeat_names_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let pages: &[&[&str]] = &[
            &["1 Tampines St 11", "Down Street", "Unknown Place"],
            &["1 Tampines St 11"],
        ];
        let fetcher = FnFetcher::new(|url, query| site(url, query, pages));
        let mut geocoder = Geocoder::new(config.endpoints.geocoder.as_str());

        let listings = fetch_listings(&fetcher, &mut geocoder, &config).await.unwrap();
        assert_eq!(listings.len(), 4);
        assert_eq!(listings[0].geo.postal.as_deref(), Some("521001"));
        assert_eq!(listings[1].geo.coordinates(), None);
        assert_eq!(listings[2].geo.coordinates(), None);
        assert_eq!(listings[3].geo, listings[0].geo);
        assert_eq!(geocoder.lookups(), 3);
        assert_eq!(listings[0].psf, 474);
        assert_eq!(listings[0].hdb_type, "4NG (New Generation)");
    }

    #[tokio::test]
    async fn test_unavailable_pages_count_toward_empty_streak() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let fetcher = FnFetcher::new(|url, _| Err(PipelineError::Status { url: url.to_string(), status: 404 }));
        let mut geocoder = Geocoder::new(config.endpoints.geocoder.as_str());
        let listings = fetch_listings(&fetcher, &mut geocoder, &config).await.unwrap();
        assert!(listings.is_empty());
        assert_eq!(page_requests(&fetcher), config.listings.empty_page_limit as usize);
    }

    #[tokio::test]
    async fn test_unavailable_page_between_listing_pages_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.listings.max_pages = 3;
        let pages: &[&[&str]] = &[&["1 Tampines St 11"], &[], &["5 Jurong West St 1"]];
        let fetcher = FnFetcher::new(|url, query| {
            if url.starts_with("https://listings.test") && query_value(query, "page") == Some("1") {
                return Err(PipelineError::Status { url: url.to_string(), status: 503 });
            }
            site(url, query, pages)
        });
        let mut geocoder = Geocoder::new(config.endpoints.geocoder.as_str());

        let listings = fetch_listings(&fetcher, &mut geocoder, &config).await.unwrap();
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].name, "1 Tampines St 11");
        assert_eq!(listings[1].name, "5 Jurong West St 1");
        assert_eq!(page_requests(&fetcher), 3);
    }

    #[tokio::test]
    async fn test_connection_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let fetcher = FnFetcher::new(|_, _| {
            Err(PipelineError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )))
        });
        let mut geocoder = Geocoder::new(config.endpoints.geocoder.as_str());
        assert!(matches!(
            fetch_listings(&fetcher, &mut geocoder, &config).await,
            Err(PipelineError::Io(_))
        ));
        assert_eq!(page_requests(&fetcher), 1);
    }

    #[tokio::test]
    async fn test_run_writes_town_tagged_listings() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let pages: &[&[&str]] = &[
            &["1 Tampines St 11", "5 Jurong West St 1", "Down Street"],
            &["1 Tampines St 11"],
        ];
        let fetcher = FnFetcher::new(|url, query| site(url, query, pages));

        let written = run(&fetcher, &config).await.unwrap();

        // Jurong West lies outside the only town, Down Street has no coordinates,
        // and the repeated Tampines listing shares its URL.
        assert_eq!(written, 1);
        let csv = std::fs::read_to_string(config.data_dir.join(LISTINGS_FILE)).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Address,HDBType,Bathrooms,UtilityRooms,Sqft,Psf,Price,Postal,Lat,Lon,URL,flat_type,address,town"
        );
        assert_eq!(
            lines.next().unwrap(),
            "1 Tampines St 11,4NG (New Generation),2,4,1098,474,520000,521001,1.35,103.95,\
             https://listings.test/1-Tampines-St-11,4 ROOM,1 Tampines St 11 SINGAPORE 521001,TAMPINES"
        );
        assert_eq!(lines.next(), None);
    }
}
