//! Address-to-coordinate lookups.
//!
//! One [`Geocoder`] serves a whole run. It remembers every key it has asked
//! about, so an address is sent to the geocoding API at most once no matter
//! how many records share it or which pipeline asks. An empty result set is
//! always the null triad; what a failed request or a malformed answer does is
//! up to the geocoder's [`FailurePolicy`], which defaults to degrading.

use itertools::Itertools;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

use crate::error::{FailurePolicy, PipelineError, Result};
use crate::fetch::Fetcher;
use crate::models::GeoResult;

#[derive(Debug)]
pub struct Geocoder {
    url: String,
    cache: HashMap<String, GeoResult>,
    policy: FailurePolicy,
    lookups: usize,
    misses: usize,
}

impl Geocoder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            cache: HashMap::new(),
            policy: FailurePolicy::Degrade,
            lookups: 0,
            misses: 0,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Requests actually sent so far.
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    /// Lookups that ended in the null triad.
    pub fn misses(&self) -> usize {
        self.misses
    }

    /// Geocode one key, answering from the cache when possible.
    ///
    /// Only errors under [`FailurePolicy::Abort`] come back as `Err`.
    pub async fn lookup<F: Fetcher>(&mut self, fetcher: &F, key: &str) -> Result<GeoResult> {
        if let Some(hit) = self.cache.get(key) {
            return Ok(hit.clone());
        }

        self.lookups += 1;
        let result = match self.query(fetcher, key).await {
            Ok(Some(result)) => result,
            Ok(None) => {
                debug!(%key, "No geocode match");
                self.misses += 1;
                GeoResult::unresolved(key)
            }
            Err(e) => {
                self.misses += 1;
                let policy = self.policy;
                policy.on_error(e, |e| {
                    warn!(%key, error = %e, transport = e.is_transport(), ?policy, "Geocode lookup failed; using null coordinates");
                    GeoResult::unresolved(key)
                })?
            }
        };
        self.cache.insert(key.to_string(), result.clone());
        Ok(result)
    }

    /// Geocode every distinct key once, sequentially.
    #[instrument(level = "info", skip_all)]
    pub async fn resolve_all<'k, F, I>(&mut self, fetcher: &F, keys: I) -> Result<HashMap<String, GeoResult>>
    where
        F: Fetcher,
        I: IntoIterator<Item = &'k str>,
    {
        let distinct: Vec<&str> = keys.into_iter().unique().collect();
        info!(distinct = distinct.len(), "Geocoding addresses");

        let mut resolved = HashMap::with_capacity(distinct.len());
        for key in distinct {
            let result = self.lookup(fetcher, key).await?;
            resolved.insert(key.to_string(), result);
        }
        info!(lookups = self.lookups, misses = self.misses, "Geocoding finished");
        Ok(resolved)
    }

    async fn query<F: Fetcher>(&self, fetcher: &F, key: &str) -> Result<Option<GeoResult>> {
        let query = [
            ("searchVal", key.to_string()),
            ("returnGeom", "Y".to_string()),
            ("getAddrDetails", "Y".to_string()),
            ("pageNum", "1".to_string()),
        ];
        let body = fetcher.get_json(&self.url, &query).await?;
        let Some(first) = body
            .get("results")
            .and_then(Value::as_array)
            .and_then(|results| results.first())
        else {
            return Ok(None);
        };

        Ok(Some(GeoResult {
            key: key.to_string(),
            lat: Some(coordinate(first, "LATITUDE")?),
            lng: Some(coordinate(first, "LONGITUDE")?),
            postal: first.get("POSTAL").and_then(|p| match p {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
        }))
    }
}

fn coordinate(result: &Value, field: &'static str) -> Result<f64> {
    match result.get(field) {
        Some(Value::String(s)) => s.trim().parse().map_err(|e| PipelineError::parse(field, s.as_str(), e)),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| PipelineError::decode(format!("{field} out of range"))),
        _ => Err(PipelineError::decode(format!("geocode result without {field}"))),
    }
}
