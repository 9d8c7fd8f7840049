//! Single HTTP requests against the government API, the geocoder and the
//! listings site.
//!
//! [`Fetcher`] is the seam between the pipeline and the network: the
//! paginator, the listing source and the geocoder only ever see this trait.

use reqwest::Client;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, instrument, warn};

use crate::error::{PipelineError, Result};

/// Query string as `(name, value)` pairs.
pub type Query<'q> = [(&'q str, String)];

pub trait Fetcher {
    /// GET `url` with `query` and return the body of a 2xx response.
    async fn get_text(&self, url: &str, query: &Query<'_>) -> Result<String>;

    /// GET and parse the body as JSON.
    async fn get_json(&self, url: &str, query: &Query<'_>) -> Result<Value> {
        let body = self.get_text(url, query).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// [`Fetcher`] backed by one shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn get_text(&self, url: &str, query: &Query<'_>) -> Result<String> {
        let t0 = Instant::now();
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "Non-success response");
            return Err(PipelineError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched"
        );
        Ok(body)
    }
}
