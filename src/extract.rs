//! Turning one fetched page into records.
//!
//! Open-data responses are JSON envelopes and get a direct projection.
//! Listings pages are HTML carrying one JSON-LD block with the search
//! results; that block is located by the `"mainEntity"` marker and parsed
//! into a typed schema, so a malformed block fails loudly instead of being
//! patched up.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::{PipelineError, Result};
use crate::models::{scalar_text, GeoResult, RawListing, RawResale};
use crate::paginate::Page;

/// Marker identifying the structured-data block that holds the listings.
pub const LISTING_MARKER: &str = "\"mainEntity\"";

const PROPERTY_TYPE: &str = "Property Type";
const PRICE_PER_SQFT: &str = "Price per Square Foot";

static LD_JSON: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("static selector")
});

// Relative `_links` are resolved against this.
static API_ORIGIN: Lazy<Url> = Lazy::new(|| Url::parse("https://data.gov.sg/").expect("static url"));

/* ---------------- open-data API ---------------- */

/// Child dataset ids from a collection-metadata response.
pub fn dataset_ids(body: &Value) -> Result<Vec<String>> {
    let ids = body
        .pointer("/data/collectionMetadata/childDatasets")
        .and_then(Value::as_array)
        .ok_or_else(|| PipelineError::decode("missing data.collectionMetadata.childDatasets"))?;
    ids.iter()
        .map(|id| match id {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(PipelineError::decode(format!("dataset id {other} is not a scalar"))),
        })
        .collect()
}

/// Decode one `datastore_search` page.
///
/// The next cursor is read from `_links.next` rather than computed locally.
/// It is only required when the page has records, since an empty page ends
/// the run anyway.
pub fn dataset_page(mut body: Value) -> Result<Page<RawResale>> {
    let total = body
        .pointer("/result/total")
        .and_then(Value::as_u64)
        .ok_or_else(|| PipelineError::decode("missing result.total"))?;
    let records = body
        .pointer_mut("/result/records")
        .map(Value::take)
        .ok_or_else(|| PipelineError::decode("missing result.records"))?;
    let records: Vec<RawResale> = serde_json::from_value(records)?;

    let next = if records.is_empty() {
        None
    } else {
        let link = body
            .pointer("/result/_links/next")
            .and_then(Value::as_str)
            .ok_or_else(|| PipelineError::decode("missing result._links.next"))?;
        Some(next_offset(link)?)
    };

    Ok(Page {
        records,
        next,
        total: Some(total),
    })
}

/// Pull the `offset` query parameter out of a continuation link.
pub fn next_offset(link: &str) -> Result<u64> {
    let url = API_ORIGIN
        .join(link)
        .map_err(|e| PipelineError::decode(format!("bad continuation link {link:?}: {e}")))?;
    let (_, offset) = url
        .query_pairs()
        .find(|(k, _)| k == "offset")
        .ok_or_else(|| PipelineError::decode(format!("no offset in continuation link {link:?}")))?;
    offset
        .parse()
        .map_err(|e| PipelineError::decode(format!("offset {offset:?} in {link:?}: {e}")))
}

/* ---------------- listings site ---------------- */

#[derive(Debug, Deserialize)]
struct ListingBlock {
    #[serde(rename = "mainEntity")]
    main_entity: ItemList,
}

#[derive(Debug, Deserialize)]
struct ItemList {
    #[serde(rename = "itemListElement", default)]
    item_list_element: Vec<ListingElement>,
}

/// One entry of the embedded item list.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ListingElement {
    pub name: String,
    pub url: String,
    #[serde(default, deserialize_with = "scalar_text")]
    pub price: Option<String>,
    #[serde(rename = "itemOffered")]
    pub item_offered: ItemOffered,
    #[serde(rename = "additionalProperty", default)]
    pub additional_property: Vec<PropertyValue>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ItemOffered {
    #[serde(rename = "numberOfBathroomsTotal", deserialize_with = "scalar_text")]
    pub bathrooms: Option<String>,
    #[serde(rename = "numberOfRooms", deserialize_with = "scalar_text")]
    pub rooms: Option<String>,
    #[serde(rename = "floorSize")]
    pub floor_size: FloorSize,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FloorSize {
    #[serde(deserialize_with = "scalar_text")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PropertyValue {
    pub name: String,
    #[serde(default, deserialize_with = "scalar_text")]
    pub value: Option<String>,
}

/// Text of the first JSON-LD script containing [`LISTING_MARKER`].
pub fn locate_listing_block(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&LD_JSON)
        .map(|script| script.text().collect::<String>())
        .find(|text| text.contains(LISTING_MARKER))
}

/// All listing elements on a results page.
///
/// A page without the block is an empty page; a block that does not match
/// the schema is an error.
pub fn listing_elements(html: &str) -> Result<Vec<ListingElement>> {
    let Some(block) = locate_listing_block(html) else {
        return Ok(Vec::new());
    };
    let block: ListingBlock = serde_json::from_str(&block)?;
    Ok(block.main_entity.item_list_element)
}

impl ListingElement {
    fn property(&self, name: &str) -> Option<&str> {
        self.additional_property
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.value.as_deref())
    }

    /// Flatten into a [`RawListing`], attaching its geocode.
    pub fn into_listing(self, geo: GeoResult) -> Result<RawListing> {
        let hdb_type = self.property(PROPERTY_TYPE).unwrap_or("0").to_string();
        let psf = match self.property(PRICE_PER_SQFT) {
            Some(text) => parse_psf(text)?,
            None => 0,
        };
        Ok(RawListing {
            name: self.name,
            hdb_type,
            bathrooms: self.item_offered.bathrooms,
            rooms: self.item_offered.rooms,
            floor_size: self.item_offered.floor_size.value.unwrap_or_default(),
            psf,
            price: self.price,
            url: self.url,
            geo,
        })
    }
}

/// `"S$ 1,234 psf"` -> `1234`.
pub fn parse_psf(text: &str) -> Result<i64> {
    let digits = text
        .replace("S$", "")
        .replace(',', "")
        .replace(' ', "")
        .replace("psf", "");
    digits
        .parse()
        .map_err(|e| PipelineError::parse("Price per Square Foot", text, e))
}
