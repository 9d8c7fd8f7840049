//! The two end-to-end runs.
//!
//! | Command | Module | Source | Output |
//! |---------|--------|--------|--------|
//! | `records` | [`records`] | data.gov.sg resale collection (JSON, offset paged) | `resale.csv` |
//! | `listings` | [`listings`] | listings site (HTML + JSON-LD, page numbered) | `edgeprop.csv` |
//!
//! Both share the same stages: paginate, extract, clean, geocode, assign
//! towns, write. Stages run one after another and every request is awaited
//! before the next is sent.

pub mod listings;
pub mod records;
