//! Point-in-polygon assignment of administrative regions (towns).
//!
//! Boundaries come from a GeoJSON feature collection whose features carry a
//! `name` property and a `Polygon` or `MultiPolygon` geometry in
//! longitude/latitude order. They are loaded once and never mutated.
//!
//! Containment is strict: a point lying exactly on a polygon's boundary is
//! not inside it, so a point on an edge shared by two towns matches neither.
//! If polygons overlap, the first matching feature in file order wins.

use geo::{Contains, Geometry, MultiPolygon, Point};
use geojson::FeatureCollection;
use serde_json::Value;
use std::path::Path;
use tracing::{info, instrument, warn};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct Region {
    pub name: String,
    pub shape: MultiPolygon<f64>,
}

/// Immutable set of region boundaries.
#[derive(Debug, Clone)]
pub struct RegionIndex {
    regions: Vec<Region>,
}

impl RegionIndex {
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Boundary(format!("cannot read {}: {e}", path.display()))
        })?;
        let index = Self::from_geojson(&text)?;
        info!(regions = index.len(), "Loaded region boundaries");
        Ok(index)
    }

    pub fn from_geojson(text: &str) -> Result<Self> {
        let collection: FeatureCollection = text
            .parse()
            .map_err(|e| PipelineError::Boundary(format!("not a feature collection: {e}")))?;

        let mut regions = Vec::with_capacity(collection.features.len());
        for feature in collection.features {
            let name = feature
                .property("name")
                .and_then(Value::as_str)
                .ok_or_else(|| PipelineError::Boundary("region without a name property".into()))?
                .to_string();
            let Some(geometry) = feature.geometry else {
                warn!(%name, "Region without geometry; skipping");
                continue;
            };
            let shape = match Geometry::<f64>::try_from(geometry) {
                Ok(Geometry::Polygon(polygon)) => MultiPolygon::new(vec![polygon]),
                Ok(Geometry::MultiPolygon(parts)) => parts,
                Ok(_) => {
                    return Err(PipelineError::Boundary(format!(
                        "region {name}: geometry is neither Polygon nor MultiPolygon"
                    )));
                }
                Err(e) => return Err(PipelineError::Boundary(format!("region {name}: {e}"))),
            };
            regions.push(Region { name, shape });
        }

        if regions.is_empty() {
            return Err(PipelineError::Boundary("no regions with geometry".into()));
        }
        Ok(Self { regions })
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Name of the first region strictly containing the point.
    pub fn locate(&self, lng: f64, lat: f64) -> Option<&str> {
        if !(lng.is_finite() && lat.is_finite()) {
            return None;
        }
        let point = Point::new(lng, lat);
        self.regions
            .iter()
            .find(|region| region.shape.contains(&point))
            .map(|region| region.name.as_str())
    }

    /// Attach a region to every row; rows outside all regions are dropped.
    ///
    /// `coords` yields `(longitude, latitude)`.
    pub fn join<T, F>(&self, rows: Vec<T>, coords: F) -> Vec<(T, String)>
    where
        F: Fn(&T) -> (f64, f64),
    {
        let total = rows.len();
        let joined: Vec<(T, String)> = rows
            .into_iter()
            .filter_map(|row| {
                let (lng, lat) = coords(&row);
                let name = self.locate(lng, lat)?.to_string();
                Some((row, name))
            })
            .collect();
        info!(
            total,
            kept = joined.len(),
            outside = total - joined.len(),
            "Assigned regions"
        );
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Two unit squares sharing the edge x = 1, plus a multipolygon town.
    const TOWNS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"name": "WEST"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
            {"type": "Feature", "properties": {"name": "EAST"},
             "geometry": {"type": "Polygon", "coordinates": [[[1,0],[2,0],[2,1],[1,1],[1,0]]]}},
            {"type": "Feature", "properties": {"name": "ISLANDS"},
             "geometry": {"type": "MultiPolygon", "coordinates": [
                [[[10,10],[11,10],[11,11],[10,11],[10,10]]],
                [[[20,20],[21,20],[21,21],[20,21],[20,20]]]
             ]}},
            {"type": "Feature", "properties": {"name": "NOWHERE"}, "geometry": null}
        ]
    }"#;

    fn index() -> RegionIndex {
        RegionIndex::from_geojson(TOWNS).unwrap()
    }

    #[test]
    fn test_loads_polygons_and_multipolygons() {
        assert_eq!(index().len(), 3);
    }

    #[test]
    fn test_point_inside_one_region() {
        let index = index();
        assert_eq!(index.locate(0.5, 0.5), Some("WEST"));
        assert_eq!(index.locate(1.5, 0.5), Some("EAST"));
        assert_eq!(index.locate(20.5, 20.5), Some("ISLANDS"));
    }

    #[test]
    fn test_point_outside_all_regions() {
        let index = index();
        assert_eq!(index.locate(5.0, 5.0), None);
        assert_eq!(index.locate(f64::NAN, 0.5), None);
    }

    #[test]
    fn test_shared_edge_matches_nothing() {
        assert_eq!(index().locate(1.0, 0.5), None);
    }

    #[test]
    fn test_overlap_resolves_to_first_region() {
        let overlapping = r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"name": "FIRST"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[2,0],[2,2],[0,2],[0,0]]]}},
            {"type": "Feature", "properties": {"name": "SECOND"},
             "geometry": {"type": "Polygon", "coordinates": [[[1,1],[3,1],[3,3],[1,3],[1,1]]]}}
        ]}"#;
        let index = RegionIndex::from_geojson(overlapping).unwrap();
        assert_eq!(index.locate(1.5, 1.5), Some("FIRST"));
        assert_eq!(index.locate(2.5, 2.5), Some("SECOND"));
    }

    #[test]
    fn test_join_drops_unmatched_rows() {
        let rows = vec![("a", 0.5, 0.5), ("b", 5.0, 5.0), ("c", 10.5, 10.5)];
        let joined = index().join(rows, |(_, lng, lat)| (*lng, *lat));
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].0 .0, "a");
        assert_eq!(joined[0].1, "WEST");
        assert_eq!(joined[1].0 .0, "c");
        assert_eq!(joined[1].1, "ISLANDS");
    }

    #[test]
    fn test_rejects_unusable_boundaries() {
        assert!(matches!(RegionIndex::from_geojson("[]"), Err(PipelineError::Boundary(_))));
        let point = r#"{"type": "FeatureCollection", "features": [{"type": "Feature",
            "properties": {"name": "P"}, "geometry": {"type": "Point", "coordinates": [1, 1]}}]}"#;
        assert!(matches!(RegionIndex::from_geojson(point), Err(PipelineError::Boundary(_))));
        let unnamed = r#"{"type": "FeatureCollection", "features": [{"type": "Feature", "properties": {},
            "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}}]}"#;
        assert!(matches!(RegionIndex::from_geojson(unnamed), Err(PipelineError::Boundary(_))));
        let empty = r#"{"type": "FeatureCollection", "features": []}"#;
        assert!(matches!(RegionIndex::from_geojson(empty), Err(PipelineError::Boundary(_))));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("towns.json");
        std::fs::write(&path, TOWNS).unwrap();
        assert_eq!(RegionIndex::load(&path).unwrap().len(), 3);
        assert!(RegionIndex::load(&dir.path().join("missing.json")).is_err());
    }
}
