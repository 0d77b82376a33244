//! Index from feature ids to quantized geometry.
//!
//! Built by a worker source after quantizing a tile, and shipped back to the
//! main side as part of the parsed tile.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use super::QuantizedGeometry;
use crate::point::Point2D;

/// Errors building a [`FeatureIndex`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureIndexError {
    /// The id and geometry lists have different lengths.
    #[error("Feature count mismatch: {ids} ids but {geometries} geometries")]
    CountMismatch { ids: usize, geometries: usize },
}

/// Axis-aligned bounds of a geometry, in internal-extent units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point2D,
    pub max: Point2D,
}

impl BoundingBox {
    /// Bounds of every point in `geometry`, or `None` when it has no points.
    pub fn of(geometry: &QuantizedGeometry) -> Option<Self> {
        let mut points = geometry.points();
        let first = points.next()?;
        Some(points.fold(Self { min: first, max: first }, |bbox, p| Self {
            min: Point2D::new(bbox.min.x().min(p.x()), bbox.min.y().min(p.y())),
            max: Point2D::new(bbox.max.x().max(p.x()), bbox.max.y().max(p.y())),
        }))
    }

    /// Returns true if the two boxes overlap (touching edges count).
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min.x() <= other.max.x()
            && other.min.x() <= self.max.x()
            && self.min.y() <= other.max.y()
            && other.min.y() <= self.max.y()
    }
}

/// A feature id with its geometry and precomputed bounds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexedFeature {
    pub id: u64,
    pub geometry: QuantizedGeometry,
    pub bbox: Option<BoundingBox>,
}

/// Features of one tile, addressable by id and queryable by area.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<IndexedFeature>", into = "Vec<IndexedFeature>")]
pub struct FeatureIndex {
    features: Vec<IndexedFeature>,
    by_id: HashMap<u64, usize>,
}

impl FeatureIndex {
    /// Builds an index from parallel id and geometry lists.
    ///
    /// # Errors
    ///
    /// [`FeatureIndexError::CountMismatch`] if the lists differ in length.
    pub fn from_parts(
        ids: Vec<u64>,
        geometries: Vec<QuantizedGeometry>,
    ) -> Result<Self, FeatureIndexError> {
        if ids.len() != geometries.len() {
            return Err(FeatureIndexError::CountMismatch {
                ids: ids.len(),
                geometries: geometries.len(),
            });
        }

        let features: Vec<IndexedFeature> = ids
            .into_iter()
            .zip(geometries)
            .map(|(id, geometry)| IndexedFeature {
                id,
                bbox: BoundingBox::of(&geometry),
                geometry,
            })
            .collect();
        Ok(Self::from(features))
    }

    /// Geometry of the feature with `id`.
    ///
    /// With duplicate ids the last feature wins.
    pub fn get(&self, id: u64) -> Option<&QuantizedGeometry> {
        self.by_id
            .get(&id)
            .and_then(|&i| self.features.get(i))
            .map(|f| &f.geometry)
    }

    /// Ids of the features whose bounds intersect `area`, in tile order.
    pub fn query(&self, area: &BoundingBox) -> Vec<u64> {
        self.features
            .iter()
            .filter(|f| f.bbox.is_some_and(|bbox| bbox.intersects(area)))
            .map(|f| f.id)
            .collect()
    }

    /// All features in tile order.
    pub fn features(&self) -> &[IndexedFeature] {
        &self.features
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns true if the index holds no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl From<Vec<IndexedFeature>> for FeatureIndex {
    fn from(features: Vec<IndexedFeature>) -> Self {
        let by_id = features
            .iter()
            .enumerate()
            .map(|(i, f)| (f.id, i))
            .collect();
        Self { features, by_id }
    }
}

impl From<FeatureIndex> for Vec<IndexedFeature> {
    fn from(index: FeatureIndex) -> Self {
        index.features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(origin: f64, size: f64) -> QuantizedGeometry {
        QuantizedGeometry::from_rings(vec![vec![
            Point2D::new(origin, origin),
            Point2D::new(origin + size, origin),
            Point2D::new(origin + size, origin + size),
            Point2D::new(origin, origin + size),
            Point2D::new(origin, origin),
        ]])
    }

    #[test]
    fn test_count_mismatch() {
        let err = FeatureIndex::from_parts(vec![1, 2], vec![square(0.0, 1.0)]).unwrap_err();
        assert_eq!(err, FeatureIndexError::CountMismatch { ids: 2, geometries: 1 });
        assert_eq!(err.to_string(), "Feature count mismatch: 2 ids but 1 geometries");
    }

    #[test]
    fn test_lookup_by_id() {
        let index =
            FeatureIndex::from_parts(vec![7, 9], vec![square(0.0, 10.0), square(100.0, 10.0)])
                .unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(9), Some(&square(100.0, 10.0)));
        assert_eq!(index.get(8), None);
    }

    #[test]
    fn test_bounding_box() {
        let bbox = BoundingBox::of(&square(5.0, 20.0)).unwrap();
        assert_eq!(bbox.min, Point2D::new(5.0, 5.0));
        assert_eq!(bbox.max, Point2D::new(25.0, 25.0));
        assert_eq!(BoundingBox::of(&QuantizedGeometry::default()), None);
    }

    #[test]
    fn test_query_by_area() {
        let index = FeatureIndex::from_parts(
            vec![1, 2, 3],
            vec![square(0.0, 10.0), square(100.0, 10.0), QuantizedGeometry::default()],
        )
        .unwrap();
        let area = BoundingBox {
            min: Point2D::new(5.0, 5.0),
            max: Point2D::new(50.0, 50.0),
        };
        assert_eq!(index.query(&area), vec![1]);
    }

    #[test]
    fn test_serde_round_trip_rebuilds_lookup() {
        let index = FeatureIndex::from_parts(vec![4], vec![square(0.0, 1.0)]).unwrap();
        let json = serde_json::to_value(&index).unwrap();
        assert!(json.is_array());
        let back: FeatureIndex = serde_json::from_value(json).unwrap();
        assert_eq!(back.get(4), Some(&square(0.0, 1.0)));
    }
}
