//! Tile geometry quantization.
//!
//! Raw feature geometry arrives in the coordinate space of its source tile
//! (the feature's *native extent*, commonly 4096). Everything downstream
//! works in a single fixed internal extent, stored in a signed 15-bit range.
//! This module performs that conversion.
//!
//! # Architecture
//!
//! ```text
//! RawFeature ──► GeometryQuantizer ──► QuantizedGeometry ──► FeatureIndex
//!  (native)          │                  (internal extent)
//!                    └──► ExtentDiagnostics (warn once)
//! ```

mod diagnostics;
mod feature_index;
mod quantizer;

pub use diagnostics::ExtentDiagnostics;
pub use feature_index::{BoundingBox, FeatureIndex, FeatureIndexError, IndexedFeature};
pub use quantizer::{GeometryQuantizer, QuantizerConfig, QuantizerConfigError, BITS, EXTENT};

use serde::{Deserialize, Serialize};

use crate::point::Point2D;

/// A raw coordinate pair in a feature's native extent.
pub type RawCoord = [f64; 2];

/// One feature as handed over by the tile decoder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawFeature {
    /// Feature id, when the tile carries one.
    #[serde(default)]
    pub id: Option<u64>,

    /// Width of the coordinate space the rings are expressed in.
    pub extent: u32,

    /// Coordinate rings (a point feature is a single one-point ring).
    pub rings: Vec<Vec<RawCoord>>,
}

impl RawFeature {
    /// Creates a feature without an id.
    pub fn new(extent: u32, rings: Vec<Vec<RawCoord>>) -> Self {
        Self {
            id: None,
            extent,
            rings,
        }
    }

    /// Attaches a feature id.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }
}

/// Rings of points in the internal extent.
///
/// Every coordinate is an integer inside the quantizer's signed range.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuantizedGeometry {
    rings: Vec<Vec<Point2D>>,
}

impl QuantizedGeometry {
    /// Wraps already-quantized rings.
    pub fn from_rings(rings: Vec<Vec<Point2D>>) -> Self {
        Self { rings }
    }

    /// The rings, in input order.
    pub fn rings(&self) -> &[Vec<Point2D>] {
        &self.rings
    }

    /// Consumes the geometry and returns its rings.
    pub fn into_rings(self) -> Vec<Vec<Point2D>> {
        self.rings
    }

    /// Number of rings.
    pub fn len(&self) -> usize {
        self.rings.len()
    }

    /// Returns true if there are no rings.
    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }

    /// Total number of points across all rings.
    pub fn point_count(&self) -> usize {
        self.rings.iter().map(Vec::len).sum()
    }

    /// Iterates over every point of every ring.
    pub fn points(&self) -> impl Iterator<Item = Point2D> + '_ {
        self.rings.iter().flatten().copied()
    }
}
