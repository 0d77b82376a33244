//! Native-extent to internal-extent coordinate quantization.

use std::sync::Arc;
use thiserror::Error;

use super::{ExtentDiagnostics, QuantizedGeometry, RawCoord, RawFeature};
use crate::point::Point2D;

/// Internal tile extent every geometry is rescaled to.
pub const EXTENT: u32 = 8192;

/// Bit width of the signed storage for a quantized coordinate.
///
/// 15 bits gives the range `[-16384, 16383]`, i.e. one full tile of buffer
/// on each side of the `[0, EXTENT)` tile area.
pub const BITS: u32 = 15;

/// Invalid quantizer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantizerConfigError {
    /// Bit width outside the supported range.
    #[error("Invalid bit width {0}: must be between 2 and 31")]
    InvalidBits(u32),

    /// Internal extent of zero.
    #[error("Invalid extent 0: must be positive")]
    ZeroExtent,
}

/// Extent and bit width used by a [`GeometryQuantizer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuantizerConfig {
    /// Internal extent coordinates are scaled to.
    pub extent: u32,

    /// Signed bit width of the output range.
    pub bits: u32,
}

impl Default for QuantizerConfig {
    fn default() -> Self {
        Self {
            extent: EXTENT,
            bits: BITS,
        }
    }
}

impl QuantizerConfig {
    /// Checks that the configuration describes a usable range.
    pub fn validate(&self) -> Result<(), QuantizerConfigError> {
        if !(2..=31).contains(&self.bits) {
            return Err(QuantizerConfigError::InvalidBits(self.bits));
        }
        if self.extent == 0 {
            return Err(QuantizerConfigError::ZeroExtent);
        }
        Ok(())
    }

    /// Smallest representable coordinate, `-2^(bits-1)`.
    pub fn min(&self) -> i64 {
        -(1_i64 << (self.bits - 1))
    }

    /// Largest representable coordinate, `2^(bits-1) - 1`.
    pub fn max(&self) -> i64 {
        (1_i64 << (self.bits - 1)) - 1
    }
}

/// Rescales raw feature rings into the internal extent.
///
/// Each coordinate is multiplied by `extent / native_extent`, rounded, and
/// clamped into the signed range. Out-of-range input never fails: it is
/// clamped, and the shared [`ExtentDiagnostics`] logs the first occurrence.
#[derive(Clone, Debug)]
pub struct GeometryQuantizer {
    config: QuantizerConfig,
    min: f64,
    max: f64,
    diagnostics: Arc<ExtentDiagnostics>,
}

impl GeometryQuantizer {
    /// Creates a quantizer with the default extent (8192) and 15-bit range.
    pub fn new(diagnostics: Arc<ExtentDiagnostics>) -> Self {
        Self::from_valid(QuantizerConfig::default(), diagnostics)
    }

    /// Creates a quantizer with a custom extent and bit width.
    pub fn with_config(
        config: QuantizerConfig,
        diagnostics: Arc<ExtentDiagnostics>,
    ) -> Result<Self, QuantizerConfigError> {
        config.validate()?;
        Ok(Self::from_valid(config, diagnostics))
    }

    fn from_valid(config: QuantizerConfig, diagnostics: Arc<ExtentDiagnostics>) -> Self {
        Self {
            min: config.min() as f64,
            max: config.max() as f64,
            config,
            diagnostics,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> QuantizerConfig {
        self.config
    }

    /// The diagnostics sink shared by this quantizer.
    pub fn diagnostics(&self) -> &Arc<ExtentDiagnostics> {
        &self.diagnostics
    }

    /// Quantizes one decoded feature.
    pub fn quantize_feature(&self, feature: &RawFeature) -> QuantizedGeometry {
        self.quantize(feature.extent, feature.rings.iter().map(|ring| ring.iter().copied()))
    }

    /// Quantizes rings expressed in `native_extent` coordinates.
    pub fn quantize<R, I>(&self, native_extent: u32, rings: R) -> QuantizedGeometry
    where
        R: IntoIterator<Item = I>,
        I: IntoIterator<Item = RawCoord>,
    {
        let scale = f64::from(self.config.extent) / f64::from(native_extent);
        let rings = rings
            .into_iter()
            .map(|ring| {
                ring.into_iter()
                    .map(|raw| self.quantize_coord(raw, scale))
                    .collect()
            })
            .collect();
        QuantizedGeometry::from_rings(rings)
    }

    fn quantize_coord(&self, [raw_x, raw_y]: RawCoord, scale: f64) -> Point2D {
        let (x, x_exceeded) = self.quantize_axis(raw_x * scale);
        let (y, y_exceeded) = self.quantize_axis(raw_y * scale);
        if x_exceeded || y_exceeded {
            self.diagnostics.report_exceeded();
        }
        Point2D::new(x, y)
    }

    /// Rounds and clamps one scaled component.
    ///
    /// The flag is raised when clamping moved the rounded value by more than
    /// one unit. A value exactly one past either end of the range is a
    /// rounding artefact at the tile-buffer edge and is not worth a warning.
    fn quantize_axis(&self, scaled: f64) -> (f64, bool) {
        let rounded = scaled.round();
        if rounded.is_nan() {
            return (0.0, true);
        }
        let clamped = rounded.clamp(self.min, self.max);
        let exceeded = (rounded - clamped).abs() > 1.0;
        (clamped, exceeded)
    }
}
