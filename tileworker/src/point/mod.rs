//! Two-dimensional point value type.
//!
//! [`Point2D`] is the coordinate type handed to every geometry consumer in
//! the crate. It is a plain `Copy` value: each operation returns a new point
//! and nothing mutates a point in place, so quantized geometry can be passed
//! around freely once it leaves the worker.
//!
//! # Example
//!
//! ```
//! use tileworker::point::Point2D;
//!
//! let p = Point2D::new(3.0, 4.0);
//! assert_eq!(p.mag(), 5.0);
//! assert_eq!(p.perp(), Point2D::new(-4.0, 3.0));
//! ```

mod convert;

pub use convert::ConversionError;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// An immutable 2-D vector.
///
/// Equality compares `x` and `y` exactly (IEEE semantics, so a point holding
/// `NaN` never equals anything).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    x: f64,
    y: f64,
}

impl Point2D {
    /// The origin.
    pub const ZERO: Point2D = Point2D::new(0.0, 0.0);

    /// Creates a point from its components.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns the x component.
    pub const fn x(&self) -> f64 {
        self.x
    }

    /// Returns the y component.
    pub const fn y(&self) -> f64 {
        self.y
    }

    /// Multiplies component-wise by another point.
    pub fn mult_by_point(self, other: Point2D) -> Self {
        Self::new(self.x * other.x, self.y * other.y)
    }

    /// Divides component-wise by another point.
    ///
    /// Zero components in `other` yield infinite or `NaN` components.
    pub fn div_by_point(self, other: Point2D) -> Self {
        Self::new(self.x / other.x, self.y / other.y)
    }

    /// Rotates around the origin by `angle` radians (counter-clockwise).
    pub fn rotate(self, angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(cos * self.x - sin * self.y, sin * self.x + cos * self.y)
    }

    /// Rotates around `pivot` by `angle` radians.
    pub fn rotate_around(self, angle: f64, pivot: Point2D) -> Self {
        (self - pivot).rotate(angle) + pivot
    }

    /// Multiplies by the 2×2 matrix `[a, b, c, d]` (row-major).
    pub fn mat_mult(self, m: [f64; 4]) -> Self {
        let [a, b, c, d] = m;
        Self::new(a * self.x + b * self.y, c * self.x + d * self.y)
    }

    /// Scales to unit length.
    ///
    /// The zero vector has no direction; the result is `(NaN, NaN)`.
    pub fn unit(self) -> Self {
        self / self.mag()
    }

    /// Rotates by 90 degrees counter-clockwise: `(-y, x)`.
    pub fn perp(self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Rounds both components to the nearest integer, half away from zero.
    pub fn round(self) -> Self {
        Self::new(self.x.round(), self.y.round())
    }

    /// Length of the vector from the origin.
    pub fn mag(self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Euclidean distance to another point.
    pub fn dist(self, other: Point2D) -> f64 {
        self.dist_sqr(other).sqrt()
    }

    /// Squared Euclidean distance to another point.
    pub fn dist_sqr(self, other: Point2D) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }

    /// Angle of the vector from the origin, in radians.
    pub fn angle(self) -> f64 {
        self.y.atan2(self.x)
    }

    /// Angle of the vector pointing from `other` to `self`.
    pub fn angle_to(self, other: Point2D) -> f64 {
        (self.y - other.y).atan2(self.x - other.x)
    }

    /// Signed angle from `self` to `other`, both taken as vectors from the origin.
    pub fn angle_with(self, other: Point2D) -> f64 {
        self.angle_with_sep(other.x, other.y)
    }

    /// Signed angle from `self` to the vector `(x, y)`.
    pub fn angle_with_sep(self, x: f64, y: f64) -> f64 {
        (self.x * y - self.y * x).atan2(self.x * x + self.y * y)
    }

    /// Returns true when both components are finite.
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Point2D {
    type Output = Point2D;

    fn add(self, other: Point2D) -> Point2D {
        Point2D::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Point2D {
    type Output = Point2D;

    fn sub(self, other: Point2D) -> Point2D {
        Point2D::new(self.x - other.x, self.y - other.y)
    }
}

impl Mul<f64> for Point2D {
    type Output = Point2D;

    fn mul(self, k: f64) -> Point2D {
        Point2D::new(self.x * k, self.y * k)
    }
}

/// Division by zero produces non-finite components rather than panicking.
impl Div<f64> for Point2D {
    type Output = Point2D;

    fn div(self, k: f64) -> Point2D {
        Point2D::new(self.x / k, self.y / k)
    }
}

impl Neg for Point2D {
    type Output = Point2D;

    fn neg(self) -> Point2D {
        Point2D::new(-self.x, -self.y)
    }
}

impl fmt::Display for Point2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
