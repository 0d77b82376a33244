//! Conversions into [`Point2D`].
//!
//! Points arrive from two shapes on the wire: `{ "x": .., "y": .. }` records
//! and `[x, y]` ordered pairs. Anything else is a [`ConversionError`].

use serde_json::Value;
use thiserror::Error;

use super::Point2D;

/// A value could not be interpreted as a point.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Cannot convert {found} into a point: expected {{x, y}} or [x, y]")]
pub struct ConversionError {
    found: String,
}

impl ConversionError {
    fn new(value: &Value) -> Self {
        Self {
            found: describe(value),
        }
    }

    /// Short description of the rejected value.
    pub fn found(&self) -> &str {
        &self.found
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "a boolean".to_string(),
        Value::Number(_) => "a number".to_string(),
        Value::String(_) => "a string".to_string(),
        Value::Array(items) => format!("an array of length {}", items.len()),
        Value::Object(_) => "an object without numeric x and y".to_string(),
    }
}

impl Point2D {
    /// Converts an `{x, y}` record or an `[x, y]` pair into a point.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError`] for any other shape, including pairs of the
    /// wrong length and records whose `x`/`y` are missing or not numbers.
    pub fn convert(value: &Value) -> Result<Self, ConversionError> {
        let components = match value {
            Value::Array(items) if items.len() == 2 => items[0].as_f64().zip(items[1].as_f64()),
            Value::Object(fields) => fields
                .get("x")
                .and_then(Value::as_f64)
                .zip(fields.get("y").and_then(Value::as_f64)),
            _ => None,
        };

        components
            .map(|(x, y)| Point2D::new(x, y))
            .ok_or_else(|| ConversionError::new(value))
    }
}

impl TryFrom<&Value> for Point2D {
    type Error = ConversionError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Point2D::convert(value)
    }
}

impl From<(f64, f64)> for Point2D {
    fn from((x, y): (f64, f64)) -> Self {
        Point2D::new(x, y)
    }
}

impl From<[f64; 2]> for Point2D {
    fn from([x, y]: [f64; 2]) -> Self {
        Point2D::new(x, y)
    }
}

impl From<Point2D> for [f64; 2] {
    fn from(p: Point2D) -> Self {
        [p.x(), p.y()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_convert_pair_and_record_agree() {
        let from_pair = Point2D::convert(&json!([3, -4.5])).unwrap();
        let from_record = Point2D::convert(&json!({ "x": 3, "y": -4.5 })).unwrap();
        assert_eq!(from_pair, from_record);
        assert_eq!(from_pair, Point2D::new(3.0, -4.5));
    }

    #[test]
    fn test_convert_ignores_extra_record_fields() {
        let p = Point2D::convert(&json!({ "x": 1, "y": 2, "z": 3 })).unwrap();
        assert_eq!(p, Point2D::new(1.0, 2.0));
    }

    #[test]
    fn test_convert_rejects_wrong_shapes() {
        for value in [
            json!(null),
            json!(5),
            json!("1,2"),
            json!([1]),
            json!([1, 2, 3]),
            json!(["1", 2]),
            json!({ "x": 1 }),
            json!({ "x": "1", "y": 2 }),
        ] {
            assert!(Point2D::convert(&value).is_err(), "{value} should not convert");
        }
    }

    #[test]
    fn test_conversion_error_describes_input() {
        let err = Point2D::convert(&json!([1, 2, 3])).unwrap_err();
        assert_eq!(err.found(), "an array of length 3");
        assert!(err.to_string().contains("an array of length 3"));
    }

    #[test]
    fn test_tuple_and_array_conversions() {
        assert_eq!(Point2D::from((1.0, 2.0)), Point2D::new(1.0, 2.0));
        assert_eq!(Point2D::from([1.0, 2.0]), Point2D::new(1.0, 2.0));
        let pair: [f64; 2] = Point2D::new(5.0, 6.0).into();
        assert_eq!(pair, [5.0, 6.0]);
    }

    #[test]
    fn test_try_from_value() {
        let value = json!([7, 8]);
        let p = Point2D::try_from(&value).unwrap();
        assert_eq!(p, Point2D::new(7.0, 8.0));
    }
}
