//! Messages exchanged between the main side and worker threads.
//!
//! ```text
//! main ──► WorkerMessage::Request { id, type, op, params } ──► worker
//! main ──► WorkerMessage::Cancel(id) ───────────────────────► worker
//! main ◄── Response { id, error?, data? } ◄───────────────── worker
//! ```
//!
//! Messages move by value through the channels, so a payload is never
//! reachable from both sides at once.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Global counter for generated correlation ids.
static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Opaque token pairing a request with its response.
///
/// Ids are compared by value. The channel refuses a second in-flight request
/// with the same id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Wraps a caller-chosen id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a process-unique id.
    pub fn next() -> Self {
        Self(format!("req-{}", NEXT_ID.fetch_add(1, Ordering::Relaxed)))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Operation requested of a worker source.
///
/// Sources may accept operations beyond the tile lifecycle ones; those travel
/// as [`Operation::Other`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operation {
    LoadTile,
    ReloadTile,
    AbortTile,
    RemoveTile,
    Other(String),
}

impl Operation {
    /// Wire name of the operation.
    pub fn as_str(&self) -> &str {
        match self {
            Operation::LoadTile => "loadTile",
            Operation::ReloadTile => "reloadTile",
            Operation::AbortTile => "abortTile",
            Operation::RemoveTile => "removeTile",
            Operation::Other(name) => name,
        }
    }
}

impl From<String> for Operation {
    fn from(name: String) -> Self {
        match name.as_str() {
            "loadTile" => Operation::LoadTile,
            "reloadTile" => Operation::ReloadTile,
            "abortTile" => Operation::AbortTile,
            "removeTile" => Operation::RemoveTile,
            _ => Operation::Other(name),
        }
    }
}

impl From<&str> for Operation {
    fn from(name: &str) -> Self {
        Operation::from(name.to_string())
    }
}

impl From<Operation> for String {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request for a worker source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: CorrelationId,

    /// Registered source type that should handle the request.
    #[serde(rename = "type")]
    pub source_type: String,

    pub op: Operation,

    /// Source-specific parameters.
    #[serde(default)]
    pub params: Value,
}

/// Serializable description of a failure on the worker side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct ErrorDescriptor {
    /// Stable machine-readable category (e.g. `unregistered_source_type`).
    pub kind: String,

    /// Human-readable detail.
    pub message: String,
}

impl ErrorDescriptor {
    /// Creates a descriptor.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// A worker's answer to one request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: CorrelationId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    /// Successful response carrying `data`.
    pub fn ok(id: CorrelationId, data: Value) -> Self {
        Self {
            id,
            error: None,
            data: Some(data),
        }
    }

    /// Failed response.
    pub fn err(id: CorrelationId, error: ErrorDescriptor) -> Self {
        Self {
            id,
            error: Some(error),
            data: None,
        }
    }

    /// Splits the response into its payload or error.
    ///
    /// A response without error and without data yields `Value::Null`.
    pub fn into_result(self) -> Result<Value, ErrorDescriptor> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data.unwrap_or(Value::Null)),
        }
    }
}

/// Messages delivered to a worker thread.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkerMessage {
    /// Run a request.
    Request(Request),

    /// Best-effort abandon of the request with this id.
    Cancel(CorrelationId),

    /// Stop accepting messages and shut the worker down.
    Terminate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = CorrelationId::next();
        let b = CorrelationId::next();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("req-"));
    }

    #[test]
    fn test_operation_wire_names() {
        assert_eq!(Operation::from("loadTile"), Operation::LoadTile);
        assert_eq!(Operation::from("removeTile"), Operation::RemoveTile);
        assert_eq!(
            Operation::from("getResource"),
            Operation::Other("getResource".to_string())
        );
        assert_eq!(String::from(Operation::AbortTile), "abortTile");
        assert_eq!(Operation::ReloadTile.to_string(), "reloadTile");
    }

    #[test]
    fn test_request_wire_shape() {
        let request = Request {
            id: CorrelationId::new("a"),
            source_type: "vector".to_string(),
            op: Operation::LoadTile,
            params: json!({ "uid": "1" }),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({ "id": "a", "type": "vector", "op": "loadTile", "params": { "uid": "1" } })
        );
        let back: Request = serde_json::from_value(value).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn test_response_wire_shape_omits_absent_fields() {
        let ok = Response::ok(CorrelationId::new("a"), json!(1));
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({ "id": "a", "data": 1 }));

        let err = Response::err(CorrelationId::new("b"), ErrorDescriptor::new("x", "boom"));
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({ "id": "b", "error": { "kind": "x", "message": "boom" } })
        );
    }

    #[test]
    fn test_response_into_result() {
        let ok = Response {
            id: CorrelationId::new("a"),
            error: None,
            data: None,
        };
        assert_eq!(ok.into_result(), Ok(Value::Null));

        let err = Response::err(CorrelationId::new("a"), ErrorDescriptor::new("k", "m"));
        assert_eq!(err.into_result().unwrap_err().to_string(), "k: m");
    }
}
