//! Error types for worker dispatch and the main-side channel.

use thiserror::Error;

use super::protocol::{CorrelationId, ErrorDescriptor};
use super::vector::DecodeError;
use crate::geometry::{FeatureIndexError, QuantizerConfigError};

/// Failures while a worker services a request.
///
/// Every variant is turned into an [`ErrorDescriptor`] and sent back as the
/// request's response; none of them escape the worker thread.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No constructor registered under the requested source type.
    #[error("No worker source registered for type '{0}'")]
    UnregisteredSourceType(String),

    /// The source does not implement the requested operation.
    #[error("Source '{source_type}' does not support operation '{op}'")]
    UnsupportedOperation { source_type: String, op: String },

    /// Request parameters are malformed.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// The tile decoder rejected the tile.
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Feature ids and geometries did not line up.
    #[error(transparent)]
    FeatureIndex(#[from] FeatureIndexError),

    /// Result could not be encoded for the response.
    #[error("Failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),

    /// The request was cancelled before it finished.
    #[error("Request cancelled")]
    Cancelled,

    /// The source panicked.
    #[error("Worker source panicked: {0}")]
    Panicked(String),

    /// Source-specific failure.
    #[error("{0}")]
    Source(String),
}

impl DispatchError {
    /// Stable category name used in [`ErrorDescriptor::kind`].
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::UnregisteredSourceType(_) => "unregistered_source_type",
            DispatchError::UnsupportedOperation { .. } => "unsupported_operation",
            DispatchError::InvalidParams(_) => "invalid_params",
            DispatchError::Decode(_) => "decode",
            DispatchError::FeatureIndex(_) => "count_mismatch",
            DispatchError::Encode(_) => "encode",
            DispatchError::Cancelled => "cancelled",
            DispatchError::Panicked(_) => "panic",
            DispatchError::Source(_) => "source",
        }
    }
}

impl From<&DispatchError> for ErrorDescriptor {
    fn from(err: &DispatchError) -> Self {
        ErrorDescriptor::new(err.kind(), err.to_string())
    }
}

/// Errors from the strict registration path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A constructor is already bound to the name.
    #[error("Worker source type '{0}' is already registered")]
    DuplicateSourceType(String),
}

/// Errors seen by main-side callers of a [`WorkerChannel`](super::WorkerChannel).
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel was terminated; no requests are accepted or answered.
    #[error("Worker channel has been terminated")]
    Terminated,

    /// The quantizer configuration is unusable.
    #[error("Invalid channel configuration: {0}")]
    Config(#[from] QuantizerConfigError),

    /// A worker thread could not be started.
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// Another in-flight request already uses this id.
    #[error("Request id {0} is already in flight")]
    DuplicateId(CorrelationId),

    /// The request was cancelled by the caller.
    #[error("Request {0} was cancelled")]
    Cancelled(CorrelationId),

    /// The worker answered with an error.
    #[error("Worker reported an error: {0}")]
    Remote(#[source] ErrorDescriptor),

    /// The worker went away before answering.
    #[error("Worker disconnected before responding")]
    Disconnected,
}

impl ChannelError {
    /// The worker-side error descriptor, for [`ChannelError::Remote`].
    pub fn remote(&self) -> Option<&ErrorDescriptor> {
        match self {
            ChannelError::Remote(descriptor) => Some(descriptor),
            _ => None,
        }
    }
}
