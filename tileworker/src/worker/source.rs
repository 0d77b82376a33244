//! The pluggable worker source interface.
//!
//! A worker source handles every request addressed to one source type
//! (`"vector"`, `"geojson"`, ...). Each worker thread builds its own source
//! instances from the constructors in its
//! [`WorkerSourceRegistry`](super::WorkerSourceRegistry), so source state is
//! private to the thread that owns it.

use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

use super::bootstrap::BootstrapLocation;
use super::error::DispatchError;
use super::protocol::{CorrelationId, Operation};
use crate::geometry::GeometryQuantizer;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Per-thread state handed to source constructors.
#[derive(Clone, Debug)]
pub struct WorkerContext {
    /// Index of the worker thread within its pool.
    pub worker_id: usize,

    /// Location the worker was bootstrapped from.
    pub location: BootstrapLocation,

    /// Quantizer configured for the pool; its diagnostics are pool-wide.
    pub quantizer: GeometryQuantizer,
}

/// Per-request state handed to [`WorkerSource::handle`].
#[derive(Clone, Debug)]
pub struct RequestContext {
    /// Id of the request being serviced.
    pub id: CorrelationId,

    /// Triggered when the main side cancels the request.
    ///
    /// Long-running sources should check it between units of work; the
    /// dispatcher also drops the request future at its next await point.
    pub cancellation: CancellationToken,
}

impl RequestContext {
    /// Returns true once the request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Handles requests for one source type on one worker thread.
///
/// # Dyn Compatibility
///
/// `handle` returns a boxed future so sources can be stored as
/// `Arc<dyn WorkerSource>` in the dispatcher.
pub trait WorkerSource: Send + Sync + 'static {
    /// Source type name, for logging.
    fn name(&self) -> &str;

    /// Services one request.
    ///
    /// Errors are reported back to the caller as an error response; a panic
    /// is caught by the dispatcher and reported the same way.
    fn handle<'a>(
        &'a self,
        op: &'a Operation,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<Value, DispatchError>>;
}
