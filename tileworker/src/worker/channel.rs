//! Main-side handle to the worker pool.

use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tracing::{debug, info};

use super::bootstrap::{BootstrapChain, BootstrapLocation, BootstrapSettings, ResolvedBootstrap};
use super::error::ChannelError;
use super::pending::{Outcome, PendingRequests, RequestState};
use super::pool::WorkerPool;
use super::protocol::{CorrelationId, Operation, Request, WorkerMessage};
use super::registry::{RegistryBootstrap, WorkerSourceRegistry};
use crate::geometry::{ExtentDiagnostics, GeometryQuantizer, QuantizerConfig};

/// Upper bound for the automatically chosen pool size.
pub const MAX_DEFAULT_POOL_SIZE: usize = 6;

/// Pool size used when none is configured: half the available cores,
/// between 1 and [`MAX_DEFAULT_POOL_SIZE`].
pub fn default_pool_size() -> usize {
    thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .clamp(1, MAX_DEFAULT_POOL_SIZE)
}

/// Settings for a [`WorkerChannel`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Number of worker threads started on first use.
    pub pool_size: usize,

    /// Inputs to bootstrap-location resolution.
    pub bootstrap: BootstrapSettings,

    /// Quantizer used by every worker.
    pub quantizer: QuantizerConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            bootstrap: BootstrapSettings::default(),
            quantizer: QuantizerConfig::default(),
        }
    }
}

impl ChannelConfig {
    /// Resolves where workers are bootstrapped from.
    ///
    /// The default chain ends with the verbatim entry, so this always
    /// produces a location.
    pub fn resolve_bootstrap(&self) -> ResolvedBootstrap {
        BootstrapChain::from_settings(&self.bootstrap)
            .resolve()
            .unwrap_or_else(|| ResolvedBootstrap {
                location: BootstrapLocation::Verbatim(self.bootstrap.entry.clone()),
                resolver: "verbatim",
            })
    }
}

/// Sends requests to worker threads and routes their responses back.
///
/// The pool is created on the first request and reused until
/// [`terminate`](Self::terminate) or until the last clone is dropped.
/// Cloning is cheap; clones share the pool.
///
/// # Example
///
/// ```ignore
/// let channel = WorkerChannel::new(ChannelConfig::default())?;
/// let tile = channel
///     .request("vector", Operation::LoadTile, json!({ "uid": "0/0/0", "features": [] }))
///     .await?;
/// ```
#[derive(Clone)]
pub struct WorkerChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    config: ChannelConfig,
    quantizer: GeometryQuantizer,
    sources: Option<RegistryBootstrap>,
    pool: Mutex<Option<WorkerPool>>,
    pending: Arc<PendingRequests>,
    terminated: AtomicBool,
}

impl WorkerChannel {
    /// Creates a channel whose workers know the built-in sources only.
    pub fn new(config: ChannelConfig) -> Result<Self, ChannelError> {
        Self::build(config, None)
    }

    /// Creates a channel whose workers also run `sources` at startup.
    ///
    /// The hook runs on every worker thread, after the built-in sources are
    /// registered and before the first request is processed.
    pub fn with_sources<F>(config: ChannelConfig, sources: F) -> Result<Self, ChannelError>
    where
        F: Fn(&mut WorkerSourceRegistry) + Send + Sync + 'static,
    {
        Self::build(config, Some(Arc::new(sources)))
    }

    fn build(config: ChannelConfig, sources: Option<RegistryBootstrap>) -> Result<Self, ChannelError> {
        let quantizer =
            GeometryQuantizer::with_config(config.quantizer, Arc::new(ExtentDiagnostics::new()))?;
        Ok(Self {
            inner: Arc::new(ChannelInner {
                config,
                quantizer,
                sources,
                pool: Mutex::new(None),
                pending: Arc::new(PendingRequests::new()),
                terminated: AtomicBool::new(false),
            }),
        })
    }

    /// Sends a request under a generated id.
    pub fn send(
        &self,
        source_type: &str,
        op: impl Into<Operation>,
        params: Value,
    ) -> Result<PendingRequest, ChannelError> {
        self.send_with_id(CorrelationId::next(), source_type, op, params)
    }

    /// Sends a request under a caller-chosen id.
    ///
    /// Starts the worker pool if this is the first request.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Terminated`] after [`terminate`](Self::terminate)
    /// - [`ChannelError::DuplicateId`] if `id` is still pending, or was
    ///   cancelled and the worker has not yet answered the cancelled request
    /// - [`ChannelError::Spawn`] if the pool could not be started
    /// - [`ChannelError::Disconnected`] if the chosen worker is gone
    pub fn send_with_id(
        &self,
        id: CorrelationId,
        source_type: &str,
        op: impl Into<Operation>,
        params: Value,
    ) -> Result<PendingRequest, ChannelError> {
        let inner = &self.inner;
        let mut guard = inner.pool.lock();
        // Checked under the lock so a concurrent terminate cannot be
        // followed by a fresh pool.
        if inner.is_terminated() {
            return Err(ChannelError::Terminated);
        }
        if guard.is_none() {
            *guard = Some(inner.start_pool()?);
        }
        let Some(pool) = guard.as_ref() else {
            return Err(ChannelError::Terminated);
        };

        let worker = pool.next_worker();
        let rx = inner.pending.insert(&id, worker)?;
        let request = Request {
            id: id.clone(),
            source_type: source_type.to_string(),
            op: op.into(),
            params,
        };
        debug!(request = %id, worker, source_type = %request.source_type, op = %request.op, "Sending request");

        if let Err(e) = pool.send(worker, WorkerMessage::Request(request)) {
            inner.pending.cancel(&id);
            return Err(e);
        }

        Ok(PendingRequest {
            id,
            rx,
            outcome: None,
            channel: Arc::downgrade(inner),
        })
    }

    /// Sends a request and waits for its response.
    pub async fn request(
        &self,
        source_type: &str,
        op: impl Into<Operation>,
        params: Value,
    ) -> Result<Value, ChannelError> {
        self.send(source_type, op, params)?.wait().await
    }

    /// Cancels a pending request.
    ///
    /// The caller is resolved with [`ChannelError::Cancelled`] and the worker
    /// is asked to abandon the work. The id can be reused once the worker
    /// has answered the abandoned request. Returns false, doing nothing, if
    /// the id is not pending (unknown, already answered, or already
    /// cancelled).
    pub fn cancel(&self, id: &CorrelationId) -> bool {
        self.inner.cancel(id)
    }

    /// Stops every worker and fails all pending requests with
    /// [`ChannelError::Terminated`].
    ///
    /// Does not wait for worker threads to exit. Later requests are refused
    /// and late responses are dropped. Calling it again has no effect.
    pub fn terminate(&self) {
        self.inner.terminate();
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Number of running worker threads; zero before the first request.
    pub fn worker_count(&self) -> usize {
        self.inner.pool.lock().as_ref().map_or(0, WorkerPool::len)
    }

    /// Where workers are (or will be) bootstrapped from.
    pub fn bootstrap(&self) -> ResolvedBootstrap {
        match self.inner.pool.lock().as_ref() {
            Some(pool) => pool.bootstrap().clone(),
            None => self.inner.config.resolve_bootstrap(),
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// Diagnostics shared by every worker's quantizer.
    pub fn diagnostics(&self) -> &Arc<ExtentDiagnostics> {
        self.inner.quantizer.diagnostics()
    }
}

impl fmt::Debug for WorkerChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerChannel")
            .field("config", &self.inner.config)
            .field("workers", &self.worker_count())
            .field("pending", &self.pending_count())
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

impl ChannelInner {
    fn start_pool(&self) -> Result<WorkerPool, ChannelError> {
        WorkerPool::spawn(
            self.config.pool_size,
            self.config.resolve_bootstrap(),
            &self.quantizer,
            self.sources.clone(),
            Arc::clone(&self.pending),
        )
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    fn cancel(&self, id: &CorrelationId) -> bool {
        let Some(worker) = self.pending.cancel(id) else {
            debug!(request = %id, "Cancel for request that is not pending");
            return false;
        };
        debug!(request = %id, worker, "Request cancelled");
        if let Some(pool) = self.pool.lock().as_ref() {
            // Best effort; the caller is already resolved.
            let _ = pool.send(worker, WorkerMessage::Cancel(id.clone()));
        }
        true
    }

    fn terminate(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        let failed = self.pending.fail_all();
        if let Some(pool) = self.pool.lock().take() {
            pool.shutdown();
        }
        info!(failed_requests = failed, "Worker channel terminated");
    }
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// A request awaiting its response.
///
/// Dropping the handle does not cancel the request.
pub struct PendingRequest {
    id: CorrelationId,
    rx: oneshot::Receiver<Outcome>,
    outcome: Option<Outcome>,
    channel: Weak<ChannelInner>,
}

impl PendingRequest {
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    /// Current state, without waiting.
    pub fn state(&mut self) -> RequestState {
        if self.outcome.is_none() {
            match self.rx.try_recv() {
                Ok(outcome) => self.outcome = Some(outcome),
                Err(TryRecvError::Empty) => return RequestState::Sent,
                Err(TryRecvError::Closed) => return RequestState::Failed,
            }
        }
        self.outcome
            .as_ref()
            .map_or(RequestState::Sent, Outcome::state)
    }

    /// Cancels this request. See [`WorkerChannel::cancel`].
    pub fn cancel(&self) -> bool {
        self.channel
            .upgrade()
            .is_some_and(|channel| channel.cancel(&self.id))
    }

    /// Waits for the response.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Remote`] if the worker reported an error
    /// - [`ChannelError::Cancelled`] if the request was cancelled
    /// - [`ChannelError::Terminated`] if the channel was terminated
    /// - [`ChannelError::Disconnected`] if the response can never arrive
    pub async fn wait(self) -> Result<Value, ChannelError> {
        let outcome = match self.outcome {
            Some(outcome) => outcome,
            None => self.rx.await.map_err(|_| ChannelError::Disconnected)?,
        };
        outcome.into_result(&self.id)
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("outcome", &self.outcome)
            .finish()
    }
}
