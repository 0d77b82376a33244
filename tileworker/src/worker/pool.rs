//! Worker threads and the response router.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::bootstrap::ResolvedBootstrap;
use super::dispatcher::{panic_message, Dispatcher};
use super::error::ChannelError;
use super::pending::PendingRequests;
use super::protocol::{ErrorDescriptor, Response, WorkerMessage};
use super::registry::{RegistryBootstrap, WorkerSourceRegistry};
use super::source::WorkerContext;
use crate::geometry::GeometryQuantizer;

struct WorkerHandle {
    inbox: mpsc::UnboundedSender<WorkerMessage>,
    thread: Option<JoinHandle<()>>,
}

/// A fixed set of worker threads plus the thread routing their responses.
pub(crate) struct WorkerPool {
    workers: Vec<WorkerHandle>,
    router: Option<JoinHandle<()>>,
    next: AtomicUsize,
    bootstrap: ResolvedBootstrap,
}

impl WorkerPool {
    /// Starts `size` worker threads bootstrapped from `bootstrap`.
    pub fn spawn(
        size: usize,
        bootstrap: ResolvedBootstrap,
        quantizer: &GeometryQuantizer,
        sources: Option<RegistryBootstrap>,
        pending: Arc<PendingRequests>,
    ) -> Result<Self, ChannelError> {
        let size = size.max(1);
        let (response_tx, response_rx) = mpsc::unbounded_channel();

        let router = thread::Builder::new()
            .name("tile-worker-router".to_string())
            .spawn(move || route_responses(response_rx, pending))
            .map_err(ChannelError::Spawn)?;

        let mut workers = Vec::with_capacity(size);
        for worker_id in 0..size {
            let (inbox, inbox_rx) = mpsc::unbounded_channel();
            let context = WorkerContext {
                worker_id,
                location: bootstrap.location.clone(),
                quantizer: quantizer.clone(),
            };
            let sources = sources.clone();
            let responses = response_tx.clone();

            let thread = thread::Builder::new()
                .name(format!("tile-worker-{}", worker_id))
                .spawn(move || run_worker(context, sources, inbox_rx, responses))
                .map_err(ChannelError::Spawn)?;

            workers.push(WorkerHandle {
                inbox,
                thread: Some(thread),
            });
        }

        info!(
            workers = size,
            location = %bootstrap.location,
            resolver = bootstrap.resolver,
            "Worker pool started"
        );

        Ok(Self {
            workers,
            router: Some(router),
            next: AtomicUsize::new(0),
            bootstrap,
        })
    }

    /// Picks the next worker, round-robin.
    pub fn next_worker(&self) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    /// Delivers `message` to worker `index`.
    pub fn send(&self, index: usize, message: WorkerMessage) -> Result<(), ChannelError> {
        let worker = self.workers.get(index).ok_or(ChannelError::Disconnected)?;
        worker
            .inbox
            .send(message)
            .map_err(|_| ChannelError::Disconnected)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn bootstrap(&self) -> &ResolvedBootstrap {
        &self.bootstrap
    }

    /// Asks every worker to stop without waiting for it.
    ///
    /// Workers drop their in-flight tasks; once the last one exits, the
    /// router sees its channel close and exits too.
    pub fn shutdown(mut self) {
        for worker in &mut self.workers {
            let _ = worker.inbox.send(WorkerMessage::Terminate);
            // Detach.
            drop(worker.thread.take());
        }
        drop(self.router.take());
        debug!("Worker pool shutdown requested");
    }
}

/// Body of one worker thread.
fn run_worker(
    context: WorkerContext,
    sources: Option<RegistryBootstrap>,
    mut inbox: mpsc::UnboundedReceiver<WorkerMessage>,
    responses: mpsc::UnboundedSender<Response>,
) {
    let worker_id = context.worker_id;

    let mut registry = WorkerSourceRegistry::with_defaults();
    if let Some(hook) = sources {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| hook(&mut registry))) {
            error!(
                worker = worker_id,
                panic = %panic_message(payload.as_ref()),
                "Worker source registration panicked; continuing with what was registered"
            );
        }
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(worker = worker_id, error = %e, "Failed to build worker runtime");
            // Answer everything so no caller waits on a dead worker.
            while let Some(message) = inbox.blocking_recv() {
                match message {
                    WorkerMessage::Request(request) => {
                        let descriptor = ErrorDescriptor::new("runtime", e.to_string());
                        let _ = responses.send(Response::err(request.id, descriptor));
                    }
                    WorkerMessage::Cancel(_) => {}
                    WorkerMessage::Terminate => break,
                }
            }
            return;
        }
    };

    let dispatcher = Dispatcher::new(context, registry, responses);
    runtime.block_on(dispatcher.run(inbox));
    debug!(worker = worker_id, "Worker thread exiting");
}

/// Body of the router thread: hands each response to its waiting caller.
fn route_responses(mut responses: mpsc::UnboundedReceiver<Response>, pending: Arc<PendingRequests>) {
    while let Some(response) = responses.blocking_recv() {
        pending.complete(response);
    }
    debug!("Response router exiting");
}
