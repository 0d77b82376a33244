//! Worker-side request dispatcher.
//!
//! One [`Dispatcher`] runs on each worker thread. It receives
//! [`WorkerMessage`]s, routes requests to the source registered for their
//! type and sends one [`Response`] per request back to the main side.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Dispatcher (per thread)                   │
//! │                                                               │
//! │  Request ──► ┌──────────┐                                     │
//! │              │ Registry │──► Unregistered ──► error response  │
//! │              └────┬─────┘                                     │
//! │                   │ Source                                    │
//! │                   ▼                                           │
//! │              ┌──────────┐                                     │
//! │              │  spawn   │──► handle() ─┬─► Ok ──► data        │
//! │              └──────────┘              ├─► Err ──► error      │
//! │                                        ├─► panic ──► error    │
//! │  Cancel(id) ──► token.cancel() ────────┘   (dropped at await) │
//! │                                                               │
//! │  Terminate ──► cancel everything, stop                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use dashmap::DashMap;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::DispatchError;
use super::protocol::{CorrelationId, ErrorDescriptor, Request, Response, WorkerMessage};
use super::registry::WorkerSourceRegistry;
use super::source::{RequestContext, WorkerContext, WorkerSource};

/// Routes requests to worker sources on one worker thread.
pub struct Dispatcher {
    context: WorkerContext,
    registry: WorkerSourceRegistry,
    /// Source instances, built on first use and kept for the worker's lifetime.
    sources: HashMap<String, Arc<dyn WorkerSource>>,
    /// In-flight requests, tagged with their dispatch sequence number.
    in_flight: Arc<DashMap<CorrelationId, (u64, CancellationToken)>>,
    next_seq: u64,
    responses: mpsc::UnboundedSender<Response>,
}

impl Dispatcher {
    /// Creates a dispatcher over a fully populated registry.
    pub fn new(
        context: WorkerContext,
        registry: WorkerSourceRegistry,
        responses: mpsc::UnboundedSender<Response>,
    ) -> Self {
        Self {
            context,
            registry,
            sources: HashMap::new(),
            in_flight: Arc::new(DashMap::new()),
            next_seq: 0,
            responses,
        }
    }

    /// Number of requests currently being serviced.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Processes messages until `Terminate` arrives or the inbox closes.
    ///
    /// Must be called from within a tokio runtime; each request is spawned
    /// as its own task on it.
    pub async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<WorkerMessage>) {
        info!(
            worker = self.context.worker_id,
            location = %self.context.location,
            source_types = ?self.registry.names(),
            "Worker dispatcher starting"
        );

        while let Some(message) = inbox.recv().await {
            match message {
                WorkerMessage::Request(request) => self.dispatch(request),
                WorkerMessage::Cancel(id) => self.cancel(&id),
                WorkerMessage::Terminate => {
                    info!(worker = self.context.worker_id, "Worker dispatcher terminating");
                    break;
                }
            }
        }

        for entry in self.in_flight.iter() {
            entry.value().1.cancel();
        }
        info!(worker = self.context.worker_id, "Worker dispatcher stopped");
    }

    /// Starts servicing one request.
    fn dispatch(&mut self, request: Request) {
        let Request {
            id,
            source_type,
            op,
            params,
        } = request;

        debug!(
            worker = self.context.worker_id,
            request = %id,
            source_type = %source_type,
            op = %op,
            "Received request"
        );

        let source = match self.source_for(&source_type) {
            Ok(source) => source,
            Err(e) => {
                warn!(request = %id, error = %e, "Rejecting request");
                self.respond(Response::err(id, ErrorDescriptor::from(&e)));
                return;
            }
        };

        let cancellation = CancellationToken::new();
        let seq = self.next_seq;
        self.next_seq += 1;
        if let Some((_, previous)) = self
            .in_flight
            .insert(id.clone(), (seq, cancellation.clone()))
        {
            warn!(request = %id, "Request id reused while in flight; cancelling the earlier one");
            previous.cancel();
        }

        let in_flight = Arc::clone(&self.in_flight);
        let responses = self.responses.clone();

        tokio::spawn(async move {
            let ctx = RequestContext {
                id,
                cancellation: cancellation.clone(),
            };

            let result = tokio::select! {
                biased;

                _ = cancellation.cancelled() => Err(DispatchError::Cancelled),

                outcome = AssertUnwindSafe(source.handle(&op, params, &ctx)).catch_unwind() => {
                    match outcome {
                        Ok(result) => result,
                        Err(payload) => {
                            let message = panic_message(payload.as_ref());
                            error!(request = %ctx.id, panic = %message, "Worker source panicked");
                            Err(DispatchError::Panicked(message))
                        }
                    }
                }
            };

            // A reused id may have replaced this entry already.
            in_flight.remove_if(&ctx.id, |_, (owner, _)| *owner == seq);

            let response = match result {
                Ok(data) => {
                    debug!(request = %ctx.id, "Request completed");
                    Response::ok(ctx.id, data)
                }
                Err(e) => {
                    debug!(request = %ctx.id, error = %e, "Request failed");
                    Response::err(ctx.id, ErrorDescriptor::from(&e))
                }
            };
            // The main side may be gone; nobody is left to tell.
            let _ = responses.send(response);
        });
    }

    /// Abandons an in-flight request. Unknown ids are ignored.
    fn cancel(&self, id: &CorrelationId) {
        match self.in_flight.get(id) {
            Some(entry) => {
                debug!(request = %id, "Cancelling request");
                entry.value().1.cancel();
            }
            None => debug!(request = %id, "Cancel for request not in flight"),
        }
    }

    /// The source instance for `source_type`, constructing it on first use.
    fn source_for(&mut self, source_type: &str) -> Result<Arc<dyn WorkerSource>, DispatchError> {
        if let Some(source) = self.sources.get(source_type) {
            return Ok(Arc::clone(source));
        }

        let constructor = self
            .registry
            .get(source_type)
            .ok_or_else(|| DispatchError::UnregisteredSourceType(source_type.to_string()))?;

        let context = &self.context;
        let source = panic::catch_unwind(AssertUnwindSafe(|| constructor(context)))
            .map_err(|payload| DispatchError::Panicked(panic_message(payload.as_ref())))?;

        debug!(
            worker = self.context.worker_id,
            source_type = %source_type,
            "Constructed worker source"
        );
        self.sources.insert(source_type.to_string(), Arc::clone(&source));
        Ok(source)
    }

    fn respond(&self, response: Response) {
        if self.responses.send(response).is_err() {
            debug!(worker = self.context.worker_id, "Response channel closed");
        }
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{ExtentDiagnostics, GeometryQuantizer};
    use crate::worker::bootstrap::BootstrapLocation;
    use crate::worker::protocol::Operation;
    use crate::worker::source::BoxFuture;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Echoes params; "slow" waits for the gate, "panic" panics.
    struct TestSource {
        gate: Arc<Notify>,
    }

    impl WorkerSource for TestSource {
        fn name(&self) -> &str {
            "test"
        }

        fn handle<'a>(
            &'a self,
            op: &'a Operation,
            params: Value,
            _ctx: &'a RequestContext,
        ) -> BoxFuture<'a, Result<Value, DispatchError>> {
            Box::pin(async move {
                match op.as_str() {
                    "slow" => {
                        self.gate.notified().await;
                        Ok(params)
                    }
                    "panic" => panic!("source exploded"),
                    "fail" => Err(DispatchError::Source("nope".to_string())),
                    _ => Ok(params),
                }
            })
        }
    }

    struct Harness {
        inbox: mpsc::UnboundedSender<WorkerMessage>,
        responses: mpsc::UnboundedReceiver<Response>,
        gate: Arc<Notify>,
        handle: tokio::task::JoinHandle<()>,
    }

    fn dispatcher() -> (Dispatcher, mpsc::UnboundedReceiver<Response>, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let source_gate = Arc::clone(&gate);

        let mut registry = WorkerSourceRegistry::with_defaults();
        registry.register("test", move |_ctx: &WorkerContext| {
            Arc::new(TestSource {
                gate: Arc::clone(&source_gate),
            }) as Arc<dyn WorkerSource>
        });
        registry.register("broken", |_ctx: &WorkerContext| -> Arc<dyn WorkerSource> {
            panic!("constructor exploded")
        });

        let context = WorkerContext {
            worker_id: 0,
            location: BootstrapLocation::Verbatim("tile-worker.js".to_string()),
            quantizer: GeometryQuantizer::new(Arc::new(ExtentDiagnostics::new())),
        };
        let (response_tx, responses) = mpsc::unbounded_channel();
        (Dispatcher::new(context, registry, response_tx), responses, gate)
    }

    fn start() -> Harness {
        let (dispatcher, responses, gate) = dispatcher();
        let (inbox, inbox_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(dispatcher.run(inbox_rx));

        Harness {
            inbox,
            responses,
            gate,
            handle,
        }
    }

    fn request(id: &str, source_type: &str, op: &str, params: Value) -> WorkerMessage {
        WorkerMessage::Request(Request {
            id: CorrelationId::new(id),
            source_type: source_type.to_string(),
            op: Operation::from(op),
            params,
        })
    }

    async fn next(harness: &mut Harness) -> Response {
        tokio::time::timeout(Duration::from_secs(5), harness.responses.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_unregistered_type_returns_error_and_keeps_serving() {
        let mut harness = start();
        harness
            .inbox
            .send(request("a", "unknown-type", "loadTile", Value::Null))
            .unwrap();
        let response = next(&mut harness).await;
        assert_eq!(response.id.as_str(), "a");
        assert_eq!(
            response.error.as_ref().map(|e| e.kind.as_str()),
            Some("unregistered_source_type")
        );

        harness
            .inbox
            .send(request("b", "test", "echo", json!(1)))
            .unwrap();
        let response = next(&mut harness).await;
        assert_eq!(response.into_result().unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_unrelated_requests_are_not_serialized() {
        let mut harness = start();
        harness
            .inbox
            .send(request("a", "test", "slow", json!("a")))
            .unwrap();
        harness
            .inbox
            .send(request("b", "test", "echo", json!("b")))
            .unwrap();

        let first = next(&mut harness).await;
        assert_eq!(first.id.as_str(), "b");

        harness.gate.notify_one();
        let second = next(&mut harness).await;
        assert_eq!(second.id.as_str(), "a");
        assert_eq!(second.into_result().unwrap(), json!("a"));
    }

    #[tokio::test]
    async fn test_cancel_in_flight_request() {
        let mut harness = start();
        harness
            .inbox
            .send(request("a", "test", "slow", Value::Null))
            .unwrap();
        harness
            .inbox
            .send(WorkerMessage::Cancel(CorrelationId::new("a")))
            .unwrap();

        let response = next(&mut harness).await;
        assert_eq!(response.error.map(|e| e.kind), Some("cancelled".to_string()));
    }

    #[tokio::test]
    async fn test_in_flight_count_drops_after_cancel() {
        let (mut dispatcher, mut responses, _gate) = dispatcher();
        let WorkerMessage::Request(slow) = request("a", "test", "slow", Value::Null) else {
            unreachable!()
        };
        dispatcher.dispatch(slow);
        assert_eq!(dispatcher.in_flight(), 1);

        dispatcher.cancel(&CorrelationId::new("a"));
        let response = tokio::time::timeout(Duration::from_secs(5), responses.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.error.map(|e| e.kind), Some("cancelled".to_string()));
        assert_eq!(dispatcher.in_flight(), 0);

        // Unknown ids are ignored.
        dispatcher.cancel(&CorrelationId::new("a"));
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_panics_become_error_responses() {
        let mut harness = start();
        harness
            .inbox
            .send(request("a", "test", "panic", Value::Null))
            .unwrap();
        let response = next(&mut harness).await;
        let error = response.error.unwrap();
        assert_eq!(error.kind, "panic");
        assert!(error.message.contains("source exploded"));

        harness
            .inbox
            .send(request("b", "broken", "loadTile", Value::Null))
            .unwrap();
        let response = next(&mut harness).await;
        assert_eq!(response.error.map(|e| e.kind), Some("panic".to_string()));

        harness
            .inbox
            .send(request("c", "test", "fail", Value::Null))
            .unwrap();
        let response = next(&mut harness).await;
        assert_eq!(response.error.map(|e| e.kind), Some("source".to_string()));
    }

    #[tokio::test]
    async fn test_terminate_stops_dispatcher() {
        let harness = start();
        harness.inbox.send(WorkerMessage::Terminate).unwrap();
        tokio::time::timeout(Duration::from_secs(5), harness.handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
