//! Main-side tracking of requests awaiting a response.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;
use tracing::debug;

use super::error::ChannelError;
use super::protocol::{CorrelationId, ErrorDescriptor, Response};

/// Lifecycle of one request as seen by the main side.
///
/// `Idle → Sent → {Completed, Failed, Cancelled}`; nothing follows a
/// terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestState {
    /// Not yet handed to a worker.
    Idle,
    /// Handed to a worker; the caller may be waiting.
    Sent,
    /// The worker answered with data.
    Completed,
    /// The worker answered with an error, or the channel went away.
    Failed,
    /// The caller cancelled the request.
    Cancelled,
}

impl RequestState {
    /// Returns true for states with no outgoing transition.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestState::Completed | RequestState::Failed | RequestState::Cancelled
        )
    }

    /// Returns true if `self → next` is a legal transition.
    pub fn can_transition_to(self, next: RequestState) -> bool {
        match self {
            RequestState::Idle => next == RequestState::Sent,
            RequestState::Sent => next.is_terminal(),
            _ => false,
        }
    }
}

/// How a pending request ended.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Completed(Value),
    Failed(ErrorDescriptor),
    Cancelled,
    Terminated,
}

impl Outcome {
    /// The request state this outcome leaves the request in.
    pub fn state(&self) -> RequestState {
        match self {
            Outcome::Completed(_) => RequestState::Completed,
            Outcome::Failed(_) | Outcome::Terminated => RequestState::Failed,
            Outcome::Cancelled => RequestState::Cancelled,
        }
    }

    /// Converts the outcome into the caller-facing result.
    pub fn into_result(self, id: &CorrelationId) -> Result<Value, ChannelError> {
        match self {
            Outcome::Completed(data) => Ok(data),
            Outcome::Failed(descriptor) => Err(ChannelError::Remote(descriptor)),
            Outcome::Cancelled => Err(ChannelError::Cancelled(id.clone())),
            Outcome::Terminated => Err(ChannelError::Terminated),
        }
    }
}

/// Whether an incoming response reached a waiting caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The id was not in `Sent`: unknown, cancelled, or already answered.
    Ignored,
}

struct PendingEntry {
    worker: usize,
    /// `None` once cancelled: the caller is resolved but the worker's reply
    /// has not been drained yet.
    tx: Option<oneshot::Sender<Outcome>>,
}

/// Requests in `Sent`, keyed by correlation id.
///
/// Taking an entry's sender is the single transition out of `Sent`, so a
/// request reaches at most one terminal outcome however responses and
/// cancels race. A cancelled entry stays behind until the worker answers,
/// which keeps its id reserved so the stale reply cannot reach a newer
/// request reusing it.
#[derive(Default)]
pub struct PendingRequests {
    entries: DashMap<CorrelationId, PendingEntry>,
    closed: AtomicBool,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves `id` into `Sent`, owned by `worker`.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Terminated`] after [`fail_all`](Self::fail_all)
    /// - [`ChannelError::DuplicateId`] if `id` is already pending, or was
    ///   cancelled and its worker has not answered yet
    pub fn insert(
        &self,
        id: &CorrelationId,
        worker: usize,
    ) -> Result<oneshot::Receiver<Outcome>, ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Terminated);
        }
        let (tx, rx) = oneshot::channel();
        match self.entries.entry(id.clone()) {
            Entry::Occupied(_) => return Err(ChannelError::DuplicateId(id.clone())),
            Entry::Vacant(slot) => {
                slot.insert(PendingEntry {
                    worker,
                    tx: Some(tx),
                });
            }
        }
        // Terminate may have drained the table between the check and insert.
        if self.is_closed() {
            self.entries.remove(id);
            return Err(ChannelError::Terminated);
        }
        Ok(rx)
    }

    /// Resolves the caller waiting on `response.id`.
    pub fn complete(&self, response: Response) -> Delivery {
        let Some((id, entry)) = self.entries.remove(&response.id) else {
            debug!(request = %response.id, "Ignoring response for request not awaiting one");
            return Delivery::Ignored;
        };
        let Some(tx) = entry.tx else {
            debug!(request = %id, "Drained response for cancelled request; id released");
            return Delivery::Ignored;
        };
        let outcome = match response.into_result() {
            Ok(data) => Outcome::Completed(data),
            Err(descriptor) => Outcome::Failed(descriptor),
        };
        if tx.send(outcome).is_err() {
            debug!(request = %id, "Caller dropped before response arrived");
        }
        Delivery::Delivered
    }

    /// Cancels `id` if it is still pending, returning its worker.
    ///
    /// `None` for ids that are unknown, already resolved or already
    /// cancelled. The id stays reserved until [`complete`](Self::complete)
    /// sees the worker's reply.
    pub fn cancel(&self, id: &CorrelationId) -> Option<usize> {
        let mut entry = self.entries.get_mut(id)?;
        let tx = entry.tx.take()?;
        let _ = tx.send(Outcome::Cancelled);
        Some(entry.worker)
    }

    /// Refuses further inserts and fails every pending caller with
    /// [`Outcome::Terminated`].
    pub fn fail_all(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let ids: Vec<CorrelationId> = self.entries.iter().map(|e| e.key().clone()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some(tx) = self.entries.remove(&id).and_then(|(_, entry)| entry.tx) {
                let _ = tx.send(Outcome::Terminated);
                failed += 1;
            }
        }
        failed
    }

    /// Returns true if a caller is awaiting a response for `id`.
    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.entries.get(id).is_some_and(|entry| entry.tx.is_some())
    }

    /// Returns true if `id` cannot be used for a new request yet.
    pub fn is_reserved(&self, id: &CorrelationId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of callers awaiting a response.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|entry| entry.tx.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> CorrelationId {
        CorrelationId::new(s)
    }

    #[test]
    fn test_state_transitions() {
        assert!(RequestState::Idle.can_transition_to(RequestState::Sent));
        assert!(!RequestState::Idle.can_transition_to(RequestState::Completed));
        assert!(RequestState::Sent.can_transition_to(RequestState::Cancelled));
        assert!(!RequestState::Sent.can_transition_to(RequestState::Idle));
        for terminal in [
            RequestState::Completed,
            RequestState::Failed,
            RequestState::Cancelled,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(RequestState::Sent));
        }
    }

    #[test]
    fn test_complete_delivers_once() {
        let pending = PendingRequests::new();
        let mut rx = pending.insert(&id("a"), 0).unwrap();

        assert_eq!(
            pending.complete(Response::ok(id("a"), json!(1))),
            Delivery::Delivered
        );
        assert_eq!(
            pending.complete(Response::ok(id("a"), json!(2))),
            Delivery::Ignored
        );
        assert_eq!(rx.try_recv().unwrap(), Outcome::Completed(json!(1)));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_cancel_then_late_response_is_ignored() {
        let pending = PendingRequests::new();
        let mut rx = pending.insert(&id("a"), 3).unwrap();

        assert_eq!(pending.cancel(&id("a")), Some(3));
        assert_eq!(pending.cancel(&id("a")), None);
        assert!(!pending.contains(&id("a")));
        assert!(pending.is_empty());
        assert_eq!(
            pending.complete(Response::ok(id("a"), json!(1))),
            Delivery::Ignored
        );
        assert_eq!(rx.try_recv().unwrap(), Outcome::Cancelled);
    }

    #[test]
    fn test_cancelled_id_reserved_until_worker_replies() {
        let pending = PendingRequests::new();
        let mut first = pending.insert(&id("x"), 0).unwrap();
        pending.cancel(&id("x"));

        assert!(pending.is_reserved(&id("x")));
        assert!(matches!(
            pending.insert(&id("x"), 0),
            Err(ChannelError::DuplicateId(_))
        ));

        // The worker's reply to the cancelled request releases the id.
        let cancelled = ErrorDescriptor::new("cancelled", "Request cancelled");
        assert_eq!(
            pending.complete(Response::err(id("x"), cancelled)),
            Delivery::Ignored
        );
        assert!(!pending.is_reserved(&id("x")));

        let mut second = pending.insert(&id("x"), 0).unwrap();
        assert_eq!(
            pending.complete(Response::ok(id("x"), json!("second"))),
            Delivery::Delivered
        );
        assert_eq!(first.try_recv().unwrap(), Outcome::Cancelled);
        assert_eq!(second.try_recv().unwrap(), Outcome::Completed(json!("second")));
    }

    #[test]
    fn test_cancel_after_delivery_is_noop() {
        let pending = PendingRequests::new();
        let mut rx = pending.insert(&id("a"), 0).unwrap();
        pending.complete(Response::err(id("a"), ErrorDescriptor::new("decode", "bad")));

        assert_eq!(pending.cancel(&id("a")), None);
        assert_eq!(
            rx.try_recv().unwrap(),
            Outcome::Failed(ErrorDescriptor::new("decode", "bad"))
        );
    }

    #[test]
    fn test_duplicate_id_refused() {
        let pending = PendingRequests::new();
        let _rx = pending.insert(&id("a"), 0).unwrap();
        assert!(matches!(
            pending.insert(&id("a"), 1),
            Err(ChannelError::DuplicateId(_))
        ));

        // Reusable once resolved.
        pending.complete(Response::ok(id("a"), Value::Null));
        assert!(pending.insert(&id("a"), 1).is_ok());
    }

    #[test]
    fn test_fail_all_closes_table() {
        let pending = PendingRequests::new();
        let mut a = pending.insert(&id("a"), 0).unwrap();
        let mut b = pending.insert(&id("b"), 1).unwrap();
        let _c = pending.insert(&id("c"), 1).unwrap();
        pending.cancel(&id("c"));

        assert_eq!(pending.fail_all(), 2);
        assert!(!pending.is_reserved(&id("c")));
        assert_eq!(a.try_recv().unwrap(), Outcome::Terminated);
        assert_eq!(b.try_recv().unwrap(), Outcome::Terminated);
        assert!(matches!(
            pending.insert(&id("c"), 0),
            Err(ChannelError::Terminated)
        ));
    }

    #[test]
    fn test_outcome_into_result() {
        let a = id("a");
        assert_eq!(Outcome::Completed(json!(5)).into_result(&a).unwrap(), json!(5));
        assert!(matches!(
            Outcome::Cancelled.into_result(&a),
            Err(ChannelError::Cancelled(ref c)) if c == &a
        ));
        assert_eq!(Outcome::Terminated.state(), RequestState::Failed);
    }
}
