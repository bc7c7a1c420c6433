//! Per-binding table of outstanding requests
//!
//! Maps a request id to a single-shot completion slot. A `oneshot` channel
//! gives the bijection invariant for free: a second `send` is simply
//! dropped, which is exactly "duplicate completion is silently dropped
//! from the wire's perspective" once the first winner has already taken
//! the slot.

use crate::message::{Id, JsonRpcError};
use dashmap::DashMap;
use lsp_support::telemetry::metrics;
use lsp_support::{Error, RequestId};
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// A decoder turns the raw JSON result of a successful response into a
/// type-erased value the caller downcasts back to its concrete type. This
/// keeps the pending table and dispatcher ignorant of per-request types.
pub type Decoder = Box<dyn FnOnce(Value) -> Result<Box<dyn Any + Send>, Error> + Send + Sync>;

/// The single outcome ever delivered to a request's waiter.
pub enum Outcome {
    Decoded(Box<dyn Any + Send>),
    Rpc(JsonRpcError),
    Cancelled,
    Timeout,
    Terminated,
}

struct PendingEntry {
    method: String,
    created_at: Instant,
    deadline: Option<Duration>,
    decoder: Option<Decoder>,
    sent: bool,
    tx: Option<oneshot::Sender<Outcome>>,
}

/// A handle returned by `insert`; the caller awaits it for the outcome.
pub struct PendingHandle {
    pub id: RequestId,
    rx: oneshot::Receiver<Outcome>,
}

impl PendingHandle {
    pub async fn wait(self) -> Outcome {
        self.rx.await.unwrap_or(Outcome::Terminated)
    }
}

/// Thread-safe map from request id to completion slot, scoped to a single
/// binding.
#[derive(Default)]
pub struct PendingTable {
    entries: DashMap<RequestId, PendingEntry>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Register a new outstanding request. `decoder` is `None` when the
    /// caller wants the raw `serde_json::Value` back.
    pub fn insert(
        &self,
        id: RequestId,
        method: impl Into<String>,
        deadline: Option<Duration>,
        decoder: Option<Decoder>,
    ) -> PendingHandle {
        let (tx, rx) = oneshot::channel();
        self.entries.insert(
            id,
            PendingEntry {
                method: method.into(),
                created_at: Instant::now(),
                deadline,
                decoder,
                sent: false,
                tx: Some(tx),
            },
        );
        metrics::PENDING_REQUESTS.increment();
        PendingHandle { id, rx }
    }

    /// Mark an entry as having actually gone out on the wire. Needed so
    /// `cancel` knows whether a `$/cancelRequest` notification is
    /// meaningful to send.
    pub fn mark_sent(&self, id: RequestId) {
        if let Some(mut entry) = self.entries.get_mut(&id) {
            entry.sent = true;
        }
    }

    pub fn method_of(&self, id: RequestId) -> Option<String> {
        self.entries.get(&id).map(|e| e.method.clone())
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn deadline_elapsed(&self, id: RequestId) -> bool {
        self.entries
            .get(&id)
            .and_then(|e| e.deadline.map(|d| e.created_at.elapsed() >= d))
            .unwrap_or(false)
    }

    /// Complete a pending request with a successful raw result, applying
    /// the registered decoder. A missing entry (already cancelled, timed
    /// out, or a genuine duplicate completion from a buggy server) is a
    /// protocol-level event that's logged and otherwise ignored.
    pub fn complete_ok(&self, id: RequestId, raw: Value) {
        let Some((_, mut entry)) = self.entries.remove(&id) else {
            warn!(%id, "duplicate or unknown completion for request id, dropping");
            return;
        };
        metrics::PENDING_REQUESTS.decrement();
        let Some(tx) = entry.tx.take() else { return };
        let outcome = match entry.decoder.take() {
            Some(decode) => match decode(raw) {
                Ok(value) => Outcome::Decoded(value),
                Err(e) => {
                    warn!(%id, error = %e, "failed to decode response");
                    metrics::ERRORS_TOTAL.increment();
                    Outcome::Rpc(JsonRpcError::internal_error(e.to_string()))
                }
            },
            None => Outcome::Decoded(Box::new(raw)),
        };
        let _ = tx.send(outcome);
    }

    pub fn complete_err(&self, id: RequestId, error: JsonRpcError) {
        let Some((_, mut entry)) = self.entries.remove(&id) else {
            warn!(%id, "duplicate or unknown error completion for request id, dropping");
            return;
        };
        metrics::PENDING_REQUESTS.decrement();
        metrics::ERRORS_TOTAL.increment();
        if let Some(tx) = entry.tx.take() {
            let _ = tx.send(Outcome::Rpc(error));
        }
    }

    /// Cancel an outstanding request. Returns the wire id to emit
    /// `$/cancelRequest` for, if the request had actually been sent.
    pub fn cancel(&self, id: RequestId) -> Option<Id> {
        let (_, mut entry) = self.entries.remove(&id)?;
        metrics::PENDING_REQUESTS.decrement();
        let sent = entry.sent;
        if let Some(tx) = entry.tx.take() {
            let _ = tx.send(Outcome::Cancelled);
        }
        sent.then(|| id.into())
    }

    pub fn timeout(&self, id: RequestId) {
        if let Some((_, mut entry)) = self.entries.remove(&id) {
            metrics::PENDING_REQUESTS.decrement();
            if let Some(tx) = entry.tx.take() {
                let _ = tx.send(Outcome::Timeout);
            }
        }
    }

    /// Cancel every outstanding entry with `Terminated`, e.g. on binding
    /// shutdown or failure.
    pub fn terminate_all(self: &Arc<Self>) {
        let ids: Vec<RequestId> = self.entries.iter().map(|e| *e.key()).collect();
        debug!(count = ids.len(), "terminating all pending requests");
        for id in ids {
            if let Some((_, mut entry)) = self.entries.remove(&id) {
                metrics::PENDING_REQUESTS.decrement();
                if let Some(tx) = entry.tx.take() {
                    let _ = tx.send(Outcome::Terminated);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_ok_delivers_decoded_value() {
        let table = PendingTable::new();
        let id = RequestId::new();
        let decoder: Decoder = Box::new(|v: Value| {
            let n: i64 = serde_json::from_value(v)?;
            Ok(Box::new(n) as Box<dyn Any + Send>)
        });
        let handle = table.insert(id, "test/method", None, Some(decoder));
        table.complete_ok(id, Value::from(42));
        let outcome = handle.wait().await;
        match outcome {
            Outcome::Decoded(v) => assert_eq!(*v.downcast::<i64>().unwrap(), 42),
            _ => panic!("expected decoded outcome"),
        }
    }

    #[tokio::test]
    async fn duplicate_completion_is_dropped() {
        let table = PendingTable::new();
        let id = RequestId::new();
        let handle = table.insert(id, "test/method", None, None);
        table.complete_ok(id, Value::Null);
        // Second completion for the same id: no entry left, silently ignored.
        table.complete_ok(id, Value::Null);
        assert!(matches!(handle.wait().await, Outcome::Decoded(_)));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn cancel_returns_wire_id_only_if_sent() {
        let table = PendingTable::new();
        let id = RequestId::new();
        let handle = table.insert(id, "test/method", None, None);
        assert!(table.cancel(id).is_none());
        assert!(!table.contains(id));

        let id2 = RequestId::new();
        let handle2 = table.insert(id2, "test/method", None, None);
        table.mark_sent(id2);
        assert!(table.cancel(id2).is_some());
        assert!(matches!(handle2.wait().await, Outcome::Cancelled));
        let _ = handle.wait().await;
    }

    #[tokio::test]
    async fn terminate_all_drains_table() {
        let table = Arc::new(PendingTable::new());
        let id1 = RequestId::new();
        let id2 = RequestId::new();
        let h1 = table.insert(id1, "a", None, None);
        let h2 = table.insert(id2, "b", None, None);
        table.terminate_all();
        assert!(table.is_empty());
        assert!(matches!(h1.wait().await, Outcome::Terminated));
        assert!(matches!(h2.wait().await, Outcome::Terminated));
    }
}
