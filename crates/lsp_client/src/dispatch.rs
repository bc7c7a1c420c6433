//! Classifies inbound frames and routes them without blocking the reader
//!
//! The reader task (`transport.rs`) is a pure producer. This dispatcher is
//! the consumer: responses are completed against the pending table inline
//! (cheap, never awaits handler code), while notifications and
//! server-initiated requests are handed to dispatcher-managed tasks so a
//! handler that issues further client requests can never deadlock the
//! reader that would otherwise need to deliver its response.
//!
//! Per-method notification order is preserved by routing each method to a
//! dedicated, lazily-spawned worker task fed by its own queue: the
//! dispatcher's own loop only ever does a cheap channel send.

use crate::handlers::HandlerRegistry;
use crate::message::{error_codes, Id, JsonRpcError, Message};
use crate::pending::PendingTable;
use dashmap::DashMap;
use futures::future::BoxFuture;
use lsp_support::telemetry::metrics;
use lsp_support::RequestId;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub type OutboundSink = Arc<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;

struct NotificationWorkers {
    handlers: Arc<HandlerRegistry>,
    senders: DashMap<String, mpsc::Sender<Value>>,
}

impl NotificationWorkers {
    fn new(handlers: Arc<HandlerRegistry>) -> Self {
        Self {
            handlers,
            senders: DashMap::new(),
        }
    }

    async fn dispatch(&self, method: &str, params: Value) {
        let sender = self.senders.entry(method.to_string()).or_insert_with(|| {
            let (tx, mut rx) = mpsc::channel::<Value>(256);
            let handlers = self.handlers.clone();
            let method = method.to_string();
            tokio::spawn(async move {
                while let Some(params) = rx.recv().await {
                    for handler in handlers.notification_handlers(&method) {
                        handler(params.clone()).await;
                    }
                }
            });
            tx
        });
        if sender.send(params).await.is_err() {
            warn!(method, "notification worker queue closed, dropping message");
        }
    }
}

/// Spawn the dispatcher task. Returns its `JoinHandle` so the owning
/// binding can await it as part of shutdown.
pub fn spawn(
    mut inbound_rx: mpsc::Receiver<Message>,
    pending: Arc<PendingTable>,
    handlers: Arc<HandlerRegistry>,
    outbound: OutboundSink,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let workers = NotificationWorkers::new(handlers.clone());
        while let Some(message) = inbound_rx.recv().await {
            metrics::MESSAGES_RECEIVED.increment();
            match message {
                Message::Response { id, outcome } => {
                    complete_response(&pending, id, outcome);
                }
                Message::Notification { method, params } => {
                    if handlers.notification_handlers(&method).is_empty() {
                        debug!(method, "dropping notification with no registered handler");
                        continue;
                    }
                    workers.dispatch(&method, params).await;
                }
                Message::Request { id, method, params } => {
                    let handlers = handlers.clone();
                    let outbound = outbound.clone();
                    tokio::spawn(async move {
                        handle_server_request(id, method, params, handlers, outbound).await;
                    });
                }
                Message::CancelRequest { id } => {
                    debug!(%id, "server-initiated cancellation of an in-flight server request is not supported, ignoring");
                }
            }
        }
    })
}

fn complete_response(pending: &PendingTable, id: Id, outcome: Result<Value, JsonRpcError>) {
    let Id::String(raw) = &id else {
        warn!(%id, "response carries a non-UUID id, cannot match a pending entry");
        return;
    };
    let Ok(request_id) = RequestId::from_str(raw) else {
        warn!(%id, "response id is not a UUID, cannot match a pending entry");
        return;
    };
    match outcome {
        Ok(result) => pending.complete_ok(request_id, result),
        Err(error) => pending.complete_err(request_id, error),
    }
}

async fn handle_server_request(
    id: Id,
    method: String,
    params: Value,
    handlers: Arc<HandlerRegistry>,
    outbound: OutboundSink,
) {
    let response = match handlers.request_handler(&method) {
        Some(handler) => match handler(params).await {
            Ok(result) => Message::ok_response(id, result),
            Err(error) => Message::err_response(id, error),
        },
        None => {
            debug!(method, "no handler for server request, replying MethodNotFound");
            Message::err_response(id, JsonRpcError::method_not_found(&method))
        }
    };
    outbound(response.to_value()).await;
}

/// Convenience for handlers that want to report an internal failure.
pub fn internal_error_response(id: Id, message: impl Into<String>) -> Message {
    Message::err_response(
        id,
        JsonRpcError {
            code: error_codes::INTERNAL_ERROR,
            message: message.into(),
            data: None,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::NotificationHandler;
    use lsp_support::RequestId;
    use tokio::sync::Mutex;

    #[tokio::test]
    async fn response_completes_matching_pending_entry() {
        let pending = Arc::new(PendingTable::new());
        let handlers = Arc::new(HandlerRegistry::new());
        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let outbound: OutboundSink = Arc::new(|_v| Box::pin(async {}));

        let id = RequestId::new();
        let handle = pending.insert(id, "test/method", None, None);

        let task = spawn(inbound_rx, pending.clone(), handlers, outbound);
        inbound_tx
            .send(Message::ok_response(Id::from(id), Value::from(7)))
            .await
            .unwrap();
        drop(inbound_tx);
        let _ = task.await;

        match handle.wait().await {
            crate::pending::Outcome::Decoded(v) => {
                assert_eq!(*v.downcast::<Value>().unwrap(), Value::from(7));
            }
            _ => panic!("expected decoded outcome"),
        }
    }

    #[tokio::test]
    async fn notifications_for_same_method_run_in_arrival_order() {
        let pending = Arc::new(PendingTable::new());
        let handlers = Arc::new(HandlerRegistry::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        let order_clone = order.clone();
        let handler: NotificationHandler = Arc::new(move |v: Value| {
            let order = order_clone.clone();
            Box::pin(async move {
                order.lock().await.push(v.as_i64().unwrap());
            })
        });
        handlers.on_notification("progress", handler).unwrap();

        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let outbound: OutboundSink = Arc::new(|_v| Box::pin(async {}));
        let task = spawn(inbound_rx, pending, handlers, outbound);

        for i in 0..5 {
            inbound_tx
                .send(Message::notification("progress", Value::from(i)))
                .await
                .unwrap();
        }
        drop(inbound_tx);
        let _ = task.await;

        assert_eq!(*order.lock().await, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn unknown_server_request_gets_method_not_found() {
        let pending = Arc::new(PendingTable::new());
        let handlers = Arc::new(HandlerRegistry::new());
        let responses = Arc::new(Mutex::new(Vec::new()));
        let responses_clone = responses.clone();
        let outbound: OutboundSink = Arc::new(move |v| {
            let responses = responses_clone.clone();
            Box::pin(async move {
                responses.lock().await.push(v);
            })
        });

        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let task = spawn(inbound_rx, pending, handlers, outbound);

        inbound_tx
            .send(Message::Request {
                id: Id::Number(1),
                method: "workspace/unknownThing".into(),
                params: Value::Null,
            })
            .await
            .unwrap();
        drop(inbound_tx);
        let _ = task.await;

        let got = responses.lock().await;
        assert_eq!(got.len(), 1);
        assert_eq!(got[0]["error"]["code"], error_codes::METHOD_NOT_FOUND);
    }
}
