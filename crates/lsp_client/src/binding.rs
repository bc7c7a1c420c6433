//! A single connected language-server instance
//!
//! Owns its transport, pending table, handler registry, and sync guard —
//! exactly the `{process/transport handle, read task, write queue,
//! pending table, handler registry, server-reported caps, state}` shape
//! the data model calls for. Exclusively owned by one pool slot.

use crate::dispatch;
use crate::handlers::HandlerRegistry;
use crate::message::{Id, Message};
use crate::pending::{Decoder, Outcome, PendingHandle, PendingTable};
use crate::sync::SyncGuard;
use crate::transport::{BindingFailure, Transport, TransportBinding};
use lsp_support::telemetry::metrics;
use lsp_support::{BindingId, Error, RequestId};
use lsp_types::ServerCapabilities;
use parking_lot::RwLock;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    New,
    Initializing,
    Ready,
    Draining,
    Down,
}

pub struct Binding {
    pub id: BindingId,
    transport: Arc<TransportBinding>,
    pending: Arc<PendingTable>,
    handlers: Arc<HandlerRegistry>,
    sync: SyncGuard,
    state: Arc<RwLock<BindingState>>,
    server_capabilities: RwLock<Option<ServerCapabilities>>,
    dispatcher: JoinHandle<()>,
    inflight: AtomicUsize,
    /// Shared with the owning `Pool`; signaled on every completion so a
    /// routing call blocked on pool saturation wakes up.
    slot_freed: Arc<Notify>,
}

impl Binding {
    pub async fn connect(
        transport: Arc<dyn Transport>,
        handlers: Arc<HandlerRegistry>,
        slot_freed: Arc<Notify>,
    ) -> Result<Arc<Self>, Error> {
        let id = BindingId::new();
        let pending = Arc::new(PendingTable::new());
        let (inbound_tx, inbound_rx) = tokio::sync::mpsc::channel(256);

        let state: Arc<RwLock<BindingState>> = Arc::new(RwLock::new(BindingState::New));
        let pending_for_failure = pending.clone();
        let state_for_failure = state.clone();
        let transport_binding = TransportBinding::start(transport, inbound_tx, move |reason| {
            warn!(?reason, "binding transport failed, marking down");
            *state_for_failure.write() = BindingState::Down;
            pending_for_failure.terminate_all();
        })
        .await?;
        let transport_binding = Arc::new(transport_binding);

        let outbound_transport = transport_binding.clone();
        let outbound: dispatch::OutboundSink = Arc::new(move |value: Value| {
            let transport = outbound_transport.clone();
            Box::pin(async move {
                if let Err(e) = transport.send(value).await {
                    warn!(error = %e, "failed to send response on the wire");
                }
            })
        });

        let dispatcher = dispatch::spawn(inbound_rx, pending.clone(), handlers.clone(), outbound);

        let binding = Arc::new(Self {
            id,
            transport: transport_binding,
            pending,
            handlers,
            sync: SyncGuard::new(),
            state,
            server_capabilities: RwLock::new(None),
            dispatcher,
            inflight: AtomicUsize::new(0),
            slot_freed,
        });
        metrics::ACTIVE_BINDINGS.increment();
        Ok(binding)
    }

    pub fn state(&self) -> BindingState {
        *self.state.read()
    }

    pub fn set_state(&self, state: BindingState) {
        *self.state.write() = state;
    }

    pub fn is_down(&self) -> bool {
        self.transport.is_failed() || self.state() == BindingState::Down
    }

    pub fn set_server_capabilities(&self, caps: ServerCapabilities) {
        *self.server_capabilities.write() = Some(caps);
    }

    pub fn server_capabilities(&self) -> Option<ServerCapabilities> {
        self.server_capabilities.read().clone()
    }

    pub fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.handlers
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }

    /// Send a request and decode its result against `decoder` (or return
    /// the raw `Value` if `decoder` is `None`). Applies `deadline` as the
    /// per-request timeout; expiry and cancellation share the same path.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        decoder: Option<Decoder>,
        deadline: Option<Duration>,
    ) -> Result<Box<dyn Any + Send>, Error> {
        let (id, handle) = self.begin_request(method, params, decoder, deadline).await?;
        self.finish_request(id, handle, deadline).await
    }

    /// Send a request without waiting for its reply. Returns the id a
    /// caller can pass to `cancel` and a handle to await the eventual
    /// outcome via `finish_request`. Splitting `request` this way is what
    /// lets a caller hold a live handle to cancel mid-flight.
    pub async fn begin_request(
        &self,
        method: &str,
        params: Value,
        decoder: Option<Decoder>,
        deadline: Option<Duration>,
    ) -> Result<(RequestId, PendingHandle), Error> {
        let id = RequestId::new();
        let handle = self.pending.insert(id, method, deadline, decoder);

        self.inflight.fetch_add(1, Ordering::SeqCst);
        let send_result = self
            .transport
            .send(Message::request(Id::from(id), method, params).to_value())
            .await;
        if let Err(e) = send_result {
            self.inflight.fetch_sub(1, Ordering::SeqCst);
            self.pending.timeout(id); // drop the stale entry, no wire id was ever marked sent
            self.slot_freed.notify_waiters();
            return Err(e);
        }
        self.pending.mark_sent(id);
        metrics::REQUESTS_SENT.increment();
        Ok((id, handle))
    }

    /// Await the outcome of a request started by `begin_request`.
    pub async fn finish_request(
        &self,
        id: RequestId,
        handle: PendingHandle,
        deadline: Option<Duration>,
    ) -> Result<Box<dyn Any + Send>, Error> {
        let outcome = match deadline {
            Some(d) => match tokio::time::timeout(d, handle.wait()).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.pending.timeout(id);
                    Outcome::Timeout
                }
            },
            None => handle.wait().await,
        };
        self.inflight.fetch_sub(1, Ordering::SeqCst);
        self.slot_freed.notify_waiters();

        match outcome {
            Outcome::Decoded(value) => Ok(value),
            Outcome::Rpc(error) => Err(Error::InternalError(format!(
                "{} ({})",
                error.message, error.code
            ))),
            Outcome::Cancelled => Err(Error::Cancelled),
            Outcome::Timeout => Err(Error::Timeout(deadline.unwrap_or_default())),
            Outcome::Terminated => Err(Error::Terminated),
        }
    }

    pub async fn notify(&self, method: &str, params: Value) -> Result<(), Error> {
        self.transport
            .send(Message::notification(method, params).to_value())
            .await?;
        metrics::NOTIFICATIONS_SENT.increment();
        Ok(())
    }

    /// Cancel an outstanding request: removes the pending entry and, if it
    /// had already gone out on the wire, sends `$/cancelRequest`.
    pub async fn cancel(&self, id: RequestId) -> Result<(), Error> {
        if let Some(wire_id) = self.pending.cancel(id) {
            self.transport
                .send(Message::cancel_request(wire_id).to_value())
                .await?;
        }
        Ok(())
    }

    pub async fn with_documents<F, Fut, T>(
        &self,
        paths: &[PathBuf],
        language_id: &str,
        body: F,
    ) -> Result<T, Error>
    where
        F: FnOnce(Vec<url::Url>) -> Fut,
        Fut: Future<Output = T>,
    {
        let transport = self.transport.clone();
        let sink: Box<dyn Fn(Message) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync> =
            Box::new(move |message: Message| {
                let transport = transport.clone();
                Box::pin(async move {
                    if let Err(e) = transport.send(message.to_value()).await {
                        warn!(error = %e, "failed to send document-sync notification");
                    }
                })
            });
        self.sync.with_documents(paths, language_id, &*sink, body).await
    }

    /// Synchronous, best-effort termination used by `Session::drop` when a
    /// caller forgets to call `shutdown` explicitly.
    pub fn kill_best_effort(&self) {
        self.transport.kill_best_effort();
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Consume the binding, terminating in-flight requests and closing
    /// the transport. Called by the pool/session on shutdown.
    pub async fn shutdown(self: Arc<Self>) {
        self.set_state(BindingState::Draining);
        self.pending.terminate_all();
        self.dispatcher.abort();
        if let Ok(binding) = Arc::try_unwrap(self) {
            binding.shutdown_owned().await;
        }
    }

    async fn shutdown_owned(self) {
        if let Ok(transport) = Arc::try_unwrap(self.transport) {
            transport.close().await;
        }
        metrics::ACTIVE_BINDINGS.decrement();
    }
}
