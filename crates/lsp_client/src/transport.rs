//! Binds the frame codec to a server instance's duplex stream
//!
//! Owns the reader task (a pure producer that only decodes frames and
//! forwards them — see `dispatch.rs` for why handler work must never run
//! inline here) and a writer task draining a bounded outbound queue with
//! bounded exponential backoff on transient write failures.

use crate::codec;
use crate::message::Message;
use async_trait::async_trait;
use lsp_support::Error;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use url::Url;

const WRITE_RETRY_ATTEMPTS: u32 = 3;
const WRITE_RETRY_BASE: Duration = Duration::from_millis(50);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// The contract a concrete server launcher presents to the engine. A test
/// harness (`tests/support`) and production process launchers both
/// implement this trait; the engine never spawns a process itself.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn start(
        &self,
    ) -> Result<
        (
            Box<dyn AsyncRead + Unpin + Send>,
            Box<dyn AsyncWrite + Unpin + Send>,
        ),
        Error,
    >;

    /// Idempotent forced termination.
    fn kill(&self);

    /// Translate a host path to the URI the server should see. Absent for
    /// transports where host and server share a filesystem.
    fn translate_path_in(&self, _host_path: &Path) -> Option<Url> {
        None
    }

    /// Translate a server-reported URI back to a host path.
    fn translate_path_out(&self, _server_uri: &Url) -> Option<PathBuf> {
        None
    }
}

/// Why a binding stopped accepting new work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingFailure {
    WriteFailed,
    ReaderFailed,
}

pub struct TransportBinding {
    transport: Arc<dyn Transport>,
    outbound_tx: mpsc::Sender<Value>,
    reader_eof: Arc<Notify>,
    failed: Arc<AtomicBool>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl TransportBinding {
    /// Start the transport and spawn its reader/writer tasks. Decoded
    /// inbound messages are pushed to `inbound_tx`; `on_failure` is called
    /// at most once if the writer exhausts its retry budget or the reader
    /// hits a framing error (both fatal to the binding).
    pub async fn start(
        transport: Arc<dyn Transport>,
        inbound_tx: mpsc::Sender<Message>,
        on_failure: impl Fn(BindingFailure) + Send + Sync + 'static,
    ) -> Result<Self, Error> {
        let (reader, writer) = transport.start().await?;
        let reader_eof = Arc::new(Notify::new());
        let failed = Arc::new(AtomicBool::new(false));
        let on_failure = Arc::new(on_failure);

        let reader_task = tokio::spawn(Self::reader_loop(
            reader,
            inbound_tx,
            reader_eof.clone(),
            failed.clone(),
            on_failure.clone(),
        ));

        let (outbound_tx, outbound_rx) = mpsc::channel::<Value>(256);
        let writer_task = tokio::spawn(Self::writer_loop(
            writer,
            outbound_rx,
            failed.clone(),
            on_failure,
        ));

        Ok(Self {
            transport,
            outbound_tx,
            reader_eof,
            failed,
            reader_task,
            writer_task,
        })
    }

    async fn reader_loop(
        reader: Box<dyn AsyncRead + Unpin + Send>,
        inbound_tx: mpsc::Sender<Message>,
        reader_eof: Arc<Notify>,
        failed: Arc<AtomicBool>,
        on_failure: Arc<dyn Fn(BindingFailure) + Send + Sync>,
    ) {
        let mut buf = BufReader::new(reader);
        loop {
            match codec::read_message(&mut buf).await {
                Ok(Some(value)) => match Message::from_value(value) {
                    Ok(message) => {
                        if inbound_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "protocol violation decoding inbound message");
                        failed.store(true, Ordering::SeqCst);
                        on_failure(BindingFailure::ReaderFailed);
                        break;
                    }
                },
                Ok(None) => {
                    debug!("reader observed clean EOF");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "framing error, binding is fatal");
                    failed.store(true, Ordering::SeqCst);
                    on_failure(BindingFailure::ReaderFailed);
                    break;
                }
            }
        }
        reader_eof.notify_waiters();
    }

    async fn writer_loop(
        mut writer: Box<dyn AsyncWrite + Unpin + Send>,
        mut outbound_rx: mpsc::Receiver<Value>,
        failed: Arc<AtomicBool>,
        on_failure: Arc<dyn Fn(BindingFailure) + Send + Sync>,
    ) {
        while let Some(value) = outbound_rx.recv().await {
            let mut attempt = 0;
            loop {
                match codec::write_message(&mut writer, &value).await {
                    Ok(()) => break,
                    Err(e) if attempt + 1 < WRITE_RETRY_ATTEMPTS => {
                        attempt += 1;
                        warn!(attempt, error = %e, "transient write failure, retrying");
                        tokio::time::sleep(WRITE_RETRY_BASE * 2u32.pow(attempt - 1)).await;
                    }
                    Err(e) => {
                        error!(error = %e, "write failed after retry budget exhausted");
                        failed.store(true, Ordering::SeqCst);
                        on_failure(BindingFailure::WriteFailed);
                        return;
                    }
                }
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Synchronous, best-effort termination for the case where a caller
    /// dropped the binding without awaiting a graceful `close`.
    pub fn kill_best_effort(&self) {
        self.transport.kill();
    }

    /// Enqueue an outbound message. Backpressure: this awaits if the
    /// bounded queue is full rather than growing unboundedly.
    pub async fn send(&self, value: Value) -> Result<(), Error> {
        self.outbound_tx
            .send(value)
            .await
            .map_err(|_| Error::Terminated)
    }

    pub fn translate_path_in(&self, host_path: &Path) -> Option<Url> {
        self.transport.translate_path_in(host_path)
    }

    pub fn translate_path_out(&self, server_uri: &Url) -> Option<PathBuf> {
        self.transport.translate_path_out(server_uri)
    }

    /// Half-close the write side, wait up to a grace period for the
    /// reader to observe EOF, then force-kill if it hasn't.
    pub async fn close(self) {
        drop(self.outbound_tx);
        let _ = tokio::time::timeout(Duration::from_millis(500), self.writer_task).await;

        let wait_eof = self.reader_eof.notified();
        tokio::pin!(wait_eof);
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut wait_eof)
            .await
            .is_err()
        {
            warn!("reader did not observe EOF within grace period, killing transport");
            self.transport.kill();
        }
        self.reader_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::duplex;

    struct DuplexTransport {
        reader: tokio::sync::Mutex<Option<Box<dyn AsyncRead + Unpin + Send>>>,
        writer: tokio::sync::Mutex<Option<Box<dyn AsyncWrite + Unpin + Send>>>,
        kills: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for DuplexTransport {
        async fn start(
            &self,
        ) -> Result<
            (
                Box<dyn AsyncRead + Unpin + Send>,
                Box<dyn AsyncWrite + Unpin + Send>,
            ),
            Error,
        > {
            let reader = self.reader.lock().await.take().unwrap();
            let writer = self.writer.lock().await.take().unwrap();
            Ok((reader, writer))
        }

        fn kill(&self) {
            self.kills.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn send_reaches_peer_and_reader_decodes_it() {
        let (client_io, server_io) = duplex(4096);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (mut server_read, mut server_write) = tokio::io::split(server_io);

        let transport = Arc::new(DuplexTransport {
            reader: tokio::sync::Mutex::new(Some(Box::new(client_read))),
            writer: tokio::sync::Mutex::new(Some(Box::new(client_write))),
            kills: Arc::new(AtomicUsize::new(0)),
        });

        let (inbound_tx, mut inbound_rx) = mpsc::channel(16);
        let binding = TransportBinding::start(transport, inbound_tx, |_| {}).await.unwrap();

        binding
            .send(serde_json::json!({"jsonrpc":"2.0","method":"ping","params":null}))
            .await
            .unwrap();

        let mut buf = BufReader::new(&mut server_read);
        let received = codec::read_message(&mut buf).await.unwrap().unwrap();
        assert_eq!(received["method"], "ping");

        codec::write_message(
            &mut server_write,
            &serde_json::json!({"jsonrpc":"2.0","method":"pong","params":null}),
        )
        .await
        .unwrap();

        let message = inbound_rx.recv().await.unwrap();
        assert!(matches!(message, Message::Notification { method, .. } if method == "pong"));

        drop(server_write);
        binding.close().await;
    }

    #[tokio::test]
    async fn force_kill_on_reader_timeout() {
        let (client_io, server_io) = duplex(4096);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (_server_read, _server_write) = tokio::io::split(server_io);

        let kills = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(DuplexTransport {
            reader: tokio::sync::Mutex::new(Some(Box::new(client_read))),
            writer: tokio::sync::Mutex::new(Some(Box::new(client_write))),
            kills: kills.clone(),
        });

        let (inbound_tx, _inbound_rx) = mpsc::channel(16);
        let binding = TransportBinding::start(transport, inbound_tx, |_| {}).await.unwrap();
        // Server side stays open (never drops), so the reader never sees EOF
        // and close() must fall back to kill() after the grace period.
        binding.close().await;
        assert_eq!(kills.load(Ordering::SeqCst), 1);
    }
}
