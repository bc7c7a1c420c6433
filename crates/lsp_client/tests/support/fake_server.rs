//! In-memory `Transport` backed by `tokio::io::duplex`, driven by a
//! scripted async closure standing in for a real server process.

use async_trait::async_trait;
use lsp_client::Transport;
use lsp_support::Error;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// The server side of the duplex pipe, handed to the scripted closure.
pub struct ServerHalf {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl ServerHalf {
    pub async fn recv(&mut self) -> Value {
        lsp_client::codec::read_message(&mut self.reader)
            .await
            .expect("framing error on the fake server side")
            .expect("peer closed before sending the expected message")
    }

    pub async fn send(&mut self, value: Value) {
        lsp_client::codec::write_message(&mut self.writer, &value)
            .await
            .expect("fake server write failed");
    }
}

pub struct FakeServer {
    client_read: Mutex<Option<Box<dyn AsyncRead + Unpin + Send>>>,
    client_write: Mutex<Option<Box<dyn AsyncWrite + Unpin + Send>>>,
    kills: Arc<AtomicUsize>,
    script: Mutex<Option<JoinHandle<()>>>,
}

impl FakeServer {
    /// Spawn the scripted server behavior immediately and return a
    /// `Transport` whose `start()` hands out the client side of the pipe.
    pub fn spawn<F, Fut>(script: F) -> Arc<Self>
    where
        F: FnOnce(ServerHalf) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (client_io, server_io) = tokio::io::duplex(32 * 1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (server_read, server_write) = tokio::io::split(server_io);
        let script = tokio::spawn(script(ServerHalf {
            reader: BufReader::new(server_read),
            writer: server_write,
        }));
        Arc::new(Self {
            client_read: Mutex::new(Some(Box::new(client_read))),
            client_write: Mutex::new(Some(Box::new(client_write))),
            kills: Arc::new(AtomicUsize::new(0)),
            script: Mutex::new(Some(script)),
        })
    }

    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    /// Await the scripted server task to completion, propagating any
    /// assertion panic from inside the script into the calling test.
    pub async fn join(&self) {
        let handle = self.script.lock().await.take();
        if let Some(handle) = handle {
            handle.await.expect("fake server script panicked");
        }
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn start(
        &self,
    ) -> Result<(Box<dyn AsyncRead + Unpin + Send>, Box<dyn AsyncWrite + Unpin + Send>), Error> {
        let reader = self.client_read.lock().await.take().expect("start() called once");
        let writer = self.client_write.lock().await.take().expect("start() called once");
        Ok((reader, writer))
    }

    fn kill(&self) {
        self.kills.fetch_add(1, Ordering::SeqCst);
    }
}
