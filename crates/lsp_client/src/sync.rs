//! Reference-counted `didOpen`/`didClose` bracketing around scoped use
//!
//! `with_documents` is the only entry point: it opens every path that
//! isn't already open (first opener reads the file and emits `didOpen`),
//! runs the caller's scoped body, then closes every path whose reference
//! count drops back to zero (last closer emits `didClose`). Because the
//! body is awaited to completion before any `didClose` is emitted, no
//! request issued inside the scope can ever be sent after its document
//! closed on this binding.

use crate::message::Message;
use dashmap::DashMap;
use lsp_support::Error;
use serde_json::json;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use tracing::debug;
use url::Url;

struct SyncEntry {
    open_count: AtomicUsize,
    version: AtomicI32,
}

/// Per-binding table of currently-open documents.
#[derive(Default)]
pub struct SyncGuard {
    entries: DashMap<Url, SyncEntry>,
}

impl SyncGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_count(&self, uri: &Url) -> usize {
        self.entries
            .get(uri)
            .map(|e| e.open_count.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Acquire every unique path in `paths`, run `body` with the resolved
    /// URIs, then release them. `send` is the binding's outbound sink,
    /// used to emit `didOpen`/`didClose` notifications.
    pub async fn with_documents<F, Fut, T>(
        &self,
        paths: &[PathBuf],
        language_id: &str,
        send: &(dyn Fn(Message) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync),
        body: F,
    ) -> Result<T, Error>
    where
        F: FnOnce(Vec<Url>) -> Fut,
        Fut: Future<Output = T>,
    {
        let mut unique: Vec<PathBuf> = Vec::new();
        for path in paths {
            if !unique.contains(path) {
                unique.push(path.clone());
            }
        }

        let mut uris = Vec::with_capacity(unique.len());
        for path in &unique {
            uris.push(self.open(path, language_id, send).await?);
        }

        let result = body(uris.clone()).await;

        for uri in &uris {
            self.close(uri, send).await;
        }

        Ok(result)
    }

    async fn open(
        &self,
        path: &Path,
        language_id: &str,
        send: &(dyn Fn(Message) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync),
    ) -> Result<Url, Error> {
        let uri = crate::uri::path_to_uri(path)?;

        let needs_read = !self.entries.contains_key(&uri);
        let text = if needs_read {
            Some(
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|_| Error::FileNotFound(path.to_path_buf()))?,
            )
        } else {
            None
        };

        let entry = self
            .entries
            .entry(uri.clone())
            .or_insert_with(|| SyncEntry {
                open_count: AtomicUsize::new(0),
                version: AtomicI32::new(0),
            });
        let previous = entry.open_count.fetch_add(1, Ordering::SeqCst);

        if previous == 0 {
            let version = entry.version.fetch_add(1, Ordering::SeqCst) + 1;
            let text = text.expect("first opener always reads the file");
            debug!(%uri, "emitting didOpen");
            send(Message::notification(
                "textDocument/didOpen",
                json!({
                    "textDocument": {
                        "uri": uri.as_str(),
                        "languageId": language_id,
                        "version": version,
                        "text": text,
                    }
                }),
            ))
            .await;
        }

        Ok(uri)
    }

    async fn close(
        &self,
        uri: &Url,
        send: &(dyn Fn(Message) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync),
    ) {
        let Some(entry) = self.entries.get(uri) else {
            return;
        };
        let previous = entry.open_count.fetch_sub(1, Ordering::SeqCst);
        drop(entry);

        if previous == 1 {
            debug!(%uri, "emitting didClose");
            send(Message::notification(
                "textDocument/didClose",
                json!({ "textDocument": { "uri": uri.as_str() } }),
            ))
            .await;
            self.entries.remove(uri);
        }
    }
}
