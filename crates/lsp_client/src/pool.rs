//! Load-balances requests across N equivalent server bindings
//!
//! Document-scoped requests hash their URI set to a single binding so a
//! given document is always opened on the same one — this keeps
//! document-sync state partitioned and avoids N-fold `didOpen` storms.
//! Workspace-scoped requests (no file URIs) use least-outstanding-requests.
//! At this pool size (bounded by the number of spawned server processes,
//! realistically single digits) a `std::hash` + modulo is all the
//! consistent hashing a document-scoped route needs.

use crate::binding::Binding;
use lsp_support::Error;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::Notify;
use url::Url;

/// A set of equivalent bindings serving one session.
pub struct Pool {
    bindings: Vec<Arc<Binding>>,
    max_inflight_per_binding: usize,
    /// Shared with every `Binding`, which signals it on each request
    /// completion so `await_slot`/`route_workspace_scoped` wake instead of
    /// blocking forever under sustained saturation.
    slot_freed: Arc<Notify>,
}

impl Pool {
    pub fn new(
        bindings: Vec<Arc<Binding>>,
        max_inflight_per_binding: usize,
        slot_freed: Arc<Notify>,
    ) -> Self {
        Self {
            bindings,
            max_inflight_per_binding,
            slot_freed,
        }
    }

    pub fn bindings(&self) -> &[Arc<Binding>] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn live_bindings(&self) -> Vec<&Arc<Binding>> {
        self.bindings.iter().filter(|b| !b.is_down()).collect()
    }

    /// Route a document-scoped request by consistent hashing of its URI
    /// set.
    pub async fn route_document_scoped(&self, uris: &[Url]) -> Result<Arc<Binding>, Error> {
        let live = self.live_bindings();
        if live.is_empty() {
            return Err(Error::PoolSaturated);
        }
        let mut hasher = DefaultHasher::new();
        let mut sorted: Vec<&str> = uris.iter().map(Url::as_str).collect();
        sorted.sort_unstable();
        for uri in sorted {
            uri.hash(&mut hasher);
        }
        let index = (hasher.finish() as usize) % live.len();
        self.await_slot(live[index]).await
    }

    /// Route a workspace-scoped request (no file URIs) to the binding
    /// with the fewest in-flight requests.
    pub async fn route_workspace_scoped(&self) -> Result<Arc<Binding>, Error> {
        loop {
            let live = self.live_bindings();
            if live.is_empty() {
                return Err(Error::PoolSaturated);
            }
            let least = live
                .iter()
                .min_by_key(|b| b.inflight_count())
                .expect("live is non-empty");
            if least.inflight_count() < self.max_inflight_per_binding {
                return Ok((*least).clone());
            }
            self.slot_freed.notified().await;
        }
    }

    async fn await_slot(&self, binding: &Arc<Binding>) -> Result<Arc<Binding>, Error> {
        loop {
            if binding.is_down() {
                return Err(Error::PoolSaturated);
            }
            if binding.inflight_count() < self.max_inflight_per_binding {
                return Ok(binding.clone());
            }
            self.slot_freed.notified().await;
        }
    }

    /// Fan a notification out to every binding (e.g.
    /// `didChangeConfiguration`).
    pub async fn broadcast(&self, method: &str, params: serde_json::Value) {
        for binding in &self.bindings {
            if binding.is_down() {
                continue;
            }
            if let Err(e) = binding.notify(method, params.clone()).await {
                tracing::warn!(error = %e, binding = %binding.id, "broadcast notification failed");
            }
        }
    }

    pub async fn shutdown(&self) {
        for binding in &self.bindings {
            binding.clone().shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HandlerRegistry;
    use crate::transport::Transport;
    use async_trait::async_trait;
    use std::path::Path;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncRead, AsyncWrite};

    #[test]
    fn same_uri_set_always_hashes_to_the_same_index() {
        let uris = vec![
            Url::parse("file:///a.py").unwrap(),
            Url::parse("file:///b.py").unwrap(),
        ];
        let hash_of = |uris: &[Url]| {
            let mut hasher = DefaultHasher::new();
            let mut sorted: Vec<&str> = uris.iter().map(Url::as_str).collect();
            sorted.sort_unstable();
            for uri in sorted {
                uri.hash(&mut hasher);
            }
            hasher.finish()
        };
        assert_eq!(hash_of(&uris), hash_of(&[uris[1].clone(), uris[0].clone()]));
    }

    struct DiscardTransport {
        client_read: tokio::sync::Mutex<Option<Box<dyn AsyncRead + Unpin + Send>>>,
        client_write: tokio::sync::Mutex<Option<Box<dyn AsyncWrite + Unpin + Send>>>,
    }

    #[async_trait]
    impl Transport for DiscardTransport {
        async fn start(
            &self,
        ) -> Result<(Box<dyn AsyncRead + Unpin + Send>, Box<dyn AsyncWrite + Unpin + Send>), Error>
        {
            let reader = self.client_read.lock().await.take().unwrap();
            let writer = self.client_write.lock().await.take().unwrap();
            Ok((reader, writer))
        }
        fn kill(&self) {}
        fn translate_path_in(&self, _host_path: &Path) -> Option<Url> {
            None
        }
    }

    /// A binding that never replies, wired into a one-slot pool. Regression
    /// test for a deadlock where nothing ever called `notify_waiters` on a
    /// binding's completion, so a saturated pool blocked forever even once
    /// the in-flight request finished.
    #[tokio::test]
    async fn route_workspace_scoped_wakes_once_the_occupying_request_finishes() {
        let (client_io, server_io) = duplex(8192);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (mut server_read, _server_write) = tokio::io::split(server_io);
        tokio::spawn(async move {
            let mut buf = tokio::io::BufReader::new(&mut server_read);
            while crate::codec::read_message(&mut buf).await.ok().flatten().is_some() {}
        });
        let transport = Arc::new(DiscardTransport {
            client_read: tokio::sync::Mutex::new(Some(Box::new(client_read))),
            client_write: tokio::sync::Mutex::new(Some(Box::new(client_write))),
        });

        let slot_freed = Arc::new(tokio::sync::Notify::new());
        let binding = Binding::connect(transport, Arc::new(HandlerRegistry::new()), slot_freed.clone())
            .await
            .unwrap();
        let pool = Arc::new(Pool::new(vec![binding.clone()], 1, slot_freed));

        let (id, handle) = binding
            .begin_request("workspace/symbol", serde_json::Value::Null, None, None)
            .await
            .unwrap();
        assert_eq!(binding.inflight_count(), 1);

        let route = tokio::spawn({
            let pool = pool.clone();
            async move { pool.route_workspace_scoped().await }
        });

        // The only binding is at capacity: the route must still be pending.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!route.is_finished());

        binding.cancel(id).await.unwrap();
        binding.finish_request(id, handle, None).await.unwrap_err();

        let routed = tokio::time::timeout(Duration::from_secs(1), route)
            .await
            .expect("route_workspace_scoped should wake once the slot frees")
            .unwrap()
            .unwrap();
        assert_eq!(routed.id, binding.id);
    }
}
