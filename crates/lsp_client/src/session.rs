//! Caller-facing scoped handle driving one session's lifecycle
//!
//! `Session::connect` drives `constructed → initializing → running`: spawn
//! one binding per transport, send `initialize` on each, validate the
//! reported capabilities, register feature handlers, send `initialized`.
//! A binding that fails to initialize, or whose capabilities a feature
//! rejects, fails the whole session — there is no partially-initialized
//! session. `Session::shutdown` consumes the handle and drives
//! `running → shutting-down → terminated`.

use crate::binding::{Binding, BindingState};
use crate::capability::{Composer, FeatureModule};
use crate::config::ConfigStore;
use crate::handlers::HandlerRegistry;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::pending::Decoder;
use crate::pool::Pool;
use crate::transport::Transport;
use lsp_support::constants::{DEFAULT_MAX_INFLIGHT_PER_BINDING, DEFAULT_REQUEST_TIMEOUT};
use lsp_support::Error;
use lsp_types::{ClientInfo, InitializeParams, InitializeResult, InitializedParams, WorkspaceFolder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// Where a request is routed: a fixed binding chosen by hashing the
/// document set, or the least-loaded binding for requests with no file
/// scope.
pub enum Scope<'a> {
    Document(&'a [Url]),
    Workspace,
}

/// Cancels the in-flight request it was returned alongside.
pub struct CancelHandle {
    binding: Arc<Binding>,
    id: lsp_support::RequestId,
}

impl CancelHandle {
    pub async fn cancel(&self) -> Result<(), Error> {
        self.binding.cancel(self.id).await
    }
}

pub struct SessionConfig {
    pub workspace_roots: Vec<PathBuf>,
    pub client_info: Option<ClientInfo>,
    pub initialization_options: Option<Value>,
    pub max_inflight_per_binding: usize,
    pub request_timeout: Duration,
    /// Shared with any `WorkspaceConfigurationFeature` passed in `features`
    /// so pushes/pulls act on the same tree the session exposes.
    pub config: Arc<ConfigStore>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            workspace_roots: Vec::new(),
            client_info: None,
            initialization_options: None,
            max_inflight_per_binding: DEFAULT_MAX_INFLIGHT_PER_BINDING,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            config: Arc::new(ConfigStore::new()),
        }
    }
}

pub struct Session {
    lifecycle: Lifecycle,
    pool: Pool,
    composer: Composer,
    pub config: Arc<ConfigStore>,
    request_timeout: Duration,
}

impl Session {
    /// Spawn and initialize one binding per transport. On any failure,
    /// every binding that did come up is shut down and the whole call
    /// fails — callers never see a partially-running session.
    pub async fn connect(
        transports: Vec<Arc<dyn Transport>>,
        features: Vec<Arc<dyn FeatureModule>>,
        options: SessionConfig,
    ) -> Result<Arc<Self>, Error> {
        let lifecycle = Lifecycle::new();
        lifecycle.begin_initializing()?;

        let composer = Composer::new(features);
        let client_capabilities = composer.build_client_capabilities();

        let workspace_folders: Vec<WorkspaceFolder> = options
            .workspace_roots
            .iter()
            .filter_map(|root| {
                crate::uri::path_to_uri(root).ok().map(|uri| WorkspaceFolder {
                    uri,
                    name: root
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                })
            })
            .collect();
        let root_uri = workspace_folders.first().map(|f| f.uri.clone());

        let slot_freed = Arc::new(tokio::sync::Notify::new());
        let mut bindings = Vec::with_capacity(transports.len());
        for transport in transports {
            match Self::initialize_binding(
                transport,
                &composer,
                &client_capabilities,
                &workspace_folders,
                root_uri.clone(),
                &options,
                slot_freed.clone(),
            )
            .await
            {
                Ok(binding) => bindings.push(binding),
                Err(e) => {
                    warn!(error = %e, "binding failed to initialize, failing whole session");
                    for binding in bindings {
                        binding.shutdown().await;
                    }
                    lifecycle.begin_shutdown().ok();
                    lifecycle.mark_terminated().ok();
                    return Err(e);
                }
            }
        }

        lifecycle.mark_running()?;
        info!(bindings = bindings.len(), "session initialized");
        lsp_support::telemetry::metrics::ACTIVE_SESSIONS.increment();

        let config = options.config.clone();
        Ok(Arc::new(Self {
            lifecycle,
            pool: Pool::new(bindings, options.max_inflight_per_binding, slot_freed),
            composer,
            config,
            request_timeout: options.request_timeout,
        }))
    }

    async fn initialize_binding(
        transport: Arc<dyn Transport>,
        composer: &Composer,
        client_capabilities: &lsp_types::ClientCapabilities,
        workspace_folders: &[WorkspaceFolder],
        root_uri: Option<Url>,
        options: &SessionConfig,
        slot_freed: Arc<tokio::sync::Notify>,
    ) -> Result<Arc<Binding>, Error> {
        lsp_support::time_operation!("session_initialize_binding", threshold = 500);
        let handlers = Arc::new(HandlerRegistry::new());
        let binding = Binding::connect(transport, handlers.clone(), slot_freed).await?;

        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_uri,
            workspace_folders: Some(workspace_folders.to_vec()),
            capabilities: client_capabilities.clone(),
            initialization_options: options.initialization_options.clone(),
            client_info: options.client_info.clone(),
            ..Default::default()
        };

        let decoder: Decoder = Box::new(|v: Value| {
            serde_json::from_value::<InitializeResult>(v)
                .map(|r| Box::new(r) as Box<dyn Any + Send>)
                .map_err(Error::from)
        });

        let raw = binding
            .request(
                "initialize",
                serde_json::to_value(params)?,
                Some(decoder),
                Some(options.request_timeout),
            )
            .await?;
        let result = *raw.downcast::<InitializeResult>().map_err(|_| {
            Error::Internal("initialize response decoded to the wrong type".into())
        })?;

        composer.validate(&result.capabilities)?;
        binding.set_server_capabilities(result.capabilities);
        composer.register_handlers(&handlers)?;
        handlers.lock();

        binding
            .notify("initialized", serde_json::to_value(InitializedParams {})?)
            .await?;
        binding.set_state(BindingState::Ready);

        Ok(binding)
    }

    pub fn is_supported(&self, feature: &str) -> bool {
        self.composer.is_supported(feature)
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.lifecycle.get()
    }

    /// Send a request, routed per `scope`, and decode its result as `T`.
    pub async fn call<T: DeserializeOwned + Send + 'static>(
        &self,
        scope: Scope<'_>,
        method: &str,
        params: Value,
    ) -> Result<T, Error> {
        self.lifecycle.ensure_running()?;
        let binding = self.route(scope).await?;
        let decoder: Decoder = Box::new(|v: Value| {
            serde_json::from_value::<T>(v)
                .map(|t| Box::new(t) as Box<dyn Any + Send>)
                .map_err(Error::from)
        });
        let raw = binding
            .request(method, params, Some(decoder), Some(self.request_timeout))
            .await?;
        raw.downcast::<T>().map(|b| *b).map_err(|_| {
            Error::Internal(format!("{method} response decoded to the wrong type"))
        })
    }

    /// Like `call`, but returns a `CancelHandle` alongside the pending
    /// result so a caller can cancel the request before the server
    /// replies. Cancelling sends `$/cancelRequest` if the request had
    /// already gone out on the wire; a reply that arrives afterward is
    /// silently dropped by the pending table.
    pub async fn call_cancelable<T: DeserializeOwned + Send + 'static>(
        &self,
        scope: Scope<'_>,
        method: &str,
        params: Value,
    ) -> Result<(CancelHandle, impl Future<Output = Result<T, Error>>), Error> {
        self.lifecycle.ensure_running()?;
        let binding = self.route(scope).await?;
        let method_owned = method.to_string();
        let decoder: Decoder = Box::new(|v: Value| {
            serde_json::from_value::<T>(v)
                .map(|t| Box::new(t) as Box<dyn Any + Send>)
                .map_err(Error::from)
        });
        let (id, handle) = binding
            .begin_request(method, params, Some(decoder), Some(self.request_timeout))
            .await?;

        let cancel_handle = CancelHandle {
            binding: binding.clone(),
            id,
        };
        let deadline = self.request_timeout;
        let wait_binding = binding;
        let result = async move {
            let raw = wait_binding.finish_request(id, handle, Some(deadline)).await?;
            raw.downcast::<T>().map(|b| *b).map_err(|_| {
                Error::Internal(format!("{method_owned} response decoded to the wrong type"))
            })
        };
        Ok((cancel_handle, result))
    }

    pub async fn notify(&self, scope: Scope<'_>, method: &str, params: Value) -> Result<(), Error> {
        self.lifecycle.ensure_running()?;
        let binding = self.route(scope).await?;
        binding.notify(method, params).await
    }

    /// Fan a notification out to every live binding, e.g.
    /// `workspace/didChangeConfiguration`.
    pub async fn broadcast(&self, method: &str, params: Value) -> Result<(), Error> {
        self.lifecycle.ensure_running()?;
        self.pool.broadcast(method, params).await;
        Ok(())
    }

    /// Open `paths` for the duration of `body`, routed to a single binding
    /// chosen by hashing the document set so sync state stays partitioned.
    pub async fn with_documents<F, Fut, T>(
        &self,
        paths: &[PathBuf],
        language_id: &str,
        body: F,
    ) -> Result<T, Error>
    where
        F: FnOnce(Vec<Url>) -> Fut,
        Fut: Future<Output = T>,
    {
        self.lifecycle.ensure_running()?;
        let uris = paths
            .iter()
            .map(|p| crate::uri::path_to_uri(p))
            .collect::<Result<Vec<Url>, Error>>()?;
        let binding = self.pool.route_document_scoped(&uris).await?;
        binding.with_documents(paths, language_id, body).await
    }

    async fn route(&self, scope: Scope<'_>) -> Result<Arc<Binding>, Error> {
        match scope {
            Scope::Document(uris) => self.pool.route_document_scoped(uris).await,
            Scope::Workspace => self.pool.route_workspace_scoped().await,
        }
    }

    /// Consume the session: send `shutdown`/`exit` to every live binding,
    /// then close every transport.
    pub async fn shutdown(self: Arc<Self>) {
        self.lifecycle.begin_shutdown().ok();
        for binding in self.pool.bindings() {
            if binding.is_down() {
                continue;
            }
            if let Err(e) = binding
                .request("shutdown", Value::Null, None, Some(self.request_timeout))
                .await
            {
                warn!(error = %e, "shutdown request failed, sending exit anyway");
            }
            let _ = binding.notify("exit", Value::Null).await;
        }

        match Arc::try_unwrap(self) {
            Ok(inner) => {
                inner.pool.shutdown().await;
                inner.lifecycle.mark_terminated().ok();
            }
            Err(shared) => {
                warn!("session still referenced elsewhere at shutdown, bindings close on drop");
                shared.lifecycle.mark_terminated().ok();
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.lifecycle.get() != LifecycleState::Terminated {
            warn!("session dropped without an explicit shutdown, force-killing bindings");
            for binding in self.pool.bindings() {
                binding.kill_best_effort();
            }
        }
        lsp_support::telemetry::metrics::ACTIVE_SESSIONS.decrement();
    }
}
