//! Method → handler registration for server-initiated traffic
//!
//! Two maps: an ordered, fan-out list per notification method, and a
//! single responder per request method. Registration is only permitted
//! while the binding is still wiring itself up; once serving starts the
//! registry is locked so the wire can be considered idle with respect to
//! handler changes.

use crate::message::JsonRpcError;
use dashmap::DashMap;
use futures::future::BoxFuture;
use lsp_support::Error;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type NotificationHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;
pub type RequestHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, JsonRpcError>> + Send + Sync>;

#[derive(Default)]
pub struct HandlerRegistry {
    notifications: DashMap<String, Vec<NotificationHandler>>,
    requests: DashMap<String, RequestHandler>,
    locked: AtomicBool,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forbid further registration. Called once the lifecycle leaves
    /// `Constructed`/`Initializing`.
    pub fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// Register a handler for a server notification. Multiple handlers
    /// per method fan out in registration order.
    pub fn on_notification(&self, method: impl Into<String>, handler: NotificationHandler) -> Result<(), Error> {
        if self.is_locked() {
            return Err(Error::Protocol(
                "handler registration attempted after lifecycle left initializing".into(),
            ));
        }
        self.notifications.entry(method.into()).or_default().push(handler);
        Ok(())
    }

    /// Register the single responder for a server request method.
    pub fn on_request(&self, method: impl Into<String>, handler: RequestHandler) -> Result<(), Error> {
        if self.is_locked() {
            return Err(Error::Protocol(
                "handler registration attempted after lifecycle left initializing".into(),
            ));
        }
        let method = method.into();
        if self.requests.contains_key(&method) {
            return Err(Error::Protocol(format!(
                "method {method} already has a request handler (at most one responder per method)"
            )));
        }
        self.requests.insert(method, handler);
        Ok(())
    }

    pub fn notification_handlers(&self, method: &str) -> Vec<NotificationHandler> {
        self.notifications
            .get(method)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn request_handler(&self, method: &str) -> Option<RequestHandler> {
        self.requests.get(method).map(|h| h.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_fan_out_preserves_registration_order() {
        let registry = HandlerRegistry::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let order = order.clone();
            registry
                .on_notification(
                    "textDocument/publishDiagnostics",
                    Arc::new(move |_v| {
                        order.lock().unwrap().push(tag);
                        Box::pin(async {})
                    }),
                )
                .unwrap();
        }

        let handlers = registry.notification_handlers("textDocument/publishDiagnostics");
        assert_eq!(handlers.len(), 2);
    }

    #[test]
    fn at_most_one_request_handler_per_method() {
        let registry = HandlerRegistry::new();
        let h: RequestHandler = Arc::new(|_v| Box::pin(async { Ok(Value::Null) }));
        registry.on_request("workspace/configuration", h.clone()).unwrap();
        let err = registry.on_request("workspace/configuration", h).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn registration_rejected_after_lock() {
        let registry = HandlerRegistry::new();
        registry.lock();
        let h: NotificationHandler = Arc::new(|_v| Box::pin(async {}));
        let err = registry.on_notification("x", h).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }
}
