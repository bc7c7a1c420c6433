//! Error types shared across the lsp-client workspace
//!
//! This module provides a unified error handling strategy using `thiserror`
//! for defining error types and `anyhow` for error propagation with context.

use thiserror::Error;

/// The primary error type for engine-level operations.
///
/// This taxonomy mirrors the error kinds a protocol engine surfaces to
/// callers: framing/protocol violations are fatal to a binding, capability
/// rejection is fatal to a session, and the remainder are per-request
/// outcomes.
#[derive(Error, Debug)]
pub enum Error {
    // ===== Transport / framing =====
    #[error("malformed LSP frame: {0}")]
    Framing(String),

    #[error("JSON-RPC protocol violation: {0}")]
    Protocol(String),

    // ===== Capability negotiation =====
    #[error(
        "server does not support capability required by feature `{feature}` (method `{method}`)"
    )]
    CapabilityUnsupported { feature: String, method: String },

    // ===== JSON-RPC error codes reported by or to a server =====
    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("internal error: {0}")]
    InternalError(String),

    // ===== Request lifecycle outcomes =====
    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("binding or session terminated before request completed")]
    Terminated,

    #[error("pool saturated: no binding slot available")]
    PoolSaturated,

    // ===== Document sync =====
    #[error("file not found: {0}")]
    FileNotFound(std::path::PathBuf),

    // ===== Configuration =====
    #[error("invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    // ===== Generic =====
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse-grained classification used for logging/telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    Capability,
    Rpc,
    Lifecycle,
    Sync,
    Config,
    Internal,
}

impl Error {
    /// Get the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Framing(_) | Error::Protocol(_) | Error::Io(_) => ErrorKind::Transport,

            Error::CapabilityUnsupported { .. } => ErrorKind::Capability,

            Error::MethodNotFound(_) | Error::InvalidParams(_) | Error::InternalError(_) => {
                ErrorKind::Rpc
            }

            Error::Cancelled | Error::Timeout(_) | Error::Terminated | Error::PoolSaturated => {
                ErrorKind::Lifecycle
            }

            Error::FileNotFound(_) => ErrorKind::Sync,

            Error::InvalidConfig { .. } => ErrorKind::Config,

            Error::Json(_) | Error::Internal(_) | Error::Other(_) => ErrorKind::Internal,
        }
    }

    /// Whether a caller could reasonably retry after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::Cancelled | Error::FileNotFound(_) | Error::PoolSaturated
        )
    }
}

/// Extension trait for adding context to errors, matching `anyhow::Context`
/// but collapsing into this crate's `Result`.
pub trait ErrorContext<T> {
    fn context<C>(self, context: C) -> crate::Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static;

    fn with_context<C, F>(self, f: F) -> crate::Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context<C>(self, context: C) -> crate::Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| Error::Other(anyhow::Error::from(e).context(context)))
    }

    fn with_context<C, F>(self, f: F) -> crate::Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| Error::Other(anyhow::Error::from(e).context(f())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        let err = Error::FileNotFound("/test".into());
        assert_eq!(err.kind(), ErrorKind::Sync);

        let err = Error::CapabilityUnsupported {
            feature: "rename".into(),
            method: "textDocument/rename".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Capability);
    }

    #[test]
    fn test_error_recoverable() {
        assert!(Error::Timeout(std::time::Duration::from_secs(5)).is_recoverable());
        assert!(!Error::Terminated.is_recoverable());
    }
}
