//! lsp-support
//!
//! Error, id, and telemetry primitives shared by the `lsp_client`
//! protocol engine. This crate carries no LSP-specific types of its own.

pub mod error;
pub mod id;
pub mod result;
pub mod telemetry;

// Re-exports for convenience
pub use error::{Error, ErrorContext, ErrorKind};
pub use id::{BindingId, RequestId, SessionId};
pub use result::Result;

/// Engine-wide constants
pub mod constants {
  use std::time::Duration;

  /// Default timeout for a request awaiting a response.
  pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

  /// Default bound on in-flight requests per server binding before
  /// new requests queue for backpressure.
  pub const DEFAULT_MAX_INFLIGHT_PER_BINDING: usize = 64;
}

/// Prelude module for common imports
pub mod prelude {
  pub use crate::error::{Error, ErrorContext, ErrorKind};
  pub use crate::id::{BindingId, RequestId, SessionId};
  pub use crate::result::Result;
  pub use anyhow::Context as AnyhowContext;
  pub use tracing::{debug, error, info, instrument, trace, warn};
}
