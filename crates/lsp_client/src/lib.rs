//! LSP client protocol engine
//!
//! A transport-agnostic Language Server Protocol 3.17 client: frame
//! codec, JSON-RPC message model, request/response correlation, a
//! capability-gated feature surface, document-sync bookkeeping, and a
//! pool for load-balancing across several equivalent server processes.
//! The engine never spawns a process itself — callers provide a
//! `Transport` implementation.

pub mod binding;
pub mod capability;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod features;
pub mod handlers;
pub mod lifecycle;
pub mod message;
pub mod pending;
pub mod pool;
pub mod session;
pub mod sync;
pub mod transport;
pub mod uri;

pub use binding::{Binding, BindingState};
pub use capability::{Composer, FeatureModule};
pub use config::{ChangeReason, ConfigStore};
pub use lifecycle::LifecycleState;
pub use message::{Id, JsonRpcError, Message};
pub use pool::Pool;
pub use session::{CancelHandle, Scope, Session, SessionConfig};
pub use transport::{BindingFailure, Transport};

pub use lsp_support::{constants, BindingId, Error, RequestId, Result, SessionId};
