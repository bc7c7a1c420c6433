//! Result type alias shared across the workspace

use crate::error::Error;

/// A specialized Result type for engine operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
