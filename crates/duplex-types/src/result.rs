//! Result type alias for duplex operations

use crate::Error;

/// Result type alias for duplex operations
pub type Result<T> = std::result::Result<T, Error>;
