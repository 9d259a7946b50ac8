//! gnat-utils: Common utilities shared across gnat crates
//!
//! This crate provides:
//! - Unified error types ([`GnatError`], [`Result`])
//! - Logging infrastructure ([`init_logging`], [`LogConfig`])

pub mod error;
pub mod logging;

// Re-export main types at crate root for convenience
pub use error::{GnatError, Result};
pub use logging::{init_logging, init_logging_with_config, LogConfig};
