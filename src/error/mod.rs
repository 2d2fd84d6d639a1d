//! Error types for the fwvpnd daemon.
//!
//! Provides a unified error handling system using thiserror.

mod types;

pub use types::*;
