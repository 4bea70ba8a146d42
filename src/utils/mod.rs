//! Utilities
//!
//! Common utilities used throughout the client.

pub mod error;
pub mod paths;

pub use error::*;
pub use paths::*;
