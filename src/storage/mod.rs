//! Storage Layer
//!
//! Handles all data persistence: the JSON config file and durable client storage.

pub mod config;
pub mod durable;

pub use config::*;
pub use durable::*;
