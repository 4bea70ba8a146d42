//! Progress Stream Adapters
//!
//! Each adapter handles one wire format of the progress channel.

pub mod sse;

pub use sse::{SseLineBuffer, SseProgressAdapter};
