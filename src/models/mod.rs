//! Data Models
//!
//! Contains the data structures used throughout the client.

pub mod response;
pub mod settings;
pub mod stage;

pub use response::*;
pub use settings::*;
pub use stage::*;
