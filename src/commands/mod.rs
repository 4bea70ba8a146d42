//! Commands
//!
//! Entry points used by the command line. Each returns a
//! [`CommandResponse`](crate::models::response::CommandResponse).

pub mod health;
pub mod resume;
pub mod settings;
pub mod stages;
pub mod tasks;

pub use health::*;
pub use resume::*;
pub use settings::*;
pub use stages::*;
pub use tasks::*;
