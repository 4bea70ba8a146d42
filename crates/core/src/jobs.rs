//! Background Job Types
//!
//! Jobs known to the backend that this client did not necessarily start.
//! The client only ever holds a read-only snapshot of them.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A backend job as reported by the running-tasks endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundJob {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Percent complete (0-100)
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub status: String,
}

/// Response of the running-tasks endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub tasks: Vec<BackgroundJob>,
    #[serde(default)]
    pub total_tasks: usize,
}

impl TaskStatusResponse {
    /// Number of running jobs. The list length wins over a stale `total_tasks`.
    pub fn job_count(&self) -> usize {
        self.tasks.len()
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}
