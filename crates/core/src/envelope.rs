//! Response Envelopes
//!
//! Backend responses arrive wrapped in a JSON envelope. Simple stages use
//! [`ApiEnvelope`]; the n-gram analysis sub-requests use [`NgramEnvelope`].
//! This module turns a raw envelope into an [`EnvelopeOutcome`], flattening
//! structured validation errors into a single readable message.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message used when a failed envelope carries no detail at all.
pub const GENERIC_FAILURE: &str = "Request failed";

/// One field-level validation problem, e.g. `{"loc": ["body", "region"], "msg": "field required"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    #[serde(default)]
    pub loc: Vec<Value>,
    #[serde(alias = "message")]
    pub msg: String,
}

impl ValidationIssue {
    /// Render as `field.path: message`. A leading `body` segment is dropped
    /// since it only names the request part.
    pub fn render(&self) -> String {
        let path: Vec<String> = self
            .loc
            .iter()
            .filter_map(|segment| match segment {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .enumerate()
            .filter(|(i, s)| !(*i == 0 && s == "body"))
            .map(|(_, s)| s)
            .collect();

        if path.is_empty() {
            self.msg.clone()
        } else {
            format!("{}: {}", path.join("."), self.msg)
        }
    }
}

/// Failure payload as the backend may send it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FailureDetail {
    Text(String),
    Issues(Vec<ValidationIssue>),
    Other(Value),
}

impl FailureDetail {
    /// Flatten into one human-readable string; lists are joined with `"; "`.
    pub fn flatten(&self) -> String {
        match self {
            FailureDetail::Text(text) => text.clone(),
            FailureDetail::Issues(issues) => issues
                .iter()
                .map(ValidationIssue::render)
                .collect::<Vec<_>>()
                .join("; "),
            FailureDetail::Other(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("; "),
            FailureDetail::Other(Value::Null) => String::new(),
            FailureDetail::Other(other) => other.to_string(),
        }
    }
}

/// Envelope returned by simple stage endpoints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
    /// FastAPI-style error detail (string or validation list)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<FailureDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<FailureDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureDetail>,
}

/// What the orchestrator should do with a response.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeOutcome {
    Success {
        data: Value,
        message: Option<String>,
    },
    AuthorizationRequired {
        auth_url: Option<String>,
    },
    Failure(String),
}

impl ApiEnvelope {
    fn has_error_payload(&self) -> bool {
        [&self.detail, &self.errors, &self.error]
            .iter()
            .any(|d| d.as_ref().map(|d| !d.flatten().is_empty()).unwrap_or(false))
    }

    /// Best failure message available, most specific first.
    pub fn failure_message(&self) -> String {
        [&self.detail, &self.errors, &self.error]
            .iter()
            .filter_map(|d| d.as_ref().map(FailureDetail::flatten))
            .find(|msg| !msg.is_empty())
            .or_else(|| self.message.clone().filter(|m| !m.is_empty()))
            .unwrap_or_else(|| GENERIC_FAILURE.to_string())
    }

    /// Whether the envelope reports success. A missing `success` field counts
    /// as success unless an error payload is present.
    pub fn is_success(&self) -> bool {
        match self.success {
            Some(flag) => flag,
            None => !self.has_error_payload(),
        }
    }
}

/// Classify a decoded response body.
///
/// Non-object bodies are passed through as opaque success data. When a
/// success envelope has no `data` field the whole body is the result, which
/// covers the richer stage-specific envelopes.
pub fn classify_response(body: Value) -> EnvelopeOutcome {
    if !body.is_object() {
        return EnvelopeOutcome::Success {
            data: body,
            message: None,
        };
    }

    let envelope: ApiEnvelope = match serde_json::from_value(body.clone()) {
        Ok(env) => env,
        Err(e) => return EnvelopeOutcome::Failure(format!("Malformed response envelope: {}", e)),
    };

    if envelope.requires_auth {
        return EnvelopeOutcome::AuthorizationRequired {
            auth_url: envelope.auth_url,
        };
    }

    if !envelope.is_success() {
        return EnvelopeOutcome::Failure(envelope.failure_message());
    }

    let message = envelope.message.filter(|m| !m.is_empty());
    // An explicit `"data": null` is the result; only a missing field falls
    // back to the whole body.
    let has_data = body.get("data").is_some();
    let data = if has_data {
        envelope.data.unwrap_or(Value::Null)
    } else {
        body
    };
    EnvelopeOutcome::Success { data, message }
}

/// Envelope returned by one n-gram sub-request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NgramEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub ngrams: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl NgramEnvelope {
    /// The n-gram list on success, a flattened message otherwise.
    pub fn into_result(self) -> Result<Vec<Value>, String> {
        if self.success {
            return Ok(self.ngrams);
        }
        let msg = self
            .error
            .as_ref()
            .map(FailureDetail::flatten)
            .filter(|m| !m.is_empty())
            .or(self.message)
            .unwrap_or_else(|| GENERIC_FAILURE.to_string());
        Err(msg)
    }
}
