use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::descriptor::ToolId;

/// One invocation of one tool. Created per call, consumed once by the
/// sandbox, which always resolves it into exactly one `ExecutionResult`.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub id: ToolId,
    pub arguments: serde_json::Value,
    /// Caller-supplied deadline. When it fires before the policy timeout
    /// the result is marked `Cancelled` rather than `TimeoutExceeded`.
    pub deadline: Option<Duration>,
    pub correlation_id: String,
}

impl ExecutionRequest {
    pub fn new(id: ToolId, arguments: serde_json::Value) -> Self {
        Self {
            id,
            arguments,
            deadline: None,
            correlation_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    Success,
    HandlerError,
    TimeoutExceeded,
    Cancelled,
    ResourceLimitExceeded,
    PolicyViolation,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapturedOutput {
    pub text: String,
    pub truncated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub wall_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_rss_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub correlation_id: String,
    pub status: ExecStatus,
    pub payload: serde_json::Value,
    pub output: CapturedOutput,
    pub usage: ResourceUsage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.status == ExecStatus::Success
    }
}

const SECRET_KEY_MARKERS: &[&str] = &["token", "secret", "password", "api_key", "authorization", "credential"];

fn is_secret_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SECRET_KEY_MARKERS.iter().any(|m| lower.contains(m))
}

/// Replace values under secret-named keys so they never reach results or
/// the audit log.
pub fn redact_secrets(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                if is_secret_key(k) {
                    out.insert(k.clone(), serde_json::Value::String("[redacted]".into()));
                } else {
                    out.insert(k.clone(), redact_secrets(v));
                }
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(redact_secrets).collect())
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_correlation_ids_are_unique() {
        let a = ExecutionRequest::new(ToolId::new("s", "t"), json!({}));
        let b = ExecutionRequest::new(ToolId::new("s", "t"), json!({}));
        assert_ne!(a.correlation_id, b.correlation_id);
    }

    #[test]
    fn redacts_nested_secret_keys() {
        let args = json!({
            "url": "https://example.com",
            "headers": {"Authorization": "Bearer abc", "Accept": "json"},
            "api_key": "xyz"
        });
        let clean = redact_secrets(&args);
        assert_eq!(clean["headers"]["Authorization"], "[redacted]");
        assert_eq!(clean["api_key"], "[redacted]");
        assert_eq!(clean["headers"]["Accept"], "json");
        assert_eq!(clean["url"], "https://example.com");
    }

    #[test]
    fn status_serializes_snake_case() {
        let s = serde_json::to_string(&ExecStatus::TimeoutExceeded).unwrap();
        assert_eq!(s, "\"timeout_exceeded\"");
    }
}
