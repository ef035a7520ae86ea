use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::descriptor::ToolCategory;
use crate::error::ToolError;
use crate::registry::RegisteredTool;
use crate::request::{
    redact_secrets, CapturedOutput, ExecStatus, ExecutionRequest, ExecutionResult, ResourceUsage,
};
use crate::sandbox::policy::SandboxPolicy;
use crate::sandbox::ExecutionContext;

/// Bounds every handler by policy and resolves each request into exactly
/// one result. Failures are encoded as statuses, never raised.
pub struct ExecutionSandbox;

impl ExecutionSandbox {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(
        &self,
        tool: &RegisteredTool,
        request: ExecutionRequest,
        policy: SandboxPolicy,
    ) -> ExecutionResult {
        let started = Instant::now();
        let correlation_id = request.correlation_id.clone();

        // Network category is refused before the handler runs at all.
        if tool.descriptor.category == ToolCategory::Network && !policy.network_enabled {
            warn!("Network disabled by policy for {}", request.id);
            return ExecutionResult {
                correlation_id,
                status: ExecStatus::PolicyViolation,
                payload: serde_json::Value::Null,
                output: CapturedOutput::default(),
                usage: ResourceUsage {
                    wall_ms: 0,
                    max_rss_bytes: None,
                },
                error: Some("Network access disabled by policy".into()),
            };
        }

        let policy = Arc::new(policy);
        let ctx = ExecutionContext::new(correlation_id.clone(), policy.clone());

        // The caller deadline and the policy timeout race; whichever is
        // shorter decides whether expiry reads Cancelled or TimeoutExceeded.
        let (budget, expiry_status) = match request.deadline {
            Some(deadline) if deadline < policy.timeout => (deadline, ExecStatus::Cancelled),
            _ => (policy.timeout, ExecStatus::TimeoutExceeded),
        };

        let handler = Arc::clone(&tool.handler);
        let task_ctx = ctx.clone();
        let args = request.arguments;
        let handle = tokio::spawn(async move { handler.execute(task_ctx, args).await });
        let abort = handle.abort_handle();

        let (status, payload, error, forced_truncation) = match timeout(budget, handle).await {
            Ok(Ok(Ok(payload))) => (ExecStatus::Success, redact_secrets(&payload), None, false),
            Ok(Ok(Err(tool_err))) => {
                let status = Self::status_for(&tool_err);
                (status, serde_json::Value::Null, Some(tool_err.to_string()), false)
            }
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    error!("Handler panicked for {}", request.id);
                    (
                        ExecStatus::HandlerError,
                        serde_json::Value::Null,
                        Some("handler panicked".into()),
                        false,
                    )
                } else {
                    (
                        ExecStatus::Cancelled,
                        serde_json::Value::Null,
                        Some("handler task cancelled".into()),
                        true,
                    )
                }
            }
            Err(_) => {
                info!(
                    "Handler for {} exceeded {}ms budget, terminating",
                    request.id,
                    budget.as_millis()
                );
                abort.abort();
                ctx.terminate_groups(policy.grace).await;
                let detail = match expiry_status {
                    ExecStatus::Cancelled => "cancelled by caller deadline",
                    _ => "execution timed out",
                };
                (
                    expiry_status,
                    serde_json::Value::Null,
                    Some(detail.into()),
                    true,
                )
            }
        };

        let output = ctx.captured(forced_truncation);
        ExecutionResult {
            correlation_id,
            status,
            payload,
            output,
            usage: ResourceUsage {
                wall_ms: started.elapsed().as_millis() as u64,
                max_rss_bytes: ctx.max_rss(),
            },
            error,
        }
    }

    fn status_for(err: &ToolError) -> ExecStatus {
        match err {
            ToolError::PolicyViolation(_) => ExecStatus::PolicyViolation,
            ToolError::Timeout => ExecStatus::TimeoutExceeded,
            ToolError::ResourceLimit(_) => ExecStatus::ResourceLimitExceeded,
            _ => ExecStatus::HandlerError,
        }
    }
}

impl Default for ExecutionSandbox {
    fn default() -> Self {
        Self::new()
    }
}
