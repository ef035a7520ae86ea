use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use quiver_agents::AgentRegistry;
use quiver_tools::request::redact_secrets;
use quiver_tools::{
    ExecStatus, ExecutionRequest, ExecutionResult, ExecutionSandbox, ToolDescriptor, ToolId,
    ToolRegistry,
};

use crate::audit::{AuditEntry, AuditKind, AuditSink};
use crate::chain::ChainContext;
use crate::error::OrchestratorError;
use crate::settings::Settings;

/// What `invoke_agent` hands back for the external language-generation
/// collaborator: the agent's capability list and prompt plus the merged
/// invocation context. No natural-language output is produced here.
#[derive(Debug, Clone, Serialize)]
pub struct AgentDirective {
    pub agent: String,
    pub generation: u64,
    pub capabilities: Vec<String>,
    pub prompt: String,
    pub context: serde_json::Value,
}

/// Single entry point for tool and agent invocation: resolves the target,
/// applies sandbox policy, records an audit entry, and returns the result.
pub struct Orchestrator {
    pub(crate) tools: Arc<ToolRegistry>,
    pub(crate) agents: Arc<AgentRegistry>,
    pub(crate) sandbox: ExecutionSandbox,
    pub(crate) audit: Arc<dyn AuditSink>,
    pub(crate) settings: Settings,
}

impl Orchestrator {
    pub fn new(
        tools: Arc<ToolRegistry>,
        agents: Arc<AgentRegistry>,
        audit: Arc<dyn AuditSink>,
        settings: Settings,
    ) -> Self {
        Self {
            tools,
            agents,
            sandbox: ExecutionSandbox::new(),
            audit,
            settings,
        }
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn agents(&self) -> &Arc<AgentRegistry> {
        &self.agents
    }

    pub async fn invoke_tool(
        &self,
        server: &str,
        name: &str,
        args: serde_json::Value,
    ) -> Result<ExecutionResult, OrchestratorError> {
        self.dispatch(server, name, args, None).await
    }

    /// Same as `invoke_tool`, with a caller deadline that propagates
    /// cancellation into the sandbox.
    pub async fn invoke_tool_with_deadline(
        &self,
        server: &str,
        name: &str,
        args: serde_json::Value,
        deadline: Duration,
    ) -> Result<ExecutionResult, OrchestratorError> {
        self.dispatch(server, name, args, Some(deadline)).await
    }

    async fn dispatch(
        &self,
        server: &str,
        name: &str,
        args: serde_json::Value,
        deadline: Option<Duration>,
    ) -> Result<ExecutionResult, OrchestratorError> {
        info!("Dispatching tool: {}/{}", server, name);
        let started = Instant::now();

        let tool = match self.tools.lookup(server, name) {
            Ok(tool) => tool,
            Err(e) => {
                self.record(AuditEntry {
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    correlation_id: String::new(),
                    kind: AuditKind::Tool,
                    identity: format!("{}/{}", server, name),
                    args_digest: Self::args_digest(&args),
                    decision: "resolve_failed".into(),
                    status: "not_found".into(),
                    duration_ms: 0,
                });
                return Err(e.into());
            }
        };

        Self::validate_args(&tool.descriptor, &args)?;

        let mut request = ExecutionRequest::new(ToolId::new(server, name), args.clone());
        if let Some(deadline) = deadline {
            request = request.with_deadline(deadline);
        }
        let correlation_id = request.correlation_id.clone();
        let policy = self.settings.policy_for(&tool.descriptor);

        let result = self.sandbox.execute(&tool, request, policy).await;

        self.record(AuditEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            correlation_id,
            kind: AuditKind::Tool,
            identity: format!("{}/{}", server, name),
            args_digest: Self::args_digest(&args),
            decision: match result.status {
                ExecStatus::PolicyViolation => "denied".into(),
                _ => "allow".into(),
            },
            status: Self::status_name(result.status).into(),
            duration_ms: started.elapsed().as_millis() as u64,
        });

        Ok(result)
    }

    /// Resolve the Active agent instance and return its directive, merging
    /// the input with any chain scratch state.
    pub fn invoke_agent(
        &self,
        id: &str,
        input: serde_json::Value,
        chain: Option<&ChainContext>,
    ) -> Result<AgentDirective, OrchestratorError> {
        let instance = self.agents.get(id)?;

        let scratch = chain
            .map(|c| serde_json::Value::Object(c.scratch.clone()))
            .unwrap_or_else(|| serde_json::json!({}));
        let context = serde_json::json!({
            "input": input,
            "scratch": scratch,
        });

        self.record(AuditEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            correlation_id: String::new(),
            kind: AuditKind::Agent,
            identity: id.to_string(),
            args_digest: Self::args_digest(&context),
            decision: "allow".into(),
            status: "resolved".into(),
            duration_ms: 0,
        });

        Ok(AgentDirective {
            agent: instance.definition.id.clone(),
            generation: instance.generation,
            capabilities: instance.definition.capabilities.clone(),
            prompt: instance.definition.prompt.clone(),
            context,
        })
    }

    fn validate_args(
        descriptor: &ToolDescriptor,
        args: &serde_json::Value,
    ) -> Result<(), OrchestratorError> {
        let object = match args {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => {
                let missing: Vec<&str> = descriptor
                    .parameters
                    .iter()
                    .filter(|p| p.required)
                    .map(|p| p.name.as_str())
                    .collect();
                if missing.is_empty() {
                    return Ok(());
                }
                return Err(OrchestratorError::Validation(format!(
                    "missing required parameters: {}",
                    missing.join(", ")
                )));
            }
            _ => {
                return Err(OrchestratorError::Validation(
                    "arguments must be a JSON object".into(),
                ))
            }
        };

        let missing: Vec<&str> = descriptor
            .parameters
            .iter()
            .filter(|p| p.required && !object.contains_key(&p.name))
            .map(|p| p.name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(OrchestratorError::Validation(format!(
                "missing required parameters: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    pub(crate) fn record(&self, entry: AuditEntry) {
        // Audit failures must never fail the invocation.
        if let Err(e) = self.audit.append(&entry) {
            warn!("Audit append failed: {}", e);
        }
    }

    pub(crate) fn args_digest(args: &serde_json::Value) -> String {
        let canonical = serde_json::to_string(&redact_secrets(args)).unwrap_or_default();
        format!("sha256:{:x}", Sha256::digest(canonical.as_bytes()))
    }

    pub(crate) fn status_name(status: ExecStatus) -> &'static str {
        match status {
            ExecStatus::Success => "success",
            ExecStatus::HandlerError => "handler_error",
            ExecStatus::TimeoutExceeded => "timeout_exceeded",
            ExecStatus::Cancelled => "cancelled",
            ExecStatus::ResourceLimitExceeded => "resource_limit_exceeded",
            ExecStatus::PolicyViolation => "policy_violation",
        }
    }
}
