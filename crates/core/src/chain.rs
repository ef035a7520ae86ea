use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use quiver_tools::ExecStatus;

use crate::audit::{AuditEntry, AuditKind};
use crate::error::OrchestratorError;
use crate::orchestrator::Orchestrator;

/// What to do when a stage's tool call fails with a recoverable error.
/// PolicyViolation always aborts the chain regardless of this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorPolicy {
    Continue,
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub server: String,
    pub name: String,
    pub args: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ChainStage {
    pub agent_id: String,
    pub tool_calls: Vec<ToolCall>,
    pub on_error: StageErrorPolicy,
}

impl ChainStage {
    pub fn new(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            tool_calls: Vec::new(),
            on_error: StageErrorPolicy::Abort,
        }
    }

    pub fn with_tool_call(mut self, server: &str, name: &str, args: serde_json::Value) -> Self {
        self.tool_calls.push(ToolCall {
            server: server.to_string(),
            name: name.to_string(),
            args,
        });
        self
    }

    pub fn on_error(mut self, policy: StageErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    /// A recoverable failure occurred and the stage's output is partial.
    Partial,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub agent: String,
    pub generation: u64,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    pub status: StageStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChainBudget {
    pub total_duration_ms: u64,
    pub tool_calls: u64,
}

/// Scratch state for one chain invocation, owned by the orchestrator call
/// that created it. Completed stage outputs accumulate in order; stages
/// share the scratch mapping.
#[derive(Debug, Clone, Default)]
pub struct ChainContext {
    pub stages: Vec<StageRecord>,
    pub scratch: serde_json::Map<String, serde_json::Value>,
    pub budget: ChainBudget,
}

impl ChainContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_scratch(&mut self, key: &str, value: serde_json::Value) {
        self.scratch.insert(key.to_string(), value);
    }
}

impl Orchestrator {
    /// Run agent stages sequentially, threading each stage's output into
    /// the next stage's input through the ChainContext. PolicyViolation
    /// from any tool call aborts immediately; other failures follow the
    /// stage's configured policy.
    pub async fn chain(
        &self,
        stages: &[ChainStage],
        initial_input: serde_json::Value,
    ) -> Result<ChainContext, OrchestratorError> {
        let mut ctx = ChainContext::new();
        let mut current = initial_input;

        for (index, stage) in stages.iter().enumerate() {
            info!("Chain stage {}: {}", index, stage.agent_id);

            let directive = self
                .invoke_agent(&stage.agent_id, current.clone(), Some(&ctx))
                .map_err(|e| {
                    self.record_chain_event(&stage.agent_id, "aborted");
                    OrchestratorError::ChainAborted {
                        stage: index,
                        agent: stage.agent_id.clone(),
                        reason: e.to_string(),
                    }
                })?;

            let mut tool_results = Vec::new();
            let mut status = StageStatus::Completed;

            for call in &stage.tool_calls {
                let result = match self
                    .invoke_tool(&call.server, &call.name, call.args.clone())
                    .await
                {
                    Ok(result) => result,
                    Err(e) => {
                        self.push_stage(&mut ctx, stage, &current, &directive, tool_results, StageStatus::Partial);
                        self.record_chain_event(&stage.agent_id, "aborted");
                        return Err(OrchestratorError::ChainAborted {
                            stage: index,
                            agent: stage.agent_id.clone(),
                            reason: e.to_string(),
                        });
                    }
                };

                ctx.budget.tool_calls += 1;
                ctx.budget.total_duration_ms += result.usage.wall_ms;
                let failed = result.status != ExecStatus::Success;
                let policy_violation = result.status == ExecStatus::PolicyViolation;
                tool_results.push(json!({
                    "server": call.server,
                    "name": call.name,
                    "status": Self::status_name(result.status),
                    "payload": result.payload,
                    "error": result.error,
                }));

                if policy_violation {
                    // Never recoverable; the partial record stays visible.
                    self.push_stage(&mut ctx, stage, &current, &directive, tool_results, StageStatus::Partial);
                    self.record_chain_event(&stage.agent_id, "aborted");
                    return Err(OrchestratorError::ChainAborted {
                        stage: index,
                        agent: stage.agent_id.clone(),
                        reason: "policy violation".into(),
                    });
                }

                if failed {
                    match stage.on_error {
                        StageErrorPolicy::Continue => {
                            warn!(
                                "Stage {} tool {}/{} failed, continuing per stage policy",
                                index, call.server, call.name
                            );
                            status = StageStatus::Partial;
                            break;
                        }
                        StageErrorPolicy::Abort => {
                            self.push_stage(&mut ctx, stage, &current, &directive, tool_results, StageStatus::Partial);
                            self.record_chain_event(&stage.agent_id, "aborted");
                            return Err(OrchestratorError::ChainAborted {
                                stage: index,
                                agent: stage.agent_id.clone(),
                                reason: "tool call failed".into(),
                            });
                        }
                    }
                }
            }

            current = self.push_stage(&mut ctx, stage, &current, &directive, tool_results, status);
        }

        self.record_chain_event("chain", "completed");
        Ok(ctx)
    }

    /// Record a finished stage and return its output, which becomes the
    /// next stage's input.
    fn push_stage(
        &self,
        ctx: &mut ChainContext,
        stage: &ChainStage,
        input: &serde_json::Value,
        directive: &crate::orchestrator::AgentDirective,
        tool_results: Vec<serde_json::Value>,
        status: StageStatus,
    ) -> serde_json::Value {
        let output = json!({
            "agent": directive.agent,
            "context": directive.context,
            "tool_results": tool_results,
        });
        ctx.scratch.insert(stage.agent_id.clone(), output.clone());
        ctx.stages.push(StageRecord {
            agent: directive.agent.clone(),
            generation: directive.generation,
            input: input.clone(),
            output: output.clone(),
            status,
        });
        output
    }

    fn record_chain_event(&self, identity: &str, status: &str) {
        self.record(AuditEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            correlation_id: String::new(),
            kind: AuditKind::Chain,
            identity: identity.to_string(),
            args_digest: String::new(),
            decision: "allow".into(),
            status: status.into(),
            duration_ms: 0,
        });
    }
}
