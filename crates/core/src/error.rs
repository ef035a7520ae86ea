use thiserror::Error;

use quiver_agents::AgentError;
use quiver_tools::ToolError;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("Chain aborted at stage {stage} ({agent}): {reason}")]
    ChainAborted {
        stage: usize,
        agent: String,
        reason: String,
    },
}
