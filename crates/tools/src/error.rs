use thiserror::Error;

use crate::descriptor::ToolId;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Resource limit exceeded: {0}")]
    ResourceLimit(String),

    #[error("Duplicate tool: {0}")]
    Duplicate(ToolId),

    #[error("Tool not found: {0}")]
    NotFound(ToolId),

    #[error("Server not found: {0}")]
    ServerNotFound(String),

    #[error("Duplicate server: {0}")]
    DuplicateServer(String),

    #[error("Identifier collision after normalization: {0}")]
    IdentifierCollision(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error")]
    Internal,
}
