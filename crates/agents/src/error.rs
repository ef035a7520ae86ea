use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Malformed agent definition: {0}")]
    MalformedAgent(String),

    #[error("Duplicate agent id: {0} (already loaded from {1})")]
    Duplicate(String, String),

    #[error("Agent not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Watcher error: {0}")]
    Watch(String),
}
