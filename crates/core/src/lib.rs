pub mod audit;
pub mod chain;
pub mod error;
pub mod orchestrator;
pub mod settings;

pub use audit::{AuditEntry, AuditKind, AuditSink, FileAuditLog, MemoryAuditLog};
pub use chain::{
    ChainBudget, ChainContext, ChainStage, StageErrorPolicy, StageRecord, StageStatus, ToolCall,
};
pub use error::OrchestratorError;
pub use orchestrator::{AgentDirective, Orchestrator};
pub use settings::Settings;
