pub mod api;
pub mod builtin;
pub mod execution;
pub mod filesystem;
pub mod git;
pub mod system;

use async_trait::async_trait;

use crate::descriptor::ToolDescriptor;
use crate::error::ToolError;
use crate::sandbox::ExecutionContext;

pub use builtin::register_builtin_servers;

/// One invocable capability. Handlers receive the invocation context and
/// raw JSON arguments; the sandbox owns timeout, capture, and teardown.
#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    async fn execute(
        &self,
        ctx: ExecutionContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError>;
}

pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(
    args: serde_json::Value,
) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::Validation(e.to_string()))
}
