use std::sync::Arc;

use crate::error::ToolError;
use crate::registry::ToolRegistry;
use crate::tools::{api, execution, filesystem, git, system};

/// Register the built-in server groups and their tools, in a fixed order
/// so discovery listings and disclosure output stay stable.
pub fn register_builtin_servers(registry: &ToolRegistry) -> Result<(), ToolError> {
    registry.define_server(filesystem::SERVER, filesystem::DESCRIPTION)?;
    registry.register(Arc::new(filesystem::ReadFileTool))?;
    registry.register(Arc::new(filesystem::WriteFileTool))?;
    registry.register(Arc::new(filesystem::ListDirectoryTool))?;
    registry.register(Arc::new(filesystem::CreateDirectoryTool))?;
    registry.register(Arc::new(filesystem::DeletePathTool))?;
    registry.register(Arc::new(filesystem::MovePathTool))?;
    registry.register(Arc::new(filesystem::FileExistsTool))?;

    registry.define_server(git::SERVER, git::DESCRIPTION)?;
    registry.register(Arc::new(git::GitStatusTool))?;
    registry.register(Arc::new(git::GitDiffTool))?;
    registry.register(Arc::new(git::GitLogTool))?;
    registry.register(Arc::new(git::GitBranchTool))?;

    registry.define_server(execution::SERVER, execution::DESCRIPTION)?;
    registry.register(Arc::new(execution::RunScriptTool))?;

    registry.define_server(api::SERVER, api::DESCRIPTION)?;
    registry.register(Arc::new(api::HttpRequestTool))?;
    registry.register(Arc::new(api::GraphqlQueryTool))?;

    registry.define_server(system::SERVER, system::DESCRIPTION)?;
    registry.register(Arc::new(system::RunCommandTool))?;
    registry.register(Arc::new(system::ProcessListTool))?;

    Ok(())
}
