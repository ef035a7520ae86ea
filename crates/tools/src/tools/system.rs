use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sysinfo::System;

use crate::descriptor::{ParamSpec, ToolCategory, ToolDescriptor};
use crate::error::ToolError;
use crate::sandbox::{ExecutionContext, ProcessSpec};
use crate::tools::{parse_args, Tool};

pub const SERVER: &str = "system";
pub const DESCRIPTION: &str = "Allow-listed system commands and process inspection";

#[derive(Deserialize)]
struct RunCommandInput {
    cmd: Vec<String>,
}

pub struct RunCommandTool;

#[async_trait]
impl Tool for RunCommandTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            server: SERVER.into(),
            name: "run_command".into(),
            description: "Execute an allow-listed command with arguments".into(),
            parameters: vec![ParamSpec::required(
                "cmd",
                "array",
                "Command and arguments as separate strings",
            )],
            category: ToolCategory::Subprocess,
            timeout_secs: None,
        }
    }

    async fn execute(
        &self,
        ctx: ExecutionContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let input: RunCommandInput = parse_args(args)?;
        if input.cmd.is_empty() {
            return Err(ToolError::Validation("Empty command".into()));
        }

        // Policy screening happens before any spawn.
        ctx.command_guard().validate(&input.cmd)?;

        let root = ctx.path_guard()?.root().to_path_buf();
        let output = ctx
            .run_process(
                ProcessSpec::new(&input.cmd[0])
                    .args(input.cmd[1..].iter().cloned())
                    .cwd(root),
            )
            .await?;

        Ok(json!({
            "success": output.success,
            "stdout": output.stdout,
            "stderr": output.stderr,
            "exit_code": output.exit_code,
        }))
    }
}

#[derive(Deserialize)]
struct ProcessListInput {
    #[serde(default)]
    filter: Option<String>,
    #[serde(default = "default_process_limit")]
    limit: usize,
}

fn default_process_limit() -> usize {
    50
}

pub struct ProcessListTool;

#[async_trait]
impl Tool for ProcessListTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            server: SERVER.into(),
            name: "processes".into(),
            description: "List running processes, optionally filtered by name".into(),
            parameters: vec![
                ParamSpec::optional("filter", "string", "Substring to match process names", json!(null)),
                ParamSpec::optional("limit", "integer", "Maximum processes to return", json!(50)),
            ],
            category: ToolCategory::InProcess,
            timeout_secs: None,
        }
    }

    async fn execute(
        &self,
        _ctx: ExecutionContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let input: ProcessListInput = parse_args(args)?;
        let filter = input.filter.map(|f| f.to_lowercase());

        let mut sys = System::new_all();
        sys.refresh_processes();

        let mut processes: Vec<serde_json::Value> = sys
            .processes()
            .iter()
            .filter(|(_, process)| {
                filter
                    .as_ref()
                    .map_or(true, |f| process.name().to_lowercase().contains(f))
            })
            .map(|(pid, process)| {
                json!({
                    "pid": pid.as_u32(),
                    "name": process.name(),
                    "memory_bytes": process.memory(),
                })
            })
            .collect();
        processes.sort_by_key(|p| p["pid"].as_u64());
        processes.truncate(input.limit);

        Ok(json!({"count": processes.len(), "processes": processes}))
    }
}
