use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::descriptor::{ParamSpec, ToolCategory, ToolDescriptor};
use crate::error::ToolError;
use crate::sandbox::{ExecutionContext, ProcessSpec};
use crate::tools::{parse_args, Tool};

pub const SERVER: &str = "git";
pub const DESCRIPTION: &str = "Read-only git repository inspection";

fn descriptor(name: &str, description: &str, parameters: Vec<ParamSpec>) -> ToolDescriptor {
    ToolDescriptor {
        server: SERVER.into(),
        name: name.into(),
        description: description.into(),
        parameters,
        category: ToolCategory::Subprocess,
        timeout_secs: None,
    }
}

/// Runs `git` inside the confinement root after the command guard has
/// screened the full argv.
async fn run_git(
    ctx: &ExecutionContext,
    args: Vec<String>,
) -> Result<serde_json::Value, ToolError> {
    let mut argv = vec!["git".to_string()];
    argv.extend(args.iter().cloned());
    ctx.command_guard().validate(&argv)?;

    let root = ctx.path_guard()?.root().to_path_buf();
    let output = ctx
        .run_process(ProcessSpec::new("git").args(args).cwd(root))
        .await?;

    if !output.success {
        return Err(ToolError::Execution(format!(
            "git exited with {:?}: {}",
            output.exit_code,
            output.stderr.trim()
        )));
    }

    Ok(json!({
        "stdout": output.stdout,
        "exit_code": output.exit_code,
    }))
}

pub struct GitStatusTool;

#[async_trait]
impl Tool for GitStatusTool {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "status",
            "Show working tree status",
            vec![],
        )
    }

    async fn execute(
        &self,
        ctx: ExecutionContext,
        _args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        run_git(&ctx, vec!["status".into(), "--porcelain".into()]).await
    }
}

#[derive(Deserialize)]
struct GitDiffInput {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    staged: bool,
}

pub struct GitDiffTool;

#[async_trait]
impl Tool for GitDiffTool {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "diff",
            "Show changes in the working tree or index",
            vec![
                ParamSpec::optional("path", "string", "Limit the diff to one relative path", json!(null)),
                ParamSpec::optional("staged", "boolean", "Diff the index instead of the working tree", json!(false)),
            ],
        )
    }

    async fn execute(
        &self,
        ctx: ExecutionContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let input: GitDiffInput = parse_args(args)?;
        let mut git_args = vec!["diff".to_string()];
        if input.staged {
            git_args.push("--staged".into());
        }
        if let Some(path) = &input.path {
            ctx.path_guard()?.validate(path)?;
            git_args.push(path.clone());
        }
        run_git(&ctx, git_args).await
    }
}

#[derive(Deserialize)]
struct GitLogInput {
    #[serde(default = "default_log_count")]
    count: u32,
}

fn default_log_count() -> u32 {
    10
}

pub struct GitLogTool;

#[async_trait]
impl Tool for GitLogTool {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "log",
            "Show recent commit history",
            vec![ParamSpec::optional(
                "count",
                "integer",
                "Number of commits to show",
                json!(10),
            )],
        )
    }

    async fn execute(
        &self,
        ctx: ExecutionContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let input: GitLogInput = parse_args(args)?;
        let count = input.count.clamp(1, 100);
        run_git(
            &ctx,
            vec!["log".into(), "--oneline".into(), format!("-n{}", count)],
        )
        .await
    }
}

pub struct GitBranchTool;

#[async_trait]
impl Tool for GitBranchTool {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor("branch", "List branches", vec![])
    }

    async fn execute(
        &self,
        ctx: ExecutionContext,
        _args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        run_git(&ctx, vec!["branch".into()]).await
    }
}
