use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::fs;

use crate::descriptor::{ParamSpec, ToolCategory, ToolDescriptor};
use crate::error::ToolError;
use crate::sandbox::ExecutionContext;
use crate::tools::{parse_args, Tool};

pub const SERVER: &str = "filesystem";
pub const DESCRIPTION: &str = "File and directory operations inside the confinement root";

fn descriptor(name: &str, description: &str, parameters: Vec<ParamSpec>) -> ToolDescriptor {
    ToolDescriptor {
        server: SERVER.into(),
        name: name.into(),
        description: description.into(),
        parameters,
        category: ToolCategory::InProcess,
        timeout_secs: None,
    }
}

#[derive(Deserialize)]
struct ReadFileInput {
    path: String,
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    2000
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "read_file",
            "Read content from a file with optional line range limits",
            vec![
                ParamSpec::required("path", "string", "Relative file path to read"),
                ParamSpec::optional("offset", "integer", "Starting line number (0-based)", json!(0)),
                ParamSpec::optional("limit", "integer", "Maximum number of lines to read", json!(2000)),
            ],
        )
    }

    async fn execute(
        &self,
        ctx: ExecutionContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let input: ReadFileInput = parse_args(args)?;
        let path = ctx.path_guard()?.validate(&input.path)?;

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        let total_lines = content.lines().count();
        let selected: Vec<&str> = content
            .lines()
            .skip(input.offset)
            .take(input.limit)
            .collect();

        Ok(json!({
            "content": selected.join("\n"),
            "lines_read": selected.len(),
            "total_lines": total_lines,
            "offset": input.offset,
        }))
    }
}

#[derive(Deserialize)]
struct WriteFileInput {
    path: String,
    content: String,
}

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "write_file",
            "Write content to a file, creating parent directories as needed",
            vec![
                ParamSpec::required("path", "string", "Relative file path to write"),
                ParamSpec::required("content", "string", "Content to write"),
            ],
        )
    }

    async fn execute(
        &self,
        ctx: ExecutionContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let input: WriteFileInput = parse_args(args)?;
        let path = ctx.path_guard()?.validate_new(&input.path)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::Execution(e.to_string()))?;
        }
        fs::write(&path, &input.content)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        Ok(json!({
            "path": input.path,
            "bytes_written": input.content.len(),
        }))
    }
}

#[derive(Deserialize)]
struct PathInput {
    path: String,
}

pub struct ListDirectoryTool;

#[async_trait]
impl Tool for ListDirectoryTool {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "list_directory",
            "List entries of a directory with type and size",
            vec![ParamSpec::optional(
                "path",
                "string",
                "Relative directory path",
                json!("."),
            )],
        )
    }

    async fn execute(
        &self,
        ctx: ExecutionContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        #[derive(Deserialize)]
        struct Input {
            #[serde(default = "default_dot")]
            path: String,
        }
        fn default_dot() -> String {
            ".".into()
        }

        let input: Input = parse_args(args)?;
        let path = ctx.path_guard()?.validate(&input.path)?;

        let mut read_dir = fs::read_dir(&path)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?
        {
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| ToolError::Execution(e.to_string()))?;
            entries.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "kind": if metadata.is_dir() { "directory" } else { "file" },
                "size": metadata.len(),
            }));
        }
        entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        Ok(json!({"path": input.path, "entries": entries}))
    }
}

pub struct CreateDirectoryTool;

#[async_trait]
impl Tool for CreateDirectoryTool {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "create_directory",
            "Create a directory and any missing parents",
            vec![ParamSpec::required("path", "string", "Relative directory path")],
        )
    }

    async fn execute(
        &self,
        ctx: ExecutionContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let input: PathInput = parse_args(args)?;
        let path = ctx.path_guard()?.validate_new(&input.path)?;

        fs::create_dir_all(&path)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        Ok(json!({"path": input.path, "created": true}))
    }
}

pub struct DeletePathTool;

#[async_trait]
impl Tool for DeletePathTool {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "delete_path",
            "Delete a file or directory (recursively)",
            vec![ParamSpec::required("path", "string", "Relative path to delete")],
        )
    }

    async fn execute(
        &self,
        ctx: ExecutionContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let input: PathInput = parse_args(args)?;
        let path = ctx.path_guard()?.validate(&input.path)?;

        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;
        if metadata.is_dir() {
            fs::remove_dir_all(&path)
                .await
                .map_err(|e| ToolError::Execution(e.to_string()))?;
        } else {
            fs::remove_file(&path)
                .await
                .map_err(|e| ToolError::Execution(e.to_string()))?;
        }

        Ok(json!({"path": input.path, "deleted": true}))
    }
}

#[derive(Deserialize)]
struct MovePathInput {
    src: String,
    dst: String,
}

pub struct MovePathTool;

#[async_trait]
impl Tool for MovePathTool {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "move_path",
            "Move or rename a file or directory",
            vec![
                ParamSpec::required("src", "string", "Relative source path"),
                ParamSpec::required("dst", "string", "Relative destination path"),
            ],
        )
    }

    async fn execute(
        &self,
        ctx: ExecutionContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let input: MovePathInput = parse_args(args)?;
        let guard = ctx.path_guard()?;
        let src = guard.validate(&input.src)?;
        let dst = guard.validate_new(&input.dst)?;

        fs::rename(&src, &dst)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        Ok(json!({"src": input.src, "dst": input.dst, "moved": true}))
    }
}

pub struct FileExistsTool;

#[async_trait]
impl Tool for FileExistsTool {
    fn descriptor(&self) -> ToolDescriptor {
        descriptor(
            "file_exists",
            "Check whether a path exists inside the confinement root",
            vec![ParamSpec::required("path", "string", "Relative path to check")],
        )
    }

    async fn execute(
        &self,
        ctx: ExecutionContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let input: PathInput = parse_args(args)?;
        // validate_new so a missing path is an answer, not a violation.
        let path = ctx.path_guard()?.validate_new(&input.path)?;

        let exists = fs::try_exists(&path).await.unwrap_or(false);
        let kind = if exists {
            let metadata = fs::metadata(&path)
                .await
                .map_err(|e| ToolError::Execution(e.to_string()))?;
            if metadata.is_dir() {
                Some("directory")
            } else {
                Some("file")
            }
        } else {
            None
        };

        Ok(json!({"path": input.path, "exists": exists, "kind": kind}))
    }
}
