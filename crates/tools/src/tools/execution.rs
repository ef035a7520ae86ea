use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::descriptor::{ParamSpec, ToolCategory, ToolDescriptor};
use crate::error::ToolError;
use crate::sandbox::{ExecutionContext, ProcessSpec};
use crate::tools::{parse_args, Tool};

pub const SERVER: &str = "execution";
pub const DESCRIPTION: &str = "Script execution in an isolated process group";

#[derive(Deserialize)]
struct RunScriptInput {
    interpreter: String,
    code: String,
    #[serde(default)]
    input_data: Option<String>,
}

struct Interpreter {
    program: &'static str,
    suffix: &'static str,
}

fn interpreter_for(name: &str) -> Result<Interpreter, ToolError> {
    match name {
        "bash" => Ok(Interpreter {
            program: "bash",
            suffix: ".sh",
        }),
        "python" => Ok(Interpreter {
            program: "python3",
            suffix: ".py",
        }),
        "node" => Ok(Interpreter {
            program: "node",
            suffix: ".js",
        }),
        other => Err(ToolError::Validation(format!(
            "Unsupported interpreter: {}",
            other
        ))),
    }
}

pub struct RunScriptTool;

#[async_trait]
impl Tool for RunScriptTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            server: SERVER.into(),
            name: "run_script".into(),
            description: "Execute a script with bash, python, or node under sandbox limits".into(),
            parameters: vec![
                ParamSpec::required("interpreter", "string", "One of: bash, python, node"),
                ParamSpec::required("code", "string", "Script source to execute"),
                ParamSpec::optional("input_data", "string", "Data passed on stdin", json!(null)),
            ],
            category: ToolCategory::Subprocess,
            timeout_secs: None,
        }
    }

    async fn execute(
        &self,
        ctx: ExecutionContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let input: RunScriptInput = parse_args(args)?;
        let interpreter = interpreter_for(&input.interpreter)?;

        // The script lands inside the confinement root and is removed when
        // the guard drops, timeout paths included.
        let root = ctx.path_guard()?.root().to_path_buf();
        let script = tempfile::Builder::new()
            .prefix("quiver-script-")
            .suffix(interpreter.suffix)
            .tempfile_in(&root)
            .map_err(|e| ToolError::Execution(format!("temp file: {}", e)))?;
        std::fs::write(script.path(), &input.code)
            .map_err(|e| ToolError::Execution(format!("write script: {}", e)))?;

        let mut spec = ProcessSpec::new(interpreter.program)
            .args([script.path().to_string_lossy().to_string()])
            .cwd(&root);
        if let Some(data) = &input.input_data {
            spec = spec.stdin_data(data.clone());
        }

        let output = ctx.run_process(spec).await?;

        Ok(json!({
            "success": output.success,
            "stdout": output.stdout,
            "stderr": output.stderr,
            "exit_code": output.exit_code,
        }))
    }
}
