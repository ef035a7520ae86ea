use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::sandbox::limits::ResourceLimits;
use crate::sandbox::ExecutionContext;

const TERMINATE_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub stdin_data: Option<String>,
    pub env: Vec<(String, String)>,
}

impl ProcessSpec {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            cwd: None,
            stdin_data: None,
            env: Vec::new(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn stdin_data(mut self, data: impl Into<String>) -> Self {
        self.stdin_data = Some(data.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Spawn `spec` in its own process group with kernel rlimits applied,
/// streaming output into the context's capture buffer as it arrives.
pub(crate) async fn run(
    ctx: &ExecutionContext,
    spec: ProcessSpec,
) -> Result<ProcessOutput, ToolError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .env_clear()
        .env("PATH", "/usr/bin:/bin")
        .stdin(if spec.stdin_data.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }

    #[cfg(unix)]
    {
        unsafe {
            cmd.pre_exec(|| {
                // New process group so teardown reaches every descendant.
                libc::setsid();
                ResourceLimits::apply()?;
                Ok(())
            });
        }
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| ToolError::Execution(format!("spawn failed: {}", e)))?;

    if let Some(pid) = child.id() {
        // After setsid the child's pid is its process group id.
        ctx.register_group(pid as i32);
    }

    if let Some(data) = &spec.stdin_data {
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(data.as_bytes()).await;
        }
    }

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let cap = ctx.policy.max_output_bytes;

    let (out_text, err_text, status) = tokio::join!(
        read_stream(stdout, ctx, cap),
        read_stream(stderr, ctx, cap),
        child.wait()
    );

    let status = status.map_err(|e| ToolError::Execution(format!("wait failed: {}", e)))?;

    record_child_rusage(ctx);

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            if signal == libc::SIGXCPU || signal == libc::SIGXFSZ {
                return Err(ToolError::ResourceLimit(format!(
                    "handler killed by signal {}",
                    signal
                )));
            }
            debug!("Handler terminated by signal {}", signal);
        }
    }

    Ok(ProcessOutput {
        exit_code: status.code(),
        success: status.success(),
        stdout: out_text,
        stderr: err_text,
    })
}

async fn read_stream<R>(stream: Option<R>, ctx: &ExecutionContext, cap: usize) -> String
where
    R: AsyncRead + Unpin,
{
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut collected = String::new();
    let mut buf = [0u8; 8192];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]);
                ctx.capture(&chunk);
                if collected.len() < cap {
                    let take = chunk.len().min(cap - collected.len());
                    let mut cut = take;
                    while cut > 0 && !chunk.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    collected.push_str(&chunk[..cut]);
                }
            }
            Err(e) => {
                warn!("Stream read error: {}", e);
                break;
            }
        }
    }
    collected
}

#[cfg(unix)]
fn record_child_rusage(ctx: &ExecutionContext) {
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::getrusage(libc::RUSAGE_CHILDREN, &mut usage) };
    if rc == 0 && usage.ru_maxrss > 0 {
        // ru_maxrss is kilobytes on Linux, bytes on macOS.
        #[cfg(target_os = "macos")]
        let bytes = usage.ru_maxrss as u64;
        #[cfg(not(target_os = "macos"))]
        let bytes = usage.ru_maxrss as u64 * 1024;
        ctx.record_max_rss(bytes);
    }
}

#[cfg(not(unix))]
fn record_child_rusage(_ctx: &ExecutionContext) {}

/// SIGTERM the whole group, poll through the grace period, then SIGKILL
/// any survivor. After this returns no member of the group is running.
pub async fn terminate_group(pgid: i32, grace: Duration) {
    #[cfg(unix)]
    {
        if pgid <= 1 {
            return;
        }
        unsafe {
            libc::killpg(pgid, libc::SIGTERM);
        }
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if unsafe { libc::killpg(pgid, 0) } != 0 {
                debug!("Process group {} exited after SIGTERM", pgid);
                return;
            }
            tokio::time::sleep(TERMINATE_POLL).await;
        }
        warn!("Process group {} survived grace period, sending SIGKILL", pgid);
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (pgid, grace);
    }
}
