pub mod command_guard;
pub mod executor;
pub mod limits;
pub mod path_guard;
pub mod policy;
pub mod process;

pub use command_guard::CommandGuard;
pub use path_guard::PathGuard;
pub use policy::SandboxPolicy;
pub use process::{ProcessOutput, ProcessSpec};

use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::ToolError;
use crate::request::CapturedOutput;

/// Bounded buffer for handler output. Shared between the running handler
/// and the sandbox so partial output survives timeout and cancellation.
#[derive(Clone)]
pub struct CaptureBuffer {
    inner: Arc<Mutex<CaptureInner>>,
}

struct CaptureInner {
    text: String,
    truncated: bool,
    cap: usize,
}

impl CaptureBuffer {
    pub fn new(cap: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CaptureInner {
                text: String::new(),
                truncated: false,
                cap,
            })),
        }
    }

    pub fn push(&self, chunk: &str) {
        let mut inner = self.inner.lock();
        let remaining = inner.cap.saturating_sub(inner.text.len());
        if remaining == 0 {
            inner.truncated = true;
            return;
        }
        if chunk.len() <= remaining {
            inner.text.push_str(chunk);
        } else {
            // Cut on a char boundary at or below the cap.
            let mut cut = remaining;
            while cut > 0 && !chunk.is_char_boundary(cut) {
                cut -= 1;
            }
            inner.text.push_str(&chunk[..cut]);
            inner.truncated = true;
        }
    }

    pub fn snapshot(&self, force_truncated: bool) -> CapturedOutput {
        let inner = self.inner.lock();
        CapturedOutput {
            text: inner.text.clone(),
            truncated: inner.truncated || force_truncated,
        }
    }
}

/// Per-invocation context handed to tool handlers. Carries the effective
/// policy, the shared capture buffer, and the process groups the handler
/// has spawned so the sandbox can terminate them on timeout.
#[derive(Clone)]
pub struct ExecutionContext {
    pub correlation_id: String,
    pub policy: Arc<SandboxPolicy>,
    capture: CaptureBuffer,
    groups: Arc<Mutex<Vec<i32>>>,
    max_rss: Arc<Mutex<Option<u64>>>,
}

impl ExecutionContext {
    pub fn new(correlation_id: String, policy: Arc<SandboxPolicy>) -> Self {
        let capture = CaptureBuffer::new(policy.max_output_bytes);
        Self {
            correlation_id,
            policy,
            capture,
            groups: Arc::new(Mutex::new(Vec::new())),
            max_rss: Arc::new(Mutex::new(None)),
        }
    }

    /// Path guard rooted at this invocation's confinement root.
    pub fn path_guard(&self) -> Result<PathGuard, ToolError> {
        PathGuard::new(&self.policy.confinement_root)
    }

    /// Command guard built from this invocation's allow/deny lists.
    pub fn command_guard(&self) -> CommandGuard {
        CommandGuard::new(&self.policy.command_allow, &self.policy.command_deny)
    }

    pub fn capture(&self, chunk: &str) {
        self.capture.push(chunk);
    }

    pub fn captured(&self, force_truncated: bool) -> CapturedOutput {
        self.capture.snapshot(force_truncated)
    }

    /// Run a subprocess under this context's policy: own process group,
    /// kernel rlimits, output streamed into the capture buffer.
    pub async fn run_process(&self, spec: ProcessSpec) -> Result<ProcessOutput, ToolError> {
        process::run(self, spec).await
    }

    pub(crate) fn register_group(&self, pgid: i32) {
        self.groups.lock().push(pgid);
    }

    pub(crate) fn record_max_rss(&self, bytes: u64) {
        let mut slot = self.max_rss.lock();
        if slot.map_or(true, |prev| bytes > prev) {
            *slot = Some(bytes);
        }
    }

    pub fn max_rss(&self) -> Option<u64> {
        *self.max_rss.lock()
    }

    /// Terminate every process group spawned under this context.
    pub async fn terminate_groups(&self, grace: std::time::Duration) {
        let groups: Vec<i32> = self.groups.lock().clone();
        for pgid in groups {
            process::terminate_group(pgid, grace).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_respects_cap() {
        let buf = CaptureBuffer::new(8);
        buf.push("hello ");
        buf.push("world");
        let out = buf.snapshot(false);
        assert_eq!(out.text, "hello wo");
        assert!(out.truncated);
    }

    #[test]
    fn capture_under_cap_not_truncated() {
        let buf = CaptureBuffer::new(64);
        buf.push("short");
        let out = buf.snapshot(false);
        assert_eq!(out.text, "short");
        assert!(!out.truncated);
    }

    #[test]
    fn capture_cut_lands_on_char_boundary() {
        let buf = CaptureBuffer::new(5);
        buf.push("héllo");
        let out = buf.snapshot(false);
        assert!(out.text.is_char_boundary(out.text.len()));
        assert!(out.truncated);
    }
}
