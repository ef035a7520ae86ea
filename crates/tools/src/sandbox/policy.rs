use std::path::PathBuf;
use std::time::Duration;

use crate::descriptor::{ToolCategory, ToolDescriptor};

/// Hard ceiling no timeout may exceed, whatever the descriptor asks for.
pub const TIMEOUT_CEILING: Duration = Duration::from_secs(300);

const DEFAULT_IN_PROCESS_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_GRACE: Duration = Duration::from_secs(2);
const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Effective constraints for one sandboxed invocation.
#[derive(Debug, Clone)]
pub struct SandboxPolicy {
    pub timeout: Duration,
    /// Wait between SIGTERM and SIGKILL when tearing down a process group.
    pub grace: Duration,
    pub max_output_bytes: usize,
    pub confinement_root: PathBuf,
    pub command_allow: Vec<String>,
    pub command_deny: Vec<String>,
    pub network_enabled: bool,
}

impl SandboxPolicy {
    pub fn new(confinement_root: impl Into<PathBuf>) -> Self {
        Self {
            timeout: DEFAULT_SUBPROCESS_TIMEOUT,
            grace: DEFAULT_GRACE,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            confinement_root: confinement_root.into(),
            command_allow: default_allow_list(),
            command_deny: default_deny_list(),
            network_enabled: false,
        }
    }

    pub fn default_timeout(category: ToolCategory) -> Duration {
        match category {
            ToolCategory::InProcess => DEFAULT_IN_PROCESS_TIMEOUT,
            ToolCategory::Subprocess => DEFAULT_SUBPROCESS_TIMEOUT,
            ToolCategory::Network => DEFAULT_NETWORK_TIMEOUT,
        }
    }

    /// Apply the per-category default and any descriptor override, clamped
    /// to the hard ceiling.
    pub fn for_descriptor(mut self, descriptor: &ToolDescriptor) -> Self {
        let base = descriptor
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| Self::default_timeout(descriptor.category));
        self.timeout = base.min(TIMEOUT_CEILING);
        self
    }

    /// Timeouts are clamped to the ceiling whatever the source.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.min(TIMEOUT_CEILING);
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn with_max_output_bytes(mut self, cap: usize) -> Self {
        self.max_output_bytes = cap;
        self
    }

    pub fn with_network(mut self, enabled: bool) -> Self {
        self.network_enabled = enabled;
        self
    }

    pub fn with_command_lists(mut self, allow: Vec<String>, deny: Vec<String>) -> Self {
        self.command_allow = allow;
        self.command_deny = deny;
        self
    }
}

pub fn default_allow_list() -> Vec<String> {
    ["ls", "pwd", "cat", "grep", "echo", "date", "whoami", "git"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn default_deny_list() -> Vec<String> {
    ["sudo", "rm", "chmod", "chown", "curl", "wget", "nc", "netcat"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
