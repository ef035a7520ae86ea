use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use quiver_tools::sandbox::policy::{default_allow_list, default_deny_list};
use quiver_tools::{SandboxPolicy, ToolCategory, ToolDescriptor};

/// Runtime settings consumed at startup. The surrounding application owns
/// where these come from; the core only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub confinement_root: PathBuf,
    pub in_process_timeout_secs: u64,
    pub subprocess_timeout_secs: u64,
    pub network_timeout_secs: u64,
    pub grace_period_ms: u64,
    pub max_output_bytes: usize,
    pub command_allow: Vec<String>,
    pub command_deny: Vec<String>,
    pub network_enabled: bool,
    pub audit_log: Option<PathBuf>,
    pub agent_dirs: Vec<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            confinement_root: PathBuf::from("."),
            in_process_timeout_secs: SandboxPolicy::default_timeout(ToolCategory::InProcess)
                .as_secs(),
            subprocess_timeout_secs: SandboxPolicy::default_timeout(ToolCategory::Subprocess)
                .as_secs(),
            network_timeout_secs: SandboxPolicy::default_timeout(ToolCategory::Network).as_secs(),
            grace_period_ms: 2000,
            max_output_bytes: 1024 * 1024,
            command_allow: default_allow_list(),
            command_deny: default_deny_list(),
            network_enabled: false,
            audit_log: None,
            agent_dirs: Vec::new(),
        }
    }
}

impl Settings {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            confinement_root: root.into(),
            ..Self::default()
        }
    }

    /// Effective sandbox policy for one descriptor: the descriptor's
    /// timeout override wins over the per-category default; both are
    /// clamped to the hard ceiling by the policy builder.
    pub fn policy_for(&self, descriptor: &ToolDescriptor) -> SandboxPolicy {
        let default_secs = match descriptor.category {
            ToolCategory::InProcess => self.in_process_timeout_secs,
            ToolCategory::Subprocess => self.subprocess_timeout_secs,
            ToolCategory::Network => self.network_timeout_secs,
        };
        let timeout = Duration::from_secs(descriptor.timeout_secs.unwrap_or(default_secs));
        SandboxPolicy::new(&self.confinement_root)
            .with_timeout(timeout)
            .with_grace(Duration::from_millis(self.grace_period_ms))
            .with_max_output_bytes(self.max_output_bytes)
            .with_command_lists(self.command_allow.clone(), self.command_deny.clone())
            .with_network(self.network_enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_tools::ParamSpec;

    fn descriptor(category: ToolCategory, timeout_secs: Option<u64>) -> ToolDescriptor {
        ToolDescriptor {
            server: "s".into(),
            name: "t".into(),
            description: String::new(),
            parameters: vec![ParamSpec::required("x", "string", "")],
            category,
            timeout_secs,
        }
    }

    #[test]
    fn category_defaults_apply() {
        let settings = Settings::default();
        let policy = settings.policy_for(&descriptor(ToolCategory::Network, None));
        assert_eq!(
            policy.timeout,
            Duration::from_secs(settings.network_timeout_secs)
        );
    }

    #[test]
    fn descriptor_override_wins_but_is_clamped() {
        let settings = Settings::default();
        let policy = settings.policy_for(&descriptor(ToolCategory::Subprocess, Some(5)));
        assert_eq!(policy.timeout, Duration::from_secs(5));

        let clamped = settings.policy_for(&descriptor(ToolCategory::Subprocess, Some(100_000)));
        assert_eq!(clamped.timeout, Duration::from_secs(300));
    }
}
