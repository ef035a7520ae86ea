use crate::error::ToolError;

const DANGEROUS_CHARS: &[char] = &['|', '&', ';', '>', '<', '`', '$', '\n', '\r', '\0'];
const GIT_ALLOWED_SUBCOMMANDS: &[&str] = &["status", "diff", "log", "show", "branch"];
const SENSITIVE_PATHS: &[&str] = &["/etc/", "/proc/", "/sys/", "/dev/"];

/// Argv-level screening for shell-category tools. Deny list is checked
/// before the allow list; both come from the invocation policy.
pub struct CommandGuard {
    allow: Vec<String>,
    deny: Vec<String>,
}

impl CommandGuard {
    pub fn new(allow: &[String], deny: &[String]) -> Self {
        Self {
            allow: allow.to_vec(),
            deny: deny.to_vec(),
        }
    }

    pub fn validate(&self, cmd: &[String]) -> Result<(), ToolError> {
        if cmd.is_empty() {
            return Err(ToolError::Validation("Empty command".into()));
        }

        let program = &cmd[0];
        let base_cmd = program.split('/').next_back().unwrap_or(program);

        if self.deny.iter().any(|d| base_cmd == d) {
            return Err(ToolError::PolicyViolation(format!(
                "Denied command: {}",
                base_cmd
            )));
        }

        if !self.allow.iter().any(|a| base_cmd == a) {
            return Err(ToolError::PolicyViolation(format!(
                "Command not allow-listed: {}",
                base_cmd
            )));
        }

        for (idx, arg) in cmd.iter().enumerate() {
            Self::validate_argument(arg, idx == 0)?;
        }

        if base_cmd == "git" && cmd.len() > 1 {
            Self::validate_git_command(&cmd[1..])?;
        }

        Ok(())
    }

    fn validate_argument(arg: &str, is_program: bool) -> Result<(), ToolError> {
        for &ch in DANGEROUS_CHARS {
            if arg.contains(ch) {
                return Err(ToolError::PolicyViolation(format!(
                    "Dangerous character in argument: {:?}",
                    ch
                )));
            }
        }

        if arg.chars().any(|c| c.is_control() && c != '\t') {
            return Err(ToolError::PolicyViolation(
                "Control character in argument".into(),
            ));
        }

        if is_program {
            return Ok(());
        }

        if arg.contains("..") {
            return Err(ToolError::PolicyViolation(
                "Path traversal in argument".into(),
            ));
        }

        for &sensitive in SENSITIVE_PATHS {
            if arg.starts_with(sensitive) {
                return Err(ToolError::PolicyViolation(format!(
                    "Access to sensitive path: {}",
                    sensitive
                )));
            }
        }

        if arg.starts_with('/') && !arg.starts_with("/tmp") {
            return Err(ToolError::PolicyViolation(
                "Absolute path not allowed".into(),
            ));
        }

        if arg.starts_with("--global") || arg.starts_with("--system") {
            return Err(ToolError::PolicyViolation(
                "Global/system config not allowed".into(),
            ));
        }

        if arg == "-C" {
            return Err(ToolError::PolicyViolation(
                "Directory change not allowed".into(),
            ));
        }

        Ok(())
    }

    fn validate_git_command(args: &[String]) -> Result<(), ToolError> {
        if args.is_empty() {
            return Ok(());
        }

        let subcommand = &args[0];

        if subcommand == "config" {
            return Err(ToolError::PolicyViolation("git config not allowed".into()));
        }

        if !GIT_ALLOWED_SUBCOMMANDS
            .iter()
            .any(|&allowed| subcommand == allowed)
        {
            return Err(ToolError::PolicyViolation(format!(
                "git subcommand not allowed: {}",
                subcommand
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::policy::{default_allow_list, default_deny_list};

    fn guard() -> CommandGuard {
        CommandGuard::new(&default_allow_list(), &default_deny_list())
    }

    fn cmd(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn deny_list_wins_over_everything() {
        assert!(matches!(
            guard().validate(&cmd(&["rm", "-rf", "dir"])),
            Err(ToolError::PolicyViolation(_))
        ));
    }

    #[test]
    fn unlisted_command_rejected() {
        assert!(matches!(
            guard().validate(&cmd(&["python3", "script.py"])),
            Err(ToolError::PolicyViolation(_))
        ));
    }

    #[test]
    fn metacharacters_rejected() {
        for bad in ["|", ";", "&", ">", "<", "`cmd`", "$(cmd)"] {
            let result = guard().validate(&cmd(&["echo", bad]));
            assert!(result.is_err(), "should reject {:?}", bad);
        }
    }

    #[test]
    fn allowed_command_passes() {
        assert!(guard().validate(&cmd(&["ls", "-la"])).is_ok());
        assert!(guard().validate(&cmd(&["git", "status"])).is_ok());
    }

    #[test]
    fn git_write_subcommands_rejected() {
        assert!(guard().validate(&cmd(&["git", "push"])).is_err());
        assert!(guard().validate(&cmd(&["git", "config"])).is_err());
    }

    #[test]
    fn custom_allow_list_honored() {
        let custom = CommandGuard::new(&["uname".to_string()], &[]);
        assert!(custom.validate(&cmd(&["uname", "-a"])).is_ok());
        assert!(custom.validate(&cmd(&["ls"])).is_err());
    }

    #[test]
    fn empty_command_is_validation_error() {
        assert!(matches!(
            guard().validate(&[]),
            Err(ToolError::Validation(_))
        ));
    }
}
