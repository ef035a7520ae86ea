use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution category of a tool. Decides which sandbox path the handler
/// takes and which default timeout applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Pure computation and confinement-checked filesystem operations.
    InProcess,
    /// Arbitrary code or command execution in an isolated process group.
    Subprocess,
    /// Outbound network calls, refused when the policy disables network.
    Network,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl ParamSpec {
    pub fn required(name: &str, type_name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            description: description.to_string(),
            required: true,
            default: None,
        }
    }

    pub fn optional(
        name: &str,
        type_name: &str,
        description: &str,
        default: serde_json::Value,
    ) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            description: description.to_string(),
            required: false,
            default: Some(default),
        }
    }
}

/// Registry identity of a tool: unique per (server, name) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolId {
    pub server: String,
    pub name: String,
}

impl ToolId {
    pub fn new(server: &str, name: &str) -> Self {
        Self {
            server: server.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.server, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub server: String,
    pub name: String,
    pub description: String,
    /// Parameter schema in declaration order.
    pub parameters: Vec<ParamSpec>,
    pub category: ToolCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ToolDescriptor {
    pub fn id(&self) -> ToolId {
        ToolId::new(&self.server, &self.name)
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// How much of each record a discovery query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailLevel {
    NameOnly,
    NameAndDescription,
    Full,
}
