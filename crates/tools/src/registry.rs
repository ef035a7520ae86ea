use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::descriptor::{DetailLevel, ParamSpec, ToolDescriptor, ToolId};
use crate::error::ToolError;
use crate::tools::Tool;

/// A descriptor paired with its handler, as returned by `lookup`.
#[derive(Clone)]
pub struct RegisteredTool {
    pub descriptor: ToolDescriptor,
    pub handler: Arc<dyn Tool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerManifest {
    pub name: String,
    pub description: String,
    pub tools: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub server: String,
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<ParamSpec>>,
}

struct ServerEntry {
    name: String,
    description: String,
}

#[derive(Default)]
struct RegistryInner {
    servers: Vec<ServerEntry>,
    entries: HashMap<ToolId, RegisteredTool>,
    /// Global registration order, used by `list` and the disclosure generator.
    order: Vec<ToolId>,
}

/// Server-grouped tool registry. Reads take a shared lock and may run
/// unbounded concurrently; registration takes the exclusive lock so no
/// reader observes a half-updated descriptor set.
pub struct ToolRegistry {
    inner: RwLock<RegistryInner>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Declare a server group. Rejects duplicate names.
    pub fn define_server(&self, name: &str, description: &str) -> Result<(), ToolError> {
        let mut inner = self.inner.write();
        if inner.servers.iter().any(|s| s.name == name) {
            return Err(ToolError::DuplicateServer(name.to_string()));
        }
        inner.servers.push(ServerEntry {
            name: name.to_string(),
            description: description.to_string(),
        });
        Ok(())
    }

    /// Register a tool handler under its descriptor identity. The first
    /// registration of an identity wins; later ones are rejected.
    pub fn register(&self, handler: Arc<dyn Tool>) -> Result<(), ToolError> {
        let descriptor = handler.descriptor();
        let id = descriptor.id();
        let mut inner = self.inner.write();
        if inner.entries.contains_key(&id) {
            return Err(ToolError::Duplicate(id));
        }
        if !inner.servers.iter().any(|s| s.name == id.server) {
            // Implicitly declared servers get an empty description.
            inner.servers.push(ServerEntry {
                name: id.server.clone(),
                description: String::new(),
            });
        }
        tracing::debug!("Registered tool: {}", id);
        inner.order.push(id.clone());
        inner.entries.insert(
            id,
            RegisteredTool {
                descriptor,
                handler,
            },
        );
        Ok(())
    }

    pub fn lookup(&self, server: &str, name: &str) -> Result<RegisteredTool, ToolError> {
        let id = ToolId::new(server, name);
        let inner = self.inner.read();
        inner
            .entries
            .get(&id)
            .cloned()
            .ok_or(ToolError::NotFound(id))
    }

    /// Descriptors in registration order, optionally filtered by server.
    pub fn list(&self, server: Option<&str>) -> Vec<ToolDescriptor> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter(|id| server.map_or(true, |s| id.server == s))
            .filter_map(|id| inner.entries.get(id))
            .map(|e| e.descriptor.clone())
            .collect()
    }

    /// Server names in declaration order.
    pub fn servers(&self) -> Vec<String> {
        self.inner.read().servers.iter().map(|s| s.name.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn server_manifest(&self, server: &str) -> Result<ServerManifest, ToolError> {
        let inner = self.inner.read();
        let entry = inner
            .servers
            .iter()
            .find(|s| s.name == server)
            .ok_or_else(|| ToolError::ServerNotFound(server.to_string()))?;
        let tools = inner
            .order
            .iter()
            .filter(|id| id.server == server)
            .filter_map(|id| inner.entries.get(id))
            .map(|e| ManifestEntry {
                name: e.descriptor.name.clone(),
                description: e.descriptor.description.clone(),
            })
            .collect();
        Ok(ServerManifest {
            name: entry.name.clone(),
            description: entry.description.clone(),
            tools,
        })
    }

    /// Full definition of a single tool, for on-demand loading.
    pub fn tool_definition(&self, server: &str, name: &str) -> Result<ToolDescriptor, ToolError> {
        self.lookup(server, name).map(|e| e.descriptor)
    }

    /// Case-insensitive substring search over names and descriptions.
    /// Name matches rank ahead of description-only matches; registration
    /// order is preserved within each rank.
    pub fn search(&self, query: &str, detail: DetailLevel) -> Vec<SearchHit> {
        let needle = query.to_lowercase();
        let inner = self.inner.read();
        let mut name_hits = Vec::new();
        let mut desc_hits = Vec::new();
        for id in &inner.order {
            let Some(entry) = inner.entries.get(id) else {
                continue;
            };
            let d = &entry.descriptor;
            if d.name.to_lowercase().contains(&needle) {
                name_hits.push(Self::hit(d, detail));
            } else if d.description.to_lowercase().contains(&needle) {
                desc_hits.push(Self::hit(d, detail));
            }
        }
        name_hits.extend(desc_hits);
        name_hits
    }

    fn hit(d: &ToolDescriptor, detail: DetailLevel) -> SearchHit {
        match detail {
            DetailLevel::NameOnly => SearchHit {
                server: d.server.clone(),
                tool: d.name.clone(),
                description: None,
                parameters: None,
            },
            DetailLevel::NameAndDescription => SearchHit {
                server: d.server.clone(),
                tool: d.name.clone(),
                description: Some(d.description.clone()),
                parameters: None,
            },
            DetailLevel::Full => SearchHit {
                server: d.server.clone(),
                tool: d.name.clone(),
                description: Some(d.description.clone()),
                parameters: Some(d.parameters.clone()),
            },
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
