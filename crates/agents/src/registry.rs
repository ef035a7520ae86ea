use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::definition::{parse_document, AgentDefinition};
use crate::error::AgentError;

/// Where a definition was loaded from. Duplicate ids are rejected across
/// all sources, not just within one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentSource {
    Builtin,
    Custom,
    Installed,
}

impl fmt::Display for AgentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentSource::Builtin => write!(f, "builtin"),
            AgentSource::Custom => write!(f, "custom"),
            AgentSource::Installed => write!(f, "installed"),
        }
    }
}

/// One immutable generation of an agent. Reload never mutates an instance;
/// it swaps in a successor with a higher generation.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentInstance {
    pub definition: AgentDefinition,
    pub generation: u64,
    pub content_hash: String,
    pub loaded_at: DateTime<Utc>,
}

struct AgentSlot {
    source: AgentSource,
    path: Option<PathBuf>,
    /// Readers clone the Arc out; reload swaps the pointer under a short
    /// write lock. A holder of generation N keeps generation N.
    active: RwLock<Arc<AgentInstance>>,
}

pub struct AgentRegistry {
    slots: RwLock<HashMap<String, Arc<AgentSlot>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn content_hash(document: &str) -> String {
        format!("{:x}", Sha256::digest(document.as_bytes()))
    }

    /// Parse and register a new agent. The second registration of an id is
    /// rejected whatever source it comes from.
    pub fn load_source(
        &self,
        source: AgentSource,
        document: &str,
        path: Option<PathBuf>,
    ) -> Result<Arc<AgentInstance>, AgentError> {
        let definition = parse_document(document)?;
        let id = definition.id.clone();

        let mut slots = self.slots.write();
        if let Some(existing) = slots.get(&id) {
            return Err(AgentError::Duplicate(id, existing.source.to_string()));
        }

        let instance = Arc::new(AgentInstance {
            definition,
            generation: 1,
            content_hash: Self::content_hash(document),
            loaded_at: Utc::now(),
        });
        slots.insert(
            id.clone(),
            Arc::new(AgentSlot {
                source,
                path,
                active: RwLock::new(instance.clone()),
            }),
        );
        info!("Loaded agent: {} ({})", id, source);
        Ok(instance)
    }

    pub fn load_file(
        &self,
        source: AgentSource,
        path: &Path,
    ) -> Result<Arc<AgentInstance>, AgentError> {
        let document = std::fs::read_to_string(path)?;
        // Canonicalize so watcher events resolve to the same slot path.
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.load_source(source, &document, Some(canonical))
    }

    /// Load every `.md` document in a directory. Malformed documents are
    /// logged and skipped so one bad file cannot block the rest.
    pub fn load_directory(&self, source: AgentSource, dir: &Path) -> Result<usize, AgentError> {
        if !dir.exists() {
            return Ok(0);
        }
        let mut loaded = 0;
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "md"))
            .collect();
        paths.sort();
        for path in paths {
            match self.load_file(source, &path) {
                Ok(_) => loaded += 1,
                Err(e) => warn!("Skipping agent file {}: {}", path.display(), e),
            }
        }
        Ok(loaded)
    }

    /// Current Active instance for an id.
    pub fn get(&self, id: &str) -> Result<Arc<AgentInstance>, AgentError> {
        let slots = self.slots.read();
        let slot = slots
            .get(id)
            .ok_or_else(|| AgentError::NotFound(id.to_string()))?;
        let active = slot.active.read().clone();
        Ok(active)
    }

    pub fn list(&self) -> Vec<Arc<AgentInstance>> {
        let slots = self.slots.read();
        let mut ids: Vec<&String> = slots.keys().collect();
        ids.sort();
        ids.iter()
            .filter_map(|id| slots.get(*id))
            .map(|slot| slot.active.read().clone())
            .collect()
    }

    /// Re-parse a document for an already-loaded id. On success the Active
    /// pointer swaps to generation+1; on failure the previous generation
    /// stays Active and the parse error is returned.
    pub fn reload(&self, id: &str, document: &str) -> Result<Arc<AgentInstance>, AgentError> {
        let slot = {
            let slots = self.slots.read();
            slots
                .get(id)
                .cloned()
                .ok_or_else(|| AgentError::NotFound(id.to_string()))?
        };

        let definition = parse_document(document)?;
        if definition.id != id {
            return Err(AgentError::MalformedAgent(format!(
                "agent id changed on reload: {} -> {}",
                id, definition.id
            )));
        }

        let mut active = slot.active.write();
        let next = Arc::new(AgentInstance {
            definition,
            generation: active.generation + 1,
            content_hash: Self::content_hash(document),
            loaded_at: Utc::now(),
        });
        *active = next.clone();
        info!("Reloaded agent: {} (generation {})", id, next.generation);
        Ok(next)
    }

    /// Reload the agent whose slot tracks `path`, but only when the file
    /// content actually changed. Returns `Ok(None)` for unknown paths and
    /// unchanged content.
    pub fn reload_path(&self, path: &Path) -> Result<Option<Arc<AgentInstance>>, AgentError> {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let found = {
            let slots = self.slots.read();
            slots.iter().find_map(|(id, slot)| {
                (slot.path.as_deref() == Some(path.as_path())).then(|| (id.clone(), slot.clone()))
            })
        };
        let Some((id, slot)) = found else {
            return Ok(None);
        };

        let document = std::fs::read_to_string(path)?;
        if Self::content_hash(&document) == slot.active.read().content_hash {
            return Ok(None);
        }
        self.reload(&id, &document).map(Some)
    }

    /// Remove an id from the registry. In-flight holders of the retired
    /// instance keep using the Arc they already cloned.
    pub fn retire(&self, id: &str) -> Result<(), AgentError> {
        let mut slots = self.slots.write();
        slots
            .remove(id)
            .map(|_| info!("Retired agent: {}", id))
            .ok_or_else(|| AgentError::NotFound(id.to_string()))
    }

    /// Paths backing loaded agents, for the hot-reload watcher.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let slots = self.slots.read();
        slots.values().filter_map(|slot| slot.path.clone()).collect()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
