use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Tool,
    Agent,
    Chain,
}

/// One appended record per invocation. Arguments are digested, never
/// stored raw, so secrets cannot land in the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub correlation_id: String,
    pub kind: AuditKind,
    pub identity: String,
    pub args_digest: String,
    pub decision: String,
    pub status: String,
    pub duration_ms: u64,
}

pub trait AuditSink: Send + Sync {
    fn append(&self, entry: &AuditEntry) -> std::io::Result<()>;
}

/// Append-only JSONL file, one entry per line, synced per write.
pub struct FileAuditLog {
    file: Mutex<File>,
}

impl FileAuditLog {
    pub fn new<P: AsRef<Path>>(log_path: P) -> std::io::Result<Self> {
        let log_path = log_path.as_ref();
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(log_path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditLog {
    fn append(&self, entry: &AuditEntry) -> std::io::Result<()> {
        let json = serde_json::to_string(entry)?;
        let mut file = self.file.lock();
        writeln!(file, "{}", json)?;
        file.sync_all()?;
        Ok(())
    }
}

/// In-memory sink for tests and embedded use.
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }
}

impl AuditSink for MemoryAuditLog {
    fn append(&self, entry: &AuditEntry) -> std::io::Result<()> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(status: &str) -> AuditEntry {
        AuditEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            correlation_id: "c-1".into(),
            kind: AuditKind::Tool,
            identity: "filesystem/read_file".into(),
            args_digest: "sha256:abc".into(),
            decision: "allow".into(),
            status: status.into(),
            duration_ms: 5,
        }
    }

    #[test]
    fn file_log_appends_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit/log.jsonl");
        let log = FileAuditLog::new(&path).unwrap();
        log.append(&entry("success")).unwrap();
        log.append(&entry("policy_violation")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: AuditEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.identity, "filesystem/read_file");
        let second: AuditEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.status, "policy_violation");
    }

    #[test]
    fn memory_log_collects_entries() {
        let log = MemoryAuditLog::new();
        log.append(&entry("success")).unwrap();
        assert_eq!(log.entries().len(), 1);
    }
}
