use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use quiver_tools::disclosure::{generate, normalize_identifier};
use quiver_tools::tools::register_builtin_servers;
use quiver_tools::{
    ExecutionContext, ParamSpec, Tool, ToolCategory, ToolDescriptor, ToolError, ToolRegistry,
};

struct StubTool {
    descriptor: ToolDescriptor,
}

impl StubTool {
    fn new(server: &str, name: &str) -> Arc<Self> {
        Arc::new(Self {
            descriptor: ToolDescriptor {
                server: server.into(),
                name: name.into(),
                description: format!("Stub {}", name),
                parameters: vec![ParamSpec::required("value", "string", "A value")],
                category: ToolCategory::InProcess,
                timeout_secs: None,
            },
        })
    }
}

#[async_trait]
impl Tool for StubTool {
    fn descriptor(&self) -> ToolDescriptor {
        self.descriptor.clone()
    }

    async fn execute(
        &self,
        _ctx: ExecutionContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        Ok(args)
    }
}

fn read_tree(dir: &Path) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let relative = path.strip_prefix(dir).unwrap().display().to_string();
                files.insert(relative, std::fs::read_to_string(&path).unwrap());
            }
        }
    }
    files
}

#[test]
fn repeated_generation_is_byte_identical() {
    let registry = ToolRegistry::new();
    register_builtin_servers(&registry).unwrap();
    let out = tempfile::tempdir().unwrap();

    let first = generate(&registry, out.path()).unwrap();
    assert!(first.written > 0);
    let snapshot = read_tree(out.path());

    let second = generate(&registry, out.path()).unwrap();
    assert_eq!(second.written, 0);
    assert_eq!(second.pruned, 0);
    assert_eq!(read_tree(out.path()), snapshot);
}

#[test]
fn tree_mirrors_server_hierarchy() {
    let registry = ToolRegistry::new();
    register_builtin_servers(&registry).unwrap();
    let out = tempfile::tempdir().unwrap();
    generate(&registry, out.path()).unwrap();

    assert!(out.path().join("servers/_index.md").exists());
    assert!(out.path().join("servers/filesystem/_index.md").exists());
    assert!(out.path().join("servers/filesystem/read_file.md").exists());
    assert!(out.path().join("servers/execution/run_script.md").exists());

    let unit = std::fs::read_to_string(out.path().join("servers/filesystem/read_file.md")).unwrap();
    assert!(unit.starts_with("---\nserver: filesystem\ntool: read_file\n"));
    assert!(unit.contains("| path | string | yes |"));
    assert!(unit.contains("\"server\": \"filesystem\""));
}

#[test]
fn removed_descriptor_prunes_only_its_unit() {
    let out = tempfile::tempdir().unwrap();

    let registry = ToolRegistry::new();
    registry.register(StubTool::new("alpha", "keep")).unwrap();
    registry.register(StubTool::new("alpha", "drop")).unwrap();
    generate(&registry, out.path()).unwrap();
    assert!(out.path().join("servers/alpha/drop.md").exists());

    let smaller = ToolRegistry::new();
    smaller.register(StubTool::new("alpha", "keep")).unwrap();
    let report = generate(&smaller, out.path()).unwrap();

    assert!(!out.path().join("servers/alpha/drop.md").exists());
    assert!(out.path().join("servers/alpha/keep.md").exists());
    assert!(report.pruned >= 1);
}

#[test]
fn removed_server_prunes_directory() {
    let out = tempfile::tempdir().unwrap();

    let registry = ToolRegistry::new();
    registry.register(StubTool::new("alpha", "one")).unwrap();
    registry.register(StubTool::new("beta", "two")).unwrap();
    generate(&registry, out.path()).unwrap();

    let alpha_only = ToolRegistry::new();
    alpha_only.register(StubTool::new("alpha", "one")).unwrap();
    generate(&alpha_only, out.path()).unwrap();

    assert!(!out.path().join("servers/beta").exists());
    assert!(out.path().join("servers/alpha/one.md").exists());
}

#[test]
fn added_descriptor_leaves_existing_units_untouched() {
    let out = tempfile::tempdir().unwrap();

    let registry = ToolRegistry::new();
    registry.register(StubTool::new("alpha", "one")).unwrap();
    generate(&registry, out.path()).unwrap();
    let before = read_tree(out.path());

    let bigger = ToolRegistry::new();
    bigger.register(StubTool::new("alpha", "one")).unwrap();
    bigger.register(StubTool::new("alpha", "two")).unwrap();
    generate(&bigger, out.path()).unwrap();

    let after = read_tree(out.path());
    assert_eq!(before["servers/alpha/one.md"], after["servers/alpha/one.md"]);
    assert!(after.contains_key("servers/alpha/two.md"));
}

#[test]
fn identifier_normalization() {
    assert_eq!(normalize_identifier("read-file"), "read_file");
    assert_eq!(normalize_identifier("HTTP Request"), "http_request");
    assert_eq!(normalize_identifier("2fast"), "_2fast");
}

#[test]
fn normalization_collision_is_rejected() {
    let registry = ToolRegistry::new();
    registry.register(StubTool::new("alpha", "read-file")).unwrap();
    registry.register(StubTool::new("alpha", "read_file")).unwrap();

    let out = tempfile::tempdir().unwrap();
    let result = generate(&registry, out.path());
    assert!(matches!(result, Err(ToolError::IdentifierCollision(_))));
}
