use std::sync::Arc;
use std::time::Duration;

use quiver_agents::{AgentError, AgentRegistry, AgentSource, AgentWatcher};

fn document(name: &str, version: &str, prompt: &str) -> String {
    format!(
        "---\nname: {}\nversion: {}\ndescription: Test agent\ncapabilities:\n  - filesystem/read_file\n---\n{}",
        name, version, prompt
    )
}

#[test]
fn load_and_get() {
    let registry = AgentRegistry::new();
    registry
        .load_source(AgentSource::Builtin, &document("helper", "1.0.0", "Help."), None)
        .unwrap();

    let instance = registry.get("helper").unwrap();
    assert_eq!(instance.generation, 1);
    assert_eq!(instance.definition.version, "1.0.0");
    assert_eq!(instance.definition.capabilities, vec!["filesystem/read_file"]);
}

#[test]
fn duplicate_id_across_sources_rejected() {
    let registry = AgentRegistry::new();
    registry
        .load_source(AgentSource::Builtin, &document("helper", "1.0.0", "a"), None)
        .unwrap();

    let err = registry
        .load_source(AgentSource::Custom, &document("helper", "2.0.0", "b"), None)
        .unwrap_err();
    assert!(matches!(err, AgentError::Duplicate(_, _)));
    assert!(err.to_string().contains("builtin"));

    // First registration still active.
    assert_eq!(registry.get("helper").unwrap().definition.version, "1.0.0");
}

#[test]
fn reload_bumps_generation_and_retires_nothing_in_flight() {
    let registry = AgentRegistry::new();
    registry
        .load_source(AgentSource::Custom, &document("helper", "1.0.0", "old"), None)
        .unwrap();

    let held = registry.get("helper").unwrap();

    let reloaded = registry
        .reload("helper", &document("helper", "1.1.0", "new"))
        .unwrap();
    assert_eq!(reloaded.generation, 2);
    assert_eq!(reloaded.definition.prompt, "new");

    // The holder of the prior generation still sees a complete, unchanged
    // instance.
    assert_eq!(held.generation, 1);
    assert_eq!(held.definition.prompt, "old");
    assert_eq!(registry.get("helper").unwrap().generation, 2);
}

#[test]
fn failed_reload_keeps_active_generation() {
    let registry = AgentRegistry::new();
    registry
        .load_source(AgentSource::Custom, &document("helper", "1.0.0", "ok"), None)
        .unwrap();

    // Missing version field.
    let malformed = "---\nname: helper\ndescription: broken\n---\nbody";
    let err = registry.reload("helper", malformed).unwrap_err();
    assert!(matches!(err, AgentError::MalformedAgent(_)));

    let active = registry.get("helper").unwrap();
    assert_eq!(active.generation, 1);
    assert_eq!(active.definition.version, "1.0.0");
}

#[test]
fn reload_cannot_change_id() {
    let registry = AgentRegistry::new();
    registry
        .load_source(AgentSource::Custom, &document("helper", "1.0.0", "a"), None)
        .unwrap();
    let err = registry
        .reload("helper", &document("other", "1.0.0", "b"))
        .unwrap_err();
    assert!(matches!(err, AgentError::MalformedAgent(_)));
}

#[test]
fn unknown_agent_is_not_found() {
    let registry = AgentRegistry::new();
    assert!(matches!(
        registry.get("ghost"),
        Err(AgentError::NotFound(_))
    ));
    assert!(matches!(
        registry.reload("ghost", &document("ghost", "1.0.0", "x")),
        Err(AgentError::NotFound(_))
    ));
}

#[test]
fn retire_removes_but_holders_keep_their_instance() {
    let registry = AgentRegistry::new();
    registry
        .load_source(AgentSource::Installed, &document("helper", "1.0.0", "p"), None)
        .unwrap();
    let held = registry.get("helper").unwrap();

    registry.retire("helper").unwrap();
    assert!(matches!(registry.get("helper"), Err(AgentError::NotFound(_))));
    assert_eq!(held.definition.id, "helper");
}

#[test]
fn directory_load_skips_malformed_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("good.md"), document("good", "1.0.0", "p")).unwrap();
    std::fs::write(dir.path().join("bad.md"), "no front matter at all").unwrap();
    std::fs::write(dir.path().join("ignored.txt"), "not markdown").unwrap();

    let registry = AgentRegistry::new();
    let loaded = registry
        .load_directory(AgentSource::Custom, dir.path())
        .unwrap();
    assert_eq!(loaded, 1);
    assert!(registry.get("good").is_ok());
}

#[test]
fn reload_path_is_gated_on_content_hash() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("helper.md");
    std::fs::write(&path, document("helper", "1.0.0", "v1")).unwrap();

    let registry = AgentRegistry::new();
    registry.load_file(AgentSource::Custom, &path).unwrap();

    // Same content: no new generation.
    assert!(registry.reload_path(&path).unwrap().is_none());

    std::fs::write(&path, document("helper", "1.0.1", "v2")).unwrap();
    let reloaded = registry.reload_path(&path).unwrap().unwrap();
    assert_eq!(reloaded.generation, 2);

    // Unknown path: ignored.
    let other = dir.path().join("unknown.md");
    std::fs::write(&other, document("unknown", "1.0.0", "x")).unwrap();
    assert!(registry.reload_path(&other).unwrap().is_none());
}

#[test]
fn watcher_reloads_changed_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("helper.md");
    std::fs::write(&path, document("helper", "1.0.0", "v1")).unwrap();

    let registry = Arc::new(AgentRegistry::new());
    registry.load_file(AgentSource::Custom, &path).unwrap();

    let watcher = AgentWatcher::start(registry.clone(), &[dir.path().to_path_buf()]).unwrap();

    std::fs::write(&path, document("helper", "1.0.1", "v2")).unwrap();

    // Poll until the background reload lands.
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    loop {
        if registry.get("helper").unwrap().generation == 2 {
            break;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "watcher never picked up the change"
        );
        std::thread::sleep(Duration::from_millis(100));
    }

    let active = registry.get("helper").unwrap();
    assert_eq!(active.definition.version, "1.0.1");
    watcher.stop();
}
