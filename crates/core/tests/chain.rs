use serde_json::json;
use std::sync::Arc;

use quiver_agents::{AgentRegistry, AgentSource};
use quiver_core::{
    ChainStage, MemoryAuditLog, Orchestrator, OrchestratorError, Settings, StageErrorPolicy,
    StageStatus,
};
use quiver_tools::tools::register_builtin_servers;
use quiver_tools::ToolRegistry;

fn agent_doc(name: &str) -> String {
    format!(
        "---\nname: {}\nversion: 1.0.0\ndescription: Chain stage agent\n---\nYou are {}.",
        name, name
    )
}

struct Fixture {
    orchestrator: Orchestrator,
    audit: Arc<MemoryAuditLog>,
    _root: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("input.txt"), "chain input data").unwrap();

    let tools = Arc::new(ToolRegistry::new());
    register_builtin_servers(&tools).unwrap();

    let agents = Arc::new(AgentRegistry::new());
    for name in ["planner", "worker", "reviewer"] {
        agents
            .load_source(AgentSource::Builtin, &agent_doc(name), None)
            .unwrap();
    }

    let audit = Arc::new(MemoryAuditLog::new());
    let orchestrator = Orchestrator::new(
        tools,
        agents,
        audit.clone(),
        Settings::with_root(root.path()),
    );
    Fixture {
        orchestrator,
        audit,
        _root: root,
    }
}

fn read_stage(agent: &str, path: &str) -> ChainStage {
    ChainStage::new(agent).with_tool_call("filesystem", "read_file", json!({"path": path}))
}

#[tokio::test]
async fn chain_threads_output_through_stages() {
    let f = fixture();
    let stages = [
        read_stage("planner", "input.txt"),
        ChainStage::new("worker"),
        ChainStage::new("reviewer"),
    ];

    let ctx = f
        .orchestrator
        .chain(&stages, json!({"goal": "review the input"}))
        .await
        .unwrap();

    assert_eq!(ctx.stages.len(), 3);
    assert!(ctx.stages.iter().all(|s| s.status == StageStatus::Completed));

    // Stage 1 saw the original input; stage 2 received stage 1's output.
    assert_eq!(ctx.stages[0].input["goal"], "review the input");
    assert_eq!(ctx.stages[1].input["agent"], "planner");

    // Later stages see earlier outputs through the shared scratch space.
    let reviewer_scratch = &ctx.stages[2].output["context"]["scratch"];
    assert!(reviewer_scratch.get("planner").is_some());
    assert!(reviewer_scratch.get("worker").is_some());

    // Stage 1's tool call payload landed in its output.
    let tool_results = ctx.stages[0].output["tool_results"].as_array().unwrap();
    assert_eq!(tool_results.len(), 1);
    assert_eq!(tool_results[0]["status"], "success");
    assert_eq!(tool_results[0]["payload"]["content"], "chain input data");

    assert_eq!(ctx.budget.tool_calls, 1);
}

#[tokio::test]
async fn policy_violation_aborts_before_later_stages() {
    let f = fixture();
    let stages = [
        read_stage("planner", "input.txt"),
        read_stage("worker", "../../etc/passwd"),
        read_stage("reviewer", "input.txt"),
    ];

    let err = f
        .orchestrator
        .chain(&stages, json!({}))
        .await
        .unwrap_err();
    match err {
        OrchestratorError::ChainAborted { stage, agent, reason } => {
            assert_eq!(stage, 1);
            assert_eq!(agent, "worker");
            assert!(reason.contains("policy"));
        }
        other => panic!("expected ChainAborted, got {}", other),
    }

    // Stage 3 never resolved its agent or ran its tool call.
    let entries = f.audit.entries();
    assert!(!entries.iter().any(|e| e.identity == "reviewer"));
    let tool_entries: Vec<_> = entries
        .iter()
        .filter(|e| e.identity == "filesystem/read_file")
        .collect();
    assert_eq!(tool_entries.len(), 2);
    assert_eq!(tool_entries[1].status, "policy_violation");
}

#[tokio::test]
async fn recoverable_failure_continues_with_partial_output() {
    let f = fixture();
    let stages = [
        read_stage("planner", "input.txt"),
        ChainStage::new("worker")
            .with_tool_call("execution", "run_script", json!({"interpreter": "cobol", "code": ""}))
            .on_error(StageErrorPolicy::Continue),
        read_stage("reviewer", "input.txt"),
    ];

    let ctx = f.orchestrator.chain(&stages, json!({})).await.unwrap();

    assert_eq!(ctx.stages.len(), 3);
    assert_eq!(ctx.stages[1].status, StageStatus::Partial);
    assert_eq!(ctx.stages[2].status, StageStatus::Completed);

    // The failed call's partial output is recorded in the chain context.
    let partial = ctx.stages[1].output["tool_results"].as_array().unwrap();
    assert_eq!(partial[0]["status"], "handler_error");
    assert!(ctx.scratch.contains_key("worker"));
}

#[tokio::test]
async fn recoverable_failure_aborts_when_stage_says_so() {
    let f = fixture();
    let stages = [
        read_stage("planner", "input.txt"),
        ChainStage::new("worker")
            .with_tool_call("execution", "run_script", json!({"interpreter": "cobol", "code": ""}))
            .on_error(StageErrorPolicy::Abort),
        read_stage("reviewer", "input.txt"),
    ];

    let err = f.orchestrator.chain(&stages, json!({})).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::ChainAborted { stage: 1, .. }
    ));
}

#[tokio::test]
async fn unknown_stage_agent_aborts_chain() {
    let f = fixture();
    let stages = [ChainStage::new("planner"), ChainStage::new("ghost")];
    let err = f.orchestrator.chain(&stages, json!({})).await.unwrap_err();
    match err {
        OrchestratorError::ChainAborted { stage, reason, .. } => {
            assert_eq!(stage, 1);
            assert!(reason.contains("not found"));
        }
        other => panic!("expected ChainAborted, got {}", other),
    }
}

#[tokio::test]
async fn generation_is_pinned_per_stage_record() {
    let f = fixture();
    let ctx = f
        .orchestrator
        .chain(&[ChainStage::new("planner")], json!({}))
        .await
        .unwrap();
    assert_eq!(ctx.stages[0].generation, 1);

    // A reload after the chain finished does not rewrite the record.
    f.orchestrator
        .agents()
        .reload("planner", &agent_doc("planner").replace("1.0.0", "1.0.1"))
        .unwrap();
    assert_eq!(ctx.stages[0].generation, 1);
    assert_eq!(
        f.orchestrator.agents().get("planner").unwrap().generation,
        2
    );
}
