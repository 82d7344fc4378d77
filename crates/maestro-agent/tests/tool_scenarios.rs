// End-to-end tool scenarios against a real store and a seeded knowledge
// directory: the registry built here is the one the tool loop dispatches
// into during live conversations.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use maestro_agent::tools::control::EngineSwitch;
use maestro_agent::tools::{ToolContext, ToolOutput, ToolRegistry};
use maestro_core::events::EventBus;
use maestro_knowledge::{load_project, Knowledge};
use maestro_store::types::HighlightStatus;
use maestro_store::Store;

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Knowledge store with one unique K_211 page and an ambiguous K_201 pair.
fn seed_knowledge(root: &Path) {
    write(root.join("project.json").as_path(), r#"{"name": "DQ 42"}"#);
    for page in [
        "K_211_ENLARGED_EQUIPMENT_FLOOR_PLAN_p001",
        "K_201_OVERALL_EQUIPMENT_PLAN_p001",
        "K_201A_DETAIL_PLAN_p001",
    ] {
        write(
            root.join(format!("pages/{page}/pass1.json")).as_path(),
            r#"{"sheet_reflection": "Kitchen sheet.", "discipline": "Kitchen", "regions": []}"#,
        );
    }
}

fn build_fixture() -> (tempfile::TempDir, Arc<ToolContext>, ToolRegistry) {
    let dir = tempfile::tempdir().unwrap();
    seed_knowledge(dir.path());

    let bus = EventBus::new();
    let store = Arc::new(Store::open_in_memory(bus).unwrap());
    let project = store.get_or_create_project("DQ 42", "").unwrap();
    let knowledge = Arc::new(Knowledge::new(
        load_project(dir.path().to_str().unwrap()).unwrap(),
    ));

    let ctx = Arc::new(ToolContext {
        store,
        knowledge,
        project_id: project.id,
        identity_dir: dir.path().join("identity"),
        workspaces_dir: dir.path().join("workspaces"),
        google: None,
        request_timeout: Duration::from_secs(5),
        switch: Arc::new(EngineSwitch::new("gpt")),
    });
    let registry = ToolRegistry::build(ctx.clone());
    (dir, ctx, registry)
}

async fn call(registry: &ToolRegistry, name: &str, input: serde_json::Value) -> ToolOutput {
    registry
        .find(name)
        .unwrap_or_else(|| panic!("tool '{name}' not registered"))
        .execute(input)
        .await
}

fn expect_text(output: ToolOutput) -> String {
    match output {
        ToolOutput::Text(s) => s,
        other => panic!("expected text output, got {other:?}"),
    }
}

fn expect_failure(output: ToolOutput) -> String {
    match output {
        ToolOutput::Failure(s) => s,
        other => panic!("expected failure output, got {other:?}"),
    }
}

#[test]
fn registry_holds_the_full_catalogue() {
    let (_dir, _ctx, registry) = build_fixture();
    assert_eq!(registry.len(), 30);
    for name in [
        "list_disciplines",
        "search",
        "check_gaps",
        "create_workspace",
        "add_page",
        "remove_highlight",
        "see_page",
        "highlight_on_page",
        "list_events",
        "upcoming",
        "update_experience",
        "update_knowledge",
        "switch_engine",
    ] {
        assert!(registry.find(name).is_some(), "missing tool {name}");
    }
    // every definition carries an object schema
    for def in registry.definitions() {
        assert_eq!(def.input_schema["type"], "object");
    }
}

#[tokio::test]
async fn workspace_flow_creates_adds_and_removes_pages() {
    let (_dir, ctx, registry) = build_fixture();

    let created = expect_text(
        call(
            &registry,
            "create_workspace",
            serde_json::json!({
                "title": "Walk-In Cooler Install",
                "description": "Cooler pad, drains, power"
            }),
        )
        .await,
    );
    assert!(created.contains("walk_in_cooler_install"));

    // fuzzy page token resolves to the unique full page name
    let added = expect_text(
        call(
            &registry,
            "add_page",
            serde_json::json!({
                "workspace_slug": "walk_in_cooler_install",
                "page_name": "K_211"
            }),
        )
        .await,
    );
    assert!(added.contains("K_211_ENLARGED_EQUIPMENT_FLOOR_PLAN_p001"));

    let detail = ctx
        .store
        .get_workspace(&ctx.project_id, "walk_in_cooler_install")
        .unwrap()
        .unwrap();
    assert_eq!(detail.pages.len(), 1);
    assert_eq!(
        detail.pages[0].page.page_name,
        "K_211_ENLARGED_EQUIPMENT_FLOOR_PLAN_p001"
    );

    let removed = expect_text(
        call(
            &registry,
            "remove_page",
            serde_json::json!({
                "workspace_slug": "Walk-In Cooler Install",
                "page_name": "K 211"
            }),
        )
        .await,
    );
    assert!(removed.contains("Removed"));
    let detail = ctx
        .store
        .get_workspace(&ctx.project_id, "walk_in_cooler_install")
        .unwrap()
        .unwrap();
    assert!(detail.pages.is_empty());
}

#[tokio::test]
async fn ambiguous_page_token_is_rejected_with_the_full_set() {
    let (_dir, _ctx, registry) = build_fixture();

    expect_text(
        call(
            &registry,
            "create_workspace",
            serde_json::json!({"title": "Kitchen", "description": "equipment"}),
        )
        .await,
    );

    let failure = expect_failure(
        call(
            &registry,
            "add_page",
            serde_json::json!({"workspace_slug": "kitchen", "page_name": "K_201"}),
        )
        .await,
    );
    assert!(failure.starts_with("ambiguous"), "got: {failure}");
    assert!(failure.contains("K_201_OVERALL_EQUIPMENT_PLAN_p001"));
    assert!(failure.contains("K_201A_DETAIL_PLAN_p001"));
}

#[tokio::test]
async fn schedule_tools_round_trip() {
    let (_dir, ctx, registry) = build_fixture();

    let added = expect_text(
        call(
            &registry,
            "add_event",
            serde_json::json!({
                "title": "Footing pour",
                "start": "2026-08-04",
                "event_type": "Milestone"
            }),
        )
        .await,
    );
    assert!(added.contains("evt_"));
    assert!(added.contains("milestone"));

    let events = ctx.store.list_events(&ctx.project_id, None, None, None).unwrap();
    assert_eq!(events.len(), 1);

    let bad = expect_failure(
        call(
            &registry,
            "add_event",
            serde_json::json!({"title": "Bad", "start": "tomorrow"}),
        )
        .await,
    );
    assert!(bad.contains("Invalid start date"));
}

#[tokio::test]
async fn highlight_tool_requires_vision_credentials() {
    let (_dir, ctx, registry) = build_fixture();

    expect_text(
        call(
            &registry,
            "create_workspace",
            serde_json::json!({"title": "Kitchen", "description": "equipment"}),
        )
        .await,
    );
    expect_text(
        call(
            &registry,
            "add_page",
            serde_json::json!({"workspace_slug": "kitchen", "page_name": "K_211"}),
        )
        .await,
    );

    // no Google config in the fixture: the tool refuses before creating a row
    let failure = expect_failure(
        call(
            &registry,
            "highlight_on_page",
            serde_json::json!({
                "workspace_slug": "kitchen",
                "page_name": "K_211",
                "mission": "find the floor drains"
            }),
        )
        .await,
    );
    assert!(failure.contains("not configured"));

    // highlight lifecycle driven through the store directly
    let h = ctx
        .store
        .add_highlight(
            &ctx.project_id,
            "kitchen",
            "K_211_ENLARGED_EQUIPMENT_FLOOR_PLAN_p001",
            "drains",
        )
        .unwrap();
    ctx.store.fail_highlight(h.id).unwrap();
    assert_eq!(
        ctx.store.get_highlight(h.id).unwrap().unwrap().status,
        HighlightStatus::Failed
    );
}

#[tokio::test]
async fn switch_engine_tool_validates_and_stages() {
    let (_dir, ctx, registry) = build_fixture();

    let rejected = expect_failure(
        call(&registry, "switch_engine", serde_json::json!({"engine": "gpt"})).await,
    );
    assert_eq!(rejected, "Already running on gpt.");

    let unknown = expect_failure(
        call(&registry, "switch_engine", serde_json::json!({"engine": "hal9000"})).await,
    );
    assert!(unknown.contains("Unknown engine"));
    assert!(ctx.switch.take_pending().is_none());

    let confirmed = expect_text(
        call(&registry, "switch_engine", serde_json::json!({"engine": "opus"})).await,
    );
    assert!(confirmed.contains("Switched from gpt to opus"));
    assert_eq!(ctx.switch.take_pending().as_deref(), Some("opus"));
}
