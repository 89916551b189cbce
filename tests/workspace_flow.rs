mod common;

use std::sync::Arc;

use noteslice::editor_manager::{EditorManagerConfig, editor_manager_slice};
use noteslice::persist::{restore_state, save_state};
use noteslice::workspace::{
    CreateNoteOptions, ExtensionRegistry, FileOps, History, LocalFileOps, Location, MemoryHistory,
    WORKSPACE, WorkspaceConfig, WorkspaceContext, default_note_doc, workspace_slice,
};
use noteslice::{AppState, ApplicationStore, FsErrorKind, SliceFields, WorkspaceError};
use serde_json::{Value, json};
use tempfile::TempDir;

use common::RecordingHost;

const WS: &str = "notes";

struct App {
    dir: TempDir,
    ops: Arc<LocalFileOps>,
    history: Arc<MemoryHistory>,
    host: Arc<RecordingHost>,
    ctx: WorkspaceContext,
}

fn slice_fields(host: &Arc<RecordingHost>) -> SliceFields {
    SliceFields::new()
        .with_field("workspaceSlice", workspace_slice(WorkspaceConfig::new(host.clone())))
        .with_field(
            "editorManagerSlice",
            editor_manager_slice(EditorManagerConfig::default()),
        )
}

async fn app(pathname: &str) -> App {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let ops = Arc::new(LocalFileOps::new(dir.path().join("workspaces")));
    ops.create_workspace(WS).await.unwrap();
    let welcome = json!({
        "type": "doc",
        "content": [{ "type": "paragraph", "content": [{ "type": "text", "text": "hi" }] }],
    });
    ops.save_doc("notes:welcome.md", &welcome, &ExtensionRegistry::default())
        .await
        .unwrap();

    let host = Arc::new(RecordingHost::default());
    let slices = vec![
        workspace_slice(WorkspaceConfig::new(host.clone())),
        editor_manager_slice(EditorManagerConfig::default()),
    ];
    let state = AppState::create(slices, Value::Null).unwrap();
    let store = ApplicationStore::builder().name("notes-app").build(state);
    let history = Arc::new(MemoryHistory::new(Location::new(pathname, "")));
    let ctx = WorkspaceContext::new(store, history.clone(), ops.clone(), host.clone());
    ctx.sync_location().await.unwrap();

    App {
        dir,
        ops,
        history,
        host,
        ctx,
    }
}

#[tokio::test]
async fn note_lifecycle_on_disk() {
    let app = app("/ws/notes/welcome.md").await;
    assert_eq!(*app.ctx.note_ws_paths().unwrap(), vec!["notes:welcome.md"]);
    assert_eq!(*app.ctx.recent_ws_paths(), vec!["notes:welcome.md"]);

    app.ctx
        .create_note("notes:ideas/today.md", CreateNoteOptions::default())
        .await
        .unwrap();
    let on_disk =
        std::fs::read_to_string(app.ops.workspace_dir(WS).join("ideas").join("today.md")).unwrap();
    let stored: Value = serde_json::from_str(&on_disk).unwrap();
    assert_eq!(stored, default_note_doc("today.md"));
    assert_eq!(app.history.location().pathname, "/ws/notes/ideas/today.md");

    app.ctx.push_ws_path("notes:welcome.md", false, true).unwrap();
    let opened = app.ctx.opened_ws_paths();
    assert_eq!(opened.primary_ws_path(), Some("notes:ideas/today.md"));
    assert_eq!(opened.secondary_ws_path(), Some("notes:welcome.md"));

    app.ctx
        .rename_note("notes:welcome.md", "notes:hello.md", true)
        .await
        .unwrap();
    assert_eq!(app.ctx.opened_ws_paths().secondary_ws_path(), Some("notes:hello.md"));
    assert_eq!(
        *app.ctx.note_ws_paths().unwrap(),
        vec!["notes:hello.md", "notes:ideas/today.md"]
    );

    app.ctx.delete_note(&["notes:ideas/today.md"]).await.unwrap();
    assert_eq!(app.ctx.opened_ws_paths().primary_ws_path(), None);
    assert!(!app.ctx.check_file_exists("notes:ideas/today.md").await.unwrap());

    let doc = app.ctx.get_note("notes:hello.md").await.unwrap();
    assert_eq!(doc["content"][0]["content"][0]["text"], "hi");
    assert!(app.host.calls().is_empty());
}

#[tokio::test]
async fn missing_workspace_reaches_the_host() {
    let app = app("/ws/elsewhere/a.md").await;
    assert!(app.ctx.note_ws_paths().is_none());
    assert_eq!(app.host.calls(), vec!["not-found:elsewhere"]);

    let err = app.ctx.get_note("elsewhere:a.md").await.unwrap_err();
    assert!(matches!(err, WorkspaceError::FileSystem(e) if e.kind == FsErrorKind::WorkspaceNotFound));
    assert_eq!(app.host.calls().len(), 2);
}

#[tokio::test]
async fn invalid_location_is_reported_and_dropped() {
    let app = app("/ws/notes/welcome.md").await;
    app.history.push(Location::new("/ws/notes/welcome.md", "?secondary=broken"));
    app.ctx.sync_location().await.unwrap();
    assert_eq!(app.ctx.opened_ws_paths().secondary_ws_path(), None);
    assert_eq!(app.host.calls(), vec!["invalid:broken"]);
}

#[tokio::test]
async fn recency_survives_a_restart() {
    let app = app("/ws/notes/welcome.md").await;
    let base = app.dir.path().join("app-state");
    let fields = slice_fields(&app.host);
    save_state(&base, "notes-app", &app.ctx.store().state(), &fields).unwrap();
    app.ctx.store().destroy();

    let slices = vec![
        workspace_slice(WorkspaceConfig::new(app.host.clone())),
        editor_manager_slice(EditorManagerConfig::default()),
    ];
    let state = restore_state(&base, "notes-app", slices, &fields, Value::Null).unwrap();
    let store = ApplicationStore::builder().name("notes-app").build(state);
    let ctx = WorkspaceContext::new(store, app.history.clone(), app.ops.clone(), app.host.clone());
    ctx.sync_location().await.unwrap();

    let recency = WORKSPACE.get_slice_state(&ctx.store().state()).unwrap().recency.clone();
    assert_eq!(recency.records()[0].key, "notes:welcome.md");
    assert_eq!(*ctx.recent_ws_paths(), vec!["notes:welcome.md"]);
}
