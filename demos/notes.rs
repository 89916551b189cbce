//! Self-contained example wiring a custom slice, the workspace slice and
//! the editor manager into one store backed by a temporary directory.
//!
//! Run with: `cargo run --example notes`

use std::sync::Arc;

use noteslice::editor_manager::{EditorManagerConfig, editor_manager_slice};
use noteslice::persist::{restore_state, save_state};
use noteslice::workspace::{
    CreateNoteOptions, LocalFileOps, Location, LoggingHost, MemoryHistory, WorkspaceConfig,
    WorkspaceContext, workspace_slice,
};
use noteslice::{
    Action, AppState, ApplicationStore, Effect, EffectContext, EffectError, Slice, SliceError,
    SliceFields, SliceKey, StateField, TokioScheduler, Trigger, VersionedJson,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Session stats slice
// ---------------------------------------------------------------------------

/// Counts dispatched actions per domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SessionStats {
    workspace_actions: u64,
    editor_actions: u64,
}

const STATS: SliceKey<SessionStats> = SliceKey::new("session-stats-slice");

fn stats_slice() -> Slice {
    let field = StateField::new(|_, _| Ok(SessionStats::default()))
        .with_apply(|action: &Action, prev: &Arc<SessionStats>, _| {
            let mut next = (**prev).clone();
            match action.domain() {
                Some("workspace-context") => next.workspace_actions += 1,
                Some("editor-manager-context") => next.editor_actions += 1,
                _ => return Ok(Arc::clone(prev)),
            }
            Ok(Arc::new(next))
        })
        .with_json(
            |s| {
                let json_err = |source| SliceError::Json {
                    slice: STATS.name().into(),
                    source,
                };
                let data = serde_json::to_value(s).map_err(json_err)?;
                serde_json::to_value(VersionedJson { version: 1, data }).map_err(json_err)
            },
            |_, json, _| {
                let json_err = |source| SliceError::Json {
                    slice: STATS.name().into(),
                    source,
                };
                let envelope: VersionedJson = serde_json::from_value(json.clone()).map_err(json_err)?;
                serde_json::from_value(envelope.data).map_err(json_err)
            },
        );
    Slice::new(STATS, field).with_effect(LogStats)
}

/// Prints the stats every time they change.
struct LogStats;

impl Effect for LogStats {
    type Local = ();

    fn name(&self) -> &'static str {
        "log-stats"
    }

    fn trigger(&self) -> Trigger {
        Trigger::SliceChanged(STATS.name())
    }

    fn init(&self, _store: &ApplicationStore) {}

    fn update(&self, _: &mut (), cx: &EffectContext<'_>) -> Result<(), EffectError> {
        if let Some(stats) = STATS.get_slice_state(cx.state()) {
            println!("  [{}] stats: {stats:?}", cx.action().name);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn slices(host: Arc<LoggingHost>) -> Vec<Slice> {
    vec![
        workspace_slice(WorkspaceConfig::new(host)),
        editor_manager_slice(EditorManagerConfig::default()),
        stats_slice(),
    ]
}

fn fields(host: Arc<LoggingHost>) -> SliceFields {
    SliceFields::new()
        .with_field("workspaceSlice", workspace_slice(WorkspaceConfig::new(host)))
        .with_field(
            "editorManagerSlice",
            editor_manager_slice(EditorManagerConfig::default()),
        )
        .with_field("sessionStats", stats_slice())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let tmp = tempfile::tempdir()?;
    let ops = Arc::new(LocalFileOps::new(tmp.path().join("workspaces")));
    ops.create_workspace("demo").await?;

    let host = Arc::new(LoggingHost);
    let state = restore_state(
        tmp.path(),
        "demo-store",
        slices(host.clone()),
        &fields(host.clone()),
        Value::Null,
    )?;
    let store = ApplicationStore::builder()
        .name("demo-store")
        .scheduler(Arc::new(TokioScheduler::new()))
        .build(state);

    let history = Arc::new(MemoryHistory::new(Location::new("/ws/demo", "")));
    let ctx = WorkspaceContext::new(store.clone(), history, ops, host.clone());
    ctx.sync_location().await?;

    ctx.create_note("demo:first.md", CreateNoteOptions::default()).await?;
    ctx.create_note(
        "demo:second.md",
        CreateNoteOptions {
            open: false,
            doc: None,
        },
    )
    .await?;
    ctx.push_ws_path("demo:second.md", false, true)?;
    ctx.rename_note("demo:second.md", "demo:renamed.md", true).await?;

    // Let the scheduled effect passes drain.
    tokio::task::yield_now().await;

    println!("notes:  {:?}", ctx.note_ws_paths());
    println!("opened: {:?}", ctx.opened_ws_paths());
    println!("recent: {:?}", ctx.recent_ws_paths());

    save_state(tmp.path(), "demo-store", &store.state(), &fields(host))?;
    store.destroy();

    let stats = STATS
        .get_slice_state(&store.state())
        .ok_or("stats slice missing")?;
    assert!(stats.workspace_actions > 0, "workspace actions should be counted");
    println!("all assertions passed");

    Ok(())
}
