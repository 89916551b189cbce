mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use noteslice::editor_manager::{
    EDITOR_MANAGER, Editor, EditorManagerConfig, FOCUS_EDITOR_ON_LOAD_COOLDOWN, editor_manager_slice,
    on_focus_update, set_editor,
};
use noteslice::persist::{restore_state, save_state};
use noteslice::{AppState, ApplicationStore, ManualClock, QueueScheduler, SliceFields};
use serde_json::{Value, json};

use common::FakeEditor;

fn fields() -> SliceFields {
    SliceFields::new().with_field(
        "editorManagerSlice",
        editor_manager_slice(EditorManagerConfig::default()),
    )
}

fn store(state: AppState, clock: Arc<ManualClock>) -> ApplicationStore {
    ApplicationStore::builder().name("editors").clock(clock).build(state)
}

fn fresh_state() -> AppState {
    AppState::create(
        vec![editor_manager_slice(EditorManagerConfig::default())],
        Value::Null,
    )
    .unwrap()
}

#[test]
fn designated_pane_takes_focus_on_load_then_new_editors_do() {
    common::init_tracing();
    let clock = Arc::new(ManualClock::new(10_000));
    let store = store(fresh_state(), clock.clone());

    let first = FakeEditor::new("notes:a.md");
    let second = FakeEditor::new("notes:b.md");
    store.dispatch(set_editor(1, Some(second.clone() as Editor))).unwrap();
    store.dispatch(set_editor(0, Some(first.clone() as Editor))).unwrap();
    assert_eq!(first.focus_calls(), 1);
    assert_eq!(second.focus_calls(), 0);

    clock.advance(FOCUS_EDITOR_ON_LOAD_COOLDOWN + 1);
    let third = FakeEditor::new("notes:c.md");
    store.dispatch(set_editor(1, Some(third.clone() as Editor))).unwrap();
    assert_eq!(third.focus_calls(), 0, "the focused first pane keeps focus");

    first.focused.store(false, Ordering::SeqCst);
    let fourth = FakeEditor::new("notes:d.md");
    store.dispatch(set_editor(1, Some(fourth.clone() as Editor))).unwrap();
    assert_eq!(fourth.focus_calls(), 1);
}

#[test]
fn selection_and_scroll_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(0));
    let store = store(fresh_state(), clock.clone());

    let editor = FakeEditor::new("notes:a.md");
    store.dispatch(set_editor(0, Some(editor.clone() as Editor))).unwrap();
    store.dispatch(on_focus_update(0)).unwrap();
    store.dispatch(set_editor(0, None)).unwrap();

    save_state(dir.path(), "editors", &store.state(), &fields()).unwrap();
    store.destroy();

    let restored = restore_state(
        dir.path(),
        "editors",
        vec![editor_manager_slice(EditorManagerConfig::default())],
        &fields(),
        Value::Null,
    )
    .unwrap();
    let state = EDITOR_MANAGER.get_slice_state(&restored).unwrap();
    assert_eq!(state.focused_editor_id, Some(0));
    assert_eq!(
        state.editor_config.initial_selection("notes:a.md", 0),
        Some(&json!({ "type": "text", "anchor": 3, "head": 3 }))
    );
    assert!(state.editors.live().next().is_none());
}

#[test]
fn deferred_effects_run_only_when_flushed() {
    let scheduler = Arc::new(QueueScheduler::new());
    let store = ApplicationStore::builder()
        .scheduler(scheduler.clone())
        .clock(Arc::new(ManualClock::new(0)))
        .build(fresh_state());

    let editor = FakeEditor::new("notes:a.md");
    store.dispatch(set_editor(0, Some(editor.clone() as Editor))).unwrap();
    assert_eq!(editor.focus_calls(), 0);

    scheduler.run_pending();
    assert_eq!(editor.focus_calls(), 1);

    store.destroy();
    store.dispatch(set_editor(0, None)).unwrap_err();
}
