//! Effects of the editor-manager slice: focus on load, initial-selection
//! capture and scroll watching.

use std::sync::Arc;

use serde_json::json;

use super::state::{
    EDITOR_MANAGER, EditorSlots, UPDATE_INITIAL_SELECTION_JSON, UPDATE_SCROLL_POSITION,
};
use crate::action::Action;
use crate::effect::{Effect, EffectContext, Trigger};
use crate::error::EffectError;
use crate::store::{ApplicationStore, WeakStore};

/// Time after store creation during which only the designated pane may be
/// focused automatically, in milliseconds.
pub const FOCUS_EDITOR_ON_LOAD_COOLDOWN: u64 = 500;

fn current_editors(store: &ApplicationStore) -> Arc<EditorSlots> {
    EDITOR_MANAGER
        .get_slice_state(&store.state())
        .map(|s| Arc::clone(&s.editors))
        .unwrap_or_default()
}

/// Focuses editors as they mount.
///
/// Within the cooldown only the designated pane (`focused_editor_id`, or
/// pane 0) is focused, and only once. After it, a newly mounted editor takes
/// focus unless another live editor already holds it. When an editor
/// unmounts and no live editor holds focus,
/// focus falls back to the designated pane if it is live, otherwise to the
/// lowest live pane.
#[derive(Debug, Clone)]
pub struct FocusEditorEffect {
    cooldown_ms: u64,
}

impl FocusEditorEffect {
    /// Create the effect.
    ///
    /// # Arguments
    ///
    /// * `cooldown_ms` - Time after store creation, in milliseconds, during
    ///   which only the designated pane is focused. An elapsed time equal to
    ///   the cooldown still counts as within it.
    pub fn new(cooldown_ms: u64) -> Self {
        Self { cooldown_ms }
    }
}

impl Default for FocusEditorEffect {
    fn default() -> Self {
        Self::new(FOCUS_EDITOR_ON_LOAD_COOLDOWN)
    }
}

#[derive(Debug)]
pub struct FocusLocal {
    loaded_at: u64,
    last_seen: Arc<EditorSlots>,
    initial_focus_done: bool,
}

impl Effect for FocusEditorEffect {
    type Local = FocusLocal;

    fn name(&self) -> &'static str {
        "focus-editor"
    }

    fn trigger(&self) -> Trigger {
        Trigger::SliceChanged(EDITOR_MANAGER.name())
    }

    fn init(&self, store: &ApplicationStore) -> FocusLocal {
        FocusLocal {
            loaded_at: store.clock().now_ms(),
            last_seen: current_editors(store),
            initial_focus_done: false,
        }
    }

    fn update(&self, local: &mut FocusLocal, cx: &EffectContext<'_>) -> Result<(), EffectError> {
        let Some(state) = EDITOR_MANAGER.get_slice_state(cx.state()) else {
            return Ok(());
        };
        if Arc::ptr_eq(&state.editors, &local.last_seen) {
            return Ok(());
        }
        let newly_set = state.editors.newly_set(&local.last_seen);
        local.last_seen = Arc::clone(&state.editors);

        let past_cooldown = cx.now_ms().saturating_sub(local.loaded_at) > self.cooldown_ms;
        let target = state.focused_editor_id.unwrap_or(0);

        match newly_set {
            Some(slot) if past_cooldown => {
                let focus_held = state
                    .editors
                    .live()
                    .any(|(i, editor)| i != slot && editor.has_focus());
                if focus_held {
                    tracing::debug!(slot, "another editor holds focus, leaving it");
                    return Ok(());
                }
                tracing::debug!(slot, "focusing newly mounted editor");
                if let Some(editor) = state.editors.get(slot) {
                    editor.focus_view();
                }
            }
            Some(slot) => {
                if !local.initial_focus_done && slot == target {
                    tracing::debug!(slot, "focusing designated editor on load");
                    if let Some(editor) = state.editors.get(slot) {
                        editor.focus_view();
                    }
                    local.initial_focus_done = true;
                }
            }
            None => {
                if state.focused_editor().is_some() {
                    return Ok(());
                }
                let fallback = state
                    .editors
                    .get(target)
                    .or_else(|| state.editors.live().next().map(|(_, e)| e));
                if let Some(editor) = fallback {
                    tracing::debug!("no editor focused after unmount, focusing fallback");
                    editor.focus_view();
                }
            }
        }
        Ok(())
    }
}

/// Saves the selection of an editor as it leaves its pane, so reopening the
/// note restores the cursor.
#[derive(Debug, Clone, Default)]
pub struct InitialSelectionEffect;

impl Effect for InitialSelectionEffect {
    type Local = Arc<EditorSlots>;

    fn name(&self) -> &'static str {
        "initial-selection"
    }

    fn trigger(&self) -> Trigger {
        Trigger::SliceChanged(EDITOR_MANAGER.name())
    }

    fn init(&self, store: &ApplicationStore) -> Arc<EditorSlots> {
        current_editors(store)
    }

    fn update(
        &self,
        last_seen: &mut Arc<EditorSlots>,
        cx: &EffectContext<'_>,
    ) -> Result<(), EffectError> {
        let Some(state) = EDITOR_MANAGER.get_slice_state(cx.state()) else {
            return Ok(());
        };
        if Arc::ptr_eq(&state.editors, last_seen) {
            return Ok(());
        }
        let previous = std::mem::replace(last_seen, Arc::clone(&state.editors));

        for slot in state.editors.changed_slots(&previous) {
            let Some(outgoing) = previous.get(slot) else {
                continue;
            };
            let Some(ws_path) = outgoing.ws_path() else {
                continue;
            };
            cx.dispatch(Action::new(UPDATE_INITIAL_SELECTION_JSON).with_value(json!({
                "wsPath": ws_path,
                "editorId": slot,
                "selectionJson": outgoing.selection_json(),
            })))?;
        }
        Ok(())
    }
}

/// Callback invoked by the host on every scroll event.
pub type ScrollListener = Arc<dyn Fn() + Send + Sync>;

/// Host hook for document-level scroll events.
///
/// Implementations should listen in capture mode and passively, so scrolls
/// inside any nested container reach the listener without blocking the
/// scroll itself.
pub trait ScrollListenerRegistry: Send + Sync {
    /// Register `listener` and return an id for removal.
    fn add_scroll_listener(&self, listener: ScrollListener) -> u64;

    fn remove_scroll_listener(&self, id: u64);
}

/// Records the scroll position of every mounted note.
///
/// One host listener is registered when the first editor mounts and is
/// removed when the store is destroyed.
pub struct WatchEditorScrollEffect {
    registry: Arc<dyn ScrollListenerRegistry>,
}

impl WatchEditorScrollEffect {
    pub fn new(registry: Arc<dyn ScrollListenerRegistry>) -> Self {
        Self { registry }
    }
}

impl std::fmt::Debug for WatchEditorScrollEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchEditorScrollEffect").finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ScrollLocal {
    store: WeakStore,
    listener: Option<u64>,
}

fn record_scroll_positions(store: &ApplicationStore) {
    let Some(state) = EDITOR_MANAGER.get_slice_state(&store.state()) else {
        return;
    };
    for (slot, editor) in state.editors.live() {
        let (Some(ws_path), Some(position)) = (editor.ws_path(), editor.scroll_position()) else {
            continue;
        };
        // NaN and infinities have no JSON form.
        if !position.is_finite() {
            tracing::trace!(slot, position, "ignoring non-finite scroll position");
            continue;
        }
        let action = Action::new(UPDATE_SCROLL_POSITION).with_value(json!({
            "editorId": slot,
            "scrollPosition": position,
            "wsPath": ws_path,
        }));
        if let Err(err) = store.dispatch(action) {
            tracing::warn!(slot, error = %err, "failed to record scroll position");
        }
    }
}

impl Effect for WatchEditorScrollEffect {
    type Local = ScrollLocal;

    fn name(&self) -> &'static str {
        "watch-editor-scroll"
    }

    fn trigger(&self) -> Trigger {
        Trigger::SliceChanged(EDITOR_MANAGER.name())
    }

    fn init(&self, store: &ApplicationStore) -> ScrollLocal {
        ScrollLocal {
            store: store.downgrade(),
            listener: None,
        }
    }

    fn update(&self, local: &mut ScrollLocal, cx: &EffectContext<'_>) -> Result<(), EffectError> {
        if local.listener.is_some() {
            return Ok(());
        }
        let mounted = EDITOR_MANAGER
            .get_slice_state(cx.state())
            .is_some_and(|s| s.editors.live().next().is_some());
        if !mounted {
            return Ok(());
        }

        let store = local.store.clone();
        let id = self.registry.add_scroll_listener(Arc::new(move || {
            if let Some(store) = store.upgrade() {
                record_scroll_positions(&store);
            }
        }));
        tracing::debug!(listener = id, "scroll listener registered");
        local.listener = Some(id);
        Ok(())
    }

    fn destroy(&self, local: ScrollLocal) {
        if let Some(id) = local.listener {
            self.registry.remove_scroll_listener(id);
            tracing::debug!(listener = id, "scroll listener removed");
        }
    }
}
