//! The editor-manager slice.
//!
//! Tracks the live editor mounted in each pane, which pane last reported
//! focus, and per-note editor settings (initial selection, scroll position)
//! that are persisted across reloads. Its effects decide which editor gets
//! focus as panes mount and unmount, capture the selection of an editor
//! leaving its pane, and record scroll positions reported by the host.

mod effects;
mod state;

use std::sync::Arc;

pub use effects::{
    FOCUS_EDITOR_ON_LOAD_COOLDOWN, FocusEditorEffect, FocusLocal, InitialSelectionEffect,
    ScrollListener, ScrollListenerRegistry, ScrollLocal, WatchEditorScrollEffect,
};
pub use state::{
    EDITOR_MANAGER, Editor, EditorConfig, EditorConfigEntry, EditorHandle, EditorManagerState,
    EditorSlots, JSON_SCHEMA_VERSION, MAX_OPEN_EDITORS, ON_FOCUS_UPDATE, SET_EDITOR,
    UPDATE_INITIAL_SELECTION_JSON, UPDATE_SCROLL_POSITION, on_focus_update, set_editor,
};

use crate::slice::{Slice, StateField};

/// Options for [`editor_manager_slice`].
#[derive(Clone)]
pub struct EditorManagerConfig {
    /// See [`FOCUS_EDITOR_ON_LOAD_COOLDOWN`].
    pub focus_cooldown_ms: u64,
    /// Host scroll hook. Scroll positions are not recorded without one.
    pub scroll_registry: Option<Arc<dyn ScrollListenerRegistry>>,
}

impl EditorManagerConfig {
    pub fn with_focus_cooldown_ms(mut self, ms: u64) -> Self {
        self.focus_cooldown_ms = ms;
        self
    }

    pub fn with_scroll_registry(mut self, registry: Arc<dyn ScrollListenerRegistry>) -> Self {
        self.scroll_registry = Some(registry);
        self
    }
}

impl Default for EditorManagerConfig {
    fn default() -> Self {
        Self {
            focus_cooldown_ms: FOCUS_EDITOR_ON_LOAD_COOLDOWN,
            scroll_registry: None,
        }
    }
}

impl std::fmt::Debug for EditorManagerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorManagerConfig")
            .field("focus_cooldown_ms", &self.focus_cooldown_ms)
            .field("scroll_registry", &self.scroll_registry.is_some())
            .finish()
    }
}

/// Build the editor-manager slice.
///
/// Persist it under the `editorManagerSlice` field name to stay compatible
/// with existing saved state.
pub fn editor_manager_slice(config: EditorManagerConfig) -> Slice {
    let field = StateField::new(|_, _| Ok(EditorManagerState::default()))
        .with_apply(state::apply)
        .with_json(state::to_json, |_, json, _| state::from_json(json));

    let slice = Slice::new(EDITOR_MANAGER, field)
        .with_effect(FocusEditorEffect::new(config.focus_cooldown_ms))
        .with_effect(InitialSelectionEffect);

    match config.scroll_registry {
        Some(registry) => slice.with_effect(WatchEditorScrollEffect::new(registry)),
        None => slice,
    }
}
