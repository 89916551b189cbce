//! Editor-manager sub-state and reducer.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::action::Action;
use crate::app_state::AppState;
use crate::error::SliceError;
use crate::slice::{SliceKey, VersionedJson};

/// Number of editor panes.
pub const MAX_OPEN_EDITORS: usize = 2;

/// Version written into the persisted `{version, data}` envelope.
pub const JSON_SCHEMA_VERSION: u32 = 1;

/// Key of the editor-manager slice.
pub const EDITOR_MANAGER: SliceKey<EditorManagerState> = SliceKey::new("editor-manager-slice");

pub const SET_EDITOR: &str = "action::editor-manager-context:set-editor";
pub const ON_FOCUS_UPDATE: &str = "action::editor-manager-context:on-focus-update";
pub const UPDATE_INITIAL_SELECTION_JSON: &str =
    "action::editor-manager-context:update-initial-selection-json";
pub const UPDATE_SCROLL_POSITION: &str = "action::editor-manager-context:update-scroll-position";

/// A live editor surface mounted in one pane.
///
/// Implemented by the host's editor view. Identity matters: the slice and
/// its effects compare editors by allocation, never by content.
pub trait EditorHandle: Send + Sync {
    /// Move keyboard focus into the editor.
    fn focus_view(&self);

    /// Whether the editor currently holds keyboard focus.
    fn has_focus(&self) -> bool;

    /// The note shown in the editor, if any.
    fn ws_path(&self) -> Option<String>;

    /// The current selection, serialized.
    fn selection_json(&self) -> Value;

    /// Scroll offset of the editor's scroll container, if it has one.
    fn scroll_position(&self) -> Option<f64>;
}

/// Shared editor handle.
pub type Editor = Arc<dyn EditorHandle>;

fn same_editor(a: &Editor, b: &Editor) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn same_slot(a: Option<&Editor>, b: Option<&Editor>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => same_editor(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// The editors mounted in each pane slot.
#[derive(Clone, Default)]
pub struct EditorSlots {
    slots: [Option<Editor>; MAX_OPEN_EDITORS],
}

impl EditorSlots {
    /// The editor in `slot`, if one is mounted.
    pub fn get(&self, slot: usize) -> Option<&Editor> {
        self.slots.get(slot)?.as_ref()
    }

    /// Live editors with their slot index, lowest slot first.
    pub fn live(&self) -> impl Iterator<Item = (usize, &Editor)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i, e)))
    }

    /// Lowest slot whose live editor is not the one in `previous`.
    pub fn newly_set(&self, previous: &EditorSlots) -> Option<usize> {
        self.live()
            .find(|&(i, editor)| !same_slot(Some(editor), previous.get(i)))
            .map(|(i, _)| i)
    }

    /// Slots whose occupant differs from `previous`, lowest first.
    pub fn changed_slots<'a>(&'a self, previous: &'a EditorSlots) -> impl Iterator<Item = usize> + 'a {
        (0..MAX_OPEN_EDITORS).filter(move |&i| !same_slot(self.get(i), previous.get(i)))
    }

    fn with_slot(&self, slot: usize, editor: Option<Editor>) -> Self {
        let mut next = self.clone();
        next.slots[slot] = editor;
        next
    }
}

impl fmt::Debug for EditorSlots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.slots.iter().map(|s| s.as_ref().map(|e| e.ws_path())))
            .finish()
    }
}

/// Per-note, per-pane editor settings that survive reloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfigEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_selection: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_position: Option<f64>,
}

/// wsPath → editor id → settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditorConfig {
    entries: BTreeMap<String, BTreeMap<usize, EditorConfigEntry>>,
}

impl EditorConfig {
    /// Settings saved for `ws_path` as shown in pane `editor_id`.
    ///
    /// # Returns
    ///
    /// `None` if nothing was recorded for that note and pane yet.
    pub fn entry(&self, ws_path: &str, editor_id: usize) -> Option<&EditorConfigEntry> {
        self.entries.get(ws_path)?.get(&editor_id)
    }

    /// Selection JSON captured when the note last left pane `editor_id`.
    pub fn initial_selection(&self, ws_path: &str, editor_id: usize) -> Option<&Value> {
        self.entry(ws_path, editor_id)?.initial_selection.as_ref()
    }

    /// Last recorded scroll offset of the note in pane `editor_id`.
    pub fn scroll_position(&self, ws_path: &str, editor_id: usize) -> Option<f64> {
        self.entry(ws_path, editor_id)?.scroll_position
    }

    fn update(&self, ws_path: &str, editor_id: usize, f: impl FnOnce(&mut EditorConfigEntry)) -> Self {
        let mut next = self.clone();
        let entry = next
            .entries
            .entry(ws_path.to_owned())
            .or_default()
            .entry(editor_id)
            .or_default();
        f(entry);
        next
    }
}

/// Sub-state of the editor-manager slice.
#[derive(Debug, Clone, Default)]
pub struct EditorManagerState {
    /// Mounted editors; never persisted.
    pub editors: Arc<EditorSlots>,
    /// Pane that last reported focus.
    pub focused_editor_id: Option<usize>,
    pub editor_config: Arc<EditorConfig>,
}

impl EditorManagerState {
    /// The editor holding keyboard focus, if any.
    pub fn focused_editor(&self) -> Option<&Editor> {
        self.editors.live().find(|(_, e)| e.has_focus()).map(|(_, e)| e)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedData {
    #[serde(default)]
    focused_editor_id: Option<usize>,
    #[serde(default)]
    editor_config: EditorConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditorIdPayload {
    editor_id: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectionPayload {
    ws_path: String,
    editor_id: usize,
    selection_json: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScrollPayload {
    ws_path: String,
    editor_id: usize,
    scroll_position: f64,
}

fn payload<T: serde::de::DeserializeOwned>(action: &Action) -> Result<T, SliceError> {
    action
        .value_as::<T>()
        .map_err(|e| SliceError::invalid_payload(&action.name, e))
}

fn check_editor_id(action: &Action, editor_id: usize) -> Result<usize, SliceError> {
    if editor_id >= MAX_OPEN_EDITORS {
        return Err(SliceError::invalid_payload(
            &action.name,
            format!("editorId {editor_id} is out of range (max {MAX_OPEN_EDITORS})"),
        ));
    }
    Ok(editor_id)
}

/// Build a `set-editor` action. `None` unmounts the pane.
pub fn set_editor(editor_id: usize, editor: Option<Editor>) -> Action {
    let action = Action::new(SET_EDITOR).with_value(json!({ "editorId": editor_id }));
    match editor {
        Some(editor) => action.with_attachment(editor),
        None => action,
    }
}

/// Build an `on-focus-update` action.
pub fn on_focus_update(editor_id: usize) -> Action {
    Action::new(ON_FOCUS_UPDATE).with_value(json!({ "editorId": editor_id }))
}

pub(crate) fn apply(
    action: &Action,
    prev: &Arc<EditorManagerState>,
    _state: &AppState,
) -> Result<Arc<EditorManagerState>, SliceError> {
    match action.name.as_str() {
        SET_EDITOR => {
            let EditorIdPayload { editor_id } = payload(action)?;
            let slot = check_editor_id(action, editor_id)?;
            let editor = action.attachment::<Editor>().cloned();
            if same_slot(editor.as_ref(), prev.editors.get(slot)) {
                return Ok(Arc::clone(prev));
            }
            Ok(Arc::new(EditorManagerState {
                editors: Arc::new(prev.editors.with_slot(slot, editor)),
                ..(**prev).clone()
            }))
        }
        ON_FOCUS_UPDATE => {
            let EditorIdPayload { editor_id } = payload(action)?;
            let editor_id = check_editor_id(action, editor_id)?;
            if prev.focused_editor_id == Some(editor_id) {
                return Ok(Arc::clone(prev));
            }
            Ok(Arc::new(EditorManagerState {
                focused_editor_id: Some(editor_id),
                ..(**prev).clone()
            }))
        }
        UPDATE_INITIAL_SELECTION_JSON => {
            let p: SelectionPayload = payload(action)?;
            let editor_id = check_editor_id(action, p.editor_id)?;
            let config = prev.editor_config.update(&p.ws_path, editor_id, |entry| {
                entry.initial_selection = Some(p.selection_json);
            });
            Ok(Arc::new(EditorManagerState {
                editor_config: Arc::new(config),
                ..(**prev).clone()
            }))
        }
        UPDATE_SCROLL_POSITION => {
            let p: ScrollPayload = payload(action)?;
            let editor_id = check_editor_id(action, p.editor_id)?;
            let recorded = prev.editor_config.scroll_position(&p.ws_path, editor_id);
            if recorded.map(f64::to_bits) == Some(p.scroll_position.to_bits()) {
                return Ok(Arc::clone(prev));
            }
            let config = prev.editor_config.update(&p.ws_path, editor_id, |entry| {
                entry.scroll_position = Some(p.scroll_position);
            });
            Ok(Arc::new(EditorManagerState {
                editor_config: Arc::new(config),
                ..(**prev).clone()
            }))
        }
        _ => Ok(Arc::clone(prev)),
    }
}

pub(crate) fn to_json(state: &EditorManagerState) -> Result<Value, SliceError> {
    let data = PersistedData {
        focused_editor_id: state.focused_editor_id,
        editor_config: (*state.editor_config).clone(),
    };
    let json_err = |source| SliceError::Json {
        slice: EDITOR_MANAGER.name().into(),
        source,
    };
    let envelope = VersionedJson {
        version: JSON_SCHEMA_VERSION,
        data: serde_json::to_value(data).map_err(json_err)?,
    };
    serde_json::to_value(envelope).map_err(json_err)
}

pub(crate) fn from_json(json: &Value) -> Result<EditorManagerState, SliceError> {
    let json_err = |source| SliceError::Json {
        slice: EDITOR_MANAGER.name().into(),
        source,
    };
    let envelope: VersionedJson = serde_json::from_value(json.clone()).map_err(json_err)?;
    if envelope.version != JSON_SCHEMA_VERSION {
        tracing::debug!(
            found = envelope.version,
            expected = JSON_SCHEMA_VERSION,
            "editor manager schema changed, starting fresh"
        );
        return Ok(EditorManagerState::default());
    }
    let data: PersistedData = serde_json::from_value(envelope.data).map_err(json_err)?;
    Ok(EditorManagerState {
        editors: Arc::default(),
        focused_editor_id: data.focused_editor_id.filter(|id| *id < MAX_OPEN_EDITORS),
        editor_config: Arc::new(data.editor_config),
    })
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use serde_json::{Value, json};

    use super::{Editor, EditorHandle};

    /// Editor double counting `focus_view` calls. Focusing does not make
    /// it report focus, so fallback rules stay observable.
    #[derive(Debug, Default)]
    pub(crate) struct TestEditor {
        pub ws_path: Option<String>,
        pub focus_calls: AtomicUsize,
        pub focused: AtomicBool,
        pub scroll: Option<f64>,
    }

    impl TestEditor {
        pub(crate) fn new(ws_path: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                ws_path: ws_path.map(str::to_owned),
                ..Self::default()
            })
        }

        pub(crate) fn scrolled(ws_path: &str, scroll: f64) -> Arc<Self> {
            Arc::new(Self {
                ws_path: Some(ws_path.to_owned()),
                scroll: Some(scroll),
                ..Self::default()
            })
        }

        pub(crate) fn focus_calls(&self) -> usize {
            self.focus_calls.load(Ordering::SeqCst)
        }

        pub(crate) fn handle(self: &Arc<Self>) -> Editor {
            Arc::clone(self) as Editor
        }
    }

    impl EditorHandle for TestEditor {
        fn focus_view(&self) {
            self.focus_calls.fetch_add(1, Ordering::SeqCst);
        }

        fn has_focus(&self) -> bool {
            self.focused.load(Ordering::SeqCst)
        }

        fn ws_path(&self) -> Option<String> {
            self.ws_path.clone()
        }

        fn selection_json(&self) -> Value {
            json!({ "type": "text", "anchor": 1, "head": 1 })
        }

        fn scroll_position(&self) -> Option<f64> {
            self.scroll
        }
    }
}
