//! The workspace slice: current location, opened paths, known files and
//! recency records.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::file_ops::WorkspaceHost;
use super::opened::{Location, OpenedWsPaths};
use super::recency::{RecencyConfig, RecencyRecords};
use super::ws_path::{file_path_to_ws_path, is_valid_file_ws_path, is_valid_note_ws_path};
use super::{HELP_FS_INDEX_FILE_NAME, HELP_FS_WORKSPACE_NAME};
use crate::action::Action;
use crate::app_state::AppState;
use crate::effect::{Effect, EffectContext, Trigger};
use crate::error::{EffectError, SliceError};
use crate::slice::{Slice, SliceKey, StateField, VersionedJson};
use crate::store::ApplicationStore;

pub const WORKSPACE: SliceKey<WorkspaceState> = SliceKey::new("workspace-context-slice");

/// Schema version of the persisted recency records.
pub const WORKSPACE_SCHEMA_VERSION: u32 = 1;

pub const UPDATE_LOCATION: &str = "action::workspace-context:update-location";
pub const UPDATE_WS_PATHS: &str = "action::workspace-context:update-ws-paths";
pub const RECORD_RECENTLY_USED: &str = "action::workspace-context:record-recently-used";

/// Sub-state of the workspace slice.
///
/// The `Arc` fields keep their identity across actions that leave them
/// structurally equal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkspaceState {
    pub location: Location,
    pub ws_name: Option<String>,
    pub opened_ws_paths: Arc<OpenedWsPaths>,
    /// The path dropped from the current location for being invalid.
    pub invalid_ws_path: Option<String>,
    /// Every file of the workspace; `None` until listed or after a failed
    /// listing.
    pub ws_paths: Option<Arc<Vec<String>>>,
    /// The note subset of `ws_paths`.
    pub note_ws_paths: Option<Arc<Vec<String>>>,
    pub recency: Arc<RecencyRecords>,
    /// Known notes by most recent open, newest first.
    pub recent_ws_paths: Arc<Vec<String>>,
}

impl WorkspaceState {
    pub fn primary_ws_path(&self) -> Option<&str> {
        self.opened_ws_paths.primary_ws_path()
    }

    pub fn secondary_ws_path(&self) -> Option<&str> {
        self.opened_ws_paths.secondary_ws_path()
    }

    fn is_known_note(&self, ws_path: &str) -> bool {
        self.note_ws_paths
            .as_ref()
            .is_some_and(|notes| notes.iter().any(|p| p == ws_path))
    }
}

pub fn update_location(location: &Location) -> Action {
    Action::new(UPDATE_LOCATION).with_value(json!({
        "pathname": location.pathname,
        "search": location.search,
    }))
}

/// `ws_paths` of `None` records a failed listing.
pub fn update_ws_paths(ws_name: &str, ws_paths: Option<Vec<String>>) -> Action {
    Action::new(UPDATE_WS_PATHS).with_value(json!({
        "wsName": ws_name,
        "wsPaths": ws_paths,
    }))
}

pub fn record_recently_used(ws_path: &str, timestamp: u64) -> Action {
    Action::new(RECORD_RECENTLY_USED).with_value(json!({
        "wsPath": ws_path,
        "timestamp": timestamp,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WsPathsPayload {
    ws_name: String,
    ws_paths: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordPayload {
    ws_path: String,
    timestamp: u64,
}

#[derive(Serialize, Deserialize)]
struct PersistedData {
    recency: RecencyRecords,
}

fn payload<T: serde::de::DeserializeOwned>(action: &Action) -> Result<T, SliceError> {
    action
        .value_as::<T>()
        .map_err(|e| SliceError::invalid_payload(&action.name, e))
}

/// Workspace name, opened pair and the invalid path dropped from it.
fn read_location(location: &Location) -> (Option<String>, OpenedWsPaths, Option<String>) {
    let ws_name = location.ws_name();
    let mut primary = location.primary_ws_path();
    let mut secondary = location.secondary_ws_path();

    if ws_name.as_deref() == Some(HELP_FS_WORKSPACE_NAME) && primary.is_none() {
        primary = Some(file_path_to_ws_path(HELP_FS_WORKSPACE_NAME, HELP_FS_INDEX_FILE_NAME));
    }

    // Only the first bad path is dropped per location; a bad secondary
    // behind a bad primary surfaces on the next navigation.
    let invalid = if primary.as_deref().is_some_and(|p| !is_valid_file_ws_path(p)) {
        primary.take()
    } else if secondary.as_deref().is_some_and(|p| !is_valid_file_ws_path(p)) {
        secondary.take()
    } else {
        None
    };
    (ws_name, OpenedWsPaths::new(primary, secondary), invalid)
}

fn keep_if_equal<T: PartialEq>(prev: &Arc<T>, next: T) -> Arc<T> {
    if **prev == next {
        Arc::clone(prev)
    } else {
        Arc::new(next)
    }
}

fn recent_ws_paths(state: &WorkspaceState) -> Arc<Vec<String>> {
    let next = match &state.note_ws_paths {
        Some(notes) => state.recency.recent_keys(notes.iter().map(String::as_str)),
        None => Vec::new(),
    };
    keep_if_equal(&state.recent_ws_paths, next)
}

fn apply(
    recency_config: &RecencyConfig,
    action: &Action,
    prev: &Arc<WorkspaceState>,
) -> Result<Arc<WorkspaceState>, SliceError> {
    match action.name.as_str() {
        UPDATE_LOCATION => {
            let location: Location = payload(action)?;
            if location == prev.location {
                return Ok(Arc::clone(prev));
            }
            let (ws_name, opened, invalid_ws_path) = read_location(&location);
            let mut next = WorkspaceState {
                opened_ws_paths: keep_if_equal(&prev.opened_ws_paths, opened),
                invalid_ws_path,
                location,
                ..(**prev).clone()
            };
            if ws_name != prev.ws_name {
                next.ws_paths = None;
                next.note_ws_paths = None;
                next.ws_name = ws_name;
                next.recent_ws_paths = recent_ws_paths(&next);
            }
            Ok(Arc::new(next))
        }
        UPDATE_WS_PATHS => {
            let p: WsPathsPayload = payload(action)?;
            if prev.ws_name.as_deref() != Some(p.ws_name.as_str()) {
                tracing::debug!(ws_name = %p.ws_name, "dropping file list of an inactive workspace");
                return Ok(Arc::clone(prev));
            }
            let ws_paths = match (p.ws_paths, &prev.ws_paths) {
                (Some(items), Some(existing)) => Some(keep_if_equal(existing, items)),
                (items, _) => items.map(Arc::new),
            };
            let unchanged = match (&ws_paths, &prev.ws_paths) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            };
            if unchanged {
                return Ok(Arc::clone(prev));
            }
            let note_ws_paths = ws_paths.as_ref().map(|paths| {
                Arc::new(
                    paths
                        .iter()
                        .filter(|p| is_valid_note_ws_path(p))
                        .cloned()
                        .collect::<Vec<_>>(),
                )
            });
            let mut next = WorkspaceState {
                ws_paths,
                note_ws_paths,
                ..(**prev).clone()
            };
            next.recent_ws_paths = recent_ws_paths(&next);
            Ok(Arc::new(next))
        }
        RECORD_RECENTLY_USED => {
            let p: RecordPayload = payload(action)?;
            let mut next = WorkspaceState {
                recency: Arc::new(prev.recency.update_record(&p.ws_path, p.timestamp, recency_config)),
                ..(**prev).clone()
            };
            next.recent_ws_paths = recent_ws_paths(&next);
            Ok(Arc::new(next))
        }
        _ => Ok(Arc::clone(prev)),
    }
}

fn to_json(state: &WorkspaceState) -> Result<Value, SliceError> {
    let json_err = |source| SliceError::Json {
        slice: WORKSPACE.name().into(),
        source,
    };
    let data = PersistedData {
        recency: (*state.recency).clone(),
    };
    let envelope = VersionedJson {
        version: WORKSPACE_SCHEMA_VERSION,
        data: serde_json::to_value(data).map_err(json_err)?,
    };
    serde_json::to_value(envelope).map_err(json_err)
}

fn from_json(json: &Value) -> Result<WorkspaceState, SliceError> {
    let json_err = |source| SliceError::Json {
        slice: WORKSPACE.name().into(),
        source,
    };
    let envelope: VersionedJson = serde_json::from_value(json.clone()).map_err(json_err)?;
    if envelope.version != WORKSPACE_SCHEMA_VERSION {
        tracing::debug!(found = envelope.version, "workspace schema changed, starting fresh");
        return Ok(WorkspaceState::default());
    }
    let data: PersistedData = serde_json::from_value(envelope.data).map_err(json_err)?;
    Ok(WorkspaceState {
        recency: Arc::new(data.recency),
        ..WorkspaceState::default()
    })
}

/// Reports the path dropped from each new location to the host.
pub struct InvalidPathEffect {
    host: Arc<dyn WorkspaceHost>,
}

impl InvalidPathEffect {
    pub fn new(host: Arc<dyn WorkspaceHost>) -> Self {
        Self { host }
    }
}

impl Effect for InvalidPathEffect {
    type Local = ();

    fn name(&self) -> &'static str {
        "invalid-ws-path"
    }

    fn trigger(&self) -> Trigger {
        Trigger::SliceChanged(WORKSPACE.name())
    }

    fn init(&self, _store: &ApplicationStore) {}

    fn update(&self, _: &mut (), cx: &EffectContext<'_>) -> Result<(), EffectError> {
        let Some(next) = WORKSPACE.get_slice_state(cx.state()) else {
            return Ok(());
        };
        let moved = WORKSPACE
            .get_slice_state(cx.previous())
            .is_none_or(|prev| prev.location != next.location);
        if let (true, Some(invalid)) = (moved, &next.invalid_ws_path) {
            tracing::warn!(invalid_path = %invalid, "dropping invalid path from location");
            self.host.on_invalid_path(next.ws_name.as_deref(), invalid);
        }
        Ok(())
    }
}

/// Records each note as it becomes primary or secondary.
///
/// A path is recorded once per appearance in its pane, and only when the
/// workspace is known and the path is among its notes. A path opened before
/// the file list loads is recorded when the list arrives.
#[derive(Debug, Clone, Default)]
pub struct RecordRecentlyUsedEffect;

impl Effect for RecordRecentlyUsedEffect {
    /// Last recorded path per pane.
    type Local = [Option<String>; 2];

    fn name(&self) -> &'static str {
        "record-recently-used"
    }

    fn trigger(&self) -> Trigger {
        Trigger::SliceChanged(WORKSPACE.name())
    }

    fn init(&self, _store: &ApplicationStore) -> [Option<String>; 2] {
        [None, None]
    }

    fn update(&self, recorded: &mut [Option<String>; 2], cx: &EffectContext<'_>) -> Result<(), EffectError> {
        let Some(state) = WORKSPACE.get_slice_state(cx.state()) else {
            return Ok(());
        };
        if state.ws_name.is_none() {
            return Ok(());
        }
        let panes = [state.primary_ws_path(), state.secondary_ws_path()];
        for (last, current) in recorded.iter_mut().zip(panes) {
            let Some(ws_path) = current.filter(|p| state.is_known_note(p)) else {
                *last = None;
                continue;
            };
            if last.as_deref() == Some(ws_path) {
                continue;
            }
            *last = Some(ws_path.to_owned());
            cx.dispatch(record_recently_used(ws_path, cx.now_ms()))?;
        }
        Ok(())
    }
}

/// Options for [`workspace_slice`].
#[derive(Clone)]
pub struct WorkspaceConfig {
    pub host: Arc<dyn WorkspaceHost>,
    pub recency: RecencyConfig,
}

impl WorkspaceConfig {
    pub fn new(host: Arc<dyn WorkspaceHost>) -> Self {
        Self {
            host,
            recency: RecencyConfig::default(),
        }
    }

    pub fn with_recency(mut self, recency: RecencyConfig) -> Self {
        self.recency = recency;
        self
    }
}

impl std::fmt::Debug for WorkspaceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceConfig")
            .field("recency", &self.recency)
            .finish_non_exhaustive()
    }
}

/// Build the workspace slice.
///
/// Only the recency records are persisted; everything else is derived from
/// the location and the file listing.
pub fn workspace_slice(config: WorkspaceConfig) -> Slice {
    let recency_config = config.recency;
    let field = StateField::new(|_, _| Ok(WorkspaceState::default()))
        .with_apply(move |action, prev, _state: &AppState| apply(&recency_config, action, prev))
        .with_json(to_json, |_, json, _| from_json(json));

    Slice::new(WORKSPACE, field)
        .with_effect(InvalidPathEffect::new(config.host))
        .with_effect(RecordRecentlyUsedEffect)
}
