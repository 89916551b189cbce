//! Local file persistence for [`AppState`] JSON.
//!
//! State is stored at `<base_dir>/state/<store_name>/state.json`. Writes go
//! through a temp file and a rename so readers never see a partial file. A
//! file that no longer parses is logged and treated as missing, which makes
//! every slice fall back to `init`.

use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::app_state::{AppState, SliceFields};
use crate::error::PersistError;
use crate::slice::Slice;

/// `<base_dir>/state/<store_name>/state.json`
pub fn state_path(base_dir: &Path, store_name: &str) -> PathBuf {
    base_dir.join("state").join(store_name).join("state.json")
}

/// Serialize the persisted fields of `state` and write them atomically.
///
/// # Errors
///
/// [`PersistError::Slice`] if a slice's `to_json` fails, [`PersistError::Io`]
/// if the file cannot be written.
pub fn save_state(
    base_dir: &Path,
    store_name: &str,
    state: &AppState,
    fields: &SliceFields,
) -> Result<(), PersistError> {
    let json = state.state_to_json(fields)?;
    let path = state_path(base_dir, store_name);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let bytes =
        serde_json::to_vec_pretty(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    std::fs::write(&tmp_path, &bytes)?;
    std::fs::rename(&tmp_path, &path)?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "state saved");
    Ok(())
}

/// Read the stored JSON.
///
/// Returns `Ok(None)` when the file is missing or is not valid JSON.
///
/// # Errors
///
/// Only unexpected I/O failures (permission denied, for example).
pub fn load_state(base_dir: &Path, store_name: &str) -> io::Result<Option<Value>> {
    let path = state_path(base_dir, store_name);
    let bytes = match std::fs::read(&path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(json) => Ok(Some(json)),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to parse stored state; starting fresh"
            );
            Ok(None)
        }
    }
}

/// Load the stored JSON, if any, and build a state from it.
///
/// Slices missing from the file, or without `from_json`, are initialized
/// normally.
pub fn restore_state(
    base_dir: &Path,
    store_name: &str,
    slices: Vec<Slice>,
    fields: &SliceFields,
    opts: Value,
) -> Result<AppState, PersistError> {
    let json = load_state(base_dir, store_name)?.unwrap_or(Value::Null);
    Ok(AppState::state_from_json(slices, &json, fields, opts)?)
}
