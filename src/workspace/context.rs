//! Async workspace operations over the store and a [`FileOps`] backend.

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};

use super::file_ops::{ErrorRoutingFileOps, ExtensionRegistry, FileOps, WorkspaceHost};
use super::opened::{Location, OpenedWsPaths};
use super::slice::{WORKSPACE, WorkspaceState, update_location, update_ws_paths};
use super::ws_path::{remove_md_extension, resolve_path, validate_note_ws_path};
use super::HELP_FS_WORKSPACE_NAME;
use crate::error::{DispatchError, PathValidationError, WorkspaceError};
use crate::store::ApplicationStore;

/// The host router.
pub trait History: Send + Sync {
    fn location(&self) -> Location;

    fn push(&self, location: Location);

    fn replace(&self, location: Location);

    /// Open `location_path` outside the current view.
    fn open_new_tab(&self, location_path: &str);
}

/// A [`History`] kept in memory, for headless hosts and tests.
#[derive(Debug)]
pub struct MemoryHistory {
    entries: Mutex<Vec<Location>>,
    tabs: Mutex<Vec<String>>,
}

impl MemoryHistory {
    pub fn new(initial: Location) -> Self {
        Self {
            entries: Mutex::new(vec![initial]),
            tabs: Mutex::new(Vec::new()),
        }
    }

    /// Every entry, oldest first. The last one is current.
    pub fn entries(&self) -> Vec<Location> {
        self.entries.lock().expect("history lock poisoned").clone()
    }

    /// Paths passed to [`open_new_tab`](History::open_new_tab).
    pub fn opened_tabs(&self) -> Vec<String> {
        self.tabs.lock().expect("history lock poisoned").clone()
    }
}

impl History for MemoryHistory {
    fn location(&self) -> Location {
        self.entries
            .lock()
            .expect("history lock poisoned")
            .last()
            .cloned()
            .unwrap_or_default()
    }

    fn push(&self, location: Location) {
        self.entries.lock().expect("history lock poisoned").push(location);
    }

    fn replace(&self, location: Location) {
        let mut entries = self.entries.lock().expect("history lock poisoned");
        entries.pop();
        entries.push(location);
    }

    fn open_new_tab(&self, location_path: &str) {
        self.tabs
            .lock()
            .expect("history lock poisoned")
            .push(location_path.to_owned());
    }
}

/// Options for [`WorkspaceContext::create_note`].
#[derive(Debug, Clone)]
pub struct CreateNoteOptions {
    /// Open the note in the primary pane once created.
    pub open: bool,
    /// Content for a new note; defaults to a title heading and a greeting.
    pub doc: Option<Value>,
}

impl Default for CreateNoteOptions {
    fn default() -> Self {
        Self { open: true, doc: None }
    }
}

/// The document a note starts with: its name as a heading, then a
/// paragraph.
pub fn default_note_doc(file_name: &str) -> Value {
    json!({
        "type": "doc",
        "content": [
            {
                "type": "heading",
                "attrs": { "level": 1 },
                "content": [{ "type": "text", "text": remove_md_extension(file_name) }],
            },
            {
                "type": "paragraph",
                "content": [{ "type": "text", "text": "Hello world!" }],
            },
        ],
    })
}

/// Workspace operations for one store.
///
/// Every operation is a no-op when the current location names no
/// workspace. File-system failures reach the host through
/// [`ErrorRoutingFileOps`] before they are returned.
///
/// ```no_run
/// # async fn demo(ctx: noteslice::workspace::WorkspaceContext) -> Result<(), noteslice::error::WorkspaceError> {
/// ctx.sync_location().await?;
/// ctx.create_note("my-ws:ideas.md", Default::default()).await?;
/// ctx.push_ws_path("my-ws:ideas.md", false, true)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct WorkspaceContext {
    store: ApplicationStore,
    history: Arc<dyn History>,
    file_ops: ErrorRoutingFileOps,
    registry: ExtensionRegistry,
}

impl WorkspaceContext {
    /// The store must contain the workspace slice. Call
    /// [`sync_location`](WorkspaceContext::sync_location) before the first
    /// operation.
    pub fn new(
        store: ApplicationStore,
        history: Arc<dyn History>,
        file_ops: Arc<dyn FileOps>,
        host: Arc<dyn WorkspaceHost>,
    ) -> Self {
        Self {
            store,
            history,
            file_ops: ErrorRoutingFileOps::new(file_ops, host),
            registry: ExtensionRegistry::default(),
        }
    }

    /// Read and write documents through `registry` instead of the default
    /// [`JsonDocCodec`](super::JsonDocCodec).
    pub fn with_registry(mut self, registry: ExtensionRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// The store this context dispatches to.
    pub fn store(&self) -> &ApplicationStore {
        &self.store
    }

    /// The registry passed to every document read and write.
    pub fn registry(&self) -> &ExtensionRegistry {
        &self.registry
    }

    /// Current workspace sub-state.
    ///
    /// # Returns
    ///
    /// The committed snapshot, or an empty state if the store has no
    /// workspace slice.
    pub fn state(&self) -> Arc<WorkspaceState> {
        WORKSPACE.get_slice_state(&self.store.state()).unwrap_or_default()
    }

    /// The open workspace, if the location names one.
    pub fn ws_name(&self) -> Option<String> {
        self.state().ws_name.clone()
    }

    /// Notes open in the primary and secondary panes.
    pub fn opened_ws_paths(&self) -> Arc<OpenedWsPaths> {
        Arc::clone(&self.state().opened_ws_paths)
    }

    /// Every note in the open workspace.
    ///
    /// # Returns
    ///
    /// `None` until a listing loaded, or after the last listing failed.
    pub fn note_ws_paths(&self) -> Option<Arc<Vec<String>>> {
        self.state().note_ws_paths.clone()
    }

    /// Known notes ordered by when they were last opened, newest first.
    pub fn recent_ws_paths(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.state().recent_ws_paths)
    }

    /// Bring the slice in line with the history's location, reloading the
    /// file list when the workspace changed.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Dispatch`] if the store rejected the update.
    pub async fn sync_location(&self) -> Result<(), WorkspaceError> {
        let before = self.ws_name();
        self.store.dispatch(update_location(&self.history.location()))?;
        let state = self.state();
        if state.ws_name != before || (state.ws_name.is_some() && state.ws_paths.is_none()) {
            self.refresh_ws_paths().await?;
        }
        Ok(())
    }

    /// Reload the file list.
    ///
    /// A file-system failure clears the list and is otherwise swallowed:
    /// the host has already been told through its callbacks.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Dispatch`] if the store rejected the list.
    pub async fn refresh_ws_paths(&self) -> Result<(), WorkspaceError> {
        let Some(ws_name) = self.ws_name() else {
            return Ok(());
        };
        tracing::debug!(ws_name = %ws_name, "refreshing wsPaths");
        let items = match self.file_ops.list_all_files(&ws_name).await {
            Ok(items) => {
                tracing::debug!(ws_name = %ws_name, count = items.len(), "received files");
                Some(items)
            }
            Err(err) => {
                tracing::debug!(ws_name = %ws_name, error = %err, "listing failed, clearing files");
                None
            }
        };
        self.store.dispatch(update_ws_paths(&ws_name, items))?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the backend failure.
    pub async fn get_note(&self, ws_path: &str) -> Result<Value, WorkspaceError> {
        Ok(self.file_ops.get_doc(ws_path, &self.registry).await?)
    }

    /// Create `ws_path` unless it exists, refresh, then open it if asked.
    ///
    /// # Errors
    ///
    /// Fails on an invalid note path or a backend failure.
    pub async fn create_note(&self, ws_path: &str, options: CreateNoteOptions) -> Result<(), WorkspaceError> {
        let Some(ws_name) = self.ws_name() else {
            return Ok(());
        };
        validate_note_ws_path(ws_path)?;
        if !self.file_ops.check_file_exists(ws_path).await? {
            let doc = match options.doc {
                Some(doc) => doc,
                None => default_note_doc(resolve_path(ws_path)?.file_name),
            };
            self.file_ops.save_doc(ws_path, &doc, &self.registry).await?;
            tracing::info!(ws_path, "created note");
        }
        self.refresh_ws_paths().await?;
        if options.open {
            let location = self
                .opened_ws_paths()
                .update_primary_ws_path(Some(ws_path))
                .to_location(&self.history.location(), &ws_name);
            self.navigate(location, false)?;
        }
        Ok(())
    }

    /// Delete notes, closing any pane that shows one.
    ///
    /// # Errors
    ///
    /// Fails in the help workspace, on an invalid note path, or on a
    /// backend failure. Paths are validated before anything is deleted.
    pub async fn delete_note(&self, ws_paths: &[&str]) -> Result<(), WorkspaceError> {
        let Some(ws_name) = self.ws_name() else {
            return Ok(());
        };
        if ws_name == HELP_FS_WORKSPACE_NAME {
            return Err(PathValidationError("Cannot delete a help document".into()).into());
        }
        let mut opened = (*self.opened_ws_paths()).clone();
        for ws_path in ws_paths {
            validate_note_ws_path(ws_path)?;
            opened = opened.close_if_found(ws_path);
        }
        self.update_opened_ws_paths(|_| opened, true)?;

        for ws_path in ws_paths {
            self.file_ops.delete_file(ws_path).await?;
            tracing::info!(ws_path, "deleted note");
        }
        self.refresh_ws_paths().await
    }

    /// Rename a note and point panes showing it at the new path.
    ///
    /// # Errors
    ///
    /// Fails in the help workspace or on a backend failure.
    pub async fn rename_note(
        &self,
        old_ws_path: &str,
        new_ws_path: &str,
        update_location: bool,
    ) -> Result<(), WorkspaceError> {
        let Some(ws_name) = self.ws_name() else {
            return Ok(());
        };
        if ws_name == HELP_FS_WORKSPACE_NAME {
            return Err(PathValidationError("Cannot rename a help document".into()).into());
        }
        self.file_ops.rename_file(old_ws_path, new_ws_path).await?;
        tracing::info!(old_ws_path, new_ws_path, "renamed note");
        if update_location {
            let location = self
                .opened_ws_paths()
                .update_if_found(old_ws_path, Some(new_ws_path))
                .to_location(&self.history.location(), &ws_name);
            self.navigate(location, true)?;
        }
        self.refresh_ws_paths().await
    }

    /// Navigate to the pair `update` derives from the current one.
    ///
    /// Returns `false`, without touching history, when there is no
    /// workspace or the pair is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Dispatch`] if the store rejected the new
    /// location.
    pub fn update_opened_ws_paths(
        &self,
        update: impl FnOnce(&OpenedWsPaths) -> OpenedWsPaths,
        replace: bool,
    ) -> Result<bool, WorkspaceError> {
        let Some(ws_name) = self.ws_name() else {
            return Ok(false);
        };
        let current = self.opened_ws_paths();
        let next = update(&current);
        if next == *current {
            return Ok(false);
        }
        let location = next.to_location(&self.history.location(), &ws_name);
        self.navigate(location, replace)?;
        Ok(true)
    }

    /// Open `ws_path` in the primary pane, the secondary pane, or a new
    /// tab.
    ///
    /// # Errors
    ///
    /// Fails if a new tab is asked for an invalid path, or the store
    /// rejected the new location.
    pub fn push_ws_path(&self, ws_path: &str, new_tab: bool, secondary: bool) -> Result<(), WorkspaceError> {
        if new_tab {
            let location_path = resolve_path(ws_path)?.location_path();
            self.history.open_new_tab(&location_path);
            return Ok(());
        }
        self.update_opened_ws_paths(
            |opened| {
                if secondary {
                    opened.update_secondary_ws_path(Some(ws_path))
                } else {
                    opened.update_primary_ws_path(Some(ws_path))
                }
            },
            false,
        )?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns the backend failure.
    pub async fn check_file_exists(&self, ws_path: &str) -> Result<bool, WorkspaceError> {
        Ok(self.file_ops.check_file_exists(ws_path).await?)
    }

    fn navigate(&self, location: Location, replace: bool) -> Result<(), DispatchError> {
        if self.history.location() != location {
            if replace {
                self.history.replace(location);
            } else {
                self.history.push(location);
            }
        }
        self.store.dispatch(update_location(&self.history.location()))
    }
}

impl std::fmt::Debug for WorkspaceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceContext")
            .field("store", &self.store.name())
            .field("ws_name", &self.ws_name())
            .finish_non_exhaustive()
    }
}
