//! Workspaces: wsPaths, the opened pair, recency, the workspace slice and
//! the async operations that drive a [`FileOps`] backend.

mod context;
mod file_ops;
mod local;
mod opened;
mod recency;
mod slice;
mod ws_path;

pub use context::{CreateNoteOptions, History, MemoryHistory, WorkspaceContext, default_note_doc};
pub use file_ops::{
    DocCodec, ErrorRoutingFileOps, ExtensionRegistry, FileOps, JsonDocCodec, LoggingHost,
    WorkspaceHost,
};
pub use local::LocalFileOps;
pub use opened::{Location, OpenedWsPaths};
pub use recency::{RecencyConfig, RecencyRecord, RecencyRecords};
pub use slice::{
    InvalidPathEffect, RECORD_RECENTLY_USED, RecordRecentlyUsedEffect, UPDATE_LOCATION,
    UPDATE_WS_PATHS, WORKSPACE, WORKSPACE_SCHEMA_VERSION, WorkspaceConfig, WorkspaceState,
    record_recently_used, update_location, update_ws_paths, workspace_slice,
};
pub use ws_path::{
    NOTE_EXTENSION, ResolvedPath, file_path_to_ws_path, is_valid_file_ws_path,
    is_valid_note_ws_path, remove_md_extension, resolve_path, validate_note_ws_path, ws_name_of,
};

/// The bundled, read-only help workspace.
pub const HELP_FS_WORKSPACE_NAME: &str = "bangle-help";

/// Note opened when the help workspace is entered without one.
pub const HELP_FS_INDEX_FILE_NAME: &str = "getting started.md";
