//! Crate-level error types for state construction, dispatch, effects and
//! workspace file operations.

/// Error raised while building an [`AppStateConfig`](crate::AppStateConfig).
///
/// These are programmer errors: they surface at construction time, before
/// any slice is initialized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Two slices were registered under the same key.
    #[error("adding different instances of an existing slice ({0})")]
    DuplicateSlice(String),
}

/// Error produced by a slice's `init`, `apply` or JSON hooks.
#[derive(Debug, thiserror::Error)]
pub enum SliceError {
    /// The action payload did not match what the slice expects.
    #[error("invalid payload for action '{action}': {reason}")]
    InvalidPayload {
        /// Name of the offending action.
        action: String,
        /// Human-readable description of the mismatch.
        reason: String,
    },

    /// Persisted JSON could not be decoded or encoded.
    #[error("slice '{slice}' JSON error: {source}")]
    Json {
        /// Key of the slice whose JSON hook failed.
        slice: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// Any other failure raised by slice code.
    #[error("slice '{slice}' failed: {message}")]
    Failed {
        /// Key of the failing slice.
        slice: String,
        /// Description of the failure.
        message: String,
    },
}

impl SliceError {
    /// Shorthand for [`SliceError::InvalidPayload`].
    pub fn invalid_payload(action: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::InvalidPayload {
            action: action.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for [`SliceError::Failed`].
    pub fn failed(slice: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            slice: slice.into(),
            message: message.into(),
        }
    }
}

/// Error returned by [`AppState`](crate::AppState) constructors.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Slice registration was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A slice failed to produce its initial state.
    #[error(transparent)]
    Slice(#[from] SliceError),
}

/// Error returned from [`ApplicationStore::dispatch`](crate::ApplicationStore::dispatch).
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A slice reducer failed; the store kept its previous state.
    #[error("reducer failed for action '{action}': {source}")]
    Reducer {
        /// Name of the action being applied.
        action: String,
        /// The slice failure.
        #[source]
        source: SliceError,
    },

    /// The store was destroyed and no longer accepts actions.
    #[error("store '{0}' has been destroyed")]
    Destroyed(String),
}

/// Error reported by an effect. Effects are isolated, so these are logged
/// rather than propagated.
#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    /// A follow-up dispatch issued by the effect failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Effect-specific failure.
    #[error("{0}")]
    Failed(String),
}

/// Error returned by the [`persist`](crate::persist) helpers.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Reading or writing the state file failed.
    #[error("state file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A slice could not serialize its sub-state.
    #[error(transparent)]
    Slice(#[from] SliceError),

    /// Rebuilding the state from the stored JSON failed.
    #[error(transparent)]
    State(#[from] StateError),
}

/// Classification of a [`FileSystemError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FsErrorKind {
    /// Permission to read or write the workspace was denied.
    Permission,
    /// The user dismissed a native picker or permission prompt.
    UserAborted,
    /// The requested file does not exist.
    NotFound,
    /// The workspace itself does not exist.
    WorkspaceNotFound,
    /// Any other backend failure.
    Other,
}

/// Error raised by a [`FileOps`](crate::workspace::FileOps) backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct FileSystemError {
    /// What went wrong.
    pub kind: FsErrorKind,
    /// Backend-provided description.
    pub message: String,
}

impl FileSystemError {
    /// Create a new file-system error.
    pub fn new(kind: FsErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns `true` for errors that require the user to re-grant access.
    pub fn needs_auth(&self) -> bool {
        matches!(self.kind, FsErrorKind::Permission | FsErrorKind::UserAborted)
    }
}

impl From<std::io::Error> for FileSystemError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => FsErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => FsErrorKind::Permission,
            _ => FsErrorKind::Other,
        };
        Self::new(kind, err.to_string())
    }
}

/// A wsPath failed validation, or an operation targeted read-only content.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct PathValidationError(pub String);

/// Error returned by [`WorkspaceContext`](crate::workspace::WorkspaceContext)
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// The file-system collaborator failed.
    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    /// A path was invalid or the target is read-only.
    #[error(transparent)]
    PathValidation(#[from] PathValidationError),

    /// Committing the result into the store failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Error returned by a [`NotePathSearcher`](crate::search::NotePathSearcher).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    /// The query was cancelled by a newer one.
    #[error("search cancelled")]
    Cancelled,

    /// The search backend failed.
    #[error("search failed: {0}")]
    Backend(String),
}
