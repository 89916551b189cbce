//! A slice-based application state container for a note-taking app, plus
//! the workspace and editor models built on it.

mod action;
pub use action::{ACTION_PREFIX, Action, ActionName};
mod app_state;
pub use app_state::{AppState, AppStateConfig, SliceFields};
mod clock;
pub use clock::{Clock, ManualClock, SystemClock};
mod effect;
pub use effect::{Effect, EffectContext, Trigger};
pub mod editor_manager;
pub mod error;
pub mod persist;
mod scheduler;
pub mod search;
mod slice;
mod store;
pub mod workspace;

pub use error::{
    ConfigError, DispatchError, EffectError, FileSystemError, FsErrorKind, PathValidationError,
    PersistError, SearchError, SliceError, StateError, WorkspaceError,
};
pub use scheduler::{CancelHandle, ImmediateScheduler, QueueScheduler, Scheduler, Task, TokioScheduler};
pub use slice::{Slice, SliceKey, StateField, SubState, VersionedJson, same_sub_state};
pub use store::{ApplicationStore, ApplicationStoreBuilder, WeakStore};
