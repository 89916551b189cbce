//! Side-effect reactions that run after a transition is committed.
//!
//! An [`Effect`] is a plain struct registered on a [`Slice`](crate::Slice).
//! Each store instantiates every effect once, giving it an explicit
//! [`Effect::Local`] value that persists across passes and is handed back to
//! [`Effect::destroy`] when the store is torn down. No effect state lives in
//! closures or globals, so two stores built from the same slices never share
//! anything.

use std::sync::Arc;

use crate::action::Action;
use crate::app_state::AppState;
use crate::error::{DispatchError, EffectError};
use crate::slice::same_sub_state;
use crate::store::ApplicationStore;

/// When an effect's [`update`](Effect::update) runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// After every committed dispatch.
    EveryDispatch,
    /// Only when the named slice's sub-state is a different allocation
    /// than before the dispatch.
    SliceChanged(&'static str),
}

/// A side-effecting reaction to committed transitions.
///
/// # Contract
///
/// - `init` runs once, when the store is built, in slice then effect
///   registration order.
/// - `update` runs once per matching effect pass, strictly after the state
///   it observes was committed. Actions dispatched through the context are
///   queued and applied after the whole pass finishes.
/// - `destroy` runs once when the store is destroyed and receives the local
///   state by value; dropping it must release listeners and timers.
/// - An error from `update` is logged and does not stop sibling effects.
pub trait Effect: Send + Sync + 'static {
    /// Per-store state owned by this effect.
    type Local: Send + 'static;

    /// Name used in log fields.
    fn name(&self) -> &'static str;

    /// When to run. Defaults to every dispatch.
    fn trigger(&self) -> Trigger {
        Trigger::EveryDispatch
    }

    /// Build the local state for a new store.
    fn init(&self, store: &ApplicationStore) -> Self::Local;

    /// React to one committed transition.
    fn update(&self, local: &mut Self::Local, cx: &EffectContext<'_>) -> Result<(), EffectError>;

    /// Tear down. The default drops `local`.
    fn destroy(&self, local: Self::Local) {
        drop(local);
    }
}

/// What an effect sees during one pass.
pub struct EffectContext<'a> {
    action: &'a Action,
    previous: &'a AppState,
    state: &'a AppState,
    store: &'a ApplicationStore,
}

impl<'a> EffectContext<'a> {
    pub(crate) fn new(
        action: &'a Action,
        previous: &'a AppState,
        state: &'a AppState,
        store: &'a ApplicationStore,
    ) -> Self {
        Self {
            action,
            previous,
            state,
            store,
        }
    }

    /// The action that produced this transition.
    pub fn action(&self) -> &Action {
        self.action
    }

    /// Snapshot before the action.
    pub fn previous(&self) -> &AppState {
        self.previous
    }

    /// Snapshot after the action.
    pub fn state(&self) -> &AppState {
        self.state
    }

    /// The store running this pass.
    pub fn store(&self) -> &ApplicationStore {
        self.store
    }

    /// Dispatch a follow-up action. It is queued and applied once the
    /// current pass completes.
    pub fn dispatch(&self, action: Action) -> Result<(), DispatchError> {
        self.store.dispatch(action)
    }

    /// Current time from the store's clock.
    pub fn now_ms(&self) -> u64 {
        self.store.clock().now_ms()
    }
}

// --- Type-erased plumbing for the store ---

/// Object-safe factory stored on a slice; one runner per store.
pub(crate) trait ErasedEffectSpec: Send + Sync {
    fn instantiate(&self, store: &ApplicationStore) -> Box<dyn EffectRunner>;
}

/// Object-safe view of one instantiated effect.
pub(crate) trait EffectRunner: Send {
    fn name(&self) -> &'static str;

    fn should_run(&self, previous: &AppState, next: &AppState) -> bool;

    fn update(&mut self, cx: &EffectContext<'_>) -> Result<(), EffectError>;

    /// Consumes the local state. Later calls are no-ops.
    fn destroy(&mut self);
}

/// Wraps a concrete [`Effect`] so slices can hold heterogeneous effects.
pub(crate) struct EffectSpec<E> {
    effect: Arc<E>,
}

impl<E: Effect> EffectSpec<E> {
    pub(crate) fn new(effect: E) -> Self {
        Self {
            effect: Arc::new(effect),
        }
    }
}

impl<E: Effect> ErasedEffectSpec for EffectSpec<E> {
    fn instantiate(&self, store: &ApplicationStore) -> Box<dyn EffectRunner> {
        let local = self.effect.init(store);
        Box::new(TypedEffectRunner {
            effect: Arc::clone(&self.effect),
            local: Some(local),
        })
    }
}

struct TypedEffectRunner<E: Effect> {
    effect: Arc<E>,
    local: Option<E::Local>,
}

impl<E: Effect> EffectRunner for TypedEffectRunner<E> {
    fn name(&self) -> &'static str {
        self.effect.name()
    }

    fn should_run(&self, previous: &AppState, next: &AppState) -> bool {
        match self.effect.trigger() {
            Trigger::EveryDispatch => true,
            Trigger::SliceChanged(key) => {
                match (previous.get_sub_state(key), next.get_sub_state(key)) {
                    (Some(a), Some(b)) => !same_sub_state(&a, &b),
                    (None, None) => false,
                    _ => true,
                }
            }
        }
    }

    fn update(&mut self, cx: &EffectContext<'_>) -> Result<(), EffectError> {
        match self.local.as_mut() {
            Some(local) => self.effect.update(local, cx),
            None => Ok(()),
        }
    }

    fn destroy(&mut self) {
        if let Some(local) = self.local.take() {
            self.effect.destroy(local);
        }
    }
}
