//! The [`ApplicationStore`]: a mutable cursor over the current [`AppState`].
//!
//! All work a store does flows through one FIFO queue owned by one thread at
//! a time. The owner drains the queue. Work arriving on the owner thread
//! itself (an effect dispatching a follow-up, an inline effect pass) is
//! appended and picked up by the running drain. Other threads wait until
//! the store is free and then drain their own work, so an external
//! `dispatch` always gets its own result. Two reducer passes or two effect
//! passes therefore never interleave, and an action dispatched from an
//! effect is applied strictly after the pass that issued it.
//!
//! Effect passes are handed to the configured [`Scheduler`] after each
//! commit. When the scheduler eventually runs the task, the pass joins the
//! same queue. [`ApplicationStore::destroy`] cancels every pass that has not
//! started and tears down effect local state exactly once.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock, Weak};
use std::thread::{self, ThreadId};

use tokio::sync::watch;
use uuid::Uuid;

use crate::action::Action;
use crate::app_state::AppState;
use crate::clock::{Clock, SystemClock};
use crate::effect::{EffectContext, EffectRunner};
use crate::error::DispatchError;
use crate::scheduler::{CancelHandle, ImmediateScheduler, Scheduler};

/// Store name used when none is configured.
const DEFAULT_STORE_NAME: &str = "bangle-store";

enum Work {
    Action(Action),
    Effects(EffectPass),
}

struct EffectPass {
    action: Action,
    previous: AppState,
    next: AppState,
}

struct StoreInner {
    name: String,
    state: RwLock<AppState>,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    effects: Mutex<Vec<Box<dyn EffectRunner>>>,
    has_effects: bool,
    queue: Mutex<VecDeque<Work>>,
    /// Thread currently draining the queue.
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
    destroyed: AtomicBool,
    torn_down: AtomicBool,
    /// Scheduled passes that have not started, by pass id.
    pending: Mutex<HashMap<u64, CancelHandle>>,
    next_pass: AtomicU64,
    /// Bumped on every commit.
    version: watch::Sender<u64>,
}

/// Holds the current [`AppState`], applies dispatched actions and runs
/// effects.
///
/// `Clone` is cheap: every clone refers to the same store.
///
/// # Examples
///
/// ```
/// use noteslice::{Action, AppState, ApplicationStore};
///
/// let state = AppState::create(Vec::new(), serde_json::Value::Null).unwrap();
/// let store = ApplicationStore::builder().name("demo").build(state);
///
/// store.dispatch(Action::new("action::demo:noop")).unwrap();
/// store.destroy();
/// assert!(store.dispatch(Action::new("action::demo:noop")).is_err());
/// ```
#[derive(Clone)]
pub struct ApplicationStore {
    inner: Arc<StoreInner>,
}

/// A non-owning store handle for long-lived callbacks.
///
/// Listeners registered with the host hold a `WeakStore` so that they never
/// keep a destroyed store alive.
#[derive(Clone)]
pub struct WeakStore {
    inner: Weak<StoreInner>,
}

impl WeakStore {
    /// Recover the store if it is still alive.
    pub fn upgrade(&self) -> Option<ApplicationStore> {
        self.inner.upgrade().map(|inner| ApplicationStore { inner })
    }
}

impl fmt::Debug for WeakStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakStore")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

/// Releases queue ownership on drop, including while unwinding from a
/// panicking reducer or effect.
struct OwnerGuard<'a> {
    inner: &'a StoreInner,
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        *self.inner.owner.lock().expect("store owner lock poisoned") = None;
        self.inner.released.notify_one();
    }
}

enum Entry<'a> {
    /// The caller now owns the queue and must drain it.
    Owner(OwnerGuard<'a>),
    /// The calling thread is already draining; append only.
    Nested,
}

impl ApplicationStore {
    /// Start configuring a store.
    pub fn builder() -> ApplicationStoreBuilder {
        ApplicationStoreBuilder::new()
    }

    /// Apply `action` and commit the result, then schedule the effect pass.
    ///
    /// Actions without an id are stamped with a UUID v4. A dispatch issued
    /// from inside an effect is queued behind the running pass and `Ok(())`
    /// is returned at once; failures of such follow-ups are logged rather
    /// than returned. A dispatch from another thread while the store is busy
    /// blocks until the store is free, then reports its own result.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::Reducer`] if a slice rejected the action. The
    ///   current state is left untouched.
    /// - [`DispatchError::Destroyed`] after [`destroy`](Self::destroy).
    pub fn dispatch(&self, mut action: Action) -> Result<(), DispatchError> {
        if self.is_destroyed() {
            return Err(DispatchError::Destroyed(self.inner.name.clone()));
        }
        if action.id.is_none() {
            action.id = Some(Uuid::new_v4().to_string());
        }

        let _owner = match self.enter() {
            Entry::Owner(guard) => guard,
            Entry::Nested => {
                tracing::trace!(store = %self.inner.name, action = %action.name, "dispatch from effect, queueing action");
                self.queue().push_back(Work::Action(action));
                return Ok(());
            }
        };
        // Destroyed while waiting for the previous owner.
        if self.is_destroyed() {
            return Err(DispatchError::Destroyed(self.inner.name.clone()));
        }

        // Work left behind by an interrupted drain goes first.
        self.drain_queue();
        let result = self.reduce(action);
        self.run_queue();
        result
    }

    /// The current snapshot.
    pub fn state(&self) -> AppState {
        self.inner
            .state
            .read()
            .expect("store state lock poisoned")
            .clone()
    }

    /// The store name, used in log fields and errors.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The clock effects read time from.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    /// Returns `true` once [`destroy`](Self::destroy) was called.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Number of commits so far.
    pub fn version(&self) -> u64 {
        *self.inner.version.borrow()
    }

    /// Watch the commit counter. The receiver is marked changed after every
    /// committed dispatch.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }

    /// A handle that does not keep the store alive.
    pub fn downgrade(&self) -> WeakStore {
        WeakStore {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Stop accepting actions, cancel scheduled effect passes and tear down
    /// every effect.
    ///
    /// Calling `destroy` from inside an effect is allowed: the remaining
    /// effects of that pass are skipped and teardown happens once the pass
    /// returns. Repeated calls are no-ops.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let cancelled: Vec<CancelHandle> = self
            .inner
            .pending
            .lock()
            .expect("pending passes lock poisoned")
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        for handle in &cancelled {
            handle.cancel();
        }
        tracing::debug!(store = %self.inner.name, cancelled = cancelled.len(), "destroying store");

        // Called from an effect: the running drain tears down when it
        // returns.
        if let Entry::Owner(_owner) = self.enter() {
            self.run_queue();
        }
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Work>> {
        self.inner.queue.lock().expect("work queue poisoned")
    }

    /// Take ownership of the queue, waiting for another thread to finish
    /// its drain first.
    fn enter(&self) -> Entry<'_> {
        let me = thread::current().id();
        let mut owner = self.inner.owner.lock().expect("store owner lock poisoned");
        loop {
            let current = *owner;
            match current {
                None => {
                    *owner = Some(me);
                    return Entry::Owner(OwnerGuard { inner: &*self.inner });
                }
                Some(id) if id == me => return Entry::Nested,
                Some(_) => {
                    owner = self
                        .inner
                        .released
                        .wait(owner)
                        .expect("store owner lock poisoned");
                }
            }
        }
    }

    /// Append work, draining it unless this thread already is.
    fn enqueue(&self, work: Work) {
        match self.enter() {
            Entry::Owner(_owner) => {
                self.queue().push_back(work);
                self.run_queue();
            }
            Entry::Nested => self.queue().push_back(work),
        }
    }

    /// Drain the queue. The caller must own it.
    fn run_queue(&self) {
        self.drain_queue();
        if self.is_destroyed() {
            self.teardown();
        }
    }

    fn drain_queue(&self) {
        loop {
            if self.is_destroyed() {
                return;
            }
            let next = self.queue().pop_front();
            match next {
                None => return,
                Some(Work::Action(action)) => {
                    if let Err(err) = self.reduce(action) {
                        tracing::error!(store = %self.inner.name, error = %err, "queued action failed");
                    }
                }
                Some(Work::Effects(pass)) => self.run_effects(pass),
            }
        }
    }

    /// Apply and commit one action. The caller must own the queue.
    fn reduce(&self, action: Action) -> Result<(), DispatchError> {
        let _span = tracing::debug_span!(
            "dispatch",
            store = %self.inner.name,
            action = %action.name,
            id = action.id.as_deref().unwrap_or_default(),
        )
        .entered();

        let previous = self.state();
        let next = previous.apply_action(&action).map_err(|source| {
            tracing::debug!(error = %source, "reducer rejected action");
            DispatchError::Reducer {
                action: action.name.clone(),
                source,
            }
        })?;

        *self.inner.state.write().expect("store state lock poisoned") = next.clone();
        self.inner.version.send_modify(|v| *v += 1);
        tracing::trace!("state committed");

        if self.inner.has_effects {
            self.schedule_effects(EffectPass {
                action,
                previous,
                next,
            });
        }
        Ok(())
    }

    fn schedule_effects(&self, pass: EffectPass) {
        let id = self.inner.next_pass.fetch_add(1, Ordering::Relaxed);
        let started = Arc::new(AtomicBool::new(false));
        let weak = self.downgrade();
        let task_started = Arc::clone(&started);

        let handle = self.inner.scheduler.schedule(Box::new(move || {
            let Some(store) = weak.upgrade() else {
                return;
            };
            {
                let mut pending = store
                    .inner
                    .pending
                    .lock()
                    .expect("pending passes lock poisoned");
                task_started.store(true, Ordering::Release);
                pending.remove(&id);
            }
            if store.is_destroyed() {
                tracing::trace!(store = %store.inner.name, "skipping effect pass on destroyed store");
                return;
            }
            store.enqueue(Work::Effects(pass));
        }));

        // Immediate schedulers have already run the task; only track
        // passes that are still waiting.
        let mut pending = self
            .inner
            .pending
            .lock()
            .expect("pending passes lock poisoned");
        if !started.load(Ordering::Acquire) && !handle.is_cancelled() {
            if self.is_destroyed() {
                handle.cancel();
            } else {
                pending.insert(id, handle);
            }
        }
    }

    fn run_effects(&self, pass: EffectPass) {
        let _span = tracing::debug_span!(
            "effects",
            store = %self.inner.name,
            action = %pass.action.name,
        )
        .entered();

        let cx = EffectContext::new(&pass.action, &pass.previous, &pass.next, self);
        let mut runners = self.inner.effects.lock().expect("effects lock poisoned");
        for runner in runners.iter_mut() {
            if self.is_destroyed() {
                tracing::debug!("store destroyed mid-pass, skipping remaining effects");
                break;
            }
            if !runner.should_run(&pass.previous, &pass.next) {
                continue;
            }
            if let Err(err) = runner.update(&cx) {
                tracing::error!(effect = runner.name(), error = %err, "effect failed");
            }
        }
    }

    fn teardown(&self) {
        if self.inner.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let runners = std::mem::take(&mut *self.inner.effects.lock().expect("effects lock poisoned"));
        for mut runner in runners {
            tracing::trace!(effect = runner.name(), "destroying effect");
            runner.destroy();
        }
        let dropped = {
            let mut queue = self.queue();
            let n = queue.len();
            queue.clear();
            n
        };
        tracing::debug!(store = %self.inner.name, dropped, "store torn down");
    }
}

impl fmt::Debug for ApplicationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationStore")
            .field("name", &self.inner.name)
            .field("version", &self.version())
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ApplicationStore`].
///
/// Defaults: name `"bangle-store"`, [`ImmediateScheduler`],
/// [`SystemClock`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use noteslice::{AppState, ApplicationStore, ManualClock, QueueScheduler};
///
/// let scheduler = Arc::new(QueueScheduler::new());
/// let store = ApplicationStore::builder()
///     .name("editor")
///     .scheduler(scheduler.clone())
///     .clock(Arc::new(ManualClock::new(0)))
///     .build(AppState::create(Vec::new(), serde_json::Value::Null).unwrap());
///
/// assert_eq!(store.name(), "editor");
/// ```
pub struct ApplicationStoreBuilder {
    name: String,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
}

impl ApplicationStoreBuilder {
    /// Create a builder with the defaults.
    pub fn new() -> Self {
        Self {
            name: DEFAULT_STORE_NAME.to_owned(),
            scheduler: Arc::new(ImmediateScheduler),
            clock: Arc::new(SystemClock),
        }
    }

    /// Set the store name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the scheduler that decides when effect passes run.
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Set the clock effects read time from.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the store around `state` and initialize every effect, in slice
    /// then effect registration order.
    pub fn build(self, state: AppState) -> ApplicationStore {
        let slices = state.slices().to_vec();
        let has_effects = slices.iter().any(|s| !s.effects().is_empty());
        let (version, _) = watch::channel(0);

        let store = ApplicationStore {
            inner: Arc::new(StoreInner {
                name: self.name,
                state: RwLock::new(state),
                scheduler: self.scheduler,
                clock: self.clock,
                effects: Mutex::new(Vec::new()),
                has_effects,
                queue: Mutex::new(VecDeque::new()),
                owner: Mutex::new(None),
                released: Condvar::new(),
                destroyed: AtomicBool::new(false),
                torn_down: AtomicBool::new(false),
                pending: Mutex::new(HashMap::new()),
                next_pass: AtomicU64::new(0),
                version,
            }),
        };

        let runners: Vec<Box<dyn EffectRunner>> = slices
            .iter()
            .flat_map(|slice| slice.effects().iter())
            .map(|spec| spec.instantiate(&store))
            .collect();
        tracing::debug!(store = %store.inner.name, slices = slices.len(), effects = runners.len(), "store built");
        *store.inner.effects.lock().expect("effects lock poisoned") = runners;
        store
    }
}

impl Default for ApplicationStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
