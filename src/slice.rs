//! Slices: independently authored units of state, reducer and effects.
//!
//! A [`Slice`] pairs a unique key with an optional [`StateField`] and a list
//! of effects. Sub-states are stored type-erased as `Arc<dyn Any>` inside an
//! [`AppState`]; a typed [`SliceKey`] recovers them. Because every sub-state
//! lives behind an `Arc`, "unchanged" is observable as pointer identity.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::Action;
use crate::app_state::{AppState, AppStateConfig};
use crate::effect::{Effect, EffectSpec, ErasedEffectSpec};
use crate::error::SliceError;

/// A type-erased sub-state as stored inside an [`AppState`].
pub type SubState = Arc<dyn Any + Send + Sync>;

/// Returns `true` if both sub-states are the same allocation.
pub fn same_sub_state(a: &SubState, b: &SubState) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

type InitFn<S> = dyn Fn(&AppStateConfig, &AppState) -> Result<S, SliceError> + Send + Sync;
type ApplyFn<S> =
    dyn Fn(&Action, &Arc<S>, &AppState) -> Result<Arc<S>, SliceError> + Send + Sync;
type ToJsonFn<S> = dyn Fn(&S) -> Result<Value, SliceError> + Send + Sync;
type FromJsonFn<S> =
    dyn Fn(&AppStateConfig, &Value, &AppState) -> Result<S, SliceError> + Send + Sync;

/// Describes how a slice's sub-state is created, updated and persisted.
///
/// # Contract
///
/// - `init` runs once per container in slice registration order. The
///   `AppState` it receives only holds the slices registered earlier.
/// - `apply` must be pure and must return `Arc::clone(previous)` when the
///   action does not concern the slice. The `AppState` it receives is the
///   previous, fully committed snapshot.
/// - A field without `apply` never changes after `init`.
pub struct StateField<S> {
    init: Box<InitFn<S>>,
    apply: Option<Box<ApplyFn<S>>>,
    to_json: Option<Box<ToJsonFn<S>>>,
    from_json: Option<Box<FromJsonFn<S>>>,
}

impl<S: Send + Sync + 'static> StateField<S> {
    /// Create a field with the given initializer and no reducer.
    pub fn new(
        init: impl Fn(&AppStateConfig, &AppState) -> Result<S, SliceError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            init: Box::new(init),
            apply: None,
            to_json: None,
            from_json: None,
        }
    }

    /// Set the reducer.
    pub fn with_apply(
        mut self,
        apply: impl Fn(&Action, &Arc<S>, &AppState) -> Result<Arc<S>, SliceError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.apply = Some(Box::new(apply));
        self
    }

    /// Set the persistence hooks.
    pub fn with_json(
        mut self,
        to_json: impl Fn(&S) -> Result<Value, SliceError> + Send + Sync + 'static,
        from_json: impl Fn(&AppStateConfig, &Value, &AppState) -> Result<S, SliceError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.to_json = Some(Box::new(to_json));
        self.from_json = Some(Box::new(from_json));
        self
    }
}

/// Object-safe view of a [`StateField`] used by the container.
pub(crate) trait ErasedField: Send + Sync {
    fn init(&self, config: &AppStateConfig, state: &AppState) -> Result<SubState, SliceError>;

    fn has_apply(&self) -> bool;

    /// Only called when `has_apply` is true.
    fn apply(
        &self,
        key: &str,
        action: &Action,
        previous: &SubState,
        state: &AppState,
    ) -> Result<SubState, SliceError>;

    fn to_json(&self, key: &str, sub_state: &SubState) -> Option<Result<Value, SliceError>>;

    fn has_from_json(&self) -> bool;

    fn from_json(
        &self,
        config: &AppStateConfig,
        json: &Value,
        state: &AppState,
    ) -> Option<Result<SubState, SliceError>>;
}

fn downcast<S: Send + Sync + 'static>(key: &str, sub_state: &SubState) -> Result<Arc<S>, SliceError> {
    Arc::clone(sub_state)
        .downcast::<S>()
        .map_err(|_| SliceError::failed(key, "sub-state has an unexpected type"))
}

impl<S: Send + Sync + 'static> ErasedField for StateField<S> {
    fn init(&self, config: &AppStateConfig, state: &AppState) -> Result<SubState, SliceError> {
        let value = (self.init)(config, state)?;
        Ok(Arc::new(value))
    }

    fn has_apply(&self) -> bool {
        self.apply.is_some()
    }

    fn apply(
        &self,
        key: &str,
        action: &Action,
        previous: &SubState,
        state: &AppState,
    ) -> Result<SubState, SliceError> {
        let Some(apply) = &self.apply else {
            return Ok(Arc::clone(previous));
        };
        let typed = downcast::<S>(key, previous)?;
        let next = apply(action, &typed, state)?;
        Ok(next)
    }

    fn to_json(&self, key: &str, sub_state: &SubState) -> Option<Result<Value, SliceError>> {
        let to_json = self.to_json.as_ref()?;
        Some(downcast::<S>(key, sub_state).and_then(|s| to_json(&s)))
    }

    fn has_from_json(&self) -> bool {
        self.from_json.is_some()
    }

    fn from_json(
        &self,
        config: &AppStateConfig,
        json: &Value,
        state: &AppState,
    ) -> Option<Result<SubState, SliceError>> {
        let from_json = self.from_json.as_ref()?;
        Some(from_json(config, json, state).map(|s| Arc::new(s) as SubState))
    }
}

#[derive(Clone)]
struct SliceInner {
    key: String,
    field: Option<Arc<dyn ErasedField>>,
    effects: Vec<Arc<dyn ErasedEffectSpec>>,
}

/// A named unit of sub-state plus its reducer and effects.
///
/// `Clone` is cheap: the definition is shared behind an `Arc`.
#[derive(Clone)]
pub struct Slice {
    inner: Arc<SliceInner>,
}

impl Slice {
    /// Create a slice that owns a state field.
    pub fn new<S: Send + Sync + 'static>(key: SliceKey<S>, field: StateField<S>) -> Self {
        Self {
            inner: Arc::new(SliceInner {
                key: key.name().to_owned(),
                field: Some(Arc::new(field)),
                effects: Vec::new(),
            }),
        }
    }

    /// Create a slice that only contributes effects.
    pub fn stateless(key: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SliceInner {
                key: key.into(),
                field: None,
                effects: Vec::new(),
            }),
        }
    }

    /// Register an effect. Effects run in registration order.
    ///
    /// Clones of this slice made earlier keep their own effect list.
    pub fn with_effect<E: Effect>(mut self, effect: E) -> Self {
        Arc::make_mut(&mut self.inner)
            .effects
            .push(Arc::new(EffectSpec::new(effect)));
        self
    }

    /// The slice key.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Returns `true` if the slice owns a state field.
    pub fn has_state(&self) -> bool {
        self.inner.field.is_some()
    }

    pub(crate) fn field(&self) -> Option<&dyn ErasedField> {
        self.inner.field.as_deref()
    }

    pub(crate) fn effects(&self) -> &[Arc<dyn ErasedEffectSpec>] {
        &self.inner.effects
    }
}

impl fmt::Debug for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slice")
            .field("key", &self.inner.key)
            .field("has_state", &self.has_state())
            .field("effects", &self.inner.effects.len())
            .finish()
    }
}

/// Typed handle naming a slice and the type of its sub-state.
///
/// Keys are plain values, usually declared as constants next to the slice:
///
/// ```
/// use noteslice::SliceKey;
///
/// struct Counter(u32);
/// const COUNTER: SliceKey<Counter> = SliceKey::new("counter-slice");
/// assert_eq!(COUNTER.name(), "counter-slice");
/// ```
pub struct SliceKey<S> {
    name: &'static str,
    _marker: PhantomData<fn() -> S>,
}

impl<S> SliceKey<S> {
    /// Declare a key.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// The slice key string.
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<S: Send + Sync + 'static> SliceKey<S> {
    /// Read this slice's sub-state from a snapshot.
    ///
    /// Returns `None` if the slice is not registered in `state`.
    pub fn get_slice_state(&self, state: &AppState) -> Option<Arc<S>> {
        state.get_slice_state::<S>(self.name)
    }
}

// Manual impls: `S` itself need not be `Clone`/`Copy`/`Debug`.
impl<S> Clone for SliceKey<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for SliceKey<S> {}

impl<S> fmt::Debug for SliceKey<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SliceKey").field(&self.name).finish()
    }
}

/// On-disk shape of a persisted slice: `{ "version": n, "data": ... }`.
///
/// The container never interprets `version`; each slice's `from_json`
/// decides whether to migrate or discard mismatched data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedJson {
    /// Schema version written by the slice.
    pub version: u32,
    /// Slice-specific payload.
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_sub_state_compares_allocation() {
        let a: SubState = Arc::new(1u32);
        let b: SubState = Arc::clone(&a);
        let c: SubState = Arc::new(1u32);
        assert!(same_sub_state(&a, &b));
        assert!(!same_sub_state(&a, &c));
    }

    #[test]
    fn stateless_slice_has_no_field() {
        let slice = Slice::stateless("effects-only");
        assert_eq!(slice.key(), "effects-only");
        assert!(!slice.has_state());
        assert!(slice.field().is_none());
    }

    #[test]
    fn field_without_apply_keeps_previous() {
        const KEY: SliceKey<u32> = SliceKey::new("static");
        let slice = Slice::new(KEY, StateField::new(|_, _| Ok(7u32)));
        let field = slice.field().unwrap();
        assert!(!field.has_apply());
        assert!(!field.has_from_json());

        let state = AppState::create(vec![slice.clone()], Value::Null).unwrap();
        let prev = state.get_sub_state(KEY.name()).unwrap();
        let next = field
            .apply(KEY.name(), &Action::new("action::test:any"), &prev, &state)
            .unwrap();
        assert!(same_sub_state(&prev, &next));
    }

    #[test]
    fn downcast_mismatch_is_reported() {
        let wrong: SubState = Arc::new("text");
        let err = downcast::<u32>("k", &wrong).unwrap_err();
        assert!(err.to_string().contains("unexpected type"));
    }

    #[test]
    fn versioned_json_shape() {
        let v = VersionedJson {
            version: 2,
            data: serde_json::json!({"a": 1}),
        };
        assert_eq!(
            serde_json::to_value(&v).unwrap(),
            serde_json::json!({"version": 2, "data": {"a": 1}})
        );
    }

    #[test]
    fn slice_key_is_copy_and_debug() {
        struct NotClone;
        const KEY: SliceKey<NotClone> = SliceKey::new("nc");
        let copy = KEY;
        assert_eq!(copy.name(), "nc");
        assert_eq!(format!("{KEY:?}"), "SliceKey(\"nc\")");
    }
}
