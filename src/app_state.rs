//! The immutable application state snapshot and its slice registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::action::Action;
use crate::error::{ConfigError, SliceError, StateError};
use crate::slice::{Slice, SubState};

/// A state-owning slice and its position in the field list.
struct FieldDesc {
    name: String,
    slice: Slice,
}

/// Ordered registry of slices, built once per container.
///
/// Construction validates key uniqueness and fixes the init/apply order to
/// the slice registration order.
pub struct AppStateConfig {
    slices: Vec<Slice>,
    slices_by_key: HashMap<String, usize>,
    fields: Vec<FieldDesc>,
    field_index: HashMap<String, usize>,
    opts: Value,
}

impl AppStateConfig {
    /// Build a config from an ordered list of slices.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateSlice`] if two slices share a key.
    pub fn new(slices: impl IntoIterator<Item = Slice>, opts: Value) -> Result<Self, ConfigError> {
        let mut config = Self {
            slices: Vec::new(),
            slices_by_key: HashMap::new(),
            fields: Vec::new(),
            field_index: HashMap::new(),
            opts,
        };

        for slice in slices {
            let key = slice.key().to_owned();
            if config.slices_by_key.contains_key(&key) {
                return Err(ConfigError::DuplicateSlice(key));
            }
            config.slices_by_key.insert(key.clone(), config.slices.len());
            if slice.has_state() {
                config.field_index.insert(key.clone(), config.fields.len());
                config.fields.push(FieldDesc {
                    name: key,
                    slice: slice.clone(),
                });
            }
            config.slices.push(slice);
        }

        Ok(config)
    }

    /// Slices in registration order.
    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    /// Look up a slice by key.
    pub fn slice_by_key(&self, key: &str) -> Option<&Slice> {
        self.slices_by_key.get(key).map(|&i| &self.slices[i])
    }

    /// Global options passed at construction.
    pub fn opts(&self) -> &Value {
        &self.opts
    }
}

impl fmt::Debug for AppStateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppStateConfig")
            .field("slices", &self.slices)
            .field("opts", &self.opts)
            .finish()
    }
}

/// Mapping from a persistence field name to the slice that owns it.
///
/// Only slices listed here take part in [`AppState::state_to_json`] and
/// [`AppState::state_from_json`], and each may be stored under any name.
#[derive(Debug, Clone, Default)]
pub struct SliceFields {
    entries: Vec<(String, Slice)>,
}

impl SliceFields {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist `slice` under `field_name`.
    pub fn with_field(mut self, field_name: impl Into<String>, slice: Slice) -> Self {
        self.entries.push((field_name.into(), slice));
        self
    }

    /// Iterate over `(field_name, slice)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Slice)> {
        self.entries.iter().map(|(name, slice)| (name.as_str(), slice))
    }
}

/// An immutable snapshot mapping each slice key to its sub-state.
///
/// `Clone` is cheap: both the config and the sub-state table are shared.
/// [`apply_action`](AppState::apply_action) never mutates the receiver.
#[derive(Clone)]
pub struct AppState {
    config: Arc<AppStateConfig>,
    values: Arc<[SubState]>,
}

impl AppState {
    /// Build a config from `slices` and initialize every field in order.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Config`] on duplicate keys (before any `init`
    /// runs) or [`StateError::Slice`] if an `init` fails.
    pub fn create(slices: impl IntoIterator<Item = Slice>, opts: Value) -> Result<Self, StateError> {
        let config = Arc::new(AppStateConfig::new(slices, opts)?);
        Self::initialize(config, |_, _| None)
    }

    /// Like [`create`](AppState::create), but rebuilds persisted slices from
    /// `json`.
    ///
    /// A field is read from JSON when some entry of `slice_fields` names a
    /// slice with the same key that defines `from_json`, and `json` has a
    /// property with that entry's field name. Every other field falls back
    /// to `init`.
    ///
    /// # Errors
    ///
    /// Same as [`create`](AppState::create), plus any `from_json` failure.
    pub fn state_from_json(
        slices: impl IntoIterator<Item = Slice>,
        json: &Value,
        slice_fields: &SliceFields,
        opts: Value,
    ) -> Result<Self, StateError> {
        let config = Arc::new(AppStateConfig::new(slices, opts)?);
        Self::initialize(config, |field, partial| {
            slice_fields.iter().find_map(|(prop, slice)| {
                let erased = slice.field()?;
                if slice.key() != field.name || !erased.has_from_json() {
                    return None;
                }
                let data = json.get(prop)?;
                erased.from_json(&partial.config, data, partial)
            })
        })
    }

    /// Run each field's initializer, or `restore` when it yields a value.
    fn initialize(
        config: Arc<AppStateConfig>,
        restore: impl Fn(&FieldDesc, &AppState) -> Option<Result<SubState, SliceError>>,
    ) -> Result<Self, StateError> {
        let mut values: Vec<SubState> = Vec::with_capacity(config.fields.len());

        for field in &config.fields {
            // Earlier fields are visible to later initializers.
            let partial = AppState {
                config: Arc::clone(&config),
                values: values.as_slice().into(),
            };
            let value = match restore(field, &partial) {
                Some(restored) => restored?,
                None => match field.slice.field() {
                    Some(erased) => erased.init(&config, &partial)?,
                    None => continue,
                },
            };
            tracing::trace!(slice = %field.name, "slice initialized");
            values.push(value);
        }

        Ok(Self {
            config,
            values: values.into(),
        })
    }

    /// Serialize every slice listed in `slice_fields` that defines `to_json`.
    ///
    /// # Errors
    ///
    /// Returns the first slice serialization failure.
    pub fn state_to_json(&self, slice_fields: &SliceFields) -> Result<Value, SliceError> {
        let mut result = Map::new();
        for (prop, slice) in slice_fields.iter() {
            let (Some(erased), Some(sub_state)) = (slice.field(), self.get_sub_state(slice.key()))
            else {
                continue;
            };
            if let Some(json) = erased.to_json(slice.key(), &sub_state) {
                result.insert(prop.to_owned(), json?);
            }
        }
        Ok(Value::Object(result))
    }

    /// Compute the next snapshot for `action`.
    ///
    /// Each field is computed from this snapshot in registration order;
    /// fields without a reducer keep their previous `Arc`. Nothing is
    /// published unless every reducer succeeds.
    ///
    /// # Errors
    ///
    /// Returns the first reducer failure.
    pub fn apply_action(&self, action: &Action) -> Result<Self, SliceError> {
        let mut next = Vec::with_capacity(self.values.len());

        for (field, previous) in self.config.fields.iter().zip(self.values.iter()) {
            let value = match field.slice.field() {
                Some(erased) if erased.has_apply() => {
                    erased.apply(&field.name, action, previous, self)?
                }
                _ => Arc::clone(previous),
            };
            next.push(value);
        }

        Ok(Self {
            config: Arc::clone(&self.config),
            values: next.into(),
        })
    }

    /// Slices in registration order.
    pub fn slices(&self) -> &[Slice] {
        self.config.slices()
    }

    /// The container config.
    pub fn config(&self) -> &Arc<AppStateConfig> {
        &self.config
    }

    /// Look up a slice by key. `None` means the slice is not registered.
    pub fn get_slice_by_key(&self, key: &str) -> Option<&Slice> {
        self.config.slice_by_key(key)
    }

    /// Read a slice's sub-state as `S`.
    ///
    /// Returns `None` if the slice is not registered, owns no state, or
    /// stores a different type.
    pub fn get_slice_state<S: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<S>> {
        self.get_sub_state(key)?.downcast::<S>().ok()
    }

    /// Read a slice's sub-state without downcasting.
    pub fn get_sub_state(&self, key: &str) -> Option<SubState> {
        let index = *self.config.field_index.get(key)?;
        self.values.get(index).cloned()
    }

    /// Returns `true` if both snapshots share the same sub-state table.
    pub fn ptr_eq(&self, other: &AppState) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.config.fields.iter().map(|d| d.name.as_str()).collect();
        f.debug_struct("AppState").field("fields", &keys).finish()
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::test_fixtures::*;
    use super::*;
    use crate::slice::{SliceKey, StateField};

    fn state() -> AppState {
        AppState::create(vec![counter_slice(), label_slice()], Value::Null).unwrap()
    }

    #[test]
    fn create_runs_init_for_every_field() {
        let state = state();
        assert_eq!(COUNTER.get_slice_state(&state).unwrap().value, 0);
        assert_eq!(*LABEL.get_slice_state(&state).unwrap(), "untitled");
    }

    #[test]
    fn apply_action_returns_new_snapshot() {
        let before = state();
        let after = before.apply_action(&increment()).unwrap();
        assert!(!before.ptr_eq(&after));
        assert_eq!(COUNTER.get_slice_state(&before).unwrap().value, 0);
        assert_eq!(COUNTER.get_slice_state(&after).unwrap().value, 1);
    }

    #[test]
    fn unaffected_slices_keep_identity() {
        let before = state();
        let after = before.apply_action(&increment()).unwrap();
        let label_before = LABEL.get_slice_state(&before).unwrap();
        let label_after = LABEL.get_slice_state(&after).unwrap();
        assert!(Arc::ptr_eq(&label_before, &label_after));

        let after = after.apply_action(&set_label("untitled")).unwrap();
        assert!(Arc::ptr_eq(&label_before, &LABEL.get_slice_state(&after).unwrap()));
    }

    #[test]
    fn unknown_action_keeps_every_identity() {
        let before = state();
        let after = before.apply_action(&Action::new("action::other:noop")).unwrap();
        for key in [COUNTER.name(), LABEL.name()] {
            let a = before.get_sub_state(key).unwrap();
            let b = after.get_sub_state(key).unwrap();
            assert!(crate::slice::same_sub_state(&a, &b), "{key} changed identity");
        }
    }

    #[test]
    fn duplicate_keys_fail_before_any_init() {
        let inits = Arc::new(AtomicUsize::new(0));
        const DUP: SliceKey<u8> = SliceKey::new("dup");
        let make = |inits: Arc<AtomicUsize>| {
            Slice::new(
                DUP,
                StateField::new(move |_, _| {
                    inits.fetch_add(1, Ordering::SeqCst);
                    Ok(0u8)
                }),
            )
        };

        let err = AppState::create(
            vec![make(Arc::clone(&inits)), make(Arc::clone(&inits))],
            Value::Null,
        )
        .unwrap_err();

        assert!(matches!(err, StateError::Config(ConfigError::DuplicateSlice(ref k)) if k == "dup"));
        assert_eq!(inits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_apply_publishes_nothing() {
        let before = state();
        let err = before.apply_action(&Action::new(FAIL)).unwrap_err();
        assert!(err.to_string().contains("asked to fail"));
        assert_eq!(COUNTER.get_slice_state(&before).unwrap().value, 0);
    }

    #[test]
    fn static_slice_never_changes() {
        const STATIC: SliceKey<u32> = SliceKey::new("static");
        let state = AppState::create(
            vec![Slice::new(STATIC, StateField::new(|_, _| Ok(9u32))), counter_slice()],
            Value::Null,
        )
        .unwrap();
        let next = state.apply_action(&increment()).unwrap();
        assert!(Arc::ptr_eq(
            &STATIC.get_slice_state(&state).unwrap(),
            &STATIC.get_slice_state(&next).unwrap()
        ));
    }

    #[test]
    fn later_init_sees_earlier_slices() {
        const DERIVED: SliceKey<u64> = SliceKey::new("derived");
        let derived = Slice::new(
            DERIVED,
            StateField::new(|_, state| {
                Ok(COUNTER.get_slice_state(state).map(|c| c.value + 100).unwrap_or(0))
            }),
        );
        let state = AppState::create(vec![counter_slice(), derived], Value::Null).unwrap();
        assert_eq!(*DERIVED.get_slice_state(&state).unwrap(), 100);
    }

    #[test]
    fn lookups_return_none_for_unregistered() {
        let state = state();
        assert!(state.get_slice_by_key("missing").is_none());
        assert!(state.get_sub_state("missing").is_none());
        assert!(state.get_slice_state::<Counter>(LABEL.name()).is_none());
        assert_eq!(state.get_slice_by_key(COUNTER.name()).unwrap().key(), COUNTER.name());
    }

    #[test]
    fn stateless_slices_are_registered_but_hold_no_state() {
        let state = AppState::create(
            vec![Slice::stateless("fx"), counter_slice()],
            json!({"storeName": "test"}),
        )
        .unwrap();
        assert!(state.get_slice_by_key("fx").is_some());
        assert!(state.get_sub_state("fx").is_none());
        assert_eq!(state.config().opts()["storeName"], "test");
        assert_eq!(state.slices().len(), 2);
    }

    #[test]
    fn json_roundtrip_under_custom_field_name() {
        let fields = SliceFields::new().with_field("counterField", counter_slice());
        let state = state()
            .apply_action(&increment())
            .unwrap()
            .apply_action(&increment())
            .unwrap();

        let json = state.state_to_json(&fields).unwrap();
        assert_eq!(json, json!({"counterField": {"version": 1, "data": {"value": 2}}}));

        let restored =
            AppState::state_from_json(vec![counter_slice(), label_slice()], &json, &fields, Value::Null)
                .unwrap();
        assert_eq!(*COUNTER.get_slice_state(&restored).unwrap(), Counter { value: 2 });
        assert_eq!(*LABEL.get_slice_state(&restored).unwrap(), "untitled");
    }

    #[test]
    fn from_json_falls_back_to_init_when_property_missing() {
        let fields = SliceFields::new().with_field("counterField", counter_slice());
        let restored =
            AppState::state_from_json(vec![counter_slice()], &json!({"other": 1}), &fields, Value::Null)
                .unwrap();
        assert_eq!(COUNTER.get_slice_state(&restored).unwrap().value, 0);
    }

    #[test]
    fn version_mismatch_is_left_to_the_slice() {
        let fields = SliceFields::new().with_field("counterField", counter_slice());
        let json = json!({"counterField": {"version": 99, "data": {"value": 5}}});
        let restored =
            AppState::state_from_json(vec![counter_slice()], &json, &fields, Value::Null).unwrap();
        assert_eq!(COUNTER.get_slice_state(&restored).unwrap().value, 0);
    }

    #[test]
    fn to_json_skips_slices_without_hooks() {
        let fields = SliceFields::new()
            .with_field("label", label_slice())
            .with_field("counter", counter_slice());
        let json = state().state_to_json(&fields).unwrap();
        assert!(json.get("label").is_none());
        assert!(json.get("counter").is_some());
    }

    #[test]
    fn malformed_json_is_an_error() {
        let fields = SliceFields::new().with_field("counterField", counter_slice());
        let json = json!({"counterField": "not an object"});
        let err = AppState::state_from_json(vec![counter_slice()], &json, &fields, Value::Null)
            .unwrap_err();
        assert!(matches!(err, StateError::Slice(SliceError::Json { .. })));
    }
}
