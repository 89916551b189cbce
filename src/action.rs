//! Action messages and the `action::<domain>:<verb>` name grammar.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix every action name starts with.
pub const ACTION_PREFIX: &str = "action::";

/// An immutable, named message describing an intended state transition.
///
/// Actions are dispatched into an [`ApplicationStore`](crate::ApplicationStore)
/// and handed to every slice reducer. The `value` carries the JSON payload;
/// values that cannot be represented as JSON (live editor handles, for
/// example) travel in the `attachment` slot, which is skipped when the
/// action is serialized.
///
/// # Examples
///
/// ```
/// use noteslice::Action;
/// use serde_json::json;
///
/// let action = Action::new("action::workspace-context:update-location")
///     .with_value(json!({"locationPathname": "/ws/my-ws/note.md"}));
///
/// assert_eq!(action.domain(), Some("workspace-context"));
/// assert!(action.id.is_none());
/// ```
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Action {
    /// Namespaced action name, e.g. `action::editor-manager-context:set-editor`.
    pub name: String,
    /// JSON payload. `Value::Null` when the action carries none.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
    /// Dispatch id, stamped by the store when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Non-serializable payload shared by reference.
    #[serde(skip)]
    attachment: Option<Arc<dyn Any + Send + Sync>>,
}

impl Action {
    /// Create an action with no payload.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the JSON payload.
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = value;
        self
    }

    /// Set the dispatch id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach a value that cannot be expressed as JSON.
    ///
    /// The attachment is shared by `Arc`, so cloning the action never clones
    /// the attached value.
    pub fn with_attachment<T: Any + Send + Sync>(mut self, attachment: T) -> Self {
        self.attachment = Some(Arc::new(attachment));
        self
    }

    /// Borrow the attachment if it has type `T`.
    pub fn attachment<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.attachment.as_deref()?.downcast_ref::<T>()
    }

    /// Returns `true` if this action has the given name.
    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }

    /// The `<domain>` segment of the name, if the name is well formed.
    pub fn domain(&self) -> Option<&str> {
        ActionName::parse(&self.name).map(|n| n.domain)
    }

    /// Deserialize the JSON payload into `T`.
    ///
    /// # Errors
    ///
    /// Returns the serde error if the payload does not match `T`.
    pub fn value_as<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.value)
    }
}

// Manual `Debug`: the attachment is `dyn Any`, so only its presence is shown.
impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("id", &self.id)
            .field("attachment", &self.attachment.is_some())
            .finish()
    }
}

/// A parsed `action::<domain>:<verb>` name.
///
/// Action names are the wire protocol between dispatchers and slices;
/// renaming one is a breaking change for replay logs and listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionName<'a> {
    /// Owning domain, usually the slice or context name.
    pub domain: &'a str,
    /// The operation within that domain.
    pub verb: &'a str,
}

impl<'a> ActionName<'a> {
    /// Parse a full action name. Returns `None` if it does not follow the
    /// `action::<domain>:<verb>` grammar with non-empty segments.
    pub fn parse(name: &'a str) -> Option<Self> {
        let rest = name.strip_prefix(ACTION_PREFIX)?;
        let (domain, verb) = rest.split_once(':')?;
        let valid = |s: &str| {
            !s.is_empty()
                && s
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        };
        (valid(domain) && valid(verb)).then_some(Self { domain, verb })
    }
}

impl fmt::Display for ActionName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ACTION_PREFIX}{}:{}", self.domain, self.verb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_action_has_no_payload() {
        let action = Action::new("action::test:noop");
        assert_eq!(action.name, "action::test:noop");
        assert!(action.value.is_null());
        assert_eq!(action.id, None);
        assert!(action.attachment::<u32>().is_none());
    }

    #[test]
    fn builder_chains_all_fields() {
        let action = Action::new("action::test:set")
            .with_value(json!({"n": 1}))
            .with_id("id-1")
            .with_attachment(42u32);

        assert_eq!(action.value, json!({"n": 1}));
        assert_eq!(action.id.as_deref(), Some("id-1"));
        assert_eq!(action.attachment::<u32>(), Some(&42));
        assert!(action.attachment::<String>().is_none());
    }

    #[test]
    fn clone_shares_attachment() {
        let action = Action::new("action::test:set").with_attachment(String::from("shared"));
        let cloned = action.clone();
        let a = action.attachment::<String>().unwrap() as *const String;
        let b = cloned.attachment::<String>().unwrap() as *const String;
        assert_eq!(a, b);
    }

    #[test]
    fn serde_skips_attachment_and_null_value() {
        let action = Action::new("action::test:set").with_attachment(1u8);
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json, json!({"name": "action::test:set"}));

        let back: Action = serde_json::from_value(json!({
            "name": "action::test:set",
            "value": {"a": true},
            "id": "x"
        }))
        .unwrap();
        assert_eq!(back.value, json!({"a": true}));
        assert_eq!(back.id.as_deref(), Some("x"));
        assert!(back.attachment::<u8>().is_none());
    }

    #[test]
    fn value_as_decodes_payload() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct Payload {
            editor_id: usize,
        }
        let action = Action::new("action::test:set").with_value(json!({"editor_id": 3}));
        assert_eq!(action.value_as::<Payload>().unwrap(), Payload { editor_id: 3 });
        assert!(action.value_as::<Vec<u8>>().is_err());
    }

    #[test]
    fn parses_well_formed_names() {
        let name = ActionName::parse("action::editor-manager-context:set-editor").unwrap();
        assert_eq!(name.domain, "editor-manager-context");
        assert_eq!(name.verb, "set-editor");
        assert_eq!(name.to_string(), "action::editor-manager-context:set-editor");
    }

    #[test]
    fn rejects_malformed_names() {
        assert!(ActionName::parse("editor:set").is_none());
        assert!(ActionName::parse("action::editor").is_none());
        assert!(ActionName::parse("action:::set").is_none());
        assert!(ActionName::parse("action::editor:").is_none());
        assert!(ActionName::parse("action::edi tor:set").is_none());
    }

    #[test]
    fn debug_shows_attachment_presence_only() {
        let action = Action::new("action::test:set").with_attachment(7u64);
        let out = format!("{action:?}");
        assert!(out.contains("action::test:set"));
        assert!(out.contains("attachment: true"));
    }
}
