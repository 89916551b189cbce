//! The pair of open documents and its round trip through a [`Location`].
//!
//! A location encodes the primary note in its pathname
//! (`/ws/<wsName>/<filePath>`) and the secondary note in the `secondary`
//! query parameter.

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use super::ws_path::{decode_path, encode_path, resolve_path};

const WS_PREFIX: &str = "/ws/";
const SECONDARY_PARAM: &str = "secondary";

/// A router location: pathname plus query string (with its leading `?`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub pathname: String,
    #[serde(default)]
    pub search: String,
}

impl Location {
    /// Create a location from a pathname and a query string.
    ///
    /// # Arguments
    ///
    /// * `pathname` - Percent-encoded path, e.g. `/ws/notes/my%20note.md`.
    /// * `search` - Query string with its leading `?`, or empty.
    pub fn new(pathname: impl Into<String>, search: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
            search: search.into(),
        }
    }

    /// Workspace named by the pathname, decoded, if it is a `/ws/...` path.
    pub fn ws_name(&self) -> Option<String> {
        let rest = self.pathname.strip_prefix(WS_PREFIX)?;
        let name = rest.split('/').next()?;
        (!name.is_empty()).then(|| decode_path(name))
    }

    /// The wsPath in the pathname, decoded and unvalidated.
    pub fn primary_ws_path(&self) -> Option<String> {
        let rest = self.pathname.strip_prefix(WS_PREFIX)?;
        let (ws_name, file_path) = rest.split_once('/')?;
        if ws_name.is_empty() || file_path.is_empty() {
            return None;
        }
        Some(format!("{}:{}", decode_path(ws_name), decode_path(file_path)))
    }

    /// The wsPath in the `secondary` query parameter, unvalidated.
    pub fn secondary_ws_path(&self) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find(|(k, _)| k == SECONDARY_PARAM)
            .map(|(_, v)| v)
            .filter(|v| !v.is_empty())
    }

    fn query_pairs(&self) -> Vec<(String, String)> {
        let query = self.search.strip_prefix('?').unwrap_or(&self.search);
        form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }
}

/// The notes open in the primary and secondary panes.
///
/// Equality is structural. Update operators return a new value and leave
/// `self` untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenedWsPaths {
    primary_ws_path: Option<String>,
    secondary_ws_path: Option<String>,
}

impl OpenedWsPaths {
    /// Create a pair from its two panes. Paths are not validated.
    pub fn new(primary: Option<String>, secondary: Option<String>) -> Self {
        Self {
            primary_ws_path: primary,
            secondary_ws_path: secondary,
        }
    }

    /// Read both panes from a location without validating them.
    pub fn from_location(location: &Location) -> Self {
        Self::new(location.primary_ws_path(), location.secondary_ws_path())
    }

    /// Note in the primary pane.
    pub fn primary_ws_path(&self) -> Option<&str> {
        self.primary_ws_path.as_deref()
    }

    /// Note in the secondary pane.
    pub fn secondary_ws_path(&self) -> Option<&str> {
        self.secondary_ws_path.as_deref()
    }

    /// Open paths, primary first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.primary_ws_path().into_iter().chain(self.secondary_ws_path())
    }

    /// Returns `true` if either pane shows `ws_path`.
    pub fn has(&self, ws_path: &str) -> bool {
        self.iter().any(|p| p == ws_path)
    }

    pub fn is_empty(&self) -> bool {
        self.primary_ws_path.is_none() && self.secondary_ws_path.is_none()
    }

    /// Put `ws_path` in the primary pane, or close it with `None`.
    ///
    /// # Returns
    ///
    /// A new pair with the secondary pane unchanged. `self` is not modified.
    pub fn update_primary_ws_path(&self, ws_path: Option<&str>) -> Self {
        Self::new(ws_path.map(str::to_owned), self.secondary_ws_path.clone())
    }

    /// Put `ws_path` in the secondary pane, or close it with `None`.
    ///
    /// # Returns
    ///
    /// A new pair with the primary pane unchanged. `self` is not modified.
    pub fn update_secondary_ws_path(&self, ws_path: Option<&str>) -> Self {
        Self::new(self.primary_ws_path.clone(), ws_path.map(str::to_owned))
    }

    /// Close every pane showing `ws_path`.
    pub fn close_if_found(&self, ws_path: &str) -> Self {
        self.update_if_found(ws_path, None)
    }

    /// Replace `old` with `new` in every pane showing it.
    pub fn update_if_found(&self, old: &str, new: Option<&str>) -> Self {
        let swap = |slot: &Option<String>| match slot {
            Some(p) if p == old => new.map(str::to_owned),
            other => other.clone(),
        };
        Self::new(swap(&self.primary_ws_path), swap(&self.secondary_ws_path))
    }

    /// Encode into a location for `ws_name`, keeping unrelated query
    /// parameters of `base`.
    pub fn to_location(&self, base: &Location, ws_name: &str) -> Location {
        let pathname = self
            .primary_ws_path()
            .and_then(|p| resolve_path(p).ok())
            .map(|r| r.location_path())
            .unwrap_or_else(|| format!("{WS_PREFIX}{}", encode_path(ws_name)));

        let mut query = form_urlencoded::Serializer::new(String::new());
        for (k, v) in base.query_pairs() {
            if k != SECONDARY_PARAM {
                query.append_pair(&k, &v);
            }
        }
        if let Some(secondary) = self.secondary_ws_path() {
            query.append_pair(SECONDARY_PARAM, secondary);
        }
        let query = query.finish();
        let search = if query.is_empty() {
            String::new()
        } else {
            format!("?{query}")
        };
        Location { pathname, search }
    }
}
