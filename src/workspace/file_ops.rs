//! The file-operations collaborator and its error routing.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::ws_path::ws_name_of;
use crate::error::{FileSystemError, FsErrorKind};

/// Converts between stored note text and document JSON.
pub trait DocCodec: Send + Sync {
    /// # Errors
    ///
    /// Fails if `text` is not a stored document.
    fn parse(&self, text: &str) -> Result<Value, FileSystemError>;

    /// # Errors
    ///
    /// Fails if `doc` cannot be written out.
    fn serialize(&self, doc: &Value) -> Result<String, FileSystemError>;
}

/// Stores documents as their JSON text, untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDocCodec;

impl DocCodec for JsonDocCodec {
    fn parse(&self, text: &str) -> Result<Value, FileSystemError> {
        serde_json::from_str(text).map_err(|err| {
            FileSystemError::new(FsErrorKind::Other, format!("unreadable document: {err}"))
        })
    }

    fn serialize(&self, doc: &Value) -> Result<String, FileSystemError> {
        let text = serde_json::to_string_pretty(doc).map_err(|err| {
            FileSystemError::new(FsErrorKind::Other, format!("unwritable document: {err}"))
        })?;
        Ok(format!("{text}\n"))
    }
}

/// Extensions that shape how documents are read and written.
#[derive(Clone)]
pub struct ExtensionRegistry {
    codec: Arc<dyn DocCodec>,
}

impl ExtensionRegistry {
    /// Create a registry that reads and writes documents with `codec`.
    pub fn new(codec: Arc<dyn DocCodec>) -> Self {
        Self { codec }
    }

    /// The codec used by [`FileOps::get_doc`] and [`FileOps::save_doc`].
    pub fn codec(&self) -> &dyn DocCodec {
        self.codec.as_ref()
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new(Arc::new(JsonDocCodec))
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry").finish_non_exhaustive()
    }
}

/// Storage backend for a workspace's files.
///
/// Every path argument is a wsPath. Implementations must be safe to call
/// concurrently.
#[async_trait]
pub trait FileOps: Send + Sync {
    /// Every file in the workspace as a wsPath, in a stable order.
    async fn list_all_files(&self, ws_name: &str) -> Result<Vec<String>, FileSystemError>;

    async fn get_doc(&self, ws_path: &str, registry: &ExtensionRegistry) -> Result<Value, FileSystemError>;

    async fn save_doc(
        &self,
        ws_path: &str,
        doc: &Value,
        registry: &ExtensionRegistry,
    ) -> Result<(), FileSystemError>;

    async fn rename_file(&self, old_ws_path: &str, new_ws_path: &str) -> Result<(), FileSystemError>;

    async fn delete_file(&self, ws_path: &str) -> Result<(), FileSystemError>;

    async fn check_file_exists(&self, ws_path: &str) -> Result<bool, FileSystemError>;
}

/// Host callbacks for workspace conditions the core cannot resolve itself.
///
/// Every method defaults to a log line.
pub trait WorkspaceHost: Send + Sync {
    /// A location named a path that is not a valid file wsPath.
    fn on_invalid_path(&self, ws_name: Option<&str>, invalid_path: &str) {
        tracing::warn!(ws_name, invalid_path, "invalid path in location");
    }

    /// Storage access was denied or the user dismissed the permission prompt.
    fn on_auth_error(&self, ws_name: &str) {
        tracing::warn!(ws_name, "workspace needs permission");
    }

    fn on_workspace_not_found(&self, ws_name: &str) {
        tracing::warn!(ws_name, "workspace not found");
    }
}

/// A host that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHost;

impl WorkspaceHost for LoggingHost {}

/// Wraps a [`FileOps`] so failures notify the host before propagating.
///
/// Permission and user-abort errors call
/// [`on_auth_error`](WorkspaceHost::on_auth_error); missing workspaces call
/// [`on_workspace_not_found`](WorkspaceHost::on_workspace_not_found). The
/// error itself is always returned unchanged.
#[derive(Clone)]
pub struct ErrorRoutingFileOps {
    inner: Arc<dyn FileOps>,
    host: Arc<dyn WorkspaceHost>,
}

impl ErrorRoutingFileOps {
    pub fn new(inner: Arc<dyn FileOps>, host: Arc<dyn WorkspaceHost>) -> Self {
        Self { inner, host }
    }

    fn route<T>(&self, ws_name: Option<&str>, result: Result<T, FileSystemError>) -> Result<T, FileSystemError> {
        if let (Err(err), Some(ws_name)) = (&result, ws_name) {
            tracing::debug!(ws_name, error = %err, "file operation failed");
            if err.needs_auth() {
                self.host.on_auth_error(ws_name);
            }
            if err.kind == FsErrorKind::WorkspaceNotFound {
                self.host.on_workspace_not_found(ws_name);
            }
        }
        result
    }
}

#[async_trait]
impl FileOps for ErrorRoutingFileOps {
    async fn list_all_files(&self, ws_name: &str) -> Result<Vec<String>, FileSystemError> {
        let result = self.inner.list_all_files(ws_name).await;
        self.route(Some(ws_name), result)
    }

    async fn get_doc(&self, ws_path: &str, registry: &ExtensionRegistry) -> Result<Value, FileSystemError> {
        let result = self.inner.get_doc(ws_path, registry).await;
        self.route(ws_name_of(ws_path), result)
    }

    async fn save_doc(
        &self,
        ws_path: &str,
        doc: &Value,
        registry: &ExtensionRegistry,
    ) -> Result<(), FileSystemError> {
        let result = self.inner.save_doc(ws_path, doc, registry).await;
        self.route(ws_name_of(ws_path), result)
    }

    async fn rename_file(&self, old_ws_path: &str, new_ws_path: &str) -> Result<(), FileSystemError> {
        let result = self.inner.rename_file(old_ws_path, new_ws_path).await;
        self.route(ws_name_of(old_ws_path), result)
    }

    async fn delete_file(&self, ws_path: &str) -> Result<(), FileSystemError> {
        let result = self.inner.delete_file(ws_path).await;
        self.route(ws_name_of(ws_path), result)
    }

    async fn check_file_exists(&self, ws_path: &str) -> Result<bool, FileSystemError> {
        let result = self.inner.check_file_exists(ws_path).await;
        self.route(ws_name_of(ws_path), result)
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::{ExtensionRegistry, FileOps, WorkspaceHost};
    use crate::error::{FileSystemError, FsErrorKind};
    use crate::workspace::ws_path::ws_name_of;

    /// In-memory workspaces with an injectable failure.
    #[derive(Default)]
    pub(crate) struct MemoryFileOps {
        pub workspaces: Mutex<BTreeSet<String>>,
        pub docs: Mutex<BTreeMap<String, Value>>,
        pub fail_with: Mutex<Option<FileSystemError>>,
    }

    impl MemoryFileOps {
        pub(crate) fn with_notes(ws_name: &str, ws_paths: &[&str]) -> Self {
            let ops = Self::default();
            ops.workspaces.lock().unwrap().insert(ws_name.to_owned());
            let mut docs = ops.docs.lock().unwrap();
            for p in ws_paths {
                docs.insert((*p).to_owned(), serde_json::json!({"type": "doc", "content": []}));
            }
            drop(docs);
            ops
        }

        pub(crate) fn fail_next(&self, err: FileSystemError) {
            *self.fail_with.lock().unwrap() = Some(err);
        }

        fn check(&self, ws_name: Option<&str>) -> Result<(), FileSystemError> {
            if let Some(err) = self.fail_with.lock().unwrap().take() {
                return Err(err);
            }
            match ws_name {
                Some(ws) if self.workspaces.lock().unwrap().contains(ws) => Ok(()),
                _ => Err(FileSystemError::new(FsErrorKind::WorkspaceNotFound, "no such workspace")),
            }
        }

        fn not_found(ws_path: &str) -> FileSystemError {
            FileSystemError::new(FsErrorKind::NotFound, format!("{ws_path} not found"))
        }
    }

    #[async_trait]
    impl FileOps for MemoryFileOps {
        async fn list_all_files(&self, ws_name: &str) -> Result<Vec<String>, FileSystemError> {
            self.check(Some(ws_name))?;
            let prefix = format!("{ws_name}:");
            Ok(self
                .docs
                .lock()
                .unwrap()
                .keys()
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect())
        }

        async fn get_doc(&self, ws_path: &str, _: &ExtensionRegistry) -> Result<Value, FileSystemError> {
            self.check(ws_name_of(ws_path))?;
            self.docs
                .lock()
                .unwrap()
                .get(ws_path)
                .cloned()
                .ok_or_else(|| Self::not_found(ws_path))
        }

        async fn save_doc(&self, ws_path: &str, doc: &Value, _: &ExtensionRegistry) -> Result<(), FileSystemError> {
            self.check(ws_name_of(ws_path))?;
            self.docs.lock().unwrap().insert(ws_path.to_owned(), doc.clone());
            Ok(())
        }

        async fn rename_file(&self, old: &str, new: &str) -> Result<(), FileSystemError> {
            self.check(ws_name_of(old))?;
            let mut docs = self.docs.lock().unwrap();
            let doc = docs.remove(old).ok_or_else(|| Self::not_found(old))?;
            docs.insert(new.to_owned(), doc);
            Ok(())
        }

        async fn delete_file(&self, ws_path: &str) -> Result<(), FileSystemError> {
            self.check(ws_name_of(ws_path))?;
            self.docs
                .lock()
                .unwrap()
                .remove(ws_path)
                .map(drop)
                .ok_or_else(|| Self::not_found(ws_path))
        }

        async fn check_file_exists(&self, ws_path: &str) -> Result<bool, FileSystemError> {
            self.check(ws_name_of(ws_path))?;
            Ok(self.docs.lock().unwrap().contains_key(ws_path))
        }
    }

    /// Host double recording every callback as `"<kind>:<arg>"`.
    #[derive(Default)]
    pub(crate) struct RecordingHost {
        pub calls: Mutex<Vec<String>>,
    }

    impl RecordingHost {
        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl WorkspaceHost for RecordingHost {
        fn on_invalid_path(&self, _ws_name: Option<&str>, invalid_path: &str) {
            self.calls.lock().unwrap().push(format!("invalid:{invalid_path}"));
        }

        fn on_auth_error(&self, ws_name: &str) {
            self.calls.lock().unwrap().push(format!("auth:{ws_name}"));
        }

        fn on_workspace_not_found(&self, ws_name: &str) {
            self.calls.lock().unwrap().push(format!("not-found:{ws_name}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::test_fixtures::{MemoryFileOps, RecordingHost};
    use super::*;

    fn routed() -> (Arc<MemoryFileOps>, Arc<RecordingHost>, ErrorRoutingFileOps) {
        let ops = Arc::new(MemoryFileOps::with_notes("ws", &["ws:a.md"]));
        let host = Arc::new(RecordingHost::default());
        let routed = ErrorRoutingFileOps::new(ops.clone(), host.clone());
        (ops, host, routed)
    }

    #[tokio::test]
    async fn success_does_not_notify() {
        let (_, host, ops) = routed();
        assert_eq!(ops.list_all_files("ws").await.unwrap(), vec!["ws:a.md"]);
        assert!(ops.check_file_exists("ws:a.md").await.unwrap());
        assert!(host.calls().is_empty());
    }

    #[tokio::test]
    async fn auth_errors_notify_and_propagate() {
        let (inner, host, ops) = routed();
        inner.fail_next(FileSystemError::new(FsErrorKind::Permission, "denied"));
        let err = ops.get_doc("ws:a.md", &ExtensionRegistry::default()).await.unwrap_err();
        assert_eq!(err.kind, FsErrorKind::Permission);

        inner.fail_next(FileSystemError::new(FsErrorKind::UserAborted, "closed"));
        let err = ops.delete_file("ws:a.md").await.unwrap_err();
        assert_eq!(err.kind, FsErrorKind::UserAborted);

        assert_eq!(host.calls(), vec!["auth:ws", "auth:ws"]);
    }

    #[tokio::test]
    async fn missing_workspace_notifies_and_propagates() {
        let (_, host, ops) = routed();
        let err = ops.list_all_files("other").await.unwrap_err();
        assert_eq!(err.kind, FsErrorKind::WorkspaceNotFound);
        assert_eq!(host.calls(), vec!["not-found:other"]);
    }

    #[tokio::test]
    async fn other_errors_only_propagate() {
        let (_, host, ops) = routed();
        let err = ops.rename_file("ws:missing.md", "ws:b.md").await.unwrap_err();
        assert_eq!(err.kind, FsErrorKind::NotFound);
        assert!(host.calls().is_empty());
    }

    #[test]
    fn json_codec_passes_documents_through() {
        let doc = json!({ "type": "doc", "content": [{ "type": "paragraph" }] });
        let text = JsonDocCodec.serialize(&doc).unwrap();
        assert!(text.ends_with('\n'));
        assert_eq!(JsonDocCodec.parse(&text).unwrap(), doc);
    }

    #[test]
    fn json_codec_rejects_plain_text() {
        let err = JsonDocCodec.parse("# not json").unwrap_err();
        assert_eq!(err.kind, FsErrorKind::Other);
    }
}
