//! A [`FileOps`] backend over the local file system.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use super::file_ops::{ExtensionRegistry, FileOps};
use super::ws_path::{file_path_to_ws_path, resolve_path};
use crate::error::{FileSystemError, FsErrorKind};

/// Stores each workspace as a directory of plain files.
///
/// ```text
/// <base_dir>/
///     <wsName>/
///         <filePath>      -- one file per wsPath
/// ```
///
/// Hidden entries (names starting with `.`) are ignored when listing, so
/// the temporary files of in-flight writes never show up.
#[derive(Debug, Clone)]
pub struct LocalFileOps {
    base_dir: PathBuf,
}

impl LocalFileOps {
    /// The directory need not exist yet; workspaces are created with
    /// [`create_workspace`](LocalFileOps::create_workspace).
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// `<base_dir>/<ws_name>`
    pub fn workspace_dir(&self, ws_name: &str) -> PathBuf {
        self.base_dir.join(ws_name)
    }

    /// Creates the workspace directory. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the I/O failure as a [`FileSystemError`].
    pub async fn create_workspace(&self, ws_name: &str) -> Result<PathBuf, FileSystemError> {
        let dir = self.workspace_dir(ws_name);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Map a wsPath to its file, refusing paths that would leave the
    /// workspace directory.
    fn file_path(&self, ws_path: &str) -> Result<PathBuf, FileSystemError> {
        let resolved = resolve_path(ws_path)
            .map_err(|e| FileSystemError::new(FsErrorKind::Other, e.0))?;
        if resolved
            .file_path
            .split('/')
            .any(|segment| segment == "." || segment == "..")
        {
            return Err(FileSystemError::new(
                FsErrorKind::Other,
                format!("{ws_path} escapes its workspace"),
            ));
        }
        let mut path = self.workspace_dir(resolved.ws_name);
        path.extend(resolved.file_path.split('/'));
        Ok(path)
    }

    async fn ensure_workspace(&self, ws_path: &str) -> Result<(), FileSystemError> {
        let ws_name = resolve_path(ws_path)
            .map(|r| r.ws_name)
            .map_err(|e| FileSystemError::new(FsErrorKind::Other, e.0))?;
        self.workspace_exists(ws_name).await
    }

    async fn workspace_exists(&self, ws_name: &str) -> Result<(), FileSystemError> {
        match tokio::fs::metadata(self.workspace_dir(ws_name)).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(workspace_not_found(ws_name)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(workspace_not_found(ws_name)),
            Err(e) => Err(e.into()),
        }
    }
}

fn workspace_not_found(ws_name: &str) -> FileSystemError {
    FileSystemError::new(
        FsErrorKind::WorkspaceNotFound,
        format!("workspace {ws_name} not found"),
    )
}

fn with_path(ws_path: &str) -> impl FnOnce(io::Error) -> FileSystemError + '_ {
    move |e| {
        let err = FileSystemError::from(e);
        FileSystemError::new(err.kind, format!("{ws_path}: {}", err.message))
    }
}

#[async_trait]
impl FileOps for LocalFileOps {
    async fn list_all_files(&self, ws_name: &str) -> Result<Vec<String>, FileSystemError> {
        self.workspace_exists(ws_name).await?;
        let root = self.workspace_dir(ws_name);

        let mut files = Vec::new();
        let mut pending = vec![(root, String::new())];
        while let Some((dir, prefix)) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                    tracing::debug!(path = %entry.path().display(), "skipping non UTF-8 file name");
                    continue;
                };
                if name.starts_with('.') {
                    continue;
                }
                let rel = if prefix.is_empty() {
                    name
                } else {
                    format!("{prefix}/{name}")
                };
                if entry.file_type().await?.is_dir() {
                    pending.push((entry.path(), rel));
                } else {
                    files.push(file_path_to_ws_path(ws_name, &rel));
                }
            }
        }
        files.sort();
        Ok(files)
    }

    async fn get_doc(&self, ws_path: &str, registry: &ExtensionRegistry) -> Result<Value, FileSystemError> {
        self.ensure_workspace(ws_path).await?;
        let path = self.file_path(ws_path)?;
        let text = tokio::fs::read_to_string(&path).await.map_err(with_path(ws_path))?;
        registry.codec().parse(&text)
    }

    async fn save_doc(
        &self,
        ws_path: &str,
        doc: &Value,
        registry: &ExtensionRegistry,
    ) -> Result<(), FileSystemError> {
        self.ensure_workspace(ws_path).await?;
        let path = self.file_path(ws_path)?;
        let text = registry.codec().serialize(doc)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write-to-temp-then-rename keeps readers from seeing a partial file.
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = path.with_file_name(format!(".{file_name}.tmp"));
        tokio::fs::write(&tmp, text).await.map_err(with_path(ws_path))?;
        tokio::fs::rename(&tmp, &path).await.map_err(with_path(ws_path))?;
        tracing::debug!(ws_path, "saved doc");
        Ok(())
    }

    async fn rename_file(&self, old_ws_path: &str, new_ws_path: &str) -> Result<(), FileSystemError> {
        self.ensure_workspace(old_ws_path).await?;
        let from = self.file_path(old_ws_path)?;
        let to = self.file_path(new_ws_path)?;
        if tokio::fs::try_exists(&to).await? {
            return Err(FileSystemError::new(
                FsErrorKind::Other,
                format!("{new_ws_path} already exists"),
            ));
        }
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&from, &to).await.map_err(with_path(old_ws_path))?;
        tracing::debug!(old_ws_path, new_ws_path, "renamed file");
        Ok(())
    }

    async fn delete_file(&self, ws_path: &str) -> Result<(), FileSystemError> {
        self.ensure_workspace(ws_path).await?;
        let path = self.file_path(ws_path)?;
        tokio::fs::remove_file(&path).await.map_err(with_path(ws_path))?;
        tracing::debug!(ws_path, "deleted file");
        Ok(())
    }

    async fn check_file_exists(&self, ws_path: &str) -> Result<bool, FileSystemError> {
        self.ensure_workspace(ws_path).await?;
        let path = self.file_path(ws_path)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    async fn setup() -> (TempDir, LocalFileOps) {
        let dir = TempDir::new().unwrap();
        let ops = LocalFileOps::new(dir.path());
        ops.create_workspace("ws").await.unwrap();
        (dir, ops)
    }

    fn doc(title: &str) -> Value {
        json!({
            "type": "doc",
            "content": [{
                "type": "heading",
                "attrs": { "level": 1 },
                "content": [{ "type": "text", "text": title }],
            }],
        })
    }

    #[tokio::test]
    async fn save_then_get_and_list() {
        let (dir, ops) = setup().await;
        let registry = ExtensionRegistry::default();
        ops.save_doc("ws:notes/b.md", &doc("B"), &registry).await.unwrap();
        ops.save_doc("ws:a.md", &doc("A"), &registry).await.unwrap();

        let on_disk = std::fs::read_to_string(dir.path().join("ws/notes/b.md")).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&on_disk).unwrap(), doc("B"));

        assert_eq!(ops.get_doc("ws:a.md", &registry).await.unwrap(), doc("A"));
        assert_eq!(
            ops.list_all_files("ws").await.unwrap(),
            vec!["ws:a.md", "ws:notes/b.md"]
        );
    }

    #[tokio::test]
    async fn missing_workspace_is_reported() {
        let (_dir, ops) = setup().await;
        let err = ops.list_all_files("nope").await.unwrap_err();
        assert_eq!(err.kind, FsErrorKind::WorkspaceNotFound);
        let err = ops.check_file_exists("nope:a.md").await.unwrap_err();
        assert_eq!(err.kind, FsErrorKind::WorkspaceNotFound);
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let (_dir, ops) = setup().await;
        let err = ops
            .get_doc("ws:ghost.md", &ExtensionRegistry::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, FsErrorKind::NotFound);
        assert!(err.message.contains("ws:ghost.md"));
        assert!(!ops.check_file_exists("ws:ghost.md").await.unwrap());
    }

    #[tokio::test]
    async fn rename_and_delete() {
        let (_dir, ops) = setup().await;
        let registry = ExtensionRegistry::default();
        ops.save_doc("ws:a.md", &doc("A"), &registry).await.unwrap();
        ops.save_doc("ws:b.md", &doc("B"), &registry).await.unwrap();

        let err = ops.rename_file("ws:a.md", "ws:b.md").await.unwrap_err();
        assert!(err.message.contains("already exists"));

        ops.rename_file("ws:a.md", "ws:dir/c.md").await.unwrap();
        assert!(!ops.check_file_exists("ws:a.md").await.unwrap());
        assert!(ops.check_file_exists("ws:dir/c.md").await.unwrap());

        ops.delete_file("ws:b.md").await.unwrap();
        assert_eq!(ops.list_all_files("ws").await.unwrap(), vec!["ws:dir/c.md"]);
    }

    #[tokio::test]
    async fn refuses_paths_outside_the_workspace() {
        let (_dir, ops) = setup().await;
        let err = ops
            .save_doc("ws:../escape.md", &doc("X"), &ExtensionRegistry::default())
            .await
            .unwrap_err();
        assert!(err.message.contains("escapes"));
    }
}
