//! The `wsPath` grammar: `<wsName>:<filePath>`.
//!
//! A file path is relative to the workspace root, non-empty, has no empty
//! segments, and neither starts nor ends with `/`. Notes are files whose
//! path ends in `.md`.

use crate::error::PathValidationError;

/// Extension every note file carries.
pub const NOTE_EXTENSION: &str = ".md";

/// A wsPath split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath<'a> {
    pub ws_name: &'a str,
    pub file_path: &'a str,
    /// Last segment of `file_path`.
    pub file_name: &'a str,
    /// `file_path` without the last segment; empty at the workspace root.
    pub dir_path: &'a str,
}

impl ResolvedPath<'_> {
    /// `/ws/<wsName>/<filePath>`, the location pathname opening this file,
    /// with every segment percent-encoded.
    pub fn location_path(&self) -> String {
        format!("/ws/{}/{}", encode_path(self.ws_name), encode_path(self.file_path))
    }
}

/// Split a wsPath, validating the file grammar.
///
/// # Errors
///
/// Returns [`PathValidationError`] describing the first violated rule.
pub fn resolve_path(ws_path: &str) -> Result<ResolvedPath<'_>, PathValidationError> {
    let Some((ws_name, file_path)) = ws_path.split_once(':') else {
        return Err(PathValidationError(format!("Invalid wsPath \"{ws_path}\": missing ':'")));
    };
    if ws_name.is_empty() {
        return Err(PathValidationError(format!(
            "Invalid wsPath \"{ws_path}\": empty workspace name"
        )));
    }
    if file_path.contains(':') {
        return Err(PathValidationError(format!(
            "Invalid wsPath \"{ws_path}\": more than one ':'"
        )));
    }
    if file_path.is_empty() || file_path.starts_with('/') || file_path.ends_with('/') {
        return Err(PathValidationError(format!(
            "Invalid wsPath \"{ws_path}\": file path must be relative and name a file"
        )));
    }
    if file_path.split('/').any(str::is_empty) {
        return Err(PathValidationError(format!(
            "Invalid wsPath \"{ws_path}\": empty path segment"
        )));
    }

    let (dir_path, file_name) = file_path.rsplit_once('/').unwrap_or(("", file_path));
    Ok(ResolvedPath {
        ws_name,
        file_path,
        file_name,
        dir_path,
    })
}

/// Returns `true` if `ws_path` names a file.
pub fn is_valid_file_ws_path(ws_path: &str) -> bool {
    resolve_path(ws_path).is_ok()
}

/// Returns `true` if `ws_path` names a note.
pub fn is_valid_note_ws_path(ws_path: &str) -> bool {
    validate_note_ws_path(ws_path).is_ok()
}

/// # Errors
///
/// Returns [`PathValidationError`] if `ws_path` is not a valid note path.
pub fn validate_note_ws_path(ws_path: &str) -> Result<(), PathValidationError> {
    let resolved = resolve_path(ws_path)?;
    if !resolved.file_name.ends_with(NOTE_EXTENSION) || resolved.file_name == NOTE_EXTENSION {
        return Err(PathValidationError(format!(
            "Invalid note wsPath \"{ws_path}\": notes must end with {NOTE_EXTENSION}"
        )));
    }
    Ok(())
}

/// Join a workspace name and a file path into a wsPath.
///
/// # Arguments
///
/// * `ws_name` - Workspace name, without the `:` separator.
/// * `file_path` - Path relative to the workspace root.
///
/// # Returns
///
/// `<ws_name>:<file_path>`. Neither part is validated.
pub fn file_path_to_ws_path(ws_name: &str, file_path: &str) -> String {
    format!("{ws_name}:{file_path}")
}

/// The workspace part of a wsPath, without validating the rest.
pub fn ws_name_of(ws_path: &str) -> Option<&str> {
    ws_path.split_once(':').map(|(name, _)| name).filter(|n| !n.is_empty())
}

/// Strip a trailing `.md`, giving the title a note is shown under.
///
/// # Returns
///
/// `file_name` without [`NOTE_EXTENSION`], or unchanged if it does not end
/// with it.
pub fn remove_md_extension(file_name: &str) -> &str {
    file_name.strip_suffix(NOTE_EXTENSION).unwrap_or(file_name)
}

/// Percent-encode each `/`-separated segment of `path`.
pub(crate) fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Percent-decode a pathname part. Input that does not decode to UTF-8 is
/// kept as is and left to path validation.
pub(crate) fn decode_path(raw: &str) -> String {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| raw.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_nested_note() {
        let r = resolve_path("my-ws:notes/daily/today.md").unwrap();
        assert_eq!(r.ws_name, "my-ws");
        assert_eq!(r.file_path, "notes/daily/today.md");
        assert_eq!(r.file_name, "today.md");
        assert_eq!(r.dir_path, "notes/daily");
        assert_eq!(r.location_path(), "/ws/my-ws/notes/daily/today.md");
    }

    #[test]
    fn resolves_root_file() {
        let r = resolve_path("bangle-help:getting started.md").unwrap();
        assert_eq!(r.dir_path, "");
        assert_eq!(r.file_name, "getting started.md");
    }

    #[test]
    fn rejects_bad_grammar() {
        for bad in [
            "no-colon.md",
            ":note.md",
            "ws:",
            "ws:/abs.md",
            "ws:dir/",
            "ws:a//b.md",
            "ws:a:b.md",
        ] {
            assert!(resolve_path(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn notes_need_md_extension() {
        assert!(is_valid_note_ws_path("ws:a.md"));
        assert!(!is_valid_note_ws_path("ws:a.png"));
        assert!(!is_valid_note_ws_path("ws:.md"));
        assert!(is_valid_file_ws_path("ws:a.png"));
        assert!(validate_note_ws_path("ws:a.txt").unwrap_err().0.contains(".md"));
    }

    #[test]
    fn helpers() {
        assert_eq!(file_path_to_ws_path("ws", "a/b.md"), "ws:a/b.md");
        assert_eq!(ws_name_of("ws:a.md"), Some("ws"));
        assert_eq!(ws_name_of(":a.md"), None);
        assert_eq!(remove_md_extension("note.md"), "note");
        assert_eq!(remove_md_extension("image.png"), "image.png");
    }
}
