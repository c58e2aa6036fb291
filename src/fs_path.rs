//! Physical path handling.
//!
//! A [`PhysicalPath`] is a normalized absolute path: no `..`, no `//`, always
//! starting with `/`. URI paths are mapped onto the filesystem with
//! [`resolve_under_root`], which walks segment by segment and refuses to
//! follow symlinks out of the document root.

use std::fmt::{self, Display};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathError {
    /// Caller maps this to 404.
    NotFound,
    /// Symlink target leaves the root. Caller maps this to 403.
    SymlinkEscape,
    /// Malformed input (empty, NUL, dot segment in a URI path).
    Invalid,
}

impl Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::NotFound => write!(f, "path not found"),
            PathError::SymlinkEscape => write!(f, "symlink escapes root"),
            PathError::Invalid => write!(f, "invalid path"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysicalPath(String);

impl PhysicalPath {
    /// Normalizes `path` into an absolute form. Relative inputs are joined
    /// onto the current working directory first.
    pub fn resolve(path: &str) -> Result<PhysicalPath, PathError> {
        if path.is_empty() || path.contains('\0') {
            return Err(PathError::Invalid);
        }
        let absolute = if path.starts_with('/') {
            path.to_string()
        } else {
            let cwd = std::env::current_dir().map_err(|_| PathError::Invalid)?;
            let cwd = cwd.to_str().ok_or(PathError::Invalid)?;
            format!("{}/{}", cwd, path)
        };
        Ok(PhysicalPath(normalize_absolute(&absolute)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    pub fn join_segment(&self, segment: &str) -> PhysicalPath {
        if self.0 == "/" {
            PhysicalPath(format!("/{}", segment))
        } else {
            PhysicalPath(format!("{}/{}", self.0, segment))
        }
    }

    /// Directory portion of this path ("/" for top-level entries).
    pub fn parent_dir(&self) -> PhysicalPath {
        match self.0.rfind('/') {
            Some(0) | None => PhysicalPath("/".to_string()),
            Some(pos) => PhysicalPath(self.0[..pos].to_string()),
        }
    }
}

impl Display for PhysicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lexical normalization of an absolute path: collapses `//`, drops `.`,
/// resolves `..` (clamped at root).
fn normalize_absolute(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Maps a URI path (already dot-segment-resolved, starting with `/`) onto
/// the filesystem under `root`.
///
/// Each segment is checked against the real filesystem: symlinks must point
/// back under the root's canonical prefix. With `allow_nonexistent_leaf`
/// the final segment may be absent (upload targets).
pub fn resolve_under_root(
    root: &PhysicalPath,
    uri_path: &str,
    allow_nonexistent_leaf: bool,
) -> Result<PhysicalPath, PathError> {
    if uri_path.is_empty() || !uri_path.starts_with('/') || uri_path.contains('\0') {
        return Err(PathError::Invalid);
    }

    let root_canonical = fs::canonicalize(root.as_path()).map_err(|_| PathError::NotFound)?;

    let segments: Vec<&str> = uri_path
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    let mut current = root.clone();
    for (i, segment) in segments.iter().enumerate() {
        if *segment == "." || *segment == ".." {
            return Err(PathError::Invalid);
        }
        current = current.join_segment(segment);
        let is_leaf = i + 1 == segments.len();

        match fs::symlink_metadata(current.as_path()) {
            Ok(meta) => {
                if meta.file_type().is_symlink() {
                    let real = fs::canonicalize(current.as_path())
                        .map_err(|_| PathError::NotFound)?;
                    if !is_under(&real, &root_canonical) {
                        return Err(PathError::SymlinkEscape);
                    }
                }
            }
            Err(_) => {
                if is_leaf && allow_nonexistent_leaf {
                    return Ok(current);
                }
                return Err(PathError::NotFound);
            }
        }
    }

    Ok(current)
}

fn is_under(path: &Path, root: &Path) -> bool {
    path == root || path.starts_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn normalize_collapses_slashes_and_dots() {
        assert_eq!(normalize_absolute("/a//b/./c"), "/a/b/c");
        assert_eq!(normalize_absolute("/a/b/../c"), "/a/c");
        assert_eq!(normalize_absolute("/../.."), "/");
        assert_eq!(normalize_absolute("/"), "/");
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in ["/a//b/../c/.", "/x/y/z", "/./."] {
            let once = normalize_absolute(input);
            assert_eq!(normalize_absolute(&once), once);
        }
    }

    #[test]
    fn resolve_under_root_finds_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), b"hi").unwrap();
        let root = PhysicalPath::resolve(dir.path().to_str().unwrap()).unwrap();

        let found = resolve_under_root(&root, "/hello.txt", false).unwrap();
        assert!(found.as_str().ends_with("/hello.txt"));
    }

    #[test]
    fn resolve_under_root_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = PhysicalPath::resolve(dir.path().to_str().unwrap()).unwrap();

        assert_eq!(
            resolve_under_root(&root, "/nope", false),
            Err(PathError::NotFound)
        );
        assert!(resolve_under_root(&root, "/nope", true).is_ok());
    }

    #[test]
    fn resolve_under_root_rejects_dot_segments() {
        let dir = tempfile::tempdir().unwrap();
        let root = PhysicalPath::resolve(dir.path().to_str().unwrap()).unwrap();

        assert_eq!(
            resolve_under_root(&root, "/../etc", false),
            Err(PathError::Invalid)
        );
    }

    #[test]
    fn resolve_under_root_rejects_symlink_escape() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), b"x").unwrap();
        let dir = tempfile::tempdir().unwrap();
        symlink(outside.path(), dir.path().join("leak")).unwrap();

        let root = PhysicalPath::resolve(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(
            resolve_under_root(&root, "/leak/secret", false),
            Err(PathError::SymlinkEscape)
        );
    }

    #[test]
    fn symlink_inside_root_is_followed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("real.txt"), b"x").unwrap();
        symlink(dir.path().join("real.txt"), dir.path().join("alias.txt")).unwrap();

        let root = PhysicalPath::resolve(dir.path().to_str().unwrap()).unwrap();
        assert!(resolve_under_root(&root, "/alias.txt", false).is_ok());
    }
}
