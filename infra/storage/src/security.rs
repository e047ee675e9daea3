use crate::error::StorageError;
use std::path::{Component, Path, PathBuf};

pub(crate) const TMP_MARKER: &str = ".keepertmp.";
const MAX_FILE_NAME: usize = 255;

/// Accepts a name only if it is exactly one ordinary path segment.
pub(crate) fn validate_file_name(name: &str) -> Result<(), StorageError> {
    let reject = |reason: &'static str| StorageError::InvalidName {
        message: reason.into(),
        context: Some(name.to_owned().into()),
    };

    if name.is_empty() {
        return Err(reject("file name is empty"));
    }
    if name.len() > MAX_FILE_NAME {
        return Err(reject("file name is longer than 255 bytes"));
    }
    if name == "." || name == ".." {
        return Err(reject("file name cannot be a relative directory"));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(reject("file name contains a separator or NUL"));
    }
    if name.contains(TMP_MARKER) {
        return Err(reject("file name uses the reserved temporary marker"));
    }
    Ok(())
}

/// Lexically collapses `.` and `..`, refusing anything that climbs above the base.
fn normalize_relative(path: &Path) -> Result<PathBuf, StorageError> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::Normal(segment) => out.push(segment),
            Component::ParentDir if out.pop() => {},
            Component::ParentDir => {
                return Err(traversal(path, "'..' climbs above the storage root"));
            },
            Component::RootDir | Component::Prefix(_) => {
                return Err(traversal(path, "absolute paths are not allowed"));
            },
        }
    }
    Ok(out)
}

/// Joins `path` onto the canonical `root` and proves the result stays inside it,
/// following symlinks on the deepest existing ancestor.
pub(crate) fn resolve_path(root: &Path, path: impl AsRef<Path>) -> Result<PathBuf, StorageError> {
    let path = path.as_ref();
    if path.is_absolute() {
        return Err(traversal(path, "absolute paths are not allowed"));
    }

    let joined = root.join(normalize_relative(path)?);
    match joined.canonicalize() {
        Ok(canonical) if canonical.starts_with(root) => Ok(canonical),
        Ok(canonical) => Err(traversal(&canonical, "resolves outside the storage root")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => verify_ancestors(root, joined),
        Err(e) => Err(StorageError::Io { source: e, context: Some("Canonicalizing path".into()) }),
    }
}

fn verify_ancestors(root: &Path, joined: PathBuf) -> Result<PathBuf, StorageError> {
    let mut current = joined.parent();
    while let Some(ancestor) = current {
        if ancestor == root {
            return Ok(joined);
        }
        if ancestor.exists() {
            return match ancestor.canonicalize() {
                Ok(canonical) if canonical.starts_with(root) => Ok(joined),
                Ok(canonical) => Err(traversal(&canonical, "ancestor links outside the storage root")),
                Err(e) => Err(StorageError::Io {
                    source: e,
                    context: Some("Verifying parent directory".into()),
                }),
            };
        }
        current = ancestor.parent();
    }
    Err(traversal(&joined, "no ancestor inside the storage root"))
}

fn traversal(path: &Path, reason: &'static str) -> StorageError {
    StorageError::PathTraversalAttempt {
        message: path.display().to_string().into(),
        context: Some(reason.into()),
    }
}
