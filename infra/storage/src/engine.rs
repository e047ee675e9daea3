use crate::builder::StorageBuilder;
use crate::codec::CodecPool;
use crate::error::{StorageError, StorageErrorExt};
use crate::maintenance::{self, PurgeReport};
use crate::security::{self, TMP_MARKER};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug)]
pub(crate) struct StorageInner {
    pub(crate) root: PathBuf,
    pub(crate) tmp_counter: AtomicU64,
    pub(crate) codec: Arc<CodecPool>,
}

/// Sandboxed file store. Every owner gets one directory under the root,
/// named after the owner id. Cheap to clone.
///
/// ```rust
/// use keeper_storage::{Storage, StorageError};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), StorageError> {
/// # let tmp = tempfile::tempdir().unwrap();
/// let storage = Storage::builder().root(tmp.path().join("files")).connect().await?;
/// let (pending, file) = storage.owner(42).create("notes.txt").await?;
/// drop(file);
/// let stored = pending.commit().await?;
/// assert_eq!(stored, std::path::Path::new("42/notes.txt"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Storage {
    pub(crate) inner: Arc<StorageInner>,
}

impl Storage {
    pub fn builder() -> StorageBuilder {
        StorageBuilder::default()
    }

    /// The directory of one owner.
    #[must_use]
    pub fn owner(&self, owner: i64) -> OwnerStorage {
        OwnerStorage { storage: self.clone(), namespace: PathBuf::from(owner.to_string()) }
    }

    /// Shared pool for stream compressors and decompressors.
    #[must_use]
    pub fn codec(&self) -> &Arc<CodecPool> {
        &self.inner.codec
    }

    /// Physical path of a root-relative path, refusing anything outside the sandbox.
    ///
    /// # Errors
    /// Returns [`StorageError::PathTraversalAttempt`] for escaping paths.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> Result<PathBuf, StorageError> {
        security::resolve_path(&self.inner.root, relative)
    }

    /// Removes upload temporaries older than `stale_after`.
    pub async fn purge_tmp(&self, stale_after: Duration) -> PurgeReport {
        maintenance::purge_tmp(&self.inner.root, stale_after).await
    }

    fn next_tmp(&self, target: &Path) -> PathBuf {
        let n = self.inner.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let name = target.file_name().and_then(|s| s.to_str()).unwrap_or("upload");
        target.with_file_name(format!("{name}{TMP_MARKER}{n}"))
    }
}

/// View of the store restricted to one owner's directory.
#[derive(Debug, Clone)]
pub struct OwnerStorage {
    storage: Storage,
    namespace: PathBuf,
}

impl OwnerStorage {
    /// Root-relative path under which `file_name` is stored for this owner.
    fn relative_path(&self, file_name: &str) -> Result<PathBuf, StorageError> {
        security::validate_file_name(file_name)?;
        Ok(self.namespace.join(file_name))
    }

    /// Opens a fresh temporary file for `file_name`.
    ///
    /// Nothing is visible under the final name until [`PendingFile::commit`].
    ///
    /// # Errors
    /// * [`StorageError::InvalidName`] for a bad file name.
    /// * [`StorageError::AlreadyExists`] when the owner already stores that name.
    /// * [`StorageError::Io`] when the directory or file cannot be created.
    pub async fn create(&self, file_name: &str) -> Result<(PendingFile, fs::File), StorageError> {
        let relative = self.relative_path(file_name)?;
        let target = self.storage.resolve(&relative)?;
        if fs::try_exists(&target).await.context("Checking target")? {
            return Err(StorageError::AlreadyExists {
                message: relative.display().to_string().into(),
                context: None,
            });
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .context(format!("Creating owner directory {}", parent.display()))?;
        }

        let temp = self.storage.next_tmp(&target);
        let file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp)
            .await
            .context(format!("Creating temporary file {}", temp.display()))?;

        debug!(temp = %temp.display(), "Upload file opened");
        Ok((PendingFile { temp, target, relative, armed: true }, file))
    }

    /// Opens a stored file for reading.
    ///
    /// # Errors
    /// * [`StorageError::PathTraversalAttempt`] when `relative` lies outside this owner's directory.
    /// * [`StorageError::FileNotFound`] when the file is missing.
    pub async fn open(&self, relative: impl AsRef<Path>) -> Result<fs::File, StorageError> {
        let resolved = self.resolve_owned(relative.as_ref())?;
        fs::File::open(&resolved).await.map_err(|e| not_found_or_io(e, &resolved, "Opening file"))
    }

    /// Deletes a stored file.
    ///
    /// # Errors
    /// * [`StorageError::PathTraversalAttempt`] when `relative` lies outside this owner's directory.
    /// * [`StorageError::FileNotFound`] when the file is already gone.
    pub async fn remove(&self, relative: impl AsRef<Path>) -> Result<(), StorageError> {
        let resolved = self.resolve_owned(relative.as_ref())?;
        fs::remove_file(&resolved)
            .await
            .map_err(|e| not_found_or_io(e, &resolved, "Removing file"))?;
        debug!(path = %resolved.display(), "File removed");
        Ok(())
    }

    fn resolve_owned(&self, relative: &Path) -> Result<PathBuf, StorageError> {
        let resolved = self.storage.resolve(relative)?;
        let home = self.storage.inner.root.join(&self.namespace);
        if resolved.starts_with(&home) {
            Ok(resolved)
        } else {
            Err(StorageError::PathTraversalAttempt {
                message: relative.display().to_string().into(),
                context: Some("path belongs to another owner".into()),
            })
        }
    }
}

/// An upload written to a temporary file.
///
/// [`commit`](Self::commit) publishes it under its final name. Dropping the
/// handle without committing deletes the temporary file.
#[derive(Debug)]
#[must_use = "an uncommitted upload is deleted on drop"]
pub struct PendingFile {
    temp: PathBuf,
    target: PathBuf,
    relative: PathBuf,
    armed: bool,
}

impl PendingFile {
    /// Publishes the temporary file under its final name and returns the
    /// root-relative path.
    ///
    /// Publishing never replaces an existing file: the final name is created as a
    /// hard link, which fails when the name is taken, and the temporary name is
    /// unlinked afterwards. Of several uploads racing for one name, exactly one
    /// succeeds. The caller must have flushed and synced the file handle beforehand.
    ///
    /// # Errors
    /// Returns [`StorageError::AlreadyExists`] if the name is taken, or
    /// [`StorageError::Io`] if linking fails. The temporary file is removed in both cases.
    pub async fn commit(mut self) -> Result<PathBuf, StorageError> {
        match fs::hard_link(&self.temp, &self.target).await {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists {
                    message: self.relative.display().to_string().into(),
                    context: None,
                });
            },
            Err(e) => {
                return Err(StorageError::Io {
                    source: e,
                    context: Some(
                        format!("Linking {} to {}", self.temp.display(), self.target.display()).into(),
                    ),
                });
            },
        }
        self.armed = false;
        remove_quietly(&self.temp).await;

        if let Some(parent) = self.target.parent() {
            sync_dir(parent).await;
        }
        debug!(path = %self.target.display(), "Upload committed");
        Ok(std::mem::take(&mut self.relative))
    }
}

impl Drop for PendingFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.temp) {
            Ok(()) => debug!(temp = %self.temp.display(), "Abandoned upload removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => warn!(temp = %self.temp.display(), error = %e, "Could not remove abandoned upload"),
        }
    }
}

async fn remove_quietly(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {},
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove temporary file"),
    }
}

async fn sync_dir(path: &Path) {
    let synced = match fs::File::open(path).await {
        Ok(dir) => dir.sync_all().await,
        Err(e) => Err(e),
    };
    if let Err(e) = synced {
        warn!(path = %path.display(), error = %e, "Directory sync failed");
    }
}

fn not_found_or_io(err: std::io::Error, path: &Path, action: &'static str) -> StorageError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StorageError::FileNotFound { message: path.display().to_string().into(), context: None }
    } else {
        StorageError::Io { source: err, context: Some(format!("{action}: {}", path.display()).into()) }
    }
}
