use crate::codec::CodecPool;
use crate::engine::{Storage, StorageInner};
use crate::error::{StorageError, StorageErrorExt};
use crate::maintenance::{self, STALE_AFTER};
use private::Sealed;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio::fs;
use tracing::info;

const DEFAULT_CODEC_IDLE: usize = 32;

#[derive(Debug, Default)]
pub struct NoRoot;
#[derive(Debug)]
pub struct WithRoot(PathBuf);

mod private {
    pub trait Sealed {}
}
impl Sealed for NoRoot {}
impl Sealed for WithRoot {}

#[derive(Debug)]
pub struct StorageBuilder<S: Sealed = NoRoot> {
    state: S,
    codec_idle: usize,
}

impl Default for StorageBuilder {
    fn default() -> Self {
        Self { state: NoRoot, codec_idle: DEFAULT_CODEC_IDLE }
    }
}

impl<S: Sealed> StorageBuilder<S> {
    /// How many idle codec states the pool keeps per direction.
    #[must_use]
    pub const fn codec_pool_size(mut self, idle: usize) -> Self {
        self.codec_idle = idle;
        self
    }
}

impl StorageBuilder<NoRoot> {
    #[must_use]
    pub fn root(self, path: impl Into<PathBuf>) -> StorageBuilder<WithRoot> {
        StorageBuilder { state: WithRoot(path.into()), codec_idle: self.codec_idle }
    }
}

impl StorageBuilder<WithRoot> {
    /// Creates the root if needed, canonicalizes it and sweeps stale upload files
    /// left by an earlier crash. The sweep never fails the start-up.
    ///
    /// # Errors
    /// Returns [`StorageError::Io`] when the root cannot be created or resolved.
    pub async fn connect(self) -> Result<Storage, StorageError> {
        let root = &self.state.0;
        fs::create_dir_all(root)
            .await
            .context(format!("Creating storage root {}", root.display()))?;
        let canonical = fs::canonicalize(root)
            .await
            .context(format!("Resolving storage root {}", root.display()))?;

        maintenance::purge_tmp(&canonical, STALE_AFTER).await;
        info!(root = %canonical.display(), "File storage ready");

        Ok(Storage {
            inner: Arc::new(StorageInner {
                root: canonical,
                tmp_counter: AtomicU64::new(1),
                codec: Arc::new(CodecPool::new(self.codec_idle)),
            }),
        })
    }
}
