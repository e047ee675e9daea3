use crate::repository::BinaryFileRepository;
use keeper_database::Database;
use keeper_domain::file::{BinaryFile, FileId};
use keeper_kernel::{KeeperError, RequestContext};
use keeper_storage::{Storage, StorageError};
use std::path::Path;
use tracing::{info, instrument, warn};

/// Metadata queries and deletion for the caller's stored files.
#[derive(Debug, Clone)]
pub struct FileService {
    files: BinaryFileRepository,
    storage: Storage,
}

impl FileService {
    #[must_use]
    pub const fn new(db: Database, storage: Storage) -> Self {
        Self { files: BinaryFileRepository::new(db), storage }
    }

    /// # Errors
    /// [`KeeperError::Unauthorized`] without a caller, [`KeeperError::Storage`] on a query failure.
    #[instrument(skip_all, fields(owner = ctx.owner()))]
    pub async fn list(&self, ctx: &mut RequestContext) -> Result<Vec<BinaryFile>, KeeperError> {
        let owner = ctx.require_owner()?;
        Ok(self.files.list(ctx.db(), owner).await?)
    }

    /// # Errors
    /// [`KeeperError::NotFound`] when the caller has no file with `id`.
    #[instrument(skip_all, fields(owner = ctx.owner(), id = id))]
    pub async fn get(&self, ctx: &mut RequestContext, id: FileId) -> Result<BinaryFile, KeeperError> {
        let owner = ctx.require_owner()?;
        self.files.get(ctx.db(), id, owner).await?.ok_or_else(|| not_found(id))
    }

    /// Removes the stored bytes, then the metadata row.
    ///
    /// A file that is already gone from disk does not block removing its row.
    /// Any other filesystem failure leaves the row in place so the file stays
    /// reachable.
    ///
    /// # Errors
    /// [`KeeperError::NotFound`] when the caller has no file with `id`,
    /// [`KeeperError::Storage`] when the file cannot be removed.
    #[instrument(skip_all, fields(owner = ctx.owner(), id = id))]
    pub async fn delete(&self, ctx: &mut RequestContext, id: FileId) -> Result<(), KeeperError> {
        let owner = ctx.require_owner()?;
        let record = self.files.get(ctx.db(), id, owner).await?.ok_or_else(|| not_found(id))?;

        match self.storage.owner(owner).remove(Path::new(&record.path)).await {
            Ok(()) => {},
            Err(StorageError::FileNotFound { .. }) => {
                warn!(path = %record.path, "Stored file already missing, dropping its record");
            },
            Err(err) => return Err(err.into()),
        }

        if !self.files.delete(ctx.db(), id, owner).await? {
            return Err(not_found(id));
        }
        info!(file_name = %record.file_name, "File deleted");
        Ok(())
    }
}

fn not_found(id: FileId) -> KeeperError {
    KeeperError::not_found(format!("file {id} not found"))
}
