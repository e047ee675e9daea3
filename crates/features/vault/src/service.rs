use crate::kind::SecretKind;
use crate::repository::{SealedRecord, SecretRepository, UpdateOutcome};
use keeper_cipher::FieldCipher;
use keeper_database::Database;
use keeper_domain::secret::{Revision, Secret, SecretId, SecretPayload};
use keeper_kernel::{KeeperError, RequestContext};
use tracing::{info, instrument};

pub const VERSION_MISMATCH: &str = "the versions on the server and client do not match";

/// Owner-scoped CRUD for one secret kind. Encrypts on the way in, decrypts on
/// the way out. The owner always comes from the request context.
pub struct VaultService<K: SecretKind> {
    repo: SecretRepository<K>,
    cipher: FieldCipher,
}

impl<K: SecretKind> Clone for VaultService<K> {
    fn clone(&self) -> Self {
        Self { repo: self.repo.clone(), cipher: self.cipher.clone() }
    }
}

impl<K: SecretKind> std::fmt::Debug for VaultService<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultService").field("repo", &self.repo).finish_non_exhaustive()
    }
}

impl<K: SecretKind> VaultService<K> {
    #[must_use]
    pub fn new(db: Database, cipher: FieldCipher) -> Self {
        Self { repo: SecretRepository::new(db), cipher }
    }

    /// # Errors
    /// [`KeeperError::Unauthorized`] without a caller, [`KeeperError::Validation`]
    /// for a rejected field, [`KeeperError::Crypto`] or [`KeeperError::Storage`] otherwise.
    #[instrument(skip_all, fields(kind = K::TABLE, owner = ctx.owner()))]
    pub async fn create(&self, ctx: &mut RequestContext, payload: K::Payload) -> Result<Secret<K::Payload>, KeeperError> {
        let owner = ctx.require_owner()?;
        payload.validate()?;

        let sealed = K::seal(&self.cipher, &payload)?;
        let record = self.repo.create(ctx.db(), owner, sealed).await?;
        info!(id = record.id, "Secret created");
        Ok(envelope(record, payload))
    }

    /// Every record of the caller. One undecryptable record fails the whole list.
    ///
    /// # Errors
    /// [`KeeperError::Crypto`] when any field fails to open.
    #[instrument(skip_all, fields(kind = K::TABLE, owner = ctx.owner()))]
    pub async fn list(&self, ctx: &mut RequestContext) -> Result<Vec<Secret<K::Payload>>, KeeperError> {
        let owner = ctx.require_owner()?;
        self.repo.list(ctx.db(), owner).await?.into_iter().map(|record| self.open(record)).collect()
    }

    /// # Errors
    /// [`KeeperError::NotFound`] when no record with `id` belongs to the caller.
    #[instrument(skip_all, fields(kind = K::TABLE, owner = ctx.owner(), id = id))]
    pub async fn get(&self, ctx: &mut RequestContext, id: SecretId) -> Result<Secret<K::Payload>, KeeperError> {
        let owner = ctx.require_owner()?;
        let record = self.repo.get(ctx.db(), id, owner).await?.ok_or_else(|| not_found::<K>(id))?;
        self.open(record)
    }

    /// Writes `revision` if its version is still current and returns the stored record.
    ///
    /// # Errors
    /// * [`KeeperError::NotFound`] when no record with that id belongs to the caller.
    /// * [`KeeperError::Conflict`] when the version is stale. The caller re-reads and retries.
    #[instrument(skip_all, fields(kind = K::TABLE, owner = ctx.owner(), id = revision.id, version = revision.version))]
    pub async fn update(
        &self,
        ctx: &mut RequestContext,
        revision: Revision<K::Payload>,
    ) -> Result<Secret<K::Payload>, KeeperError> {
        let owner = ctx.require_owner()?;
        revision.data.validate()?;

        let sealed = K::seal(&self.cipher, &revision.data)?;
        match self.repo.update(ctx.db(), owner, revision.id, revision.version, sealed).await? {
            UpdateOutcome::Updated(record) => {
                info!(version = record.version, "Secret updated");
                Ok(envelope(record, revision.data))
            },
            UpdateOutcome::Missing => Err(not_found::<K>(revision.id)),
            UpdateOutcome::Stale => Err(KeeperError::conflict(VERSION_MISMATCH)),
        }
    }

    /// # Errors
    /// [`KeeperError::NotFound`] when no record with `id` belongs to the caller.
    #[instrument(skip_all, fields(kind = K::TABLE, owner = ctx.owner(), id = id))]
    pub async fn delete(&self, ctx: &mut RequestContext, id: SecretId) -> Result<(), KeeperError> {
        let owner = ctx.require_owner()?;
        if !self.repo.delete(ctx.db(), id, owner).await? {
            return Err(not_found::<K>(id));
        }
        info!("Secret deleted");
        Ok(())
    }

    fn open(&self, record: SealedRecord) -> Result<Secret<K::Payload>, KeeperError> {
        let payload = K::open(&self.cipher, &record.fields)?;
        Ok(envelope(record, payload))
    }
}

fn envelope<T>(record: SealedRecord, data: T) -> Secret<T> {
    Secret {
        id: record.id,
        version: record.version,
        data,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

fn not_found<K: SecretKind>(id: SecretId) -> KeeperError {
    KeeperError::not_found(format!("{} record {id} not found", K::TABLE))
}
