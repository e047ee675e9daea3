use crate::kind::SecretKind;
use chrono::{DateTime, Utc};
use keeper_database::{Database, DatabaseError, DatabaseErrorExt, DbSession};
use keeper_domain::identity::UserId;
use keeper_domain::secret::{SecretId, Version};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// A row as stored: ciphertext columns in [`SecretKind::COLUMNS`] order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedRecord {
    pub id: SecretId,
    pub version: Version,
    pub fields: Vec<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of the conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated(SealedRecord),
    /// No row with that id belongs to the owner.
    Missing,
    /// The row exists but its version moved on.
    Stale,
}

/// Statements for one table, rendered once from its column list.
#[derive(Debug)]
struct Statements {
    insert: String,
    select_all: String,
    select_one: String,
    lock: String,
    update: String,
    delete: String,
}

impl Statements {
    fn render<K: SecretKind>() -> Self {
        let table = K::TABLE;
        let columns = K::COLUMNS.join(", ");
        let placeholders = vec!["?"; K::COLUMNS.len()].join(", ");
        let assignments = K::COLUMNS.iter().map(|c| format!("{c} = ?")).collect::<Vec<_>>().join(", ");
        let projection = format!("id, version, {columns}, created_at, updated_at");

        Self {
            insert: format!(
                "INSERT INTO {table} (user_id, {columns}, created_at, updated_at) \
                 VALUES (?, {placeholders}, ?, ?) RETURNING {projection}"
            ),
            select_all: format!("SELECT {projection} FROM {table} WHERE user_id = ? ORDER BY id"),
            select_one: format!("SELECT {projection} FROM {table} WHERE id = ? AND user_id = ?"),
            lock: format!("SELECT id FROM {table} WHERE id = ? AND user_id = ?"),
            update: format!(
                "UPDATE {table} SET {assignments}, version = version + 1, updated_at = ? \
                 WHERE id = ? AND user_id = ? AND version = ?"
            ),
            delete: format!("DELETE FROM {table} WHERE id = ? AND user_id = ?"),
        }
    }
}

/// CRUD over one secret table. Every statement filters by owner.
pub struct SecretRepository<K: SecretKind> {
    db: Database,
    sql: Arc<Statements>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: SecretKind> Clone for SecretRepository<K> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), sql: Arc::clone(&self.sql), _kind: PhantomData }
    }
}

impl<K: SecretKind> std::fmt::Debug for SecretRepository<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretRepository").field("table", &K::TABLE).finish_non_exhaustive()
    }
}

impl<K: SecretKind> SecretRepository<K> {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db, sql: Arc::new(Statements::render::<K>()), _kind: PhantomData }
    }

    /// Inserts a row; the store assigns the id and the initial version.
    ///
    /// # Errors
    /// Returns [`DatabaseError`] when the insert fails.
    pub async fn create(
        &self,
        session: &mut DbSession,
        owner: UserId,
        fields: Vec<Vec<u8>>,
    ) -> Result<SealedRecord, DatabaseError> {
        let now = Utc::now();
        let mut conn = self.db.connection(session).await?;

        let mut query = sqlx::query(&self.sql.insert).bind(owner);
        for field in fields {
            query = query.bind(field);
        }
        let row = query
            .bind(now)
            .bind(now)
            .fetch_one(&mut *conn)
            .await
            .context(format!("Inserting into {}", K::TABLE))?;

        decode::<K>(&row)
    }

    /// # Errors
    /// Returns [`DatabaseError`] when the query fails.
    pub async fn list(&self, session: &mut DbSession, owner: UserId) -> Result<Vec<SealedRecord>, DatabaseError> {
        let mut conn = self.db.connection(session).await?;
        let rows = sqlx::query(&self.sql.select_all)
            .bind(owner)
            .fetch_all(&mut *conn)
            .await
            .context(format!("Listing {}", K::TABLE))?;

        rows.iter().map(decode::<K>).collect()
    }

    /// # Errors
    /// Returns [`DatabaseError`] when the query fails.
    pub async fn get(
        &self,
        session: &mut DbSession,
        id: SecretId,
        owner: UserId,
    ) -> Result<Option<SealedRecord>, DatabaseError> {
        let mut conn = self.db.connection(session).await?;
        let row = sqlx::query(&self.sql.select_one)
            .bind(id)
            .bind(owner)
            .fetch_optional(&mut *conn)
            .await
            .context(format!("Loading from {}", K::TABLE))?;

        row.as_ref().map(decode::<K>).transpose()
    }

    /// Optimistic update, atomic in one transaction:
    ///
    /// 1. locking read of the owned row,
    /// 2. write conditioned on id, owner and `expected` version,
    /// 3. affected-row check, then re-read of the stored row.
    ///
    /// The new version is computed by the store (`version + 1`).
    ///
    /// # Errors
    /// Returns [`DatabaseError`] when a statement or the commit fails.
    pub async fn update(
        &self,
        session: &mut DbSession,
        owner: UserId,
        id: SecretId,
        expected: Version,
        fields: Vec<Vec<u8>>,
    ) -> Result<UpdateOutcome, DatabaseError> {
        let db = self.db.clone();
        let sql = Arc::clone(&self.sql);

        self.db
            .run_in_transaction(session, move |s| {
                Box::pin(async move {
                    let mut conn = db.connection(s).await?;

                    let locked = sqlx::query(&sql.lock)
                        .bind(id)
                        .bind(owner)
                        .fetch_optional(&mut *conn)
                        .await
                        .context(format!("Locking {} row", K::TABLE))?;
                    if locked.is_none() {
                        return Ok(UpdateOutcome::Missing);
                    }

                    let mut query = sqlx::query(&sql.update);
                    for field in fields {
                        query = query.bind(field);
                    }
                    let affected = query
                        .bind(Utc::now())
                        .bind(id)
                        .bind(owner)
                        .bind(expected)
                        .execute(&mut *conn)
                        .await
                        .context(format!("Updating {} row", K::TABLE))?
                        .rows_affected();
                    if affected == 0 {
                        debug!(table = K::TABLE, id, expected, "Stale version");
                        return Ok(UpdateOutcome::Stale);
                    }

                    let row = sqlx::query(&sql.select_one)
                        .bind(id)
                        .bind(owner)
                        .fetch_one(&mut *conn)
                        .await
                        .context(format!("Re-reading {} row", K::TABLE))?;
                    Ok(UpdateOutcome::Updated(decode::<K>(&row)?))
                })
            })
            .await
    }

    /// Deletes the owned row. Returns whether a row matched.
    ///
    /// # Errors
    /// Returns [`DatabaseError`] when the statement fails.
    pub async fn delete(&self, session: &mut DbSession, id: SecretId, owner: UserId) -> Result<bool, DatabaseError> {
        let mut conn = self.db.connection(session).await?;
        let affected = sqlx::query(&self.sql.delete)
            .bind(id)
            .bind(owner)
            .execute(&mut *conn)
            .await
            .context(format!("Deleting from {}", K::TABLE))?
            .rows_affected();
        Ok(affected > 0)
    }
}

fn decode<K: SecretKind>(row: &SqliteRow) -> Result<SealedRecord, DatabaseError> {
    let fields = K::COLUMNS
        .iter()
        .map(|column| row.try_get::<Vec<u8>, _>(*column))
        .collect::<Result<Vec<_>, _>>()
        .context(format!("Decoding {} row", K::TABLE))?;

    Ok(SealedRecord {
        id: row.try_get("id")?,
        version: row.try_get("version")?,
        fields,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
