use chrono::{DateTime, Utc};
use keeper_database::{Database, DatabaseError, DatabaseErrorExt, DbSession};
use keeper_domain::file::{BinaryFile, FileId};
use keeper_domain::identity::UserId;
use tracing::instrument;

#[derive(sqlx::FromRow)]
struct FileRow {
    id: i64,
    file_name: String,
    path: String,
    size: i64,
    created_at: DateTime<Utc>,
}

impl From<FileRow> for BinaryFile {
    fn from(row: FileRow) -> Self {
        Self {
            id: row.id,
            file_name: row.file_name,
            // the table enforces size > 0
            size: row.size.unsigned_abs(),
            path: row.path,
            created_at: row.created_at,
        }
    }
}

const PROJECTION: &str = "id, file_name, path, size, created_at";

/// `binary_files` table access. Every statement filters by owner.
#[derive(Debug, Clone)]
pub struct BinaryFileRepository {
    db: Database,
}

impl BinaryFileRepository {
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Records a committed file. A name the owner already uses surfaces as a
    /// unique violation.
    ///
    /// # Errors
    /// Returns [`DatabaseError`] when the insert fails.
    #[instrument(skip(self, session))]
    pub async fn create(
        &self,
        session: &mut DbSession,
        owner: UserId,
        file_name: &str,
        path: &str,
        size: i64,
    ) -> Result<BinaryFile, DatabaseError> {
        let mut conn = self.db.connection(session).await?;
        let row = sqlx::query_as::<_, FileRow>(&format!(
            "INSERT INTO binary_files (user_id, file_name, path, size, created_at) \
             VALUES (?, ?, ?, ?, ?) RETURNING {PROJECTION}"
        ))
        .bind(owner)
        .bind(file_name)
        .bind(path)
        .bind(size)
        .bind(Utc::now())
        .fetch_one(&mut *conn)
        .await
        .context("Inserting file metadata")?;
        Ok(row.into())
    }

    /// # Errors
    /// Returns [`DatabaseError`] when the query fails.
    pub async fn list(&self, session: &mut DbSession, owner: UserId) -> Result<Vec<BinaryFile>, DatabaseError> {
        let mut conn = self.db.connection(session).await?;
        let rows = sqlx::query_as::<_, FileRow>(&format!(
            "SELECT {PROJECTION} FROM binary_files WHERE user_id = ? ORDER BY id"
        ))
        .bind(owner)
        .fetch_all(&mut *conn)
        .await
        .context("Listing files")?;
        Ok(rows.into_iter().map(BinaryFile::from).collect())
    }

    /// # Errors
    /// Returns [`DatabaseError`] when the query fails.
    pub async fn get(
        &self,
        session: &mut DbSession,
        id: FileId,
        owner: UserId,
    ) -> Result<Option<BinaryFile>, DatabaseError> {
        let mut conn = self.db.connection(session).await?;
        let row = sqlx::query_as::<_, FileRow>(&format!(
            "SELECT {PROJECTION} FROM binary_files WHERE id = ? AND user_id = ?"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&mut *conn)
        .await
        .context("Loading file by id")?;
        Ok(row.map(BinaryFile::from))
    }

    /// # Errors
    /// Returns [`DatabaseError`] when the query fails.
    pub async fn find_by_name(
        &self,
        session: &mut DbSession,
        owner: UserId,
        file_name: &str,
    ) -> Result<Option<BinaryFile>, DatabaseError> {
        let mut conn = self.db.connection(session).await?;
        let row = sqlx::query_as::<_, FileRow>(&format!(
            "SELECT {PROJECTION} FROM binary_files WHERE user_id = ? AND file_name = ?"
        ))
        .bind(owner)
        .bind(file_name)
        .fetch_optional(&mut *conn)
        .await
        .context("Loading file by name")?;
        Ok(row.map(BinaryFile::from))
    }

    /// Returns whether a row matched.
    ///
    /// # Errors
    /// Returns [`DatabaseError`] when the statement fails.
    pub async fn delete(&self, session: &mut DbSession, id: FileId, owner: UserId) -> Result<bool, DatabaseError> {
        let mut conn = self.db.connection(session).await?;
        let affected = sqlx::query("DELETE FROM binary_files WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(owner)
            .execute(&mut *conn)
            .await
            .context("Deleting file metadata")?
            .rows_affected();
        Ok(affected > 0)
    }
}
