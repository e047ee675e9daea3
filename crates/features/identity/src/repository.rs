use chrono::Utc;
use keeper_database::{Database, DatabaseError, DatabaseErrorExt, DbSession};
use keeper_domain::identity::User;
use tracing::instrument;

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    login: String,
    password_hash: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self { id: row.id, login: row.login, password_hash: row.password_hash }
    }
}

/// `users` table access.
#[derive(Debug, Clone)]
pub struct UserRepository {
    db: Database,
}

impl UserRepository {
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Inserts a user. A taken login surfaces as a unique violation
    /// (see [`DatabaseError::is_unique_violation`]).
    ///
    /// # Errors
    /// Returns [`DatabaseError`] when the insert fails.
    #[instrument(skip(self, session, password_hash))]
    pub async fn create(
        &self,
        session: &mut DbSession,
        login: &str,
        password_hash: &str,
    ) -> Result<User, DatabaseError> {
        let mut conn = self.db.connection(session).await?;
        let id = sqlx::query("INSERT INTO users (login, password_hash, created_at) VALUES (?, ?, ?)")
            .bind(login)
            .bind(password_hash)
            .bind(Utc::now())
            .execute(&mut *conn)
            .await
            .context("Inserting user")?
            .last_insert_rowid();

        Ok(User { id, login: login.to_owned(), password_hash: password_hash.to_owned() })
    }

    /// # Errors
    /// Returns [`DatabaseError`] when the query fails.
    pub async fn find_by_login(
        &self,
        session: &mut DbSession,
        login: &str,
    ) -> Result<Option<User>, DatabaseError> {
        let mut conn = self.db.connection(session).await?;
        let row = sqlx::query_as::<_, UserRow>("SELECT id, login, password_hash FROM users WHERE login = ?")
            .bind(login)
            .fetch_optional(&mut *conn)
            .await
            .context("Loading user by login")?;
        Ok(row.map(User::from))
    }
}
