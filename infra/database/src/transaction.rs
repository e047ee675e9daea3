use crate::session::{Connection, DbSession};
use crate::{Database, DatabaseError, DatabaseErrorExt};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

/// Boxed future returned by a unit of work. Borrows the session for `'s`.
pub type TxFuture<'s, T> = Pin<Box<dyn Future<Output = T> + Send + 's>>;

/// SQLite takes the write lock at `BEGIN IMMEDIATE`, so concurrent writers
/// queue up at the start of their transaction instead of failing at commit.
const BEGIN: &str = "BEGIN IMMEDIATE";

impl Database {
    /// Hands out the session's ambient transaction if there is one, otherwise a
    /// pooled connection.
    ///
    /// # Errors
    /// Returns [`DatabaseError::Sqlx`] when the pool cannot provide a connection.
    pub async fn connection<'s>(
        &self,
        session: &'s mut DbSession,
    ) -> Result<Connection<'s>, DatabaseError> {
        match session.tx.as_mut() {
            Some(tx) => Ok(Connection::Transaction(&mut **tx)),
            None => {
                let conn = self.inner.pool.acquire().await.context("Acquiring connection")?;
                Ok(Connection::Pooled(conn))
            },
        }
    }

    /// Runs `work` inside a transaction attached to `session`.
    ///
    /// When the session already carries a transaction, `work` joins it and the
    /// outermost caller decides the outcome. Otherwise a transaction is opened,
    /// committed when `work` returns `Ok` and rolled back when it returns `Err`.
    /// A failed rollback is logged and the original error is returned.
    ///
    /// `work` receives the session back and must capture only owned data.
    ///
    /// # Errors
    /// Propagates the error of `work`, or a [`DatabaseError`] converted into `E`
    /// when the transaction cannot be opened or committed.
    pub async fn run_in_transaction<T, E, F>(&self, session: &mut DbSession, work: F) -> Result<T, E>
    where
        F: for<'s> FnOnce(&'s mut DbSession) -> TxFuture<'s, Result<T, E>>,
        E: From<DatabaseError>,
    {
        if session.in_transaction() {
            debug!("Joining ambient transaction");
            return work(session).await;
        }

        let tx = self.inner.pool.begin_with(BEGIN).await.context("Beginning transaction")?;
        session.tx = Some(tx);

        let outcome = work(session).await;

        let Some(tx) = session.tx.take() else {
            return Err(DatabaseError::Internal {
                message: "transaction detached from session during unit of work".into(),
                context: None,
            }
            .into());
        };

        match outcome {
            Ok(value) => {
                tx.commit().await.context("Committing transaction")?;
                Ok(value)
            },
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "Rollback failed; transaction already closed");
                }
                Err(err)
            },
        }
    }
}
