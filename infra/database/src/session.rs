use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, Transaction};
use std::ops::{Deref, DerefMut};

/// Request-scoped database handle.
///
/// Starts empty. While [`Database::run_in_transaction`](crate::Database::run_in_transaction)
/// is active it carries the ambient transaction, and every connection handed
/// out for this session runs on it.
///
/// Dropping a session that still holds a transaction (for example when the
/// unit of work panicked) rolls that transaction back.
#[derive(Debug, Default)]
pub struct DbSession {
    pub(crate) tx: Option<Transaction<'static, Sqlite>>,
}

impl DbSession {
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }
}

/// A connection as seen by repositories: either a fresh one from the pool or
/// the session's active transaction. Both dereference to [`SqliteConnection`].
#[derive(Debug)]
pub enum Connection<'s> {
    Pooled(PoolConnection<Sqlite>),
    Transaction(&'s mut SqliteConnection),
}

impl Connection<'_> {
    #[must_use]
    pub const fn is_transactional(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }
}

impl Deref for Connection<'_> {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Pooled(conn) => &**conn,
            Self::Transaction(conn) => &**conn,
        }
    }
}

impl DerefMut for Connection<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Pooled(conn) => &mut **conn,
            Self::Transaction(conn) => &mut **conn,
        }
    }
}
