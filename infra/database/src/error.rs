use std::borrow::Cow;

/// Errors raised by the pool bootstrap and the transaction manager.
#[keeper_derive::keeper_error]
pub enum DatabaseError {
    #[error("Invalid database configuration{}: {message}", format_context(.context))]
    Validation { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The database stayed unreachable after the start-up retries.
    #[error("Database connection failed{}: {message}", format_context(.context))]
    Connection { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("SQL error{}: {source}", format_context(.context))]
    Sqlx {
        #[source]
        source: sqlx::Error,
        context: Option<Cow<'static, str>>,
    },

    #[error("Migration error{}: {source}", format_context(.context))]
    Migration {
        #[source]
        source: sqlx::migrate::MigrateError,
        context: Option<Cow<'static, str>>,
    },

    #[error("Internal database error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl DatabaseError {
    /// `true` when the statement violated a `UNIQUE` constraint.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Sqlx { source, .. } => {
                source.as_database_error().is_some_and(|db| db.is_unique_violation())
            },
            _ => false,
        }
    }

    /// `true` when a query expected a row and found none.
    #[must_use]
    pub const fn is_row_not_found(&self) -> bool {
        matches!(self, Self::Sqlx { source: sqlx::Error::RowNotFound, .. })
    }
}
