use keeper_cipher::CipherError;
use keeper_database::DatabaseError;
use keeper_domain::validation::FieldError;
use keeper_storage::StorageError;
use std::borrow::Cow;

/// Domain error every service reports in. Callers branch on [`KeeperError::kind`]
/// without knowing which storage technology produced it.
#[keeper_derive::keeper_error]
pub enum KeeperError {
    /// Malformed or missing input, rejected before touching storage.
    #[error("Validation error{}: {message}", format_context(.context))]
    Validation { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
    #[error("Duplicate login{}: {message}", format_context(.context))]
    DuplicateLogin { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
    /// Stale version on update.
    #[error("Conflict{}: {message}", format_context(.context))]
    Conflict { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
    /// No row owned by the caller matches.
    #[error("Not found{}: {message}", format_context(.context))]
    NotFound { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
    /// Encrypt or decrypt failure. Fatal for the record involved.
    #[error("Crypto error{}: {message}", format_context(.context))]
    Crypto { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
    /// Protocol violation or socket failure during a binary transfer.
    #[error("Transport error{}: {message}", format_context(.context))]
    Transport { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
    /// Database or filesystem failure.
    #[error("Storage error{}: {message}", format_context(.context))]
    Storage { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
    #[error("Unauthorized{}: {message}", format_context(.context))]
    Unauthorized { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
    #[error("Internal error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    DuplicateLogin,
    Conflict,
    NotFound,
    Crypto,
    Transport,
    Storage,
    Unauthorized,
    Internal,
}

macro_rules! constructors {
    ($($fn_name:ident => $variant:ident),* $(,)?) => {
        $(
            pub fn $fn_name(message: impl Into<Cow<'static, str>>) -> Self {
                Self::$variant { message: message.into(), context: None }
            }
        )*
    };
}

impl KeeperError {
    constructors! {
        validation => Validation,
        duplicate_login => DuplicateLogin,
        conflict => Conflict,
        not_found => NotFound,
        crypto => Crypto,
        transport => Transport,
        storage => Storage,
        unauthorized => Unauthorized,
        internal => Internal,
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::DuplicateLogin { .. } => ErrorKind::DuplicateLogin,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Crypto { .. } => ErrorKind::Crypto,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// The bare message, without kind prefix or context.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message, .. }
            | Self::DuplicateLogin { message, .. }
            | Self::Conflict { message, .. }
            | Self::NotFound { message, .. }
            | Self::Crypto { message, .. }
            | Self::Transport { message, .. }
            | Self::Storage { message, .. }
            | Self::Unauthorized { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    /// Whether the caller can act on the message. Server-side failures are
    /// reported to clients only as a generic failure.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Crypto | ErrorKind::Storage | ErrorKind::Internal)
    }
}

impl From<FieldError> for KeeperError {
    fn from(err: FieldError) -> Self {
        Self::validation(err.to_string())
    }
}

impl From<DatabaseError> for KeeperError {
    fn from(err: DatabaseError) -> Self {
        if err.is_row_not_found() {
            return Self::not_found("record not found");
        }
        Self::storage(err.to_string())
    }
}

impl From<CipherError> for KeeperError {
    fn from(err: CipherError) -> Self {
        Self::crypto(err.to_string())
    }
}

impl From<StorageError> for KeeperError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::FileNotFound { .. } => Self::not_found("file not found"),
            StorageError::AlreadyExists { .. } => Self::validation("file already exists"),
            StorageError::InvalidName { message, .. } => Self::Validation {
                message,
                context: Some("file_name".into()),
            },
            StorageError::PathTraversalAttempt { .. } => Self::validation("file name is not allowed"),
            other => Self::storage(other.to_string()),
        }
    }
}
