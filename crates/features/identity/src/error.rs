use keeper_kernel::KeeperError;
use std::borrow::Cow;

/// A specialized [`IdentityError`] enum of this crate.
#[keeper_derive::keeper_error]
pub enum IdentityError {
    /// Configuration errors for identity/authentication.
    #[error("Identity config error{}: {message}", format_context(.context))]
    Config { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
    /// Password hashing or hash parsing failures.
    #[error("Password hashing error{}: {message}", format_context(.context))]
    Hashing { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
    /// Signing, signature, algorithm or expiry failures.
    #[error("Token error{}: {source}", format_context(.context))]
    Token { source: jsonwebtoken::errors::Error, context: Option<Cow<'static, str>> },
    /// Internal fallback for unexpected issues or logic errors.
    #[error("Internal identity error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl From<IdentityError> for KeeperError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Token { .. } => Self::unauthorized("invalid or expired token"),
            other => Self::internal(other.to_string()),
        }
    }
}
