use keeper_kernel::KeeperError;
use std::borrow::Cow;

#[keeper_derive::keeper_error]
pub enum ClientError {
    /// A command was given the wrong arguments.
    #[error("Invalid usage{}: {message}", format_context(.context))]
    Usage { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// No session, or the server no longer accepts the token.
    #[error("Not signed in{}: {message}", format_context(.context))]
    Unauthorized { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// The server answered with an error status or closed a transfer abnormally.
    #[error("Rejected by the server{}: {message}", format_context(.context))]
    Rejected { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("HTTP error{}: {source}", format_context(.context))]
    Http { source: reqwest::Error, context: Option<Cow<'static, str>> },

    /// The transfer connection broke or the peer spoke out of turn.
    #[error("Transfer error{}: {message}", format_context(.context))]
    Transfer { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("IO error{}: {source}", format_context(.context))]
    Io { source: std::io::Error, context: Option<Cow<'static, str>> },

    #[error("JSON error{}: {source}", format_context(.context))]
    Json { source: serde_json::Error, context: Option<Cow<'static, str>> },

    #[error("Internal client error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl ClientError {
    pub(crate) fn usage(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Usage { message: message.into(), context: None }
    }

    pub(crate) fn transfer(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Transfer { message: message.into(), context: None }
    }

    pub(crate) fn rejected(message: impl Into<Cow<'static, str>>, status: u16) -> Self {
        Self::Rejected { message: message.into(), context: Some(status.to_string().into()) }
    }

    /// The session should be dropped and the user asked to sign in again.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

impl From<KeeperError> for ClientError {
    fn from(err: KeeperError) -> Self {
        Self::Transfer { message: err.message().to_owned().into(), context: None }
    }
}
