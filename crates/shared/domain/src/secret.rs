//! Secret records: the three payload kinds and their versioned envelope.

use crate::identity::{MIN_LOGIN_CHARS, MIN_PASSWORD_CHARS};
use crate::validation::{self, FieldError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type SecretId = i64;
pub type Version = i64;

/// Plaintext body of a secret record.
pub trait SecretPayload {
    /// # Errors
    /// Returns a [`FieldError`] for the first field that is rejected.
    fn validate(&self) -> Result<(), FieldError>;
}

/// A login/password pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub password: String,
}

impl SecretPayload for Credential {
    fn validate(&self) -> Result<(), FieldError> {
        validation::min_chars("login", &self.login, MIN_LOGIN_CHARS)?;
        validation::min_chars("password", &self.password, MIN_PASSWORD_CHARS)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential").field("login", &self.login).field("password", &"***").finish()
    }
}

/// A payment card.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub expired_at: String,
    #[serde(default)]
    pub cvv: String,
}

impl SecretPayload for Card {
    fn validate(&self) -> Result<(), FieldError> {
        validation::card_number(&self.number)?;
        validation::card_expiry(&self.expired_at)?;
        validation::cvv(&self.cvv)
    }
}

impl fmt::Debug for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Card")
            .field("number", &"***")
            .field("expired_at", &self.expired_at)
            .field("cvv", &"***")
            .finish()
    }
}

/// Free-form text.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextNote {
    #[serde(default)]
    pub text: String,
}

impl SecretPayload for TextNote {
    fn validate(&self) -> Result<(), FieldError> {
        validation::not_empty("text", &self.text)
    }
}

impl fmt::Debug for TextNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextNote").field("len", &self.text.len()).finish()
    }
}

/// A decrypted record as its owner sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret<T> {
    pub id: SecretId,
    pub version: Version,
    #[serde(flatten)]
    pub data: T,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An update: the new payload plus the version the client last read.
///
/// `id` may be omitted when the route already names the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision<T> {
    #[serde(default)]
    pub id: SecretId,
    pub version: Version,
    #[serde(flatten)]
    pub data: T,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_hides_secrets() {
        let card = Card { number: "4111111111111111".into(), expired_at: "01/30".into(), cvv: "123".into() };
        let shown = format!("{card:?}");
        assert!(!shown.contains("4111"));
        assert!(!shown.contains("123"));

        let cred = Credential { login: "alice".into(), password: "s3cret12".into() };
        assert!(!format!("{cred:?}").contains("s3cret12"));
    }

    #[test]
    fn credential_rules() {
        assert!(Credential { login: "alice".into(), password: "s3cret12".into() }.validate().is_ok());
        assert!(Credential { login: "al".into(), password: "s3cret12".into() }.validate().is_err());
        assert!(Credential { login: "alice".into(), password: "short".into() }.validate().is_err());
    }
}
