use crate::validation::{FieldError, min_chars};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type UserId = i64;

pub const MIN_LOGIN_CHARS: usize = 4;
pub const MIN_PASSWORD_CHARS: usize = 8;

/// Stored account. `password_hash` is an Argon2 PHC string.
#[derive(Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub login: String,
    pub password_hash: String,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User").field("id", &self.id).field("login", &self.login).finish_non_exhaustive()
    }
}

/// The authenticated caller of a request.
///
/// Owner ids of every vault operation come from here, never from a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub login: String,
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self { id: user.id, login: user.login.clone() }
    }
}

/// Sign-up and sign-in body.
#[derive(Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub password: String,
}

impl LoginRequest {
    /// # Errors
    /// Returns a [`FieldError`] for a short login or password.
    pub fn validate(&self) -> Result<(), FieldError> {
        min_chars("login", &self.login, MIN_LOGIN_CHARS)?;
        min_chars("password", &self.password, MIN_PASSWORD_CHARS)
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest").field("login", &self.login).field("password", &"***").finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}
