//! Argon2id password hashing, off the async executor.

use crate::error::IdentityError;
use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

const SALT_LEN: usize = 16;

/// Hashes `password` into a PHC string with a fresh random salt.
pub(crate) async fn hash_password(password: String) -> Result<String, IdentityError> {
    let mut salt = [0u8; SALT_LEN];
    getrandom::fill(&mut salt).map_err(|e| IdentityError::Hashing {
        message: e.to_string().into(),
        context: Some("Drawing salt".into()),
    })?;

    blocking(move || {
        let salt = SaltString::encode_b64(&salt).map_err(hashing("Encoding salt"))?;
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(hashing("Hashing password"))?;
        Ok(hash.to_string())
    })
    .await
}

/// Constant-time check of `password` against a stored PHC string.
pub(crate) async fn verify_password(password: String, phc: String) -> Result<bool, IdentityError> {
    blocking(move || {
        let parsed = PasswordHash::new(&phc).map_err(hashing("Parsing stored hash"))?;
        Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
    })
    .await
}

async fn blocking<T, F>(work: F) -> Result<T, IdentityError>
where
    F: FnOnce() -> Result<T, IdentityError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| IdentityError::Internal {
        message: e.to_string().into(),
        context: Some("Password worker".into()),
    })?
}

fn hashing(context: &'static str) -> impl Fn(argon2::password_hash::Error) -> IdentityError {
    move |e| IdentityError::Hashing { message: e.to_string().into(), context: Some(context.into()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_then_verify() {
        let phc = hash_password("s3cret12".into()).await.unwrap();
        assert!(phc.starts_with("$argon2id$"));
        assert!(verify_password("s3cret12".into(), phc.clone()).await.unwrap());
        assert!(!verify_password("s3cret13".into(), phc).await.unwrap());
    }

    #[tokio::test]
    async fn salts_differ_per_hash() {
        let a = hash_password("same-password".into()).await.unwrap();
        let b = hash_password("same-password".into()).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn garbage_hash_is_an_error() {
        assert!(verify_password("x".into(), "not-a-phc".into()).await.is_err());
    }
}
