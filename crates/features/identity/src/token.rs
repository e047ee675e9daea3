use crate::error::IdentityError;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use keeper_cipher::DerivedKey;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Session token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub login: String,
    /// Absolute expiry, seconds since the epoch.
    pub exp: u64,
    pub iat: u64,
}

/// HS256 signer and verifier.
pub(crate) struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub(crate) fn new(key: &DerivedKey, ttl: Duration, leeway: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway.as_secs();
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(key.expose()),
            decoding: DecodingKey::from_secret(key.expose()),
            validation,
            ttl,
        }
    }

    pub(crate) fn issue(&self, login: &str) -> Result<String, IdentityError> {
        let iat = jsonwebtoken::get_current_timestamp();
        let claims = Claims { login: login.to_owned(), exp: iat + self.ttl.as_secs(), iat };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| IdentityError::Internal {
            message: e.to_string().into(),
            context: Some("Signing token".into()),
        })
    }

    /// Checks signature, algorithm and expiry. Nothing else is consulted.
    pub(crate) fn verify(&self, token: &str) -> Result<Claims, IdentityError> {
        Ok(decode::<Claims>(token, &self.decoding, &self.validation)?.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_cipher::derive_key;

    fn codec(secret: &str) -> TokenCodec {
        let key = derive_key(secret, "salt", "keeper:jwt:v1").unwrap();
        TokenCodec::new(&key, Duration::from_secs(60), Duration::ZERO)
    }

    #[test]
    fn issued_tokens_verify() {
        let codec = codec("secret");
        let claims = codec.verify(&codec.issue("alice").unwrap()).unwrap();
        assert_eq!(claims.login, "alice");
        assert_eq!(claims.exp - claims.iat, 60);
    }

    #[test]
    fn foreign_key_is_rejected() {
        let token = codec("secret").issue("alice").unwrap();
        assert!(matches!(codec("other").verify(&token), Err(IdentityError::Token { .. })));
    }

    #[test]
    fn expired_token_is_rejected() {
        let codec = codec("secret");
        let past = jsonwebtoken::get_current_timestamp() - 120;
        let claims = Claims { login: "alice".into(), exp: past, iat: past - 60 };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &codec.encoding).unwrap();
        assert!(codec.verify(&token).is_err());
    }

    #[test]
    fn other_algorithms_are_rejected() {
        let codec = codec("secret");
        let claims = Claims { login: "alice".into(), exp: u64::MAX / 2, iat: 0 };
        let token = encode(&Header::new(Algorithm::HS512), &claims, &codec.encoding).unwrap();
        assert!(codec.verify(&token).is_err());
    }
}
