use crate::cipher::{Aes, FieldAlgorithm, FieldCipher, FieldCipherInner};
use crate::error::CipherError;
use crate::keys::{DerivedKey, derive_key};
use aead::Key;
use private::Sealed;
use std::marker::PhantomData;
use std::sync::Arc;

/// Label under which the field key is expanded from the server secret.
const FIELD_KEY_LABEL: &str = "keeper:field-cipher:v1";

#[derive(Debug, Default)]
pub struct NoKey;
#[derive(Debug)]
pub struct WithKey(DerivedKey);

mod private {
    pub trait Sealed {}
}
impl Sealed for NoKey {}
impl Sealed for WithKey {}

/// Builds a [`FieldCipher`]. `build` only exists once a key is set.
#[derive(Debug)]
pub struct FieldCipherBuilder<C: FieldAlgorithm = Aes, K: Sealed = NoKey> {
    _algorithm: PhantomData<C>,
    key: K,
}

impl<C: FieldAlgorithm> Default for FieldCipherBuilder<C> {
    fn default() -> Self {
        Self { _algorithm: PhantomData, key: NoKey }
    }
}

impl<C: FieldAlgorithm> FieldCipherBuilder<C> {
    /// Derives the field key from the server secret.
    ///
    /// # Errors
    /// Returns [`CipherError::InvalidConfiguration`] for an empty secret.
    pub fn derived_key(
        self,
        secret: impl AsRef<[u8]>,
        salt: impl AsRef<[u8]>,
    ) -> Result<FieldCipherBuilder<C, WithKey>, CipherError> {
        let key = derive_key(secret, salt, FIELD_KEY_LABEL)?;
        Ok(FieldCipherBuilder { _algorithm: PhantomData, key: WithKey(key) })
    }

    /// Uses already derived key material as is.
    #[must_use]
    pub const fn key(self, key: DerivedKey) -> FieldCipherBuilder<C, WithKey> {
        FieldCipherBuilder { _algorithm: PhantomData, key: WithKey(key) }
    }
}

impl<C: FieldAlgorithm> FieldCipherBuilder<C, WithKey> {
    /// # Errors
    /// Returns [`CipherError::InvalidConfiguration`] if the algorithm rejects the key size.
    pub fn build(self) -> Result<FieldCipher<C>, CipherError> {
        let key = Key::<C>::try_from(&self.key.0.expose()[..]).map_err(|_| {
            CipherError::InvalidConfiguration {
                message: "key length does not match the algorithm".into(),
                context: None,
            }
        })?;
        Ok(FieldCipher { inner: Arc::new(FieldCipherInner { algorithm: C::new(&key) }) })
    }
}
