use crate::builder::FieldCipherBuilder;
use crate::error::CipherError;
use aead::inout::InOutBuf;
use aead::{AeadInOut, KeyInit, Nonce, Tag};
use aes_gcm::Aes256Gcm;
use std::sync::Arc;

pub type Aes = Aes256Gcm;

pub trait FieldAlgorithm: AeadInOut + KeyInit + Send + Sync + 'static {}
impl<T: AeadInOut + KeyInit + Send + Sync + 'static> FieldAlgorithm for T {}

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

pub(crate) struct FieldCipherInner<C> {
    pub(crate) algorithm: C,
}

/// Stateless AEAD wrapper shared by every repository. Cheap to clone.
pub struct FieldCipher<C: FieldAlgorithm = Aes> {
    pub(crate) inner: Arc<FieldCipherInner<C>>,
}

impl<C: FieldAlgorithm> Clone for FieldCipher<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C: FieldAlgorithm> std::fmt::Debug for FieldCipher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}

impl FieldCipher {
    #[must_use]
    pub fn builder() -> FieldCipherBuilder {
        FieldCipherBuilder::default()
    }
}

impl<C: FieldAlgorithm> FieldCipher<C> {
    /// Seals `plaintext` under a fresh random nonce.
    ///
    /// # Errors
    /// Returns [`CipherError::Encryption`] if the system RNG is unavailable.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.encrypt_bound(plaintext, &[])
    }

    /// # Errors
    /// Returns [`CipherError::Decryption`] if the input is truncated or fails authentication.
    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.decrypt_bound(sealed, &[])
    }

    /// Like [`encrypt`](Self::encrypt), additionally binding the output to `aad`.
    /// The same `aad` must be presented to decrypt.
    ///
    /// # Errors
    /// Returns [`CipherError::Encryption`] if the system RNG is unavailable.
    pub fn encrypt_bound(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CipherError> {
        let nonce = next_nonce::<C>()?;

        let mut out = Vec::with_capacity(NONCE_LEN + plaintext.len() + TAG_LEN);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(plaintext);

        let tag = self
            .inner
            .algorithm
            .encrypt_inout_detached(&nonce, aad, InOutBuf::from(&mut out[NONCE_LEN..]))
            .map_err(|_| CipherError::Encryption {
                message: "AEAD seal failed".into(),
                context: None,
            })?;
        out.extend_from_slice(&tag);
        Ok(out)
    }

    /// # Errors
    /// Returns [`CipherError::Decryption`] if the input is truncated, the key or
    /// `aad` differ, or the data was modified.
    pub fn decrypt_bound(&self, sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>, CipherError> {
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::Decryption {
                message: format!(
                    "ciphertext too short: {} bytes, need at least {}",
                    sealed.len(),
                    NONCE_LEN + TAG_LEN
                )
                .into(),
                context: None,
            });
        }

        let (nonce, rest) = sealed.split_at(NONCE_LEN);
        let (body, tag) = rest.split_at(rest.len() - TAG_LEN);
        let nonce = Nonce::<C>::try_from(nonce).map_err(|_| CipherError::Decryption {
            message: "nonce length mismatch".into(),
            context: None,
        })?;
        let tag = Tag::<C>::try_from(tag).map_err(|_| CipherError::Decryption {
            message: "tag length mismatch".into(),
            context: None,
        })?;

        let mut plaintext = body.to_vec();
        self.inner
            .algorithm
            .decrypt_inout_detached(&nonce, aad, InOutBuf::from(&mut plaintext[..]), &tag)
            .map_err(|_| CipherError::Decryption {
                message: "authentication failed".into(),
                context: None,
            })?;
        Ok(plaintext)
    }
}

fn next_nonce<C: FieldAlgorithm>() -> Result<Nonce<C>, CipherError> {
    let mut nonce = Nonce::<C>::default();
    getrandom::fill(&mut nonce).map_err(|e| CipherError::Encryption {
        message: e.to_string().into(),
        context: Some("system RNG unavailable for nonce".into()),
    })?;
    Ok(nonce)
}
