use crate::error::CipherError;
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

const KEY_LEN: usize = 32;

/// 256-bit key material, wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    #[must_use]
    pub const fn expose(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

/// Expands `secret` into a purpose-bound key with HKDF-SHA256.
///
/// Different `label`s give unrelated keys from the same secret and salt.
///
/// # Errors
/// Returns [`CipherError::InvalidConfiguration`] for an empty secret.
pub fn derive_key(
    secret: impl AsRef<[u8]>,
    salt: impl AsRef<[u8]>,
    label: &str,
) -> Result<DerivedKey, CipherError> {
    let secret = secret.as_ref();
    if secret.is_empty() {
        return Err(CipherError::InvalidConfiguration {
            message: "secret must not be empty".into(),
            context: Some(label.to_owned().into()),
        });
    }

    let (_, hk) = Hkdf::<Sha256>::extract(Some(salt.as_ref()), secret);
    let mut okm = [0u8; KEY_LEN];
    hk.expand(label.as_bytes(), &mut okm).map_err(|_| CipherError::InvalidConfiguration {
        message: "HKDF expansion failed".into(),
        context: Some(label.to_owned().into()),
    })?;

    let key = DerivedKey(okm);
    okm.zeroize();
    Ok(key)
}
