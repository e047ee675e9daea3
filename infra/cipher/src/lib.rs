//! Field-level authenticated encryption.
//!
//! Every call to [`FieldCipher::encrypt`] draws a fresh random 96-bit nonce and
//! prepends it to the sealed output:
//!
//! ```text
//! [NONCE(12)][CIPHERTEXT(N)][TAG(16)]
//! ```
//!
//! Decryption splits the nonce back off and opens the box. A short, tampered
//! or foreign ciphertext always fails; there is no partial decode.
//!
//! Keys never come from configuration directly. [`derive_key`] expands the
//! server secret with HKDF-SHA256 under a purpose label, so the field key and
//! any other key taken from the same secret stay independent.
//!
//! ```rust
//! use keeper_cipher::{CipherError, FieldCipher};
//!
//! # fn main() -> Result<(), CipherError> {
//! let cipher = FieldCipher::builder().derived_key("server-secret", "salt")?.build()?;
//! let sealed = cipher.encrypt(b"4111 1111 1111 1111")?;
//! assert_eq!(cipher.decrypt(&sealed)?, b"4111 1111 1111 1111");
//! # Ok(())
//! # }
//! ```

mod builder;
mod cipher;
mod error;
mod keys;

pub use builder::{FieldCipherBuilder, NoKey, WithKey};
pub use cipher::{Aes, FieldAlgorithm, FieldCipher, NONCE_LEN, TAG_LEN};
pub use error::{CipherError, CipherErrorExt};
pub use keys::{DerivedKey, derive_key};
