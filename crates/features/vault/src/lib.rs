//! Vault slice: credential, card and text records, encrypted field by field.
//!
//! All three kinds share one repository and one service, parameterized by a
//! [`SecretKind`]. Updates are optimistic: the client sends the version it read
//! and a stale version is rejected with a conflict, never merged.

mod kind;
mod repository;
mod service;

pub use kind::{Cards, Credentials, SecretKind, Texts};
pub use repository::{SealedRecord, SecretRepository, UpdateOutcome};
pub use service::{VERSION_MISMATCH, VaultService};

use keeper_cipher::FieldCipher;
use keeper_database::Database;

/// The three services, sharing one pool and one cipher.
#[derive(Debug, Clone)]
pub struct Vault {
    pub credentials: VaultService<Credentials>,
    pub cards: VaultService<Cards>,
    pub texts: VaultService<Texts>,
}

impl Vault {
    #[must_use]
    pub fn new(db: &Database, cipher: &FieldCipher) -> Self {
        Self {
            credentials: VaultService::new(db.clone(), cipher.clone()),
            cards: VaultService::new(db.clone(), cipher.clone()),
            texts: VaultService::new(db.clone(), cipher.clone()),
        }
    }
}
