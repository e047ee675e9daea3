use keeper_cipher::FieldCipher;
use keeper_domain::secret::{Card, Credential, SecretPayload, TextNote};
use keeper_kernel::KeeperError;

/// One table of encrypted records.
///
/// Every column is sealed separately with `"<table>.<column>"` as associated
/// data, so a ciphertext moved to another column or table no longer opens.
pub trait SecretKind: Send + Sync + 'static {
    type Payload: SecretPayload + Clone + Send + Sync + 'static;

    const TABLE: &'static str;
    /// Ciphertext columns, in the order [`fields`](Self::fields) yields them.
    const COLUMNS: &'static [&'static str];

    fn fields(payload: &Self::Payload) -> Vec<&str>;

    /// Inverse of [`fields`](Self::fields). `None` when the count is wrong.
    fn from_fields(fields: Vec<String>) -> Option<Self::Payload>;

    /// # Errors
    /// Returns [`KeeperError::Crypto`] if any column fails to encrypt.
    fn seal(cipher: &FieldCipher, payload: &Self::Payload) -> Result<Vec<Vec<u8>>, KeeperError> {
        Self::COLUMNS
            .iter()
            .zip(Self::fields(payload))
            .map(|(column, value)| Ok(cipher.encrypt_bound(value.as_bytes(), aad::<Self>(column).as_bytes())?))
            .collect()
    }

    /// # Errors
    /// Returns [`KeeperError::Crypto`] if any column fails to open. There is no
    /// partial result.
    fn open(cipher: &FieldCipher, sealed: &[Vec<u8>]) -> Result<Self::Payload, KeeperError> {
        if sealed.len() != Self::COLUMNS.len() {
            return Err(KeeperError::crypto(format!("{} expects {} fields", Self::TABLE, Self::COLUMNS.len())));
        }
        let fields = Self::COLUMNS
            .iter()
            .zip(sealed)
            .map(|(column, bytes)| {
                let plain = cipher.decrypt_bound(bytes, aad::<Self>(column).as_bytes())?;
                String::from_utf8(plain).map_err(|_| KeeperError::crypto(format!("{} is not UTF-8", aad::<Self>(column))))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_fields(fields).ok_or_else(|| KeeperError::crypto(format!("malformed {} record", Self::TABLE)))
    }
}

fn aad<K: SecretKind + ?Sized>(column: &str) -> String {
    format!("{}.{column}", K::TABLE)
}

#[derive(Debug, Clone, Copy)]
pub struct Credentials;

impl SecretKind for Credentials {
    type Payload = Credential;

    const TABLE: &'static str = "credentials";
    const COLUMNS: &'static [&'static str] = &["login", "password"];

    fn fields(payload: &Credential) -> Vec<&str> {
        vec![payload.login.as_str(), payload.password.as_str()]
    }

    fn from_fields(fields: Vec<String>) -> Option<Credential> {
        let [login, password]: [String; 2] = fields.try_into().ok()?;
        Some(Credential { login, password })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Cards;

impl SecretKind for Cards {
    type Payload = Card;

    const TABLE: &'static str = "cards";
    const COLUMNS: &'static [&'static str] = &["number", "expired_at", "cvv"];

    fn fields(payload: &Card) -> Vec<&str> {
        vec![payload.number.as_str(), payload.expired_at.as_str(), payload.cvv.as_str()]
    }

    fn from_fields(fields: Vec<String>) -> Option<Card> {
        let [number, expired_at, cvv]: [String; 3] = fields.try_into().ok()?;
        Some(Card { number, expired_at, cvv })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Texts;

impl SecretKind for Texts {
    type Payload = TextNote;

    const TABLE: &'static str = "texts";
    const COLUMNS: &'static [&'static str] = &["text"];

    fn fields(payload: &TextNote) -> Vec<&str> {
        vec![payload.text.as_str()]
    }

    fn from_fields(fields: Vec<String>) -> Option<TextNote> {
        let [text]: [String; 1] = fields.try_into().ok()?;
        Some(TextNote { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> FieldCipher {
        FieldCipher::builder().derived_key("secret", "salt").unwrap().build().unwrap()
    }

    #[test]
    fn seal_then_open() {
        let cipher = cipher();
        let card = Card { number: "4111111111111111".into(), expired_at: "01/30".into(), cvv: "123".into() };
        let sealed = Cards::seal(&cipher, &card).unwrap();
        assert_eq!(sealed.len(), 3);
        assert_eq!(Cards::open(&cipher, &sealed).unwrap(), card);
    }

    #[test]
    fn swapped_columns_do_not_open() {
        let cipher = cipher();
        let cred = Credential { login: "alice".into(), password: "s3cret12".into() };
        let mut sealed = Credentials::seal(&cipher, &cred).unwrap();
        sealed.swap(0, 1);
        assert!(Credentials::open(&cipher, &sealed).is_err());
    }

    #[test]
    fn other_tables_do_not_open() {
        let cipher = cipher();
        let note = TextNote { text: "alice".into() };
        let sealed = Texts::seal(&cipher, &note).unwrap();
        let forged = vec![sealed[0].clone(), sealed[0].clone()];
        assert!(Credentials::open(&cipher, &forged).is_err());
    }
}
