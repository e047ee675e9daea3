//! Field validators shared by the HTTP handlers and the services.

use std::fmt;

/// A rejected input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub reason: &'static str,
}

impl FieldError {
    #[must_use]
    pub const fn new(field: &'static str, reason: &'static str) -> Self {
        Self { field, reason }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

impl std::error::Error for FieldError {}

/// Fails when `value` is blank.
///
/// # Errors
/// Returns a [`FieldError`] naming `field`.
pub fn not_empty(field: &'static str, value: &str) -> Result<(), FieldError> {
    if value.trim().is_empty() {
        return Err(FieldError::new(field, "is required"));
    }
    Ok(())
}

/// Fails when `value` has fewer than `min` characters.
///
/// # Errors
/// Returns a [`FieldError`] naming `field`.
pub fn min_chars(field: &'static str, value: &str, min: usize) -> Result<(), FieldError> {
    not_empty(field, value)?;
    if value.chars().count() < min {
        return Err(FieldError::new(field, "is too short"));
    }
    Ok(())
}

/// Payment card number: digits with optional spaces, 12 to 19 digits, valid Luhn checksum.
///
/// # Errors
/// Returns a [`FieldError`] for the `number` field.
pub fn card_number(value: &str) -> Result<(), FieldError> {
    not_empty("number", value)?;
    let mut digits = Vec::with_capacity(19);
    for b in value.bytes() {
        match b {
            b' ' => {},
            b'0'..=b'9' => digits.push(b - b'0'),
            _ => return Err(FieldError::new("number", "must contain only digits")),
        }
    }
    if !(12..=19).contains(&digits.len()) {
        return Err(FieldError::new("number", "must have 12 to 19 digits"));
    }
    if !luhn(&digits) {
        return Err(FieldError::new("number", "is not a valid card number"));
    }
    Ok(())
}

/// Luhn mod-10 checksum over decimal digits (values 0..=9).
#[must_use]
pub fn luhn(digits: &[u8]) -> bool {
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            let d = u32::from(d);
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// Card expiry in `MM/YY`, month 01 to 12, year 19 to 99.
///
/// # Errors
/// Returns a [`FieldError`] for the `expired_at` field.
pub fn card_expiry(value: &str) -> Result<(), FieldError> {
    let invalid = FieldError::new("expired_at", "must be MM/YY");
    let (month, year) = value.split_once('/').ok_or(invalid)?;
    let month = two_digits(month).ok_or(invalid)?;
    let year = two_digits(year).ok_or(invalid)?;

    if !(1..=12).contains(&month) {
        return Err(FieldError::new("expired_at", "month must be 01 to 12"));
    }
    if year < 19 {
        return Err(FieldError::new("expired_at", "year must be 19 to 99"));
    }
    Ok(())
}

/// Card verification value: 3 or 4 digits.
///
/// # Errors
/// Returns a [`FieldError`] for the `cvv` field.
pub fn cvv(value: &str) -> Result<(), FieldError> {
    let digits_only = value.bytes().all(|b| b.is_ascii_digit());
    if !digits_only || !(3..=4).contains(&value.len()) {
        return Err(FieldError::new("cvv", "must be 3 or 4 digits"));
    }
    Ok(())
}

fn two_digits(part: &str) -> Option<u8> {
    match part.as_bytes() {
        [a @ b'0'..=b'9', b @ b'0'..=b'9'] => Some((a - b'0') * 10 + (b - b'0')),
        _ => None,
    }
}
