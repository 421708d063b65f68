//! IMEI validation
//!
//! A single validator used by inventory creation, the validation endpoint
//! and device assignment. Input may carry separators (`49-015420-323751-8`);
//! only the digits are kept.

use serde::Serialize;

/// Number of digits in an IMEI
pub const IMEI_LENGTH: usize = 15;

/// A cleaned, checksum-valid IMEI
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Imei(String);

impl Imei {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Imei {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImeiError {
    #[error("IMEI must have exactly 15 digits (found {found})")]
    WrongLength { found: usize },

    #[error("IMEI failed the Luhn checksum")]
    ChecksumFailed,
}

/// Strip every non-digit character
pub fn clean(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Luhn checksum over a string of ASCII digits
///
/// Every second digit from the right is doubled, 9 is subtracted when the
/// doubled value exceeds 9, and the number is valid when the sum is a
/// multiple of 10. Non-digit input is never valid.
pub fn luhn_valid(digits: &str) -> bool {
    if digits.is_empty() {
        return false;
    }

    let mut sum = 0u32;
    for (i, c) in digits.chars().rev().enumerate() {
        let Some(mut d) = c.to_digit(10) else {
            return false;
        };
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }

    sum % 10 == 0
}

/// Clean and validate a raw IMEI
pub fn validate(raw: &str) -> Result<Imei, ImeiError> {
    let digits = clean(raw);

    if digits.len() != IMEI_LENGTH {
        return Err(ImeiError::WrongLength {
            found: digits.len(),
        });
    }

    if !luhn_valid(&digits) {
        return Err(ImeiError::ChecksumFailed);
    }

    Ok(Imei(digits))
}
