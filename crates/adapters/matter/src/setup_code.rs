//! Matter onboarding payloads.
//!
//! Manual pairing codes are 11 or 21 decimal digits (dashes and spaces are
//! ignored), laid out as:
//!
//! | Digits | Content |
//! |--------|---------|
//! | 1 | `vid_pid_present << 2 \| discriminator >> 2` |
//! | 2-6 | `(discriminator & 3) << 14 \| passcode & 0x3FFF` |
//! | 7-10 | `passcode >> 14` |
//! | 11-20 | vendor id, product id (5 digits each, 21-digit form only) |
//! | last | Verhoeff check digit |
//!
//! QR payloads (`MT:` followed by base-38 text) are not decoded here; they
//! are handed to the controller as is.

use std::fmt;
use std::str::FromStr;

const SHORT_LEN: usize = 11;
const LONG_LEN: usize = 21;
const QR_PREFIX: &str = "MT:";
const BASE38_ALPHABET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-.";
const MAX_PASSCODE: u32 = 99_999_998;

/// Why a setup code was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetupCodeError {
    #[error("setup code is empty")]
    Empty,

    #[error("setup code contains invalid character {0:?}")]
    InvalidCharacter(char),

    #[error("manual code must have 11 or 21 digits, got {0}")]
    InvalidLength(usize),

    #[error("manual code check digit does not match")]
    CheckDigit,

    #[error("manual code vendor/product flag does not match its length")]
    VendorFlagMismatch,

    #[error("passcode {0:08} is not allowed")]
    DisallowedPasscode(u32),

    #[error("QR payload must be base-38 text after \"MT:\"")]
    InvalidQrPayload,
}

/// Decoded manual pairing code.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ManualCode {
    passcode: u32,
    short_discriminator: u8,
    vendor_id: Option<u16>,
    product_id: Option<u16>,
}

impl ManualCode {
    #[must_use]
    pub fn passcode(&self) -> u32 {
        self.passcode
    }

    /// Upper 4 bits of the 12-bit discriminator.
    #[must_use]
    pub fn short_discriminator(&self) -> u8 {
        self.short_discriminator
    }

    #[must_use]
    pub fn vendor_id(&self) -> Option<u16> {
        self.vendor_id
    }

    #[must_use]
    pub fn product_id(&self) -> Option<u16> {
        self.product_id
    }
}

impl fmt::Debug for ManualCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualCode")
            .field("passcode", &"<redacted>")
            .field("short_discriminator", &self.short_discriminator)
            .field("vendor_id", &self.vendor_id)
            .field("product_id", &self.product_id)
            .finish()
    }
}

/// A validated onboarding payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupCode {
    Manual(ManualCode),
    /// Full `MT:` payload, passed through to the controller.
    Qr(String),
}

impl SetupCode {
    /// Short discriminator, when known without decoding a QR payload.
    #[must_use]
    pub fn short_discriminator(&self) -> Option<u8> {
        match self {
            Self::Manual(code) => Some(code.short_discriminator),
            Self::Qr(_) => None,
        }
    }
}

impl FromStr for SetupCode {
    type Err = SetupCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SetupCodeError::Empty);
        }
        if let Some(payload) = s.strip_prefix(QR_PREFIX) {
            if payload.is_empty() || !payload.chars().all(|c| BASE38_ALPHABET.contains(c)) {
                return Err(SetupCodeError::InvalidQrPayload);
            }
            return Ok(Self::Qr(s.to_string()));
        }
        parse_manual(s).map(Self::Manual)
    }
}

fn parse_manual(s: &str) -> Result<ManualCode, SetupCodeError> {
    let mut digits = Vec::with_capacity(LONG_LEN);
    for c in s.chars().filter(|c| !matches!(c, '-' | ' ')) {
        let digit = c
            .to_digit(10)
            .ok_or(SetupCodeError::InvalidCharacter(c))?;
        digits.push(u8::try_from(digit).map_err(|_| SetupCodeError::InvalidCharacter(c))?);
    }
    if digits.len() != SHORT_LEN && digits.len() != LONG_LEN {
        return Err(SetupCodeError::InvalidLength(digits.len()));
    }
    if !verhoeff::is_valid(&digits) {
        return Err(SetupCodeError::CheckDigit);
    }

    let number = |range: std::ops::Range<usize>| {
        digits[range]
            .iter()
            .fold(0u32, |acc, digit| acc * 10 + u32::from(*digit))
    };

    let leading = digits[0];
    let has_vendor = leading & 0b100 != 0;
    if leading > 7 || has_vendor != (digits.len() == LONG_LEN) {
        return Err(SetupCodeError::VendorFlagMismatch);
    }

    let chunk2 = number(1..6);
    let chunk3 = number(6..10);
    let passcode = (chunk3 << 14) | (chunk2 & 0x3FFF);
    let discriminator_low = (chunk2 >> 14) & 0b11;
    let short_discriminator = ((leading & 0b11) << 2) | discriminator_low as u8;

    check_passcode(passcode)?;

    let (vendor_id, product_id) = if has_vendor {
        let vendor = u16::try_from(number(10..15)).map_err(|_| SetupCodeError::VendorFlagMismatch)?;
        let product = u16::try_from(number(15..20)).map_err(|_| SetupCodeError::VendorFlagMismatch)?;
        (Some(vendor), Some(product))
    } else {
        (None, None)
    };

    Ok(ManualCode {
        passcode,
        short_discriminator,
        vendor_id,
        product_id,
    })
}

fn check_passcode(passcode: u32) -> Result<(), SetupCodeError> {
    let repeated = (0..=9).any(|digit| passcode == digit * 11_111_111);
    if repeated
        || passcode == 12_345_678
        || passcode == 87_654_321
        || passcode > MAX_PASSCODE
    {
        return Err(SetupCodeError::DisallowedPasscode(passcode));
    }
    Ok(())
}

/// Verhoeff dihedral-group check digit.
mod verhoeff {
    const D: [[u8; 10]; 10] = [
        [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
        [1, 2, 3, 4, 0, 6, 7, 8, 9, 5],
        [2, 3, 4, 0, 1, 7, 8, 9, 5, 6],
        [3, 4, 0, 1, 2, 8, 9, 5, 6, 7],
        [4, 0, 1, 2, 3, 9, 5, 6, 7, 8],
        [5, 9, 8, 7, 6, 0, 4, 3, 2, 1],
        [6, 5, 9, 8, 7, 1, 0, 4, 3, 2],
        [7, 6, 5, 9, 8, 2, 1, 0, 4, 3],
        [8, 7, 6, 5, 9, 3, 2, 1, 0, 4],
        [9, 8, 7, 6, 5, 4, 3, 2, 1, 0],
    ];

    const P: [[u8; 10]; 8] = [
        [0, 1, 2, 3, 4, 5, 6, 7, 8, 9],
        [1, 5, 7, 6, 2, 8, 3, 0, 9, 4],
        [5, 8, 0, 3, 7, 9, 6, 1, 4, 2],
        [8, 9, 1, 6, 0, 4, 3, 5, 2, 7],
        [9, 4, 5, 3, 1, 2, 0, 7, 6, 8],
        [4, 2, 8, 6, 5, 7, 3, 9, 0, 1],
        [2, 7, 9, 3, 8, 0, 6, 4, 1, 5],
        [7, 0, 4, 6, 9, 1, 3, 2, 5, 8],
    ];

    const INV: [u8; 10] = [0, 4, 3, 2, 1, 5, 6, 7, 8, 9];

    /// Whether the last digit of `digits` is a correct check digit.
    pub(super) fn is_valid(digits: &[u8]) -> bool {
        let check = digits
            .iter()
            .rev()
            .enumerate()
            .fold(0u8, |c, (i, digit)| D[usize::from(c)][usize::from(P[i % 8][usize::from(*digit)])]);
        check == 0
    }

    /// Check digit to append to `digits`.
    #[cfg(test)]
    pub(super) fn compute(digits: &[u8]) -> u8 {
        let c = digits
            .iter()
            .rev()
            .enumerate()
            .fold(0u8, |c, (i, digit)| {
                D[usize::from(c)][usize::from(P[(i + 1) % 8][usize::from(*digit)])]
            });
        INV[usize::from(c)]
    }
}
