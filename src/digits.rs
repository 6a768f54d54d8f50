use std::fmt;

use crate::str_to_uint;

/// Number of digits of a passcode. Six and eight are the values authenticator apps use.
///
/// Other counts are carried verbatim (e.g. when read from a URI) but passcodes for them are
/// computed with six digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Digits(u32);

impl Digits {
    pub const SIX: Digits = Digits(6);
    pub const EIGHT: Digits = Digits(8);

    pub const fn new(digits: u32) -> Self {
        Self(digits)
    }

    /// Negative values fall back to `Digits::SIX`.
    pub fn from_int(digits: i64) -> Self {
        match u32::try_from(digits) {
            Ok(d) => Self(d),
            Err(_) if digits < 0 => Self::SIX,
            Err(_) => Self(0),
        }
    }

    /// Decimal string to digits; malformed or overflowing input gives zero digits.
    pub fn from_str_lossy(digits: &str) -> Self {
        Self(str_to_uint(digits))
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Digit count handed to the HMAC-OTP primitive.
    pub fn otp_digits(self) -> u32 {
        match self {
            Self::EIGHT => 8,
            _ => 6,
        }
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Digits {
    fn from(digits: u32) -> Self {
        Self(digits)
    }
}

impl fmt::Display for Digits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
