//! otpkey is a Rust library for managing Time-based One-time Password keys as per RFC 6238:
//! random or ECDH-derived secrets, passcodes with clock skew tolerance, otpauth URIs as read
//! by Google Authenticator and Authy, and PEM persistence.
//!
//! ```rust
//! use otpkey::{generate_key, gen_key_from_uri, with_digits, Digits};
//!
//! let key = generate_key("Example.com", "alice@example.com", [with_digits(Digits::EIGHT)])?;
//! let code = key.pass_code()?;
//! assert!(key.validate(&code));
//!
//! // register `key.uri()` with an authenticator app, store `key.pem()?`
//! let again = gen_key_from_uri(&key.uri())?;
//! assert_eq!(again.secret, key.secret);
//! # Ok::<(), otpkey::Error>(())
//! ```

pub mod algorithm;
pub mod clock;
pub mod digits;
pub mod ecdh;
pub mod error;
pub mod fix_level;
pub mod hotp;
pub mod key;
pub mod options;
pub mod secret;
pub mod uri;

pub use algorithm::Algorithm;
pub use clock::{Clock, FixedClock, SystemClock};
pub use digits::Digits;
pub use error::{Error, Result};
pub use fix_level::{FixLevel, QrCode};
pub use key::{
    gen_key_from_pem, gen_key_from_uri, generate_key, generate_key_custom,
    generate_key_custom_with, validate, Backend, Key, PemEncoder, BLOCK_TYPE_TOTP,
};
pub use options::{
    with_algorithm, with_digits, with_ecdh, with_ecdh_kdf, with_period, with_secret_query_first,
    with_secret_size, with_skew, KeyOption, Options,
};
pub use secret::Secret;
pub use uri::{OtpType, Uri};

/// Decimal string to `u32`, `None` when malformed or out of range.
pub fn parse_uint(s: &str) -> Option<u32> {
    s.parse().ok()
}

/// Decimal string to `u32`, 0 when malformed or out of range.
///
/// 0 cannot be told apart from a legitimate zero; use `parse_uint` where that matters.
pub fn str_to_uint(s: &str) -> u32 {
    parse_uint(s).unwrap_or(0)
}
