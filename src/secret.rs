//! Shared secret of a TOTP key and its transport encodings.
//!
//! Base32 (RFC 4648, no padding) is the form used in otpauth URIs, Base64 (RFC 4648, padded)
//! is the form used in PEM bodies and Base62 is a compact alphanumeric form.
//!
//! Base62 goes through an arbitrary-precision integer, so leading zero bytes of a secret are
//! not preserved: `[0x00, 0x01]` encodes to `"1"` and decodes back to `[0x01]`.

use std::fmt;

use base32::Alphabet::RFC4648;
use num_bigint::BigUint;
use openssl::base64;

use crate::error::{Error, Result};

const BASE62_ALPHABET: &[u8; 62] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Raw HMAC key material.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Secret(Vec<u8>);

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secret")
            .field("len", &self.0.len())
            .finish_non_exhaustive()
    }
}

impl Secret {
    pub fn from_bytes<B: Into<Vec<u8>>>(bytes: B) -> Self {
        Self(bytes.into())
    }

    /// Decodes an unpadded RFC 4648 Base32 string.
    ///
    /// The alphabet is uppercase only. Padding characters and lengths no unpadded encoding can
    /// produce are rejected.
    pub fn from_base32(encoded: &str) -> Result<Self> {
        if encoded.contains('=')
            || encoded.bytes().any(|b| b.is_ascii_lowercase())
            || matches!(encoded.len() % 8, 1 | 3 | 6)
        {
            return Err(Error::Base32);
        }

        base32::decode(RFC4648 { padding: false }, encoded)
            .map(Self)
            .ok_or(Error::Base32)
    }

    /// Decodes a Base62 string (`0-9`, `a-z`, `A-Z`, most significant digit first).
    pub fn from_base62(encoded: &str) -> Result<Self> {
        let digits = encoded
            .chars()
            .map(base62_digit)
            .collect::<Result<Vec<u8>>>()?;

        if digits.is_empty() {
            return Err(Error::Base62);
        }

        let value = BigUint::from_radix_be(&digits, 62).ok_or(Error::Base62)?;
        if value.bits() == 0 {
            return Ok(Self::default());
        }

        Ok(Self(value.to_bytes_be()))
    }

    /// Decodes a padded RFC 4648 Base64 string.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        base64::decode_block(encoded)
            .map(Self)
            .map_err(Error::Base64)
    }

    pub fn base32(&self) -> String {
        base32::encode(RFC4648 { padding: false }, &self.0)
    }

    pub fn base62(&self) -> String {
        BigUint::from_bytes_be(&self.0)
            .to_radix_be(62)
            .into_iter()
            .map(|digit| BASE62_ALPHABET[digit as usize] as char)
            .collect()
    }

    pub fn base64(&self) -> String {
        base64::encode_block(&self.0)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base32())
    }
}

impl From<Vec<u8>> for Secret {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

fn base62_digit(c: char) -> Result<u8> {
    match c {
        '0'..='9' => Ok(c as u8 - b'0'),
        'a'..='z' => Ok(c as u8 - b'a' + 10),
        'A'..='Z' => Ok(c as u8 - b'A' + 36),
        _ => Err(Error::Base62Charset(c)),
    }
}
