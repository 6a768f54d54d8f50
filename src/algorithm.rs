//! Hash algorithm choice for the HMAC step.

use std::borrow::Cow;
use std::fmt;

use crate::error::{Error, Result};
use crate::hotp::HmacAlgorithm;

/// Uppercase name of the hash used for HMAC.
///
/// Any string can be held so that values read from URIs and PEM headers survive a round
/// trip; only MD5, SHA1, SHA256 and SHA512 are usable for passcodes. The empty algorithm is
/// the zero value filled in by `Options::set_default`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Algorithm(Cow<'static, str>);

impl Algorithm {
    pub const MD5: Algorithm = Algorithm(Cow::Borrowed("MD5"));
    pub const SHA1: Algorithm = Algorithm(Cow::Borrowed("SHA1"));
    pub const SHA256: Algorithm = Algorithm(Cow::Borrowed("SHA256"));
    pub const SHA512: Algorithm = Algorithm(Cow::Borrowed("SHA512"));

    /// Wraps any name, uppercased. Use `is_supported` before relying on it.
    pub fn new(name: &str) -> Self {
        Self(Cow::Owned(name.to_uppercase()))
    }

    /// Case-insensitive constructor accepting only the supported names.
    pub fn from_name(name: &str) -> Result<Self> {
        let algo = Self::new(name);
        if algo.is_supported() {
            Ok(algo)
        } else {
            Err(Error::InvalidAlgorithmName)
        }
    }

    /// Constructor from the numeric ids of the HMAC-OTP primitive.
    pub fn from_id(id: i32) -> Result<Self> {
        u8::try_from(id)
            .ok()
            .and_then(HmacAlgorithm::from_id)
            .map(Self::from)
            .ok_or(Error::InvalidAlgorithmId(id))
    }

    /// Numeric id used by the HMAC-OTP primitive, `None` when unsupported.
    pub fn id(&self) -> Option<u8> {
        self.hmac().map(HmacAlgorithm::id)
    }

    pub fn is_supported(&self) -> bool {
        self.hmac().is_some()
    }

    /// Mapping to the primitive's hash, `None` is the "unsupported" sentinel.
    pub fn hmac(&self) -> Option<HmacAlgorithm> {
        match self.as_str() {
            "MD5" => Some(HmacAlgorithm::Md5),
            "SHA1" => Some(HmacAlgorithm::Sha1),
            "SHA256" => Some(HmacAlgorithm::Sha256),
            "SHA512" => Some(HmacAlgorithm::Sha512),
            _ => None,
        }
    }

    /// Same as `hmac` but failing with `unsupported algorithm: <name>`.
    pub fn require_hmac(&self) -> Result<HmacAlgorithm> {
        self.hmac()
            .ok_or_else(|| Error::UnsupportedAlgorithm(self.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<HmacAlgorithm> for Algorithm {
    fn from(hmac: HmacAlgorithm) -> Self {
        match hmac {
            HmacAlgorithm::Md5 => Self::MD5,
            HmacAlgorithm::Sha1 => Self::SHA1,
            HmacAlgorithm::Sha256 => Self::SHA256,
            HmacAlgorithm::Sha512 => Self::SHA512,
        }
    }
}

impl From<&str> for Algorithm {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
