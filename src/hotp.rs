//! HMAC-based one-time passwords (RFC 4226) over a time counter (RFC 6238).
//!
//! This is the single-factor primitive the key layer delegates to. It only knows about
//! Base32 secrets, counters, digit counts and hash functions; issuers, URIs and PEM blocks
//! live above it. `OtpPrimitive` is the seam that lets callers (and tests) replace it.
//!
//! ```rust
//! use otpkey::hotp::{make_hotp, HmacAlgorithm};
//! // secret, counter, digits, hash
//! assert_eq!(make_hotp("base32secret3232", 0, 6, HmacAlgorithm::Sha1).unwrap(), "260182");
//! ```

use std::io::Cursor;

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use log::debug;
use openssl::hash::MessageDigest;
use openssl::memcmp;
use openssl::pkey::{PKey, Private};
use openssl::rand::rand_bytes;
use openssl::sign::Signer;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::secret::Secret;

/// Secret size used when `GenerateOpts::secret_size` is zero.
const FALLBACK_SECRET_SIZE: u32 = 20;
/// Largest random secret, in bytes. Matches what HKDF-SHA512 can derive.
pub const MAX_SECRET_SIZE: u32 = 255 * 64;

/// Hash functions the primitive can run HMAC with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HmacAlgorithm {
    Sha1,
    Sha256,
    Sha512,
    Md5,
}

impl HmacAlgorithm {
    pub fn id(self) -> u8 {
        match self {
            Self::Sha1 => 0,
            Self::Sha256 => 1,
            Self::Sha512 => 2,
            Self::Md5 => 3,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Sha1),
            1 => Some(Self::Sha256),
            2 => Some(Self::Sha512),
            3 => Some(Self::Md5),
            _ => None,
        }
    }

    fn message_digest(self) -> MessageDigest {
        match self {
            Self::Sha1 => MessageDigest::sha1(),
            Self::Sha256 => MessageDigest::sha256(),
            Self::Sha512 => MessageDigest::sha512(),
            Self::Md5 => MessageDigest::md5(),
        }
    }
}

/// Parameters for computing or checking a time-based passcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidateOpts {
    /// Seconds per counter step.
    pub period: u32,
    /// Counter steps tolerated on either side when validating.
    pub skew: u32,
    pub digits: u32,
    pub algorithm: HmacAlgorithm,
}

/// Parameters for creating a fresh random secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateOpts {
    pub issuer: String,
    pub account_name: String,
    pub period: u32,
    pub secret_size: u32,
    pub digits: u32,
    pub algorithm: HmacAlgorithm,
}

/// The single-factor HMAC-OTP operations keys are built on.
pub trait OtpPrimitive: Send + Sync {
    /// Passcode for `time`, `secret` being unpadded Base32.
    fn generate_code(&self, secret: &str, time: OffsetDateTime, opts: &ValidateOpts)
        -> Result<String>;

    /// Whether `passcode` matches any counter within `opts.skew` steps of `time`.
    fn validate(
        &self,
        passcode: &str,
        secret: &str,
        time: OffsetDateTime,
        opts: &ValidateOpts,
    ) -> Result<bool>;

    /// New random secret, returned as unpadded Base32.
    fn generate(&self, opts: &GenerateOpts) -> Result<String>;
}

/// `OtpPrimitive` backed by OpenSSL.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hotp;

impl OtpPrimitive for Hotp {
    fn generate_code(
        &self,
        secret: &str,
        time: OffsetDateTime,
        opts: &ValidateOpts,
    ) -> Result<String> {
        let counter = counter_at(time, opts.period)?;
        make_hotp(secret, counter, opts.digits, opts.algorithm)
    }

    fn validate(
        &self,
        passcode: &str,
        secret: &str,
        time: OffsetDateTime,
        opts: &ValidateOpts,
    ) -> Result<bool> {
        let passcode = passcode.trim();
        if passcode.len() != opts.digits as usize {
            return Ok(false);
        }

        let pkey = hmac_key(secret)?;
        for counter in window(counter_at(time, opts.period)?, opts.skew) {
            match hotp_with_key(&pkey, counter, opts.digits, opts.algorithm) {
                Ok(code) if memcmp::eq(code.as_bytes(), passcode.as_bytes()) => return Ok(true),
                Ok(_) => {}
                Err(e) => debug!("skipping counter {} of the validation window: {}", counter, e),
            }
        }

        Ok(false)
    }

    fn generate(&self, opts: &GenerateOpts) -> Result<String> {
        if opts.issuer.is_empty() || opts.account_name.is_empty() {
            return Err(Error::MissingIdentity);
        }

        let size = match opts.secret_size {
            0 => FALLBACK_SECRET_SIZE,
            size if size > MAX_SECRET_SIZE => return Err(Error::SecretTooLarge(size)),
            size => size,
        };
        let mut buf = vec![0u8; size as usize];
        rand_bytes(&mut buf)?;

        Ok(Secret::from_bytes(buf).base32())
    }
}

/// Decodes a secret (given as an RFC4648 base32-encoded ASCII string)
/// into an HMAC key. Surrounding whitespace and lowercase letters are tolerated.
fn hmac_key(secret: &str) -> Result<PKey<Private>> {
    let decoded = Secret::from_base32(&secret.trim().to_uppercase())?;
    Ok(PKey::hmac(decoded.bytes())?)
}

/// Calculates the HMAC digest for the given key and counter.
fn calc_digest(pkey: &PKey<Private>, counter: u64, algorithm: HmacAlgorithm) -> Result<Vec<u8>> {
    let mut msg = [0u8; 8];
    BigEndian::write_u64(&mut msg, counter);
    let mut signer = Signer::new(algorithm.message_digest(), pkey)?;
    signer.update(&msg)?;
    Ok(signer.sign_to_vec()?)
}

/// Dynamic truncation of the HMAC digest into a `digits` long integer.
///
/// The offset nibble can point past the end of a 16 byte MD5 digest, so it is clamped to the
/// last four bytes.
fn encode_digest(digest: &[u8], digits: u32) -> Option<u32> {
    let offset = (*digest.last()? as usize & 0xf).min(digest.len().checked_sub(4)?);
    let mut cursor = Cursor::new(digest.get(offset..)?);
    let modulus = 10u32.checked_pow(digits)?;
    cursor
        .read_u32::<BigEndian>()
        .ok()
        .map(|code| (code & 0x7fff_ffff) % modulus)
}

fn hotp_with_key(
    pkey: &PKey<Private>,
    counter: u64,
    digits: u32,
    algorithm: HmacAlgorithm,
) -> Result<String> {
    let digest = calc_digest(pkey, counter, algorithm)?;
    let code = encode_digest(&digest, digits).ok_or(Error::InvalidOutputLength(digest.len()))?;
    Ok(format!("{:0width$}", code, width = digits as usize))
}

/// Performs the [HMAC-based One-time Password Algorithm](http://en.wikipedia.org/wiki/HMAC-based_One-time_Password_Algorithm)
/// (HOTP) given an RFC4648 base32 encoded secret and an integer counter.
pub fn make_hotp(
    secret: &str,
    counter: u64,
    digits: u32,
    algorithm: HmacAlgorithm,
) -> Result<String> {
    hotp_with_key(&hmac_key(secret)?, counter, digits, algorithm)
}

/// RFC 6238 time step: `floor(unix_time / period)`. Times before the
/// Unix epoch are not supported.
pub fn counter_at(time: OffsetDateTime, period: u32) -> Result<u64> {
    if period == 0 {
        return Err(Error::ZeroPeriod);
    }
    let secs = u64::try_from(time.unix_timestamp()).map_err(|_| Error::BeforeEpoch)?;
    Ok(secs / u64::from(period))
}

/// Counters to try when validating: the current one first, then alternating
/// later/earlier steps out to `skew`.
fn window(center: u64, skew: u32) -> impl Iterator<Item = u64> {
    let around = (1..=u64::from(skew)).flat_map(move |i| {
        [center.checked_add(i), center.checked_sub(i)]
            .into_iter()
            .flatten()
    });
    std::iter::once(center).chain(around)
}
