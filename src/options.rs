//! Key configuration and the option functions that adjust it.

use std::fmt;
use std::sync::Arc;

use openssl::pkey::{PKey, Private, Public};

use crate::algorithm::Algorithm;
use crate::digits::Digits;
use crate::error::{Error, Result};

/// Authenticator apps generally only support SHA1.
pub const OPTION_ALGORITHM_DEFAULT: Algorithm = Algorithm::SHA1;
/// Seconds, as recommended by RFC 6238.
pub const OPTION_PERIOD_DEFAULT: u32 = 30;
/// Bytes.
pub const OPTION_SECRET_SIZE_DEFAULT: u32 = 128;
/// Periods of tolerance on either side of the current one.
pub const OPTION_SKEW_DEFAULT: u32 = 1;
/// Authenticator apps generally only support six digits.
pub const OPTION_DIGITS_DEFAULT: Digits = Digits::SIX;

/// Key derivation function turning an ECDH shared secret into a TOTP secret.
///
/// Called as `kdf(shared_secret, context, out_len)`; it must be deterministic, use `context`
/// for domain separation and return exactly `out_len` bytes or an error.
pub type Kdf = Arc<dyn Fn(&[u8], &[u8], usize) -> Result<Vec<u8>> + Send + Sync>;

/// Key agreement material set by `with_ecdh`.
#[derive(Clone)]
pub struct EcdhKeys {
    pub(crate) local: PKey<Private>,
    pub(crate) remote: PKey<Public>,
    pub(crate) context: String,
}

impl fmt::Debug for EcdhKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcdhKeys")
            .field("local", &self.local.id().as_raw())
            .field("remote", &self.remote.id().as_raw())
            .field("context", &self.context)
            .finish()
    }
}

/// Options of a TOTP key.
///
/// `Options::default()` holds zero values only; call `set_default` (or build through
/// `Options::new`) before generating a key from it.
#[derive(Clone)]
pub struct Options {
    /// Name of the issuer of the secret (organization, company, domain).
    pub issuer: String,
    /// Name of the secret owner, usually an email address.
    pub account_name: String,
    /// Hash used for HMAC.
    pub algorithm: Algorithm,
    /// Seconds a passcode is valid for.
    pub period: u32,
    /// Size of a generated secret in bytes.
    pub secret_size: u32,
    /// Periods before or after the current time to accept. Values greater than 1 are likely
    /// sketchy.
    pub skew: u32,
    pub digits: Digits,
    pub(crate) ecdh: Option<EcdhKeys>,
    pub(crate) kdf: Option<Kdf>,
    pub(crate) secret_query_first: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            issuer: String::new(),
            account_name: String::new(),
            algorithm: Algorithm::default(),
            period: 0,
            secret_size: 0,
            skew: 0,
            digits: Digits::default(),
            ecdh: None,
            kdf: None,
            secret_query_first: true,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("issuer", &self.issuer)
            .field("account_name", &self.account_name)
            .field("algorithm", &self.algorithm)
            .field("period", &self.period)
            .field("secret_size", &self.secret_size)
            .field("skew", &self.skew)
            .field("digits", &self.digits)
            .field("ecdh", &self.ecdh)
            .field("custom_kdf", &self.kdf.is_some())
            .field("secret_query_first", &self.secret_query_first)
            .finish()
    }
}

/// Compares the persisted fields and the URI rendering preference. Key agreement material
/// is not part of the comparison.
impl PartialEq for Options {
    fn eq(&self, other: &Self) -> bool {
        self.issuer == other.issuer
            && self.account_name == other.account_name
            && self.algorithm == other.algorithm
            && self.period == other.period
            && self.secret_size == other.secret_size
            && self.skew == other.skew
            && self.digits == other.digits
            && self.secret_query_first == other.secret_query_first
    }
}

impl Options {
    /// Options with default values. Issuer and account name are required.
    pub fn new(issuer: impl Into<String>, account_name: impl Into<String>) -> Result<Self> {
        let issuer = issuer.into();
        let account_name = account_name.into();
        if issuer.is_empty() || account_name.is_empty() {
            return Err(Error::MissingIdentity);
        }

        let mut opts = Self {
            issuer,
            account_name,
            ..Self::default()
        };
        opts.set_default();

        Ok(opts)
    }

    /// Sets the zero-valued fields to their default value.
    pub fn set_default(&mut self) {
        if self.algorithm.is_empty() {
            self.algorithm = OPTION_ALGORITHM_DEFAULT;
        }
        if self.period == 0 {
            self.period = OPTION_PERIOD_DEFAULT;
        }
        if self.secret_size == 0 {
            self.secret_size = OPTION_SECRET_SIZE_DEFAULT;
        }
        if self.digits.is_zero() {
            self.digits = OPTION_DIGITS_DEFAULT;
        }
        if self.skew == 0 {
            self.skew = OPTION_SKEW_DEFAULT;
        }
    }

    pub fn apply<I>(&mut self, options: I) -> Result<()>
    where
        I: IntoIterator<Item = KeyOption>,
    {
        options.into_iter().try_for_each(|opt| opt.apply(self))
    }

    /// Whether `Key::uri` puts `secret` first instead of sorting it with the rest.
    pub fn secret_query_first(&self) -> bool {
        self.secret_query_first
    }

    /// Whether a generated key derives its secret from ECDH keys.
    pub fn uses_ecdh(&self) -> bool {
        self.ecdh.is_some()
    }
}

/// A single modification of `Options`, validated when applied.
#[derive(Clone)]
pub enum KeyOption {
    Algorithm(Algorithm),
    Digits(Digits),
    Period(u32),
    SecretSize(u32),
    Skew(u32),
    SecretQueryFirst(bool),
    Ecdh(EcdhKeys),
    EcdhKdf(Kdf),
}

impl fmt::Debug for KeyOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Algorithm(a) => f.debug_tuple("Algorithm").field(a).finish(),
            Self::Digits(d) => f.debug_tuple("Digits").field(d).finish(),
            Self::Period(p) => f.debug_tuple("Period").field(p).finish(),
            Self::SecretSize(s) => f.debug_tuple("SecretSize").field(s).finish(),
            Self::Skew(s) => f.debug_tuple("Skew").field(s).finish(),
            Self::SecretQueryFirst(b) => f.debug_tuple("SecretQueryFirst").field(b).finish(),
            Self::Ecdh(keys) => f.debug_tuple("Ecdh").field(keys).finish(),
            Self::EcdhKdf(_) => f.write_str("EcdhKdf(..)"),
        }
    }
}

impl KeyOption {
    pub fn apply(self, opts: &mut Options) -> Result<()> {
        match self {
            Self::Algorithm(algo) => {
                algo.require_hmac()?;
                opts.algorithm = algo;
            }
            Self::Digits(digits) => opts.digits = digits,
            Self::Period(period) => opts.period = period,
            Self::SecretSize(size) => opts.secret_size = size,
            Self::Skew(skew) => opts.skew = skew,
            Self::SecretQueryFirst(choice) => opts.secret_query_first = choice,
            Self::Ecdh(keys) => {
                if keys.context.is_empty() {
                    return Err(Error::MissingContext);
                }
                opts.ecdh = Some(keys);
            }
            Self::EcdhKdf(kdf) => opts.kdf = Some(kdf),
        }
        Ok(())
    }
}

/// Hash for HMAC. Rejects anything but MD5, SHA1, SHA256 and SHA512.
pub fn with_algorithm(algo: impl Into<Algorithm>) -> KeyOption {
    KeyOption::Algorithm(algo.into())
}

pub fn with_digits(digits: impl Into<Digits>) -> KeyOption {
    KeyOption::Digits(digits.into())
}

pub fn with_period(period: u32) -> KeyOption {
    KeyOption::Period(period)
}

pub fn with_secret_size(size: u32) -> KeyOption {
    KeyOption::SecretSize(size)
}

/// Periods before or after the current time to accept. 1 allows up to one `period` either
/// side.
pub fn with_skew(skew: u32) -> KeyOption {
    KeyOption::Skew(skew)
}

/// When true (default) the URI reads `?secret=...&algorithm=...` with the rest sorted; when
/// false every parameter, `secret` included, is sorted alphabetically.
pub fn with_secret_query_first(choice: bool) -> KeyOption {
    KeyOption::SecretQueryFirst(choice)
}

/// Derives the secret from the ECDH shared secret of `local` and `remote` instead of
/// generating it randomly.
///
/// Both keys must be on the same curve, and both parties must use the same `context`, for
/// instance `"[issuer] [sorted account names] [purpose] [version]"`:
///
/// `"example.com alice@example.com bob@example.com TOTP secret v1"`
pub fn with_ecdh(local: PKey<Private>, remote: PKey<Public>, context: impl Into<String>) -> KeyOption {
    KeyOption::Ecdh(EcdhKeys {
        local,
        remote,
        context: context.into(),
    })
}

/// Replaces the default KDF (HKDF-SHA512) used with `with_ecdh`.
pub fn with_ecdh_kdf<F>(kdf: F) -> KeyOption
where
    F: Fn(&[u8], &[u8], usize) -> Result<Vec<u8>> + Send + Sync + 'static,
{
    KeyOption::EcdhKdf(Arc::new(kdf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_fills_defaults() {
        let opts = Options::new("Example.com", "alice@example.com").unwrap();

        assert_eq!(opts.issuer, "Example.com");
        assert_eq!(opts.account_name, "alice@example.com");
        assert_eq!(opts.algorithm, Algorithm::SHA1);
        assert_eq!(opts.period, 30);
        assert_eq!(opts.secret_size, 128);
        assert_eq!(opts.skew, 1);
        assert_eq!(opts.digits, Digits::SIX);
        assert!(opts.secret_query_first());
        assert!(!opts.uses_ecdh());
    }

    #[test]
    fn new_requires_identity() {
        for (issuer, account) in [("", "alice@example.com"), ("Example.com", ""), ("", "")] {
            let err = Options::new(issuer, account).unwrap_err();
            assert_eq!(err.to_string(), "issuer and accountName are required");
        }
    }

    #[test]
    fn set_default_keeps_set_fields() {
        let mut opts = Options {
            algorithm: Algorithm::SHA512,
            period: 60,
            digits: Digits::EIGHT,
            ..Options::default()
        };
        opts.set_default();

        assert_eq!(opts.algorithm, Algorithm::SHA512);
        assert_eq!(opts.period, 60);
        assert_eq!(opts.digits, Digits::EIGHT);
        assert_eq!(opts.secret_size, OPTION_SECRET_SIZE_DEFAULT);
        assert_eq!(opts.skew, OPTION_SKEW_DEFAULT);
    }

    #[test]
    fn option_functions() {
        let mut opts = Options::new("Example.com", "alice@example.com").unwrap();
        opts.apply([
            with_algorithm("sha256"),
            with_digits(Digits::EIGHT),
            with_period(15),
            with_secret_size(256),
            with_skew(0),
            with_secret_query_first(false),
        ])
        .unwrap();

        assert_eq!(opts.algorithm, Algorithm::SHA256);
        assert_eq!(opts.digits, Digits::EIGHT);
        assert_eq!(opts.period, 15);
        assert_eq!(opts.secret_size, 256);
        assert_eq!(opts.skew, 0);
        assert!(!opts.secret_query_first());
    }

    #[test]
    fn unsupported_algorithm_is_rejected_on_apply() {
        let mut opts = Options::new("Example.com", "alice@example.com").unwrap();
        let err = with_algorithm("BADALGO").apply(&mut opts).unwrap_err();

        assert_eq!(err.to_string(), "unsupported algorithm: BADALGO");
        assert_eq!(opts.algorithm, Algorithm::SHA1);
    }

    #[test]
    fn ecdh_requires_context() {
        let local = PKey::generate_x25519().unwrap();
        let remote = PKey::public_key_from_raw_bytes(
            &local.raw_public_key().unwrap(),
            openssl::pkey::Id::X25519,
        )
        .unwrap();

        let mut opts = Options::new("Example.com", "alice@example.com").unwrap();
        assert!(matches!(
            with_ecdh(local.clone(), remote.clone(), "").apply(&mut opts),
            Err(Error::MissingContext)
        ));
        assert!(!opts.uses_ecdh());

        with_ecdh(local, remote, "ctx").apply(&mut opts).unwrap();
        assert!(opts.uses_ecdh());
    }

    #[test]
    fn equality_ignores_key_agreement_material() {
        let a = Options::new("Example.com", "alice@example.com").unwrap();
        let mut b = a.clone();
        with_ecdh_kdf(|_, _, len| Ok(vec![0; len])).apply(&mut b).unwrap();

        assert_eq!(a, b);
        assert!(format!("{:?}", b).contains("custom_kdf: true"));
    }
}
