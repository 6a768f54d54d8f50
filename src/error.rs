use openssl::error::ErrorStack;
use thiserror::Error;

/// Error type
#[derive(Debug, Error)]
pub enum Error {
    /// Issuer or account name is empty
    #[error("issuer and accountName are required")]
    MissingIdentity,
    /// Algorithm outside of MD5, SHA1, SHA256 and SHA512
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// Algorithm name rejected by `Algorithm::from_name`
    #[error("unsupported algorithm. it should be MD5, SHA1, SHA256 or SHA512")]
    InvalidAlgorithmName,
    /// Numeric algorithm id outside of 0..=3
    #[error("invalid algorithm ID. it should be 0, 1, 2 or 3")]
    InvalidAlgorithmId(i32),
    #[error("unsupported fix level: {0}")]
    UnsupportedFixLevel(u8),
    /// ECDH option given with an empty context string
    #[error("context is required to derive a secret from ECDH keys")]
    MissingContext,

    #[error("failed to decode base32 string")]
    Base32,
    /// Base62 input contains a character outside `[0-9a-zA-Z]`
    #[error("failed to decode base62 string: invalid character {0:?}")]
    Base62Charset(char),
    /// Base62 input is well-formed but cannot be turned into an integer
    #[error("failed to decode base62 string")]
    Base62,
    #[error("failed to decode base64 string")]
    Base64(#[source] ErrorStack),

    #[error("invalid scheme. it always should be `otpauth`")]
    InvalidScheme,
    #[error("invalid host. it always should be `totp`")]
    InvalidHost,
    #[error("missing issuer or issuer is not set correctly")]
    MissingIssuer,
    #[error("missing account name")]
    MissingAccountName,
    #[error("missing secret")]
    MissingSecret,
    #[error("missing algorithm")]
    MissingAlgorithm,
    #[error("missing digits or zero digits set")]
    MissingDigits,
    #[error("missing period or zero period set")]
    MissingPeriod,
    #[error("secret size is too large: {0} bytes")]
    SecretTooLarge(u32),
    /// RFC 4226 requires at least 128 bits of shared secret
    #[error("secret is too short. it should be at least 16 bytes")]
    SecretTooShort,

    #[error("failed to encode key to PEM")]
    PemEncode,
    #[error("failed to decode PEM block containing TOTP secret key")]
    PemNotFound,

    #[error("private key and public key curves do not match")]
    CurveMismatch,
    /// KDF asked for, or returned, an unusable number of bytes
    #[error("invalid output length: {0}")]
    InvalidOutputLength(usize),

    #[error("period must be greater than zero")]
    ZeroPeriod,
    #[error("times before the unix epoch are not supported")]
    BeforeEpoch,

    #[error("crypto backend error: {0}")]
    Crypto(#[from] ErrorStack),

    /// Another error with a short description of the failed step
    #[error("{context}: {source}")]
    Context {
        context: &'static str,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Innermost error, skipping every `Context` layer.
    pub fn root(&self) -> &Error {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Attaches a context message to the error side of a `Result`.
pub(crate) trait ResultExt<T> {
    fn context(self, context: &'static str) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: &'static str) -> Result<T> {
        self.map_err(|e| Error::Context {
            context,
            source: Box::new(e.into()),
        })
    }
}
