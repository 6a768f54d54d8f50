//! TOTP keys: generation, passcodes, PEM persistence and otpauth URIs.

use std::fmt;
use std::sync::Arc;

use log::{debug, warn};
use pem::{EncodeConfig, LineEnding, Pem};
use time::{OffsetDateTime, UtcOffset};

use crate::algorithm::Algorithm;
use crate::clock::{Clock, SystemClock};
use crate::digits::Digits;
use crate::ecdh;
use crate::error::{Error, Result, ResultExt};
use crate::fix_level::{FixLevel, QrCode};
use crate::hotp::{GenerateOpts, Hotp, OtpPrimitive, ValidateOpts};
use crate::options::{KeyOption, Options, OPTION_SKEW_DEFAULT};
use crate::secret::Secret;
use crate::str_to_uint;
use crate::uri::{encode_label, encode_query, Uri, SCHEME};

/// Type tag of the PEM block holding a key.
pub const BLOCK_TYPE_TOTP: &str = "TOTP SECRET KEY";

const PEM_BEGIN: &str = "-----BEGIN ";

/// Turns a PEM block into text. An empty string means the encoding failed.
pub trait PemEncoder: Send + Sync {
    fn encode(&self, block: &Pem) -> String;
}

/// `pem` crate encoder with LF line endings and 64 column lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdPemEncoder;

impl PemEncoder for StdPemEncoder {
    fn encode(&self, block: &Pem) -> String {
        pem::encode_config(block, EncodeConfig::new().set_line_ending(LineEnding::LF))
    }
}

/// Collaborators a key computes with.
#[derive(Clone)]
pub struct Backend {
    clock: Arc<dyn Clock>,
    otp: Arc<dyn OtpPrimitive>,
    pem: Arc<dyn PemEncoder>,
}

impl Default for Backend {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            otp: Arc::new(Hotp),
            pem: Arc::new(StdPemEncoder),
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend").finish_non_exhaustive()
    }
}

impl Backend {
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_otp(mut self, otp: impl OtpPrimitive + 'static) -> Self {
        self.otp = Arc::new(otp);
        self
    }

    pub fn with_pem_encoder(mut self, encoder: impl PemEncoder + 'static) -> Self {
        self.pem = Arc::new(encoder);
        self
    }
}

/// A TOTP secret and the options it is used with.
///
/// The fields are public so that a key can be rebuilt from stored values. Mutating them
/// while another thread computes passcodes needs external synchronization.
#[derive(Clone)]
pub struct Key {
    pub secret: Secret,
    pub options: Options,
    backend: Backend,
}

impl Key {
    pub fn new(secret: Secret, options: Options) -> Self {
        Self {
            secret,
            options,
            backend: Backend::default(),
        }
    }

    /// Same key computing with `backend`.
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Passcode for the current time, e.g. `"123456"` or `"12345678"`.
    pub fn pass_code(&self) -> Result<String> {
        self.pass_code_custom(self.backend.clock.now())
    }

    /// Passcode for `time`.
    pub fn pass_code_custom(&self, time: OffsetDateTime) -> Result<String> {
        let opts = self.validate_opts()?;
        self.backend
            .otp
            .generate_code(&self.secret.base32(), time.to_offset(UtcOffset::UTC), &opts)
    }

    /// Whether `passcode` is valid now, give or take `skew` periods.
    pub fn validate(&self, passcode: &str) -> bool {
        self.validate_custom(passcode, self.backend.clock.now())
    }

    /// Whether `passcode` is valid at `time`, give or take `skew` periods.
    ///
    /// A failure of the underlying computation counts as a mismatch.
    pub fn validate_custom(&self, passcode: &str, time: OffsetDateTime) -> bool {
        let result = self.validate_opts().and_then(|opts| {
            self.backend.otp.validate(
                passcode,
                &self.secret.base32(),
                time.to_offset(UtcOffset::UTC),
                &opts,
            )
        });

        result.unwrap_or_else(|e| {
            warn!("passcode validation failed: {}", e);
            false
        })
    }

    /// PEM block carrying the secret as its body and the options as headers.
    ///
    /// Header values may contain `:`. A line break in a value fails with `Error::PemEncode`.
    pub fn pem(&self) -> Result<String> {
        let opts = &self.options;
        let headers = [
            ("Account Name", opts.account_name.clone()),
            ("Algorithm", opts.algorithm.to_string()),
            ("Digits", opts.digits.to_string()),
            ("Issuer", opts.issuer.clone()),
            ("Period", opts.period.to_string()),
            ("Secret Size", opts.secret_size.to_string()),
            ("Skew", opts.skew.to_string()),
        ];

        let block = Pem::new(BLOCK_TYPE_TOTP, self.secret.bytes().to_vec());
        let out = self.backend.pem.encode(&block);
        if out.is_empty() {
            return Err(Error::PemEncode);
        }

        with_headers(&out, &headers).ok_or(Error::PemEncode)
    }

    /// otpauth URI rebuilt from the current secret and options.
    pub fn uri(&self) -> String {
        let opts = &self.options;
        let algorithm = opts.algorithm.to_string();
        let digits = opts.digits.to_string();
        let period = opts.period.to_string();
        let secret = self.secret.base32();

        let query = encode_query(
            [
                ("issuer", opts.issuer.as_str()),
                ("algorithm", algorithm.as_str()),
                ("digits", digits.as_str()),
                ("secret", secret.as_str()),
                ("period", period.as_str()),
            ],
            opts.secret_query_first,
        );

        format!(
            "{}://totp/{}?{}",
            SCHEME,
            encode_label(&opts.issuer, &opts.account_name),
            query
        )
    }

    /// QR code request for registering the key with an authenticator app.
    pub fn qr_code(&self, level: FixLevel) -> Result<QrCode> {
        if !level.is_valid() {
            return Err(Error::UnsupportedFixLevel(level.0));
        }

        Ok(QrCode {
            uri: Uri::new(self.uri()),
            level,
        })
    }

    fn validate_opts(&self) -> Result<ValidateOpts> {
        Ok(ValidateOpts {
            period: self.options.period,
            skew: self.options.skew,
            digits: self.options.digits.otp_digits(),
            algorithm: self.options.algorithm.require_hmac()?,
        })
    }
}

impl Default for Key {
    fn default() -> Self {
        Self::new(Secret::default(), Options::default())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("secret", &self.secret)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.secret == other.secret && self.options == other.options
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// New key for `issuer` and `account_name` with default options, adjusted by `options`.
pub fn generate_key<I>(issuer: &str, account_name: &str, options: I) -> Result<Key>
where
    I: IntoIterator<Item = KeyOption>,
{
    let mut opts = Options::new(issuer, account_name)
        .context("failed to create options during key generation")?;
    opts.apply(options).context("failed to apply custom options")?;

    generate_key_custom(opts)
}

/// New key with exactly `options`. Zero-valued fields are not defaulted.
pub fn generate_key_custom(options: Options) -> Result<Key> {
    generate_key_custom_with(options, Backend::default())
}

/// `generate_key_custom` computing with `backend`.
pub fn generate_key_custom_with(options: Options, backend: Backend) -> Result<Key> {
    if options.issuer.is_empty() || options.account_name.is_empty() {
        return Err(Error::MissingIdentity);
    }
    let algorithm = options.algorithm.require_hmac()?;

    let secret = match &options.ecdh {
        Some(keys) => {
            debug!("deriving TOTP secret from ECDH key agreement");
            ecdh::derive_secret(keys, options.kdf.as_ref(), options.secret_size)?
        }
        None => {
            debug!("generating random TOTP secret of {} bytes", options.secret_size);
            let encoded = backend
                .otp
                .generate(&GenerateOpts {
                    issuer: options.issuer.clone(),
                    account_name: options.account_name.clone(),
                    period: options.period,
                    secret_size: options.secret_size,
                    digits: options.digits.otp_digits(),
                    algorithm,
                })
                .context("failed to generate key")?;

            Secret::from_base32(&encoded).context("failed to create secret")?
        }
    };

    Ok(Key {
        secret,
        options,
        backend,
    })
}

/// Splices `headers` into an encoded block, right after its BEGIN line.
fn with_headers(encoded: &str, headers: &[(&str, String)]) -> Option<String> {
    let (begin, rest) = encoded.split_once('\n')?;
    let (begin, eol) = match begin.strip_suffix('\r') {
        Some(begin) => (begin, "\r\n"),
        None => (begin, "\n"),
    };

    let mut out = format!("{}{}", begin, eol);
    for (name, value) in headers {
        if value.contains(['\n', '\r']) {
            return None;
        }
        out.push_str(format!("{}: {}", name, value.trim()).trim_end());
        out.push_str(eol);
    }
    out.push_str(eol);
    out.push_str(rest);

    Some(out)
}

/// Every block of `input` that parses on its own. A malformed block does not hide the
/// blocks after it.
fn pem_blocks(input: &str) -> impl Iterator<Item = Pem> + '_ {
    input
        .split(PEM_BEGIN)
        .skip(1)
        .filter_map(|span| match pem::parse(format!("{}{}", PEM_BEGIN, span)) {
            Ok(block) => Some(block),
            Err(e) => {
                debug!("skipping unparsable PEM block: {}", e);
                None
            }
        })
}

/// Key stored in the first `TOTP SECRET KEY` block of `input`. Other blocks are skipped,
/// malformed ones included.
///
/// Numeric headers that fail to parse read as 0.
pub fn gen_key_from_pem(input: &str) -> Result<Key> {
    let block = pem_blocks(input)
        .find(|block| {
            let found = block.tag() == BLOCK_TYPE_TOTP;
            if !found {
                debug!("skipping PEM block of type {:?}", block.tag());
            }
            found
        })
        .ok_or(Error::PemNotFound)?;

    let header = |name: &str| block.headers().get(name).unwrap_or_default().to_string();
    let options = Options {
        issuer: header("Issuer"),
        account_name: header("Account Name"),
        algorithm: Algorithm::new(&header("Algorithm")),
        period: str_to_uint(&header("Period")),
        secret_size: str_to_uint(&header("Secret Size")),
        skew: str_to_uint(&header("Skew")),
        digits: Digits::from_str_lossy(&header("Digits")),
        secret_query_first: false,
        ..Options::default()
    };

    Ok(Key::new(Secret::from_bytes(block.contents()), options))
}

/// Key described by an otpauth URI.
///
/// The URI must pass `Uri::check`. Skew is set to its default and the parameter order of
/// the input is kept for `Key::uri`.
pub fn gen_key_from_uri(uri: &str) -> Result<Key> {
    let uri = Uri::new(uri);
    uri.check()
        .context("failed to create URI object from the given URI")?;

    let secret = uri.secret().ok_or(Error::MissingSecret)?;
    let options = Options {
        issuer: uri.issuer(),
        account_name: uri.account_name(),
        algorithm: Algorithm::new(&uri.algorithm()),
        period: uri.period(),
        secret_size: u32::try_from(secret.len()).unwrap_or(u32::MAX),
        skew: OPTION_SKEW_DEFAULT,
        digits: Digits::new(uri.digits()),
        secret_query_first: uri.secret_is_first(),
        ..Options::default()
    };

    Ok(Key::new(secret, options))
}

/// Whether `passcode` is valid now for the Base32 `secret` under `options`.
pub fn validate(passcode: &str, secret: &str, options: &Options) -> bool {
    match Secret::from_base32(secret.trim()) {
        Ok(secret) => Key::new(secret, options.clone()).validate(passcode),
        Err(e) => {
            warn!("passcode validation failed: {}", e);
            false
        }
    }
}
