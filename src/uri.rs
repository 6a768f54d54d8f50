//! otpauth key URIs.
//!
//! `otpauth://totp/<issuer>:<account name>?secret=...&algorithm=...&digits=...&issuer=...&period=...`
//!
//! See <https://github.com/google/google-authenticator/wiki/Key-Uri-Format>.
//!
//! A `Uri` never fails to construct. Accessors of a malformed URI return the zero value of
//! their type and `Uri::check` reports what is wrong.

use std::borrow::Cow;
use std::fmt;

use log::warn;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

use crate::algorithm::Algorithm;
use crate::error::{Error, Result};
use crate::secret::Secret;
use crate::str_to_uint;

pub const SCHEME: &str = "otpauth";

/// RFC 4226 asks for at least 128 bits of shared secret.
const MIN_SECRET_LEN: usize = 16;

/// Everything but the unreserved characters. Spaces become `%20`.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Label characters that may stay as they are in a path segment.
const LABEL: &AsciiSet = &QUERY_VALUE
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b',')
    .remove(b'/')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'@');

/// Kind of one-time password a URI describes, taken from its host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpType {
    Totp,
    Hotp,
}

/// A raw otpauth URI with lazily validated accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    raw: String,
    parsed: Option<Url>,
}

impl Uri {
    /// Wraps `uri` without validating it, use `check` for that.
    pub fn new(uri: impl Into<String>) -> Self {
        let raw = uri.into();
        let parsed = Url::parse(&raw).ok();
        Self { raw, parsed }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Should be `otpauth`.
    pub fn scheme(&self) -> &str {
        self.parsed.as_ref().map(Url::scheme).unwrap_or_default()
    }

    /// Should be `totp`.
    pub fn host(&self) -> &str {
        self.parsed
            .as_ref()
            .and_then(Url::host_str)
            .unwrap_or_default()
    }

    pub fn otp_type(&self) -> Option<OtpType> {
        match self.host() {
            "totp" => Some(OtpType::Totp),
            "hotp" => Some(OtpType::Hotp),
            _ => None,
        }
    }

    /// Path as written in the URI, percent-encoding included.
    pub fn path(&self) -> &str {
        self.parsed.as_ref().map(Url::path).unwrap_or_default()
    }

    /// Decoded path without its leading slash, `<issuer>:<account name>`. Empty when the path
    /// has a malformed percent escape or does not decode to UTF-8.
    pub fn label(&self) -> String {
        let path = self.path();
        let path = path.strip_prefix('/').unwrap_or(path);
        if !valid_escapes(path) {
            return String::new();
        }
        percent_decode_str(path)
            .decode_utf8()
            .map(Cow::into_owned)
            .unwrap_or_default()
    }

    /// Part of the label before the first colon, empty without a colon.
    pub fn issuer_from_path(&self) -> String {
        self.label()
            .split_once(':')
            .map(|(issuer, _)| issuer.to_string())
            .unwrap_or_default()
    }

    /// Issuer named both in the label and in the `issuer` parameter.
    ///
    /// Empty unless both are present and identical, so a URI whose visible label disagrees
    /// with what an app reads from the query is never trusted.
    pub fn issuer(&self) -> String {
        let from_path = self.issuer_from_path();
        let from_query = self.query("issuer");

        if from_path.is_empty() || from_query.is_empty() {
            return String::new();
        }
        if from_path != from_query {
            warn!("otpauth URI issuer mismatch between label and query parameter");
            return String::new();
        }

        from_path
    }

    /// Part of the label after the first colon, or the whole label without a colon.
    pub fn account_name(&self) -> String {
        let label = self.label();
        match label.split_once(':') {
            Some((_, account)) => account.to_string(),
            None => label,
        }
    }

    /// Decoded `secret` parameter. `None` when absent, empty or not Base32.
    pub fn secret(&self) -> Option<Secret> {
        Secret::from_base32(&self.query("secret"))
            .ok()
            .filter(|secret| !secret.is_empty())
    }

    /// Raw `algorithm` parameter.
    pub fn algorithm(&self) -> String {
        self.query("algorithm")
    }

    /// `digits` parameter, 0 when missing or not a 32-bit unsigned integer.
    pub fn digits(&self) -> u32 {
        str_to_uint(&self.query("digits"))
    }

    /// `period` parameter, 0 when missing or not a 32-bit unsigned integer.
    pub fn period(&self) -> u32 {
        str_to_uint(&self.query("period"))
    }

    /// Re-encoded query string, see `encode_query` for the ordering.
    pub fn parameters(&self, secret_first: bool) -> String {
        let Some(url) = &self.parsed else {
            return String::new();
        };

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        encode_query(
            pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            secret_first,
        )
    }

    /// Whether the parameters of the URI start with `secret`.
    pub(crate) fn secret_is_first(&self) -> bool {
        self.parsed
            .as_ref()
            .and_then(|url| url.query_pairs().next())
            .map_or(false, |(key, _)| key == "secret")
    }

    /// Structural validation: the first problem found is reported.
    pub fn check(&self) -> Result<()> {
        if self.scheme() != SCHEME {
            return Err(Error::InvalidScheme);
        }
        if self.otp_type() != Some(OtpType::Totp) {
            return Err(Error::InvalidHost);
        }
        if self.issuer().is_empty() {
            return Err(Error::MissingIssuer);
        }
        if self.account_name().is_empty() {
            return Err(Error::MissingAccountName);
        }
        let secret = self.secret().ok_or(Error::MissingSecret)?;
        let algorithm = self.algorithm();
        if algorithm.is_empty() {
            return Err(Error::MissingAlgorithm);
        }
        if self.digits() == 0 {
            return Err(Error::MissingDigits);
        }
        if self.period() == 0 {
            return Err(Error::MissingPeriod);
        }

        Algorithm::new(&algorithm).require_hmac()?;

        if secret.len() < MIN_SECRET_LEN {
            return Err(Error::SecretTooShort);
        }

        Ok(())
    }

    fn query(&self, name: &str) -> String {
        self.parsed
            .as_ref()
            .and_then(|url| {
                url.query_pairs()
                    .find(|(key, _)| key == name)
                    .map(|(_, value)| value.into_owned())
            })
            .unwrap_or_default()
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<String> for Uri {
    fn from(uri: String) -> Self {
        Self::new(uri)
    }
}

impl From<&str> for Uri {
    fn from(uri: &str) -> Self {
        Self::new(uri)
    }
}

/// Renders `key=value` pairs as a query string.
///
/// With `secret_first` the `secret` pair leads and the others follow sorted by key,
/// otherwise every pair is sorted by key. Pairs sharing a key keep their relative order.
pub fn encode_query<'a, I>(pairs: I, secret_first: bool) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut pairs: Vec<(&str, &str)> = pairs.into_iter().collect();
    pairs.sort_by_key(|&(key, _)| (secret_first && key != "secret", key));

    pairs
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                utf8_percent_encode(key, QUERY_VALUE),
                utf8_percent_encode(value, QUERY_VALUE)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Whether every `%` starts a two hex digit escape.
fn valid_escapes(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.iter().enumerate().all(|(i, &b)| {
        b != b'%'
            || matches!(
                bytes.get(i + 1..i + 3),
                Some([hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit()
            )
    })
}

/// Percent-encodes `<issuer>:<account name>` for the path of a URI.
pub(crate) fn encode_label(issuer: &str, account_name: &str) -> String {
    format!(
        "{}:{}",
        utf8_percent_encode(issuer, LABEL),
        utf8_percent_encode(account_name, LABEL)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "otpauth://totp/Example.com:alice@example.com?algorithm=SHA1&\
                        digits=12&issuer=Example.com&period=60&secret=QF7N673VMVHYWATKICRUA7V5MUGFG3Z3";

    #[test]
    fn accessors() {
        let uri = Uri::new(GOOD);

        assert_eq!(uri.scheme(), "otpauth");
        assert_eq!(uri.host(), "totp");
        assert_eq!(uri.otp_type(), Some(OtpType::Totp));
        assert_eq!(uri.path(), "/Example.com:alice@example.com");
        assert_eq!(uri.label(), "Example.com:alice@example.com");
        assert_eq!(uri.issuer_from_path(), "Example.com");
        assert_eq!(uri.issuer(), "Example.com");
        assert_eq!(uri.account_name(), "alice@example.com");
        assert_eq!(uri.algorithm(), "SHA1");
        assert_eq!(uri.digits(), 12);
        assert_eq!(uri.period(), 60);
        assert_eq!(uri.secret().unwrap().base32(), "QF7N673VMVHYWATKICRUA7V5MUGFG3Z3");
        assert_eq!(uri.to_string(), GOOD);
        assert!(uri.check().is_ok());
    }

    #[test]
    fn malformed_uri_gives_zero_values() {
        let uri = Uri::new("this is a bad URI\x7f");

        assert!(uri.check().is_err());
        assert_eq!(uri.scheme(), "");
        assert_eq!(uri.host(), "");
        assert_eq!(uri.otp_type(), None);
        assert_eq!(uri.path(), "");
        assert_eq!(uri.label(), "");
        assert_eq!(uri.issuer(), "");
        assert_eq!(uri.issuer_from_path(), "");
        assert_eq!(uri.account_name(), "");
        assert_eq!(uri.algorithm(), "");
        assert!(uri.secret().is_none());
        assert_eq!(uri.digits(), 0);
        assert_eq!(uri.period(), 0);
        assert_eq!(uri.parameters(true), "");
    }

    #[test]
    fn label_without_colon_is_the_account_name() {
        let uri = Uri::new("otpauth://totp/example.com?algorithm=SHA1");

        assert_eq!(uri.issuer(), "");
        assert_eq!(uri.issuer_from_path(), "");
        assert_eq!(uri.account_name(), "example.com");
    }

    #[test]
    fn issuer_needs_label_and_query_to_agree() {
        for (uri, issuer) in [
            ("otpauth://totp/Example.com:", ""),
            ("otpauth://totp/alice@example.com?foo=bar", ""),
            ("otpauth://totp/alice@example.com?issuer=Example.org", ""),
            ("otpauth://totp/:?issuer=Example.org", ""),
            ("otpauth://totp/Example.org:alice@example.com?issuer=Example.com", ""),
            ("otpauth://totp/Example.com:alice@example.com?issuer=Example.com", "Example.com"),
        ] {
            assert_eq!(Uri::new(uri).issuer(), issuer, "uri: {}", uri);
        }
    }

    #[test]
    fn label_is_percent_decoded() {
        let uri = Uri::new("otpauth://totp/ACME%20Co:john%40example.com?issuer=ACME%20Co");

        assert_eq!(uri.path(), "/ACME%20Co:john%40example.com");
        assert_eq!(uri.label(), "ACME Co:john@example.com");
        assert_eq!(uri.issuer(), "ACME Co");
        assert_eq!(uri.account_name(), "john@example.com");
    }

    #[test]
    fn bad_percent_escape_empties_label() {
        for raw in [
            "otpauth://totp/Exa%ZZmple:alice?issuer=Exa%25ZZmple",
            "otpauth://totp/Example:alice%?issuer=Example",
            "otpauth://totp/Example:alice%4?issuer=Example",
        ] {
            let uri = Uri::new(raw);
            assert_eq!(uri.label(), "", "uri: {}", raw);
            assert_eq!(uri.issuer(), "", "uri: {}", raw);
            assert_eq!(uri.account_name(), "", "uri: {}", raw);
            assert!(matches!(uri.check(), Err(Error::MissingIssuer)));
        }

        assert!(valid_escapes("ACME%20Co:john%40example.com"));
        assert!(!valid_escapes("%g0"));
    }

    #[test]
    fn bad_secret_encoding_is_absent() {
        let uri = Uri::new(
            "otpauth://totp/Example.com:alice@example.com?algorithm=SHA1&digits=6&\
             issuer=Example.com&period=30&secret='BAD ENCODING'",
        );
        assert!(uri.secret().is_none());
        assert_eq!(uri.check().unwrap_err().to_string(), "missing secret");
    }

    #[test]
    fn numbers_outside_u32_are_zero() {
        let uri = Uri::new("otpauth://totp/a:b?digits=4294967296&period=-30");
        assert_eq!(uri.digits(), 0);
        assert_eq!(uri.period(), 0);

        let uri = Uri::new("otpauth://totp/a:b?digits=4294967295&period=30");
        assert_eq!(uri.digits(), u32::MAX);
        assert_eq!(uri.period(), 30);
    }

    #[test]
    fn check_error_messages() {
        let tail = "period=60&secret=QF7N673VMVHYWATKICRUA7V5MUGFG3Z3";
        let cases = [
            (
                format!("ipfs://totp/Example.com:alice@example.com?algorithm=SHA1&digits=12&issuer=Example.com&{}", tail),
                "invalid scheme",
            ),
            (
                format!("otpauth://hotp/Example.com:alice@example.com?algorithm=SHA1&digits=12&issuer=Example.com&{}", tail),
                "invalid host",
            ),
            (
                format!("otpauth://totp/alice@example.com?algorithm=SHA1&digits=12&{}", tail),
                "missing issuer or issuer is not set correctly",
            ),
            (
                format!("otpauth://totp/Example.com:alice@example.com?algorithm=SHA1&digits=12&{}", tail),
                "missing issuer or issuer is not set correctly",
            ),
            (
                format!("otpauth://totp/Example.com:?algorithm=SHA1&digits=12&issuer=Example.com&{}", tail),
                "missing account name",
            ),
            (
                format!("otpauth://totp/Example.com:alice@example.com?digits=12&issuer=Example.com&{}", tail),
                "missing algorithm",
            ),
            (
                format!("otpauth://totp/Example.com:alice@example.com?algorithm=BLAKE3&digits=12&issuer=Example.com&{}", tail),
                "unsupported algorithm: BLAKE3",
            ),
            (
                format!("otpauth://totp/Example.com:alice@example.com?algorithm=SHA1&issuer=Example.com&{}", tail),
                "missing digits or zero digits set",
            ),
            (
                format!("otpauth://totp/Example.com:alice@example.com?algorithm=SHA1&digits=0&issuer=Example.com&{}", tail),
                "missing digits or zero digits set",
            ),
            (
                "otpauth://totp/Example.com:alice@example.com?algorithm=SHA1&digits=12&issuer=Example.com&\
                 secret=QF7N673VMVHYWATKICRUA7V5MUGFG3Z3"
                    .to_string(),
                "missing period or zero period set",
            ),
            (
                "otpauth://totp/Example.com:alice@example.com?algorithm=SHA1&digits=12&issuer=Example.com&\
                 period=0&secret=QF7N673VMVHYWATKICRUA7V5MUGFG3Z3"
                    .to_string(),
                "missing period or zero period set",
            ),
            (
                "otpauth://totp/Example.com:alice@example.com?algorithm=SHA1&digits=12&issuer=Example.com&period=60"
                    .to_string(),
                "missing secret",
            ),
            (
                "otpauth://totp/Example.com:alice@example.com?algorithm=SHA1&digits=12&issuer=Example.com&\
                 period=60&secret=QF7N673VMVHYW"
                    .to_string(),
                "secret is too short. it should be at least 16 bytes",
            ),
        ];

        for (uri, msg) in cases {
            let err = Uri::new(uri.as_str()).check().unwrap_err();
            assert!(err.to_string().contains(msg), "uri: {}, got: {}", uri, err);
        }
    }

    #[test]
    fn parameter_order() {
        let uri = Uri::new(
            "otpauth://totp/domain.com:test_tail@domain.com?digits=8&algorithm=SHA256&\
             period=45&issuer=domain.com&secret=DEOXGYTNWD3D6J3RNBEGCI2R45X3XO3X",
        );

        assert_eq!(
            uri.parameters(true),
            "secret=DEOXGYTNWD3D6J3RNBEGCI2R45X3XO3X&algorithm=SHA256&digits=8&issuer=domain.com&period=45"
        );
        assert_eq!(
            uri.parameters(false),
            "algorithm=SHA256&digits=8&issuer=domain.com&period=45&secret=DEOXGYTNWD3D6J3RNBEGCI2R45X3XO3X"
        );
        assert!(!uri.secret_is_first());
    }

    #[test]
    fn spaces_are_percent_encoded() {
        let uri = Uri::new("otpauth://totp/ACME%20Co:john?issuer=ACME+Co&secret=ABC");
        assert_eq!(uri.parameters(true), "secret=ABC&issuer=ACME%20Co");
        assert_eq!(uri.parameters(false), "issuer=ACME%20Co&secret=ABC");
        assert!(!uri.secret_is_first());

        let uri = Uri::new("otpauth://totp/ACME%20Co:john?secret=ABC&issuer=ACME+Co");
        assert!(uri.secret_is_first());

        assert_eq!(
            encode_query([("issuer", "a b&c"), ("secret", "X")], false),
            "issuer=a%20b%26c&secret=X"
        );
        assert_eq!(encode_query(std::iter::empty(), true), "");
    }

    #[test]
    fn label_encoding_keeps_separators() {
        assert_eq!(
            encode_label("ACME Co", "john@example.com"),
            "ACME%20Co:john@example.com"
        );
    }
}
