//! Secrets derived from an ECDH key agreement.
//!
//! Two parties holding each other's public key compute the same shared secret and stretch
//! it with a KDF into `secret_size` bytes, so both end up with the same TOTP secret without
//! ever sending it.

use openssl::derive::Deriver;
use openssl::md::Md;
use openssl::pkey::{Id, PKeyRef, Private, Public};
use openssl::pkey_ctx::PkeyCtx;

use crate::error::{Error, Result, ResultExt};
use crate::options::{EcdhKeys, Kdf};
use crate::secret::Secret;

/// HKDF can expand to at most 255 blocks of the hash output.
const HKDF_SHA512_MAX_OUTPUT: usize = 255 * 64;

/// Raw ECDH shared secret of `local` and `remote`.
///
/// Fails with `Error::CurveMismatch` when the keys are of different types or on different
/// curves.
pub fn shared_secret(local: &PKeyRef<Private>, remote: &PKeyRef<Public>) -> Result<Vec<u8>> {
    if !same_curve(local, remote)? {
        return Err(Error::CurveMismatch);
    }

    let mut deriver = Deriver::new(local)?;
    deriver.set_peer(remote)?;
    Ok(deriver.derive_to_vec()?)
}

fn same_curve(local: &PKeyRef<Private>, remote: &PKeyRef<Public>) -> Result<bool> {
    if local.id() != remote.id() {
        return Ok(false);
    }
    if local.id() != Id::EC {
        return Ok(true);
    }

    let local_curve = local.ec_key()?.group().curve_name();
    let remote_curve = remote.ec_key()?.group().curve_name();
    Ok(local_curve.is_some() && local_curve == remote_curve)
}

/// HKDF-SHA512 with `context` as the info parameter and no salt.
pub fn default_kdf(secret: &[u8], context: &[u8], out_len: usize) -> Result<Vec<u8>> {
    if out_len == 0 || out_len > HKDF_SHA512_MAX_OUTPUT {
        return Err(Error::InvalidOutputLength(out_len));
    }

    let mut ctx = PkeyCtx::new_id(Id::HKDF)?;
    ctx.derive_init()?;
    ctx.set_hkdf_md(Md::sha512())?;
    ctx.set_hkdf_key(secret)?;
    ctx.add_hkdf_info(context)?;

    let mut out = vec![0u8; out_len];
    let written = ctx.derive(Some(out.as_mut_slice()))?;
    if written != out_len {
        return Err(Error::InvalidOutputLength(written));
    }

    Ok(out)
}

/// TOTP secret of `size` bytes for the key agreement in `keys`.
pub(crate) fn derive_secret(keys: &EcdhKeys, kdf: Option<&Kdf>, size: u32) -> Result<Secret> {
    let shared = shared_secret(&keys.local, &keys.remote)
        .context("failed to generate ECDH shared secret")?;

    let out_len = size as usize;
    let context = keys.context.as_bytes();
    let derived = match kdf {
        Some(kdf) => kdf(&shared, context, out_len),
        None => default_kdf(&shared, context, out_len),
    }
    .and_then(|bytes| match bytes.len() {
        len if len == out_len => Ok(bytes),
        len => Err(Error::InvalidOutputLength(len)),
    })
    .context("failed to derive key from ECDH shared secret")?;

    Ok(Secret::from(derived))
}
