//! C6: Encryptor.
//!
//! Grounded in `encryptor.py`'s `Encryptor` base and its two concrete
//! subclasses, `GpgEncryptor` and `PyCryptoEncryptor`. Operations are pure
//! file-to-file transforms (§4.6); an absent encryptor means archives flow
//! unchanged, modeled here as `Option<Box<dyn Encryptor>>` at call sites
//! rather than a `NoopEncryptor` type, since "no cipher configured" is a
//! distinct, common case worth making unrepresentable as a trait call.

pub mod aes_cbc;
pub mod gpg;

use std::path::Path;

use crate::config::Cipher;
use crate::error::StrataResult;

/// A symmetric, passphrase-based, whole-file cipher (§4.6).
pub trait Encryptor: Send + Sync {
    /// Encrypts `in_path` into `out_path`.
    fn encrypt(&self, in_path: &Path, out_path: &Path) -> StrataResult<()>;
    /// Decrypts `in_path` into `out_path`.
    fn decrypt(&self, in_path: &Path, out_path: &Path) -> StrataResult<()>;
    /// Extension fragment appended to the archive extension when this
    /// cipher is active, e.g. `"gpg"` (§4.6).
    fn extension(&self) -> &'static str;
}

/// Builds the configured [`Encryptor`], if any.
#[must_use]
pub fn build(cipher: Option<Cipher>, passphrase: Option<&str>) -> Option<Box<dyn Encryptor>> {
    let cipher = cipher?;
    let passphrase = passphrase?.to_owned();
    Some(match cipher {
        Cipher::GpgSymmetric => Box::new(gpg::GpgEncryptor::new(passphrase)),
        Cipher::AesCbcFile => Box::new(aes_cbc::AesCbcEncryptor::new(&passphrase)),
    })
}
