//! GPG-symmetric cipher (§4.6, cipher option `gpg-symmetric`).
//!
//! Grounded in `encryptor.py`'s `GpgEncryptor`, which shells out to `gpg
//! --batch --yes --symmetric --output <out> -c --cipher-algo AES256
//! --passphrase '<key>' <in>` for encryption and `-d` for decryption, and in
//! the teacher's `CommandInput::run` for the "build a `Command`, check exit
//! status, wrap failures" shape.

use std::path::Path;
use std::process::Command;

use log::debug;

use crate::crypto::Encryptor;
use crate::error::{ErrorKind, StrataError, StrataResult};

/// Invokes `gpg` as a subprocess for passphrase-based symmetric encryption.
#[derive(Debug)]
pub struct GpgEncryptor {
    passphrase: String,
}

impl GpgEncryptor {
    #[must_use]
    pub fn new(passphrase: String) -> Self {
        Self { passphrase }
    }

    fn run(&self, mode: &str, in_path: &Path, out_path: &Path) -> StrataResult<()> {
        debug!("invoking gpg {mode} {} -> {}", in_path.display(), out_path.display());
        let mut command = Command::new("gpg");
        command
            .arg("--batch")
            .arg("--yes")
            .arg("--output")
            .arg(out_path)
            .arg("--passphrase")
            .arg(&self.passphrase);

        if mode == "encrypt" {
            command.arg("--symmetric").arg("-c").arg("--cipher-algo").arg("AES256");
        } else {
            command.arg("-d");
        }
        command.arg(in_path);

        let status = command.status().map_err(|err| {
            StrataError::with_source(ErrorKind::CipherFailure, format!("failed to spawn gpg for {mode}"), err)
        })?;

        if !status.success() {
            return Err(StrataError::new(
                ErrorKind::CipherFailure,
                format!("gpg {mode} exited with status {status}"),
            ));
        }
        Ok(())
    }
}

impl Encryptor for GpgEncryptor {
    fn encrypt(&self, in_path: &Path, out_path: &Path) -> StrataResult<()> {
        self.run("encrypt", in_path, out_path)
    }

    fn decrypt(&self, in_path: &Path, out_path: &Path) -> StrataResult<()> {
        self.run("decrypt", in_path, out_path)
    }

    fn extension(&self) -> &'static str {
        "gpg"
    }
}
