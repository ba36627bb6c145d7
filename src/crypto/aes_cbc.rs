//! AES-CBC-file cipher (§4.6, cipher option `AES-CBC-file`).
//!
//! Wire format (§6): little-endian 8-byte original length, 16-byte IV, then
//! CBC-encrypted ciphertext padded to the block size; decryption truncates
//! to the original length. Grounded in `encryptor.py`'s `PyCryptoEncryptor`,
//! which drives `AES.new(key, AES.MODE_CBC, iv)` over the whole file; that
//! class takes an already-sized key, so turning a passphrase into 32 bytes
//! is this crate's addition -- a plain SHA-256 of the passphrase bytes, not
//! `scrypt`, because the documented wire format carries no salt field to
//! make a randomized KDF round-trip (see DESIGN.md).

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use aes::Aes256;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::crypto::Encryptor;
use crate::error::{ErrorKind, StrataError, StrataResult};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Block = cbc::cipher::generic_array::GenericArray<u8, cbc::cipher::consts::U16>;

const BLOCK_SIZE: usize = 16;
const IV_SIZE: usize = 16;
const LEN_PREFIX_SIZE: usize = 8;

/// In-process AES-256-CBC encryptor, keyed by a passphrase.
#[derive(Debug)]
pub struct AesCbcEncryptor {
    key: [u8; 32],
}

impl AesCbcEncryptor {
    #[must_use]
    pub fn new(passphrase: &str) -> Self {
        let key: [u8; 32] = Sha256::digest(passphrase.as_bytes()).into();
        Self { key }
    }
}

/// PKCS7-pads `data` up to a whole number of blocks, in place.
fn pkcs7_pad(data: &mut Vec<u8>) {
    let pad_len = BLOCK_SIZE - (data.len() % BLOCK_SIZE);
    data.resize(data.len() + pad_len, pad_len as u8);
}

impl Encryptor for AesCbcEncryptor {
    fn encrypt(&self, in_path: &Path, out_path: &Path) -> StrataResult<()> {
        let mut input = File::open(in_path)?;
        let original_len = input.metadata()?.len();
        let mut plaintext = Vec::with_capacity(original_len as usize);
        input.read_to_end(&mut plaintext)?;
        pkcs7_pad(&mut plaintext);

        let mut iv = [0_u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);

        let mut encryptor = Aes256CbcEnc::new(&self.key.into(), &iv.into());
        for chunk in plaintext.chunks_exact_mut(BLOCK_SIZE) {
            let block = Block::from_mut_slice(chunk);
            encryptor.encrypt_block_mut(block);
        }

        let mut output = File::create(out_path)?;
        output.write_all(&original_len.to_le_bytes())?;
        output.write_all(&iv)?;
        output.write_all(&plaintext)?;
        Ok(())
    }

    fn decrypt(&self, in_path: &Path, out_path: &Path) -> StrataResult<()> {
        let mut input = File::open(in_path)?;

        let mut len_bytes = [0_u8; LEN_PREFIX_SIZE];
        input.read_exact(&mut len_bytes).map_err(|err| {
            StrataError::with_source(ErrorKind::CipherFailure, "truncated AES-CBC-file header (length)", err)
        })?;
        let original_len = u64::from_le_bytes(len_bytes);

        let mut iv = [0_u8; IV_SIZE];
        input.read_exact(&mut iv).map_err(|err| {
            StrataError::with_source(ErrorKind::CipherFailure, "truncated AES-CBC-file header (iv)", err)
        })?;

        let mut ciphertext = Vec::new();
        input.read_to_end(&mut ciphertext)?;
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(StrataError::new(
                ErrorKind::CipherFailure,
                "AES-CBC-file ciphertext is not block-aligned",
            ));
        }

        let mut decryptor = Aes256CbcDec::new(&self.key.into(), &iv.into());
        for chunk in ciphertext.chunks_exact_mut(BLOCK_SIZE) {
            let block = Block::from_mut_slice(chunk);
            decryptor.decrypt_block_mut(block);
        }

        ciphertext.truncate(original_len as usize);

        let mut output = File::create(out_path)?;
        output.write_all(&ciphertext)?;
        Ok(())
    }

    fn extension(&self) -> &'static str {
        "aes"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_arbitrary_length_payload() {
        let dir = tempdir().unwrap();
        let plain_path = dir.path().join("plain.bin");
        let data = vec![0x5A_u8; 12_345];
        std::fs::write(&plain_path, &data).unwrap();

        let encryptor = AesCbcEncryptor::new("correct horse battery staple");
        let cipher_path = dir.path().join("cipher.bin");
        encryptor.encrypt(&plain_path, &cipher_path).unwrap();

        let decrypted_path = dir.path().join("decrypted.bin");
        encryptor.decrypt(&cipher_path, &decrypted_path).unwrap();

        let roundtrip = std::fs::read(&decrypted_path).unwrap();
        assert_eq!(roundtrip, data);
    }

    #[test]
    fn header_carries_original_length_and_iv() {
        let dir = tempdir().unwrap();
        let plain_path = dir.path().join("plain.bin");
        std::fs::write(&plain_path, b"short payload").unwrap();

        let encryptor = AesCbcEncryptor::new("passphrase");
        let cipher_path = dir.path().join("cipher.bin");
        encryptor.encrypt(&plain_path, &cipher_path).unwrap();

        let bytes = std::fs::read(&cipher_path).unwrap();
        let len = u64::from_le_bytes(bytes[..8].try_into().unwrap());
        assert_eq!(len, "short payload".len() as u64);
        assert!(bytes.len() > LEN_PREFIX_SIZE + IV_SIZE);
    }

    #[test]
    fn empty_file_round_trips() {
        let dir = tempdir().unwrap();
        let plain_path = dir.path().join("empty.bin");
        std::fs::write(&plain_path, b"").unwrap();

        let encryptor = AesCbcEncryptor::new("passphrase");
        let cipher_path = dir.path().join("cipher.bin");
        encryptor.encrypt(&plain_path, &cipher_path).unwrap();
        let decrypted_path = dir.path().join("decrypted.bin");
        encryptor.decrypt(&cipher_path, &decrypted_path).unwrap();

        assert_eq!(std::fs::read(&decrypted_path).unwrap(), Vec::<u8>::new());
    }
}
