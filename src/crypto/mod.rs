//! AES-256-CBC cipher frames (§4.5).
//!
//! Key derivation follows OpenSSL's classic `EVP_BytesToKey` with MD5:
//! `D[0] = MD5(pass || salt)`, `D[i] = MD5(D[i-1] || pass || salt)`,
//! concatenated until there are enough bytes for a 32-byte key and a
//! 16-byte IV. A framed payload is `salt(8) || ciphertext`; `raw` mode
//! (used by the block-delta engine, whose salt already lives in the
//! block-map) omits the salt header and takes key+IV directly.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use md5::{Digest, Md5};
use rand::RngCore;
use thiserror::Error;

pub const SALT_LEN: usize = 8;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherType {
    None,
    Aes256Cbc,
}

impl CipherType {
    pub fn name(self) -> &'static str {
        match self {
            CipherType::None => "none",
            CipherType::Aes256Cbc => "aes-256-cbc",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "none" => Some(CipherType::None),
            "aes-256-cbc" => Some(CipherType::Aes256Cbc),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed — wrong password or corrupted data: {0}")]
    DecryptionFailed(String),
    #[error("encrypted payload too short (minimum {SALT_LEN} bytes for the salt header)")]
    TooShort,
}

/// `EVP_BytesToKey`-style derivation: returns `(key, iv)`.
pub fn derive_key_iv(password: &str, salt: &[u8; SALT_LEN]) -> ([u8; KEY_LEN], [u8; IV_LEN]) {
    let mut material = Vec::with_capacity(KEY_LEN + IV_LEN + Md5::output_size());
    let mut prev: Vec<u8> = Vec::new();

    while material.len() < KEY_LEN + IV_LEN {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(password.as_bytes());
        hasher.update(salt);
        let digest = hasher.finalize();
        material.extend_from_slice(&digest);
        prev = digest.to_vec();
    }

    let mut key = [0u8; KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    key.copy_from_slice(&material[..KEY_LEN]);
    iv.copy_from_slice(&material[KEY_LEN..KEY_LEN + IV_LEN]);
    (key, iv)
}

fn random_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Framed encrypt: `salt(8) || ciphertext`. The salt header is generated
/// fresh on every call.
pub fn encrypt(password: &str, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let salt = random_salt();
    let (key, iv) = derive_key_iv(password, &salt);
    let ciphertext = encrypt_raw(&key, &iv, plaintext)?;
    let mut out = Vec::with_capacity(SALT_LEN + ciphertext.len());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Framed decrypt: reads the 8-byte salt header, derives key/IV, decrypts
/// the remainder.
pub fn decrypt(password: &str, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < SALT_LEN {
        return Err(CryptoError::TooShort);
    }
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&data[..SALT_LEN]);
    let (key, iv) = derive_key_iv(password, &salt);
    decrypt_raw(&key, &iv, &data[SALT_LEN..])
}

/// Raw (no salt header) encrypt — used by the block-delta engine, whose
/// salt is stored alongside the block-map rather than in-band (§4.5).
pub fn encrypt_raw(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let enc = Aes256CbcEnc::new(key.into(), iv.into());
    Ok(enc.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Raw (no salt header) decrypt.
pub fn decrypt_raw(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let dec = Aes256CbcDec::new(key.into(), iv.into());
    dec.decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let pass = "correct horse battery staple";
        let plaintext = b"some block of plaintext that is not block-aligned!!";
        let ciphertext = encrypt(pass, plaintext).unwrap();
        let decrypted = decrypt(pass, &ciphertext).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn wrong_password_fails() {
        let ciphertext = encrypt("right", b"hello world").unwrap();
        assert!(decrypt("wrong", &ciphertext).is_err());
    }

    #[test]
    fn raw_mode_round_trip() {
        let salt = [1u8; SALT_LEN];
        let (key, iv) = derive_key_iv("pw", &salt);
        let ciphertext = encrypt_raw(&key, &iv, b"raw mode payload").unwrap();
        let plaintext = decrypt_raw(&key, &iv, &ciphertext).unwrap();
        assert_eq!(plaintext, b"raw mode payload");
    }
}
