//! Reversible password obscuring in the relay's config format
//!
//! AES-256-CTR under a fixed, publicly known key with a random IV, encoded as
//! unpadded URL-safe base64 of `iv || ciphertext`. This only keeps passwords
//! from being readable at a glance; it is not encryption.

use aes::Aes256;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::{BackupError, Result};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

const IV_LEN: usize = 16;

const KEY: [u8; 32] = [
    0x9c, 0x93, 0x5b, 0x48, 0x73, 0x0a, 0x55, 0x4d, 0x6b, 0xfd, 0x7c, 0x63, 0xc8, 0x86, 0xa9, 0x2b,
    0xd3, 0x90, 0x19, 0x8e, 0xb8, 0x12, 0x8a, 0xfb, 0xf4, 0xde, 0x16, 0x2b, 0x8b, 0x95, 0xf6, 0x38,
];

/// Obscure `plain` with a fresh random IV
pub fn obscure(plain: &str) -> Result<String> {
    let mut iv = [0u8; IV_LEN];
    OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|e| BackupError::Relay(format!("failed to generate iv: {}", e)))?;
    Ok(obscure_with_iv(plain, iv))
}

fn obscure_with_iv(plain: &str, iv: [u8; IV_LEN]) -> String {
    let mut data = plain.as_bytes().to_vec();
    Aes256Ctr::new(&KEY.into(), &iv.into()).apply_keystream(&mut data);

    let mut out = Vec::with_capacity(IV_LEN + data.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&data);
    URL_SAFE_NO_PAD.encode(out)
}

/// Recover the plain text of an obscured password
pub fn reveal(obscured: &str) -> Result<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(obscured)
        .map_err(|e| BackupError::Relay(format!("obscured password is not base64: {}", e)))?;
    if bytes.len() < IV_LEN {
        return Err(BackupError::Relay("obscured password too short".to_string()));
    }

    let (iv, cipher) = bytes.split_at(IV_LEN);
    let mut iv_block = [0u8; IV_LEN];
    iv_block.copy_from_slice(iv);

    let mut data = cipher.to_vec();
    Aes256Ctr::new(&KEY.into(), &iv_block.into()).apply_keystream(&mut data);
    String::from_utf8(data)
        .map_err(|_| BackupError::Relay("obscured password is not utf-8".to_string()))
}
