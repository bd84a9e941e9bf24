//! Password encryption for the SSO login form: AES in ECB mode with PKCS#7 padding,
//! keyed by the base64 key embedded in the login page.

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256, Block};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;

pub const BLOCK_SIZE: usize = 16;

#[derive(Debug, Error)]
pub enum CipherError {
  #[error("crypto key is not valid base64: {0}")]
  KeyEncoding(#[from] base64::DecodeError),
  #[error("crypto key has unsupported length {0} (expected 16, 24 or 32 bytes)")]
  KeyLength(usize),
}

enum AesKey {
  A128(Aes128),
  A192(Aes192),
  A256(Aes256),
}

impl AesKey {
  fn new(key: &[u8]) -> Result<Self, CipherError> {
    let bad_len = |_| CipherError::KeyLength(key.len());
    match key.len() {
      16 => Aes128::new_from_slice(key).map(Self::A128).map_err(bad_len),
      24 => Aes192::new_from_slice(key).map(Self::A192).map_err(bad_len),
      32 => Aes256::new_from_slice(key).map(Self::A256).map_err(bad_len),
      n => Err(CipherError::KeyLength(n)),
    }
  }

  fn encrypt_block(&self, block: &mut Block) {
    match self {
      Self::A128(c) => c.encrypt_block(block),
      Self::A192(c) => c.encrypt_block(block),
      Self::A256(c) => c.encrypt_block(block),
    }
  }
}

/// PKCS#7: always appends 1..=16 bytes, each equal to the pad length.
pub fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
  let pad = BLOCK_SIZE - data.len() % BLOCK_SIZE;
  let mut out = Vec::with_capacity(data.len() + pad);
  out.extend_from_slice(data);
  out.extend(std::iter::repeat(pad as u8).take(pad));
  out
}

pub fn encrypt_ecb_pkcs7(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
  let cipher = AesKey::new(key)?;
  let mut buf = pkcs7_pad(plaintext);
  for chunk in buf.chunks_exact_mut(BLOCK_SIZE) {
    cipher.encrypt_block(Block::from_mut_slice(chunk));
  }
  Ok(buf)
}

/// base64(AES-ECB(base64decode(key_b64), pkcs7(credential)))
pub fn encrypt_credential(key_b64: &str, credential: &str) -> Result<String, CipherError> {
  let key = STANDARD.decode(key_b64.trim())?;
  let ct = encrypt_ecb_pkcs7(&key, credential.as_bytes())?;
  Ok(STANDARD.encode(ct))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn padding_always_adds_a_block_fragment() {
    assert_eq!(pkcs7_pad(b"abc").len(), 16);
    assert_eq!(*pkcs7_pad(b"abc").last().unwrap(), 13);
    let full = pkcs7_pad(&[0u8; 16]);
    assert_eq!(full.len(), 32);
    assert!(full[16..].iter().all(|&b| b == 16));
    assert_eq!(pkcs7_pad(b"").len(), 16);
  }

  #[test]
  fn matches_fips197_aes128_vector() {
    let key = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
    let pt = hex::decode("00112233445566778899aabbccddeeff").unwrap();
    let ct = encrypt_ecb_pkcs7(&key, &pt).unwrap();
    assert_eq!(ct.len(), 32);
    assert_eq!(hex::encode(&ct[..16]), "69c4e0d86a7b0430d8cdb78070b4c55a");
  }

  #[test]
  fn ecb_encrypts_equal_blocks_identically() {
    let key = [7u8; 16];
    let ct = encrypt_ecb_pkcs7(&key, &[b'x'; 32]).unwrap();
    assert_eq!(ct[..16], ct[16..32]);
  }

  #[test]
  fn credential_round_trip_shape() {
    let key_b64 = STANDARD.encode([1u8; 16]);
    let out = encrypt_credential(&key_b64, "hunter2").unwrap();
    let raw = STANDARD.decode(&out).unwrap();
    assert_eq!(raw.len(), 16);
    assert_ne!(out, "hunter2");
    // deterministic: no IV
    assert_eq!(out, encrypt_credential(&key_b64, "hunter2").unwrap());
  }

  #[test]
  fn rejects_bad_keys() {
    assert!(matches!(encrypt_credential("***", "pw"), Err(CipherError::KeyEncoding(_))));
    let short = STANDARD.encode([0u8; 10]);
    assert!(matches!(encrypt_credential(&short, "pw"), Err(CipherError::KeyLength(10))));
  }
}
