//! Shared AES-256-GCM seal/open primitive.
//!
//! Both encryption layers of the token codec (master key, site key) and the
//! refresh endpoint's response envelope use the same `[nonce | ciphertext | tag]`
//! framing, so it lives in one place.

use aes_gcm::{
  Aes256Gcm, Key, KeyInit,
  aead::{Aead, OsRng, generic_array::GenericArray, rand_core::RngCore},
};

use crate::CodecError;

/// Length in bytes of the nonce prefixed to every sealed payload.
pub const NONCE_LEN: usize = 12;
/// Length in bytes of an AES-256-GCM key.
pub const KEY_LEN: usize = 32;

type Cipher = Aes256Gcm;

/// Seals `plaintext` under `key`, returning `nonce || ciphertext || tag`.
pub fn seal(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Vec<u8> {
  let cipher = Cipher::new(Key::<Cipher>::from_slice(key));

  let mut nonce = [0u8; NONCE_LEN];
  OsRng.fill_bytes(&mut nonce);

  // `aes-gcm`'s `encrypt` already appends the tag; we only need to prefix the nonce.
  let mut out = Vec::with_capacity(NONCE_LEN + plaintext.len() + 16);
  out.extend_from_slice(&nonce);
  // A fresh random nonce under a 256-bit key cannot fail to encrypt.
  out.extend_from_slice(
    &cipher
      .encrypt(GenericArray::from_slice(&nonce), plaintext)
      .expect("AES-GCM seal with a freshly generated nonce does not fail"),
  );
  return out;
}

/// Opens a `nonce || ciphertext || tag` blob sealed by [`seal`].
pub fn open(key: &[u8; KEY_LEN], sealed: &[u8]) -> Result<Vec<u8>, CodecError> {
  if sealed.len() < NONCE_LEN {
    return Err(CodecError::Truncated);
  }

  let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
  let cipher = Cipher::new(Key::<Cipher>::from_slice(key));

  return cipher
    .decrypt(GenericArray::from_slice(nonce), ciphertext)
    .map_err(|_| CodecError::Decrypt);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trips() {
    let key = [7u8; KEY_LEN];
    let plaintext = b"advertising-identity payload";

    let sealed = seal(&key, plaintext);
    let opened = open(&key, &sealed).unwrap();

    assert_eq!(plaintext.as_slice(), opened.as_slice());
  }

  #[test]
  fn rejects_wrong_key() {
    let sealed = seal(&[1u8; KEY_LEN], b"payload");
    assert!(open(&[2u8; KEY_LEN], &sealed).is_err());
  }

  #[test]
  fn rejects_truncated_input() {
    assert!(matches!(open(&[0u8; KEY_LEN], &[1, 2, 3]), Err(CodecError::Truncated)));
  }
}
