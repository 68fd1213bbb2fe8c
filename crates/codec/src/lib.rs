//! Deterministic, bit-exact encoding and decoding of advertising, user, and
//! refresh tokens, plus the layered AES-256-GCM encryption and base64 framing
//! the client's refresh path and the token-issuing server must agree on.
//!
//! This crate is deliberately side-effect free: it neither reads the clock
//! nor performs I/O. Callers supply "now" where re-stamping is required and
//! own the [`keys::KeyStore`] that backs encoding/decoding.

mod crypto;
pub mod keys;
mod reader;
mod token;
mod writer;

pub use crypto::{KEY_LEN, NONCE_LEN, open, seal};
pub use keys::{InMemoryKeyStore, Key, KeyStore};
pub use token::{
  AdvertisingToken, RefreshToken, UserIdentity, UserToken, decode_advertising_token,
  decode_refresh_token, decode_user_token, encode_advertising_token, encode_refresh_token,
  encode_user_token,
};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
  #[error("input truncated before expected field boundary")]
  Truncated,
  #[error("input has {0} trailing byte(s) after the expected encoding")]
  TrailingData(usize),
  #[error("unknown master key id {0}")]
  UnknownMasterKey(u32),
  #[error("unknown site key id {0}")]
  UnknownSiteKey(u32),
  #[error("decryption failed: bad key, nonce, or tampered ciphertext")]
  Decrypt,
  #[error("invalid base64 envelope: {0}")]
  Base64(#[from] base64::DecodeError),
  #[error("id field is not valid UTF-8")]
  InvalidUtf8,
  #[error("unsupported token version {0}")]
  UnsupportedVersion(u8),
}
