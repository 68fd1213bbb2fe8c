use crate::crypto::{open, seal};
use crate::keys::KeyStore;
use crate::reader::Reader;
use crate::writer::Writer;
use crate::CodecError;

/// The only wire version this codec speaks. Tokens minted under any other
/// version are out of scope for decoding.
pub const CURRENT_VERSION: u8 = 2;

/// The identity embedded, under encryption, in every token shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserIdentity {
  pub id: String,
  pub site_id: u32,
  pub privacy_bits: u32,
  pub established_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvertisingToken {
  pub version: u8,
  pub created_at: i64,
  pub expires_at: i64,
  pub user_identity: UserIdentity,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserToken {
  pub version: u8,
  pub created_at: i64,
  pub expires_at: i64,
  pub user_identity: UserIdentity,
  pub privacy_bits2: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshToken {
  pub version: u8,
  pub created_at: i64,
  pub expires_at: i64,
  pub valid_till: i64,
  pub user_identity: UserIdentity,
}

fn write_identity(w: &mut Writer, identity: &UserIdentity) {
  w.u32(identity.site_id)
    .len_prefixed(identity.id.as_bytes())
    .u32(identity.privacy_bits)
    .i64(identity.established_at);
}

fn read_identity(r: &mut Reader) -> Result<UserIdentity, CodecError> {
  let site_id = r.u32()?;
  let id = std::str::from_utf8(r.len_prefixed()?)
    .map_err(|_| CodecError::InvalidUtf8)?
    .to_string();
  let privacy_bits = r.u32()?;
  let established_at = r.i64()?;
  return Ok(UserIdentity {
    id,
    site_id,
    privacy_bits,
    established_at,
  });
}

fn check_version(version: u8) -> Result<(), CodecError> {
  if version != CURRENT_VERSION {
    return Err(CodecError::UnsupportedVersion(version));
  }
  return Ok(());
}

/// `version:1 | masterKeyId:4 | encrypt_master( expiresAt:8 | siteKeyId:4 | encrypt_site( siteId:4 | idLen:4 | idBytes | privacyBits:4 | establishedAt:8 ) )`
pub fn encode_advertising_token(
  token: &AdvertisingToken,
  keys: &dyn KeyStore,
) -> Result<String, CodecError> {
  let site_key = keys.active_site_key();
  let mut site_payload = Writer::new();
  write_identity(&mut site_payload, &token.user_identity);
  let sealed_site = seal(&site_key.secret, &site_payload.into_bytes());

  let master_key = keys.active_master_key();
  let mut master_payload = Writer::new();
  master_payload.i64(token.expires_at).u32(site_key.id).bytes(&sealed_site);
  let sealed_master = seal(&master_key.secret, &master_payload.into_bytes());

  let mut out = Writer::new();
  out.u8(CURRENT_VERSION).u32(master_key.id).bytes(&sealed_master);

  return Ok(base64::Engine::encode(
    &base64::engine::general_purpose::STANDARD,
    out.into_bytes(),
  ));
}

/// Decodes an advertising token. `created_at` is not carried on the wire and
/// is re-stamped from `now`.
pub fn decode_advertising_token(
  b64: &str,
  keys: &dyn KeyStore,
  now: i64,
) -> Result<AdvertisingToken, CodecError> {
  let raw = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, b64)?;
  let mut r = Reader::new(&raw);

  let version = r.u8()?;
  check_version(version)?;

  let master_key_id = r.u32()?;
  let master_key = keys
    .master_key(master_key_id)
    .ok_or(CodecError::UnknownMasterKey(master_key_id))?;

  let master_plain = open(&master_key.secret, r.remainder())?;
  r.finish()?;

  let mut mr = Reader::new(&master_plain);
  let expires_at = mr.i64()?;
  let site_key_id = mr.u32()?;
  let site_key = keys
    .site_key(site_key_id)
    .ok_or(CodecError::UnknownSiteKey(site_key_id))?;

  let site_plain = open(&site_key.secret, mr.remainder())?;
  mr.finish()?;

  let mut sr = Reader::new(&site_plain);
  let user_identity = read_identity(&mut sr)?;
  sr.finish()?;

  return Ok(AdvertisingToken {
    version,
    created_at: now,
    expires_at,
    user_identity,
  });
}

/// `version:1 | createdAt:8 | expiresAt:8 | validTill:8 | masterKeyId:4 | encrypt_master( siteId:4 | idLen:4 | idBytes | privacyBits:4 | establishedAt:8 )`
pub fn encode_refresh_token(
  token: &RefreshToken,
  keys: &dyn KeyStore,
) -> Result<String, CodecError> {
  let master_key = keys.active_master_key();

  let mut payload = Writer::new();
  write_identity(&mut payload, &token.user_identity);
  let sealed = seal(&master_key.secret, &payload.into_bytes());

  let mut out = Writer::new();
  out
    .u8(CURRENT_VERSION)
    .i64(token.created_at)
    .i64(token.expires_at)
    .i64(token.valid_till)
    .u32(master_key.id)
    .bytes(&sealed);

  return Ok(base64::Engine::encode(
    &base64::engine::general_purpose::STANDARD,
    out.into_bytes(),
  ));
}

pub fn decode_refresh_token(b64: &str, keys: &dyn KeyStore) -> Result<RefreshToken, CodecError> {
  let raw = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, b64)?;
  let mut r = Reader::new(&raw);

  let version = r.u8()?;
  check_version(version)?;

  let created_at = r.i64()?;
  let expires_at = r.i64()?;
  let valid_till = r.i64()?;
  let master_key_id = r.u32()?;
  let master_key = keys
    .master_key(master_key_id)
    .ok_or(CodecError::UnknownMasterKey(master_key_id))?;

  let plain = open(&master_key.secret, r.remainder())?;
  r.finish()?;

  let mut pr = Reader::new(&plain);
  let user_identity = read_identity(&mut pr)?;
  pr.finish()?;

  return Ok(RefreshToken {
    version,
    created_at,
    expires_at,
    valid_till,
    user_identity,
  });
}

/// `version:1 | createdAt:8 | expiresAt:8 | siteKeyId:4 | encrypt_site( siteId:4 | idLen:4 | idBytes | privacyBits:4 | establishedAt:8 | privacyBits2:4 )`
pub fn encode_user_token(token: &UserToken, keys: &dyn KeyStore) -> Result<String, CodecError> {
  let site_key = keys.active_site_key();

  let mut payload = Writer::new();
  write_identity(&mut payload, &token.user_identity);
  payload.u32(token.privacy_bits2);
  let sealed = seal(&site_key.secret, &payload.into_bytes());

  let mut out = Writer::new();
  out
    .u8(CURRENT_VERSION)
    .i64(token.created_at)
    .i64(token.expires_at)
    .u32(site_key.id)
    .bytes(&sealed);

  return Ok(base64::Engine::encode(
    &base64::engine::general_purpose::STANDARD,
    out.into_bytes(),
  ));
}

pub fn decode_user_token(b64: &str, keys: &dyn KeyStore) -> Result<UserToken, CodecError> {
  let raw = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, b64)?;
  let mut r = Reader::new(&raw);

  let version = r.u8()?;
  check_version(version)?;

  let created_at = r.i64()?;
  let expires_at = r.i64()?;
  let site_key_id = r.u32()?;
  let site_key = keys
    .site_key(site_key_id)
    .ok_or(CodecError::UnknownSiteKey(site_key_id))?;

  let plain = open(&site_key.secret, r.remainder())?;
  r.finish()?;

  let mut pr = Reader::new(&plain);
  let user_identity = read_identity(&mut pr)?;
  let privacy_bits2 = pr.u32()?;
  pr.finish()?;

  return Ok(UserToken {
    version,
    created_at,
    expires_at,
    user_identity,
    privacy_bits2,
  });
}
