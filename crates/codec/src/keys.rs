use crate::crypto::KEY_LEN;

/// A single symmetric key, identified by the id embedded alongside it on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Key {
  pub id: u32,
  pub secret: [u8; KEY_LEN],
}

/// The key-directory contract the codec requires from its host.
///
/// Key provisioning, storage, and rotation policy are explicitly out of scope
/// (see the crate-level docs); this trait is the only surface the codec needs.
pub trait KeyStore: Send + Sync {
  fn master_key(&self, id: u32) -> Option<Key>;
  fn site_key(&self, id: u32) -> Option<Key>;

  /// The key used when minting new advertising/refresh tokens.
  fn active_master_key(&self) -> Key;
  /// The key used when minting new advertising/user tokens.
  fn active_site_key(&self) -> Key;
}

/// A trivial in-memory [`KeyStore`], useful for tests and for small deployments
/// that don't need on-disk key rotation.
#[derive(Clone, Debug, Default)]
pub struct InMemoryKeyStore {
  master_keys: Vec<Key>,
  site_keys: Vec<Key>,
  active_master: u32,
  active_site: u32,
}

impl InMemoryKeyStore {
  pub fn new(active_master: Key, active_site: Key) -> Self {
    return Self {
      active_master: active_master.id,
      active_site: active_site.id,
      master_keys: vec![active_master],
      site_keys: vec![active_site],
    };
  }

  pub fn with_master_key(mut self, key: Key) -> Self {
    self.master_keys.push(key);
    return self;
  }

  pub fn with_site_key(mut self, key: Key) -> Self {
    self.site_keys.push(key);
    return self;
  }
}

impl KeyStore for InMemoryKeyStore {
  fn master_key(&self, id: u32) -> Option<Key> {
    return self.master_keys.iter().find(|k| k.id == id).copied();
  }

  fn site_key(&self, id: u32) -> Option<Key> {
    return self.site_keys.iter().find(|k| k.id == id).copied();
  }

  fn active_master_key(&self) -> Key {
    return self
      .master_key(self.active_master)
      .expect("active master key id must be present in the store");
  }

  fn active_site_key(&self) -> Key {
    return self
      .site_key(self.active_site)
      .expect("active site key id must be present in the store");
  }
}
