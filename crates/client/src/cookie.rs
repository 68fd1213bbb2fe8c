//! The cookie jar contract and the `__uid_2` cookie framing.
//!
//! The jar itself, wherever `document.cookie` or its host-side equivalent
//! actually lives, is explicitly out of scope as a collaborator; this
//! module owns only the encoding and the trait the manager depends on.

use cookie::Cookie;
use cookie::time::OffsetDateTime;
use parking_lot::Mutex;

/// The name under which the manager persists the identity envelope.
pub const COOKIE_NAME: &str = "__uid_2";

/// Where and how the cookie is scoped.
#[derive(Clone, Debug, Default)]
pub struct CookieAttributes {
  pub domain: Option<String>,
  pub path: String,
}

impl CookieAttributes {
  pub fn new(path: impl Into<String>, domain: Option<String>) -> Self {
    return Self {
      path: path.into(),
      domain,
    };
  }
}

/// The cookie-jar contract the manager requires from its host.
///
/// A single mutable slot: written after every successful refresh, cleared on
/// terminal-negative transitions and on disconnect, never written
/// speculatively. Read/write failures are the host's to report (or swallow);
/// the manager logs at `warn!` and continues in memory regardless.
pub trait CookieJar: Send + Sync {
  /// Returns the envelope's raw JSON, or `None` if absent. A jar backed by a
  /// real `Cookie` HTTP header is responsible for its own percent-decoding
  /// before returning here (see [`decode_cookie_value`]).
  fn get(&self) -> Option<String>;

  /// Writes the envelope's raw JSON with the given attributes and an expiry
  /// of `expires_at_millis`. A jar backed by a real `Set-Cookie` response
  /// header should percent-encode before transmitting (see
  /// [`build_set_cookie_header`]).
  fn set(&self, value: &str, attrs: &CookieAttributes, expires_at_millis: i64);

  /// Removes the cookie.
  fn clear(&self);
}

/// Builds the `Set-Cookie` header a host can forward verbatim, using the
/// `cookie` crate for correct `Path`/`Domain`/`SameSite`/expiry framing.
pub fn build_set_cookie_header(value: &str, attrs: &CookieAttributes, expires_at_millis: i64) -> String {
  let encoded: String = url::form_urlencoded::byte_serialize(value.as_bytes()).collect();

  let mut builder = Cookie::build((COOKIE_NAME, encoded))
    .path(attrs.path.clone())
    .same_site(cookie::SameSite::Lax)
    .http_only(false);

  if let Some(domain) = &attrs.domain {
    builder = builder.domain(domain.clone());
  }

  if let Ok(expiry) = OffsetDateTime::from_unix_timestamp(expires_at_millis / 1000) {
    builder = builder.expires(expiry);
  }

  return builder.build().to_string();
}

/// Decodes a previously percent-encoded cookie value back into the raw JSON
/// the manager serialized. Inverts [`build_set_cookie_header`]'s
/// `byte_serialize` by round-tripping through a single-pair query string.
pub fn decode_cookie_value(raw: &str) -> String {
  let wrapped = format!("v={raw}");
  return url::form_urlencoded::parse(wrapped.as_bytes())
    .next()
    .map(|(_, v)| v.into_owned())
    .unwrap_or_default();
}

/// An in-process, single-slot [`CookieJar`]: the default for hosts that
/// don't proxy a real browser cookie (tests, server-side deployments that
/// keep the envelope in their own session store).
#[derive(Default)]
pub struct InMemoryCookieJar {
  slot: Mutex<Option<String>>,
}

impl InMemoryCookieJar {
  pub fn new() -> Self {
    return Self::default();
  }
}

impl CookieJar for InMemoryCookieJar {
  fn get(&self) -> Option<String> {
    return self.slot.lock().clone();
  }

  fn set(&self, value: &str, _attrs: &CookieAttributes, _expires_at_millis: i64) {
    *self.slot.lock() = Some(value.to_string());
  }

  fn clear(&self) {
    *self.slot.lock() = None;
  }
}

/// Delegates through an `Arc`, so a test (or a host) can keep a handle to
/// the same jar instance the manager was constructed with.
impl<T: CookieJar + ?Sized> CookieJar for std::sync::Arc<T> {
  fn get(&self) -> Option<String> {
    return (**self).get();
  }

  fn set(&self, value: &str, attrs: &CookieAttributes, expires_at_millis: i64) {
    (**self).set(value, attrs, expires_at_millis);
  }

  fn clear(&self) {
    (**self).clear();
  }
}
