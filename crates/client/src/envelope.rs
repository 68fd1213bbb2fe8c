//! The identity envelope: the unit persisted in the cookie and exchanged
//! with the refresh endpoint.

use serde::{Deserialize, Serialize};

/// Below this magnitude a timestamp is assumed to be seconds, not
/// milliseconds, and is normalized by multiplying by 1000.
///
/// This is the magnitude gap between "seconds since the 2001 epoch" and
/// "milliseconds since 1970" for any date in the service's operational
/// lifetime.
const SECONDS_MAGNITUDE_THRESHOLD: i64 = 1_000_000_000_000;

fn normalize_millis(v: i64) -> i64 {
  if v > 0 && v < SECONDS_MAGNITUDE_THRESHOLD {
    return v * 1000;
  }
  return v;
}

/// The identity envelope, as persisted in the cookie and returned by the
/// refresh endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
  pub advertising_token: String,
  pub refresh_token: String,
  /// Absolute time, ms since epoch. Past this instant the advertising token
  /// must not be returned to callers.
  pub identity_expires: i64,
  /// Absolute time, ms since epoch. At or after this instant a background
  /// refresh is due, though the token remains usable until `identity_expires`.
  pub refresh_from: i64,
  /// Absolute time, ms since epoch. Past this instant the refresh token is
  /// dead and the envelope is terminally unusable.
  pub refresh_expires: i64,
  /// Symmetric key used to decrypt the refresh endpoint's response body,
  /// base64-encoded on the wire.
  pub refresh_response_key: String,
}

impl Identity {
  /// Normalizes any field that arrived in seconds (by magnitude) to
  /// milliseconds, then validates the structural invariant
  /// `refresh_from <= identity_expires <= refresh_expires` and that every
  /// string field is non-empty.
  ///
  /// Called at every ingress point: an explicit `init` identity, a decoded
  /// refresh response, and a parsed cookie.
  pub fn normalized(mut self) -> Result<Self, ValidationError> {
    self.identity_expires = normalize_millis(self.identity_expires);
    self.refresh_from = normalize_millis(self.refresh_from);
    self.refresh_expires = normalize_millis(self.refresh_expires);
    self.validate()?;
    return Ok(self);
  }

  fn validate(&self) -> Result<(), ValidationError> {
    if self.advertising_token.is_empty()
      || self.refresh_token.is_empty()
      || self.refresh_response_key.is_empty()
    {
      return Err(ValidationError::EmptyField);
    }

    if !(self.refresh_from <= self.identity_expires && self.identity_expires <= self.refresh_expires) {
      return Err(ValidationError::OutOfOrderTimestamps {
        refresh_from: self.refresh_from,
        identity_expires: self.identity_expires,
        refresh_expires: self.refresh_expires,
      });
    }

    return Ok(());
  }
}

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
  #[error("one or more required string fields are empty")]
  EmptyField,
  #[error(
    "timestamps out of order: refresh_from={refresh_from} identity_expires={identity_expires} refresh_expires={refresh_expires}"
  )]
  OutOfOrderTimestamps {
    refresh_from: i64,
    identity_expires: i64,
    refresh_expires: i64,
  },
}
