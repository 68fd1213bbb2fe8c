//! The callback taxonomy surfaced verbatim to the host, one per
//! externally-observable transition.

use serde::Serialize;

use crate::envelope::Identity;

/// Every externally-observable status a transition can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
  Established,
  Refreshed,
  Expired,
  NoIdentity,
  Invalid,
  RefreshExpired,
  Optout,
  Optin,
}

impl Status {
  /// A short, human-readable description, mirrored in `Callback::status_text`.
  pub fn text(self) -> &'static str {
    return match self {
      Status::Established => "Identity established",
      Status::Refreshed => "Identity refreshed",
      Status::Expired => "Identity expired; a refresh is in progress or pending",
      Status::NoIdentity => "No identity available",
      Status::Invalid => "Identity was invalid",
      Status::RefreshExpired => "Refresh token expired; a fresh init() is required",
      Status::Optout => "User has opted out",
      Status::Optin => "User has opted in",
    };
  }
}

/// The payload handed to the host-supplied callback on every observable
/// transition. Carries both spellings of the advertising token for
/// migration purposes, until the consumer contract settles on one.
#[derive(Clone, Debug, Serialize)]
pub struct Callback {
  pub advertising_token: Option<String>,
  #[serde(rename = "advertisingToken")]
  pub advertising_token_camel: Option<String>,
  pub status: Status,
  pub status_text: &'static str,
  pub identity: Option<Identity>,
}

impl Callback {
  pub fn new(status: Status, identity: Option<&Identity>) -> Self {
    let advertising_token = identity.map(|i| i.advertising_token.clone());
    return Self {
      advertising_token_camel: advertising_token.clone(),
      advertising_token,
      status,
      status_text: status.text(),
      identity: identity.cloned(),
    };
  }
}

/// A host-supplied transition callback. Exactly one is invoked per
/// observable transition.
pub type CallbackFn = Box<dyn Fn(Callback) + Send + Sync>;
