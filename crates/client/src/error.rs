use thiserror::Error;

/// Failures returned synchronously from the public API.
#[derive(Debug, Error)]
pub enum Error {
  /// `init` was called a second time on the same instance.
  #[error("init() has already been called on this instance")]
  AlreadyInitialised,
}

/// The reasons a waiter's future can resolve negatively.
///
/// These are the only kinds ever surfaced to a host-facing waiter; internal
/// transport/decode failures are normalized away before they reach this type
/// (see the retry handling in [`crate::manager`]).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WaiterError {
  #[error("no identity is available: init() did not establish one")]
  InitFailed,
  #[error("the advertising token is temporarily unavailable")]
  TemporarilyUnavailable,
  #[error("the user has opted out")]
  Optout,
  #[error("the refresh token has expired; a fresh init() is required")]
  RefreshExpired,
  #[error("the instance was disconnected")]
  Disconnected,
}
