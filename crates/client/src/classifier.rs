//! Pure classification of an identity envelope against the current time.
//! No I/O, no mutation; the lifecycle manager is the only caller.

use crate::envelope::Identity;

/// The derived lifecycle state of an identity envelope.
///
/// Distinct from the internal state machine in [`crate::manager`]: this is
/// the classification of the *data*, not the manager's in-flight-refresh
/// bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
  NoIdentity,
  Invalid,
  RefreshExpired,
  Expired,
  /// `refreshDue` tells the caller whether a background refresh is due; the
  /// token is returnable either way.
  Established { refresh_due: bool },
}

/// Classifies `identity` (or its absence) against `now` (ms since epoch).
pub fn classify(identity: Option<&Identity>, now: i64) -> LifecycleState {
  let Some(identity) = identity else {
    return LifecycleState::NoIdentity;
  };

  if now >= identity.refresh_expires {
    return LifecycleState::RefreshExpired;
  }

  if now >= identity.identity_expires {
    return LifecycleState::Expired;
  }

  return LifecycleState::Established {
    refresh_due: now >= identity.refresh_from,
  };
}

/// True iff `identity` is present and its advertising token is still usable
/// at `now`. Does not itself validate structural well-formedness; callers
/// are expected to only ever hold a normalized, already-validated envelope.
pub fn token_returnable(identity: Option<&Identity>, now: i64) -> bool {
  return match identity {
    Some(identity) => now < identity.identity_expires,
    None => false,
  };
}
