//! Injected clock capability, so tests can advance time deterministically
//! and so timer math has one place to live.

use std::time::{SystemTime, UNIX_EPOCH};

/// A source of "now", in ms since the Unix epoch.
pub trait Clock: Send + Sync {
  fn now_millis(&self) -> i64;
}

/// The production clock, backed by [`SystemTime::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now_millis(&self) -> i64 {
    return SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .expect("system clock is before the Unix epoch")
      .as_millis() as i64;
  }
}

#[cfg(test)]
pub(crate) mod testing {
  use super::Clock;
  use std::sync::atomic::{AtomicI64, Ordering};

  /// A settable clock for deterministic tests.
  #[derive(Debug, Default)]
  pub(crate) struct FakeClock(AtomicI64);

  impl FakeClock {
    pub(crate) fn new(now_millis: i64) -> Self {
      return Self(AtomicI64::new(now_millis));
    }

    pub(crate) fn set(&self, now_millis: i64) {
      self.0.store(now_millis, Ordering::SeqCst);
    }
  }

  impl Clock for FakeClock {
    fn now_millis(&self) -> i64 {
      return self.0.load(Ordering::SeqCst);
    }
  }
}
