//! The lifecycle manager: owns the current identity, the refresh timer, the
//! waiter queue, and the cookie mirror.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tracing::{debug, warn};

use crate::callback::{Callback, CallbackFn, Status};
use crate::classifier::{LifecycleState, classify, token_returnable};
use crate::clock::{Clock, SystemClock};
use crate::cookie::{CookieAttributes, CookieJar, InMemoryCookieJar};
use crate::envelope::{Identity, ValidationError};
use crate::error::{Error, WaiterError};
use crate::transport::{ReqwestTransport, RefreshOutcome, RefreshTransport};

/// `init`'s default and minimum refresh retry period.
pub const DEFAULT_REFRESH_RETRY_PERIOD_MILLIS: i64 = 5000;
const MIN_REFRESH_RETRY_PERIOD_MILLIS: i64 = 1000;

const DEFAULT_BASE_URL: &str = "https://prod.adid.example.invalid";

/// Configuration accepted by [`LifecycleManager::init`].
pub struct Config {
  callback: CallbackFn,
  identity: Option<Identity>,
  refresh_retry_period_millis: i64,
  base_url: String,
  cookie_domain: Option<String>,
  cookie_path: String,
}

impl Config {
  pub fn new(callback: impl Fn(Callback) + Send + Sync + 'static) -> Self {
    return Self {
      callback: Box::new(callback),
      identity: None,
      refresh_retry_period_millis: DEFAULT_REFRESH_RETRY_PERIOD_MILLIS,
      base_url: DEFAULT_BASE_URL.to_string(),
      cookie_domain: None,
      cookie_path: "/".to_string(),
    };
  }

  pub fn with_identity(mut self, identity: impl Into<Option<Identity>>) -> Self {
    self.identity = identity.into();
    return self;
  }

  pub fn with_refresh_retry_period_millis(mut self, millis: i64) -> Self {
    self.refresh_retry_period_millis = millis;
    return self;
  }

  pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
    self.base_url = base_url.into();
    return self;
  }

  pub fn with_cookie_domain(mut self, domain: impl Into<Option<String>>) -> Self {
    self.cookie_domain = domain.into();
    return self;
  }

  pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
    self.cookie_path = path.into();
    return self;
  }
}

/// A fresh promise-shaped handle, as returned by
/// [`LifecycleManager::get_advertising_token_async`].
pub struct TokenWaiter(oneshot::Receiver<Result<String, WaiterError>>);

impl TokenWaiter {
  /// Awaits the definitive outcome: the advertising token, or the reason it
  /// could never be returned.
  pub async fn resolve(self) -> Result<String, WaiterError> {
    return match self.0.await {
      Ok(outcome) => outcome,
      // The sending half was dropped without sending, which only happens if
      // the manager itself was torn down mid-flight.
      Err(_) => Err(WaiterError::Disconnected),
    };
  }
}

/// Internal lifecycle phase. Distinct from the host-facing [`Status`]
/// taxonomy used in callbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
  Initialising,
  Established,
  Refreshing,
  RefreshInFlightWithExpiredToken,
  Unavailable,
  Disconnected,
}

impl Phase {
  fn is_refresh_in_flight(self) -> bool {
    return matches!(self, Phase::Refreshing | Phase::RefreshInFlightWithExpiredToken);
  }
}

struct State {
  phase: Phase,
  identity: Option<Identity>,
  last_status: Option<Status>,
  callback: Option<CallbackFn>,
  refresh_retry_period_millis: i64,
  base_url: String,
  cookie_attrs: CookieAttributes,
  timer: Option<tokio::task::AbortHandle>,
  waiters: VecDeque<oneshot::Sender<Result<String, WaiterError>>>,
}

impl State {
  fn new() -> Self {
    return Self {
      phase: Phase::Initialising,
      identity: None,
      last_status: None,
      callback: None,
      refresh_retry_period_millis: DEFAULT_REFRESH_RETRY_PERIOD_MILLIS,
      base_url: DEFAULT_BASE_URL.to_string(),
      cookie_attrs: CookieAttributes::new("/", None),
      timer: None,
      waiters: VecDeque::new(),
    };
  }
}

fn status_to_waiter_error(status: Status) -> WaiterError {
  return match status {
    Status::Expired => WaiterError::TemporarilyUnavailable,
    Status::Optout => WaiterError::Optout,
    Status::RefreshExpired => WaiterError::RefreshExpired,
    // NoIdentity, Invalid: both arise only from `init` producing an
    // unavailable identity.
    Status::NoIdentity | Status::Invalid => WaiterError::InitFailed,
    Status::Established | Status::Refreshed | Status::Optin => {
      unreachable!("never used to reject a waiter")
    }
  };
}

struct Inner {
  clock: Arc<dyn Clock>,
  transport: Arc<dyn RefreshTransport>,
  cookie_jar: Arc<dyn CookieJar>,
  initiated: AtomicBool,
  state: AsyncMutex<State>,
}

/// Owns one identity's lifecycle: the state machine, the refresh timer, the
/// waiter queue, and the cookie mirror. Cheap to clone: every clone shares
/// the same underlying instance, matching a host holding one handle per page.
#[derive(Clone)]
pub struct LifecycleManager {
  inner: Arc<Inner>,
}

impl LifecycleManager {
  /// Constructs an instance with injected collaborators. Production code
  /// should generally prefer [`LifecycleManager::with_defaults`].
  pub fn new(
    clock: impl Clock + 'static,
    transport: impl RefreshTransport + 'static,
    cookie_jar: impl CookieJar + 'static,
  ) -> Self {
    return Self {
      inner: Arc::new(Inner {
        clock: Arc::new(clock),
        transport: Arc::new(transport),
        cookie_jar: Arc::new(cookie_jar),
        initiated: AtomicBool::new(false),
        state: AsyncMutex::new(State::new()),
      }),
    };
  }

  /// Constructs an instance with the production collaborators: the system
  /// clock, a `reqwest`-backed transport, and an in-process cookie jar.
  pub fn with_defaults() -> Self {
    return Self::new(SystemClock, ReqwestTransport::default(), InMemoryCookieJar::new());
  }

  /// One-shot. Rejected synchronously, before any `.await`, if this instance
  /// was already initialised.
  pub async fn init(&self, config: Config) -> Result<(), Error> {
    if self.inner.initiated.swap(true, Ordering::SeqCst) {
      return Err(Error::AlreadyInitialised);
    }

    let Config {
      callback,
      identity,
      refresh_retry_period_millis,
      base_url,
      cookie_domain,
      cookie_path,
    } = config;

    let now = self.inner.clock.now_millis();
    let resolved = self.resolve_initial_identity(identity);

    let mut state = self.inner.state.lock().await;
    state.callback = Some(callback);
    state.refresh_retry_period_millis = refresh_retry_period_millis.max(MIN_REFRESH_RETRY_PERIOD_MILLIS);
    state.base_url = base_url;
    state.cookie_attrs = CookieAttributes::new(cookie_path, cookie_domain);

    self.settle_init(&mut state, resolved, now).await;

    return Ok(());
  }

  /// Synchronous, never triggers I/O. Returns the advertising token iff the
  /// lifecycle is currently `ESTABLISHED` and the token hasn't expired.
  pub fn get_advertising_token(&self) -> Option<String> {
    let state = self.inner.state.try_lock().ok()?;
    if state.phase != Phase::Established {
      return None;
    }
    let identity = state.identity.as_ref()?;
    let now = self.inner.clock.now_millis();
    if !token_returnable(Some(identity), now) {
      return None;
    }
    return Some(identity.advertising_token.clone());
  }

  /// Returns a fresh handle: queued if no answer is known yet, resolved
  /// immediately if a token is returnable now, or rejected immediately if
  /// the lifecycle is terminal-negative.
  pub async fn get_advertising_token_async(&self) -> TokenWaiter {
    let (tx, rx) = oneshot::channel();
    let mut state = self.inner.state.lock().await;

    if state.phase == Phase::Disconnected {
      let _ = tx.send(Err(WaiterError::Disconnected));
      return TokenWaiter(rx);
    }

    if state.phase == Phase::Unavailable {
      let kind = state
        .last_status
        .map(status_to_waiter_error)
        .unwrap_or(WaiterError::InitFailed);
      let _ = tx.send(Err(kind));
      return TokenWaiter(rx);
    }

    if state.phase == Phase::Established {
      let now = self.inner.clock.now_millis();
      if let Some(identity) = state.identity.as_ref().filter(|i| token_returnable(Some(i), now)) {
        let _ = tx.send(Ok(identity.advertising_token.clone()));
        return TokenWaiter(rx);
      }
    }

    state.waiters.push_back(tx);
    return TokenWaiter(rx);
  }

  /// True iff no valid envelope is available and the state is not mid-refresh.
  pub async fn is_login_required(&self) -> bool {
    let state = self.inner.state.lock().await;
    if state.phase.is_refresh_in_flight() {
      return false;
    }
    let now = self.inner.clock.now_millis();
    return !token_returnable(state.identity.as_ref(), now);
  }

  /// Terminal. Cancels the timer, clears the cookie, rejects every queued
  /// waiter, and moves to `DISCONNECTED`. No callback is emitted: disconnect
  /// is a host-driven teardown, not an observed identity transition.
  pub async fn disconnect(&self) {
    let mut state = self.inner.state.lock().await;
    if state.phase == Phase::Disconnected {
      return;
    }
    self.cancel_timer(&mut state);
    state.phase = Phase::Disconnected;
    self.inner.cookie_jar.clear();
    self.drain_waiters(&mut state, Err(WaiterError::Disconnected));
    debug!("lifecycle manager disconnected");
  }

  /// Cancels the timer only. Intended for host teardown in tests; does not
  /// clear the cookie or drain waiters.
  pub async fn abort(&self) {
    let mut state = self.inner.state.lock().await;
    self.cancel_timer(&mut state);
  }

  fn resolve_initial_identity(&self, explicit: Option<Identity>) -> Option<Result<Identity, ValidationError>> {
    if let Some(identity) = explicit {
      return Some(identity.normalized());
    }

    let raw_cookie = self.inner.cookie_jar.get()?;
    let parsed: Identity = match serde_json::from_str(&raw_cookie) {
      Ok(parsed) => parsed,
      Err(err) => {
        warn!(%err, "cookie payload was not valid JSON; treating as no identity");
        return None;
      }
    };

    return match parsed.normalized() {
      Ok(identity) => Some(Ok(identity)),
      Err(err) => {
        warn!(%err, "cookie payload failed validation; treating as no identity");
        None
      }
    };
  }

  /// Classifies the resolved initial identity and drives the matching
  /// first transition: straight to `ESTABLISHED`, into a refresh with the
  /// token still (or no longer) returnable, or to a terminal unavailable
  /// outcome.
  async fn settle_init(
    &self,
    state: &mut State,
    resolved: Option<Result<Identity, ValidationError>>,
    now: i64,
  ) {
    match resolved {
      None => self.finish_unavailable(state, Status::NoIdentity).await,
      Some(Err(_)) => self.finish_unavailable(state, Status::Invalid).await,
      Some(Ok(identity)) => match classify(Some(&identity), now) {
        LifecycleState::RefreshExpired => {
          state.identity = Some(identity);
          self.finish_unavailable(state, Status::RefreshExpired).await;
        }
        LifecycleState::Established { refresh_due: false } => {
          self.enter_established(state, identity, Status::Established, now).await;
        }
        LifecycleState::Established { refresh_due: true } => {
          state.phase = Phase::Refreshing;
          state.identity = Some(identity.clone());
          self.start_refresh(state, identity);
        }
        LifecycleState::Expired => {
          state.phase = Phase::RefreshInFlightWithExpiredToken;
          state.identity = Some(identity.clone());
          self.start_refresh(state, identity);
        }
        LifecycleState::NoIdentity | LifecycleState::Invalid => {
          unreachable!("identity was already structurally validated above")
        }
      },
    }
  }

  /// Commits a successful (re)establishment: writes the cookie, emits the
  /// callback, resolves every queued waiter with the new token, and arms
  /// the refresh timer. Used both for a successful refresh and for the
  /// initial `ESTABLISHED` entry from `init` (with `status = Status::Established`).
  async fn enter_established(&self, state: &mut State, identity: Identity, status: Status, now: i64) {
    self.cancel_timer(state);
    self.write_cookie(state, &identity);

    state.phase = Phase::Established;
    state.last_status = Some(status);
    state.identity = Some(identity.clone());

    self.emit_callback(state, status, Some(&identity));
    self.drain_waiters(state, Ok(identity.advertising_token.clone()));
    self.arm_timer(state, identity.refresh_from - now);
  }

  /// Commits a terminal, negative outcome (no identity, invalid, opted
  /// out, or refresh-expired): cancels the timer, clears the cookie when
  /// the status calls for it, emits the callback, and rejects every queued
  /// waiter. No further refresh is scheduled.
  async fn finish_unavailable(&self, state: &mut State, status: Status) {
    self.cancel_timer(state);

    if matches!(status, Status::Invalid | Status::RefreshExpired | Status::Optout) {
      self.inner.cookie_jar.clear();
    }

    state.phase = Phase::Unavailable;
    state.last_status = Some(status);

    let identity = state.identity.clone();
    self.emit_callback(state, status, identity.as_ref());
    self.drain_waiters(state, Err(status_to_waiter_error(status)));
  }

  /// Applies the retry policy for a failed or errored refresh attempt:
  /// stays established with the timer rearmed if the current token is
  /// still returnable, downgrades to a reported `EXPIRED` if the token
  /// just lapsed, or finishes unavailable if the refresh token itself
  /// has expired.
  async fn handle_refresh_error(&self, state: &mut State, now: i64) {
    let Some(identity) = state.identity.clone() else {
      self.finish_unavailable(state, Status::NoIdentity).await;
      return;
    };

    match classify(Some(&identity), now) {
      LifecycleState::RefreshExpired => {
        self.finish_unavailable(state, Status::RefreshExpired).await;
      }
      LifecycleState::Expired => {
        state.phase = Phase::Established;
        let already_reported = state.last_status == Some(Status::Expired);
        state.last_status = Some(Status::Expired);
        if !already_reported {
          self.emit_callback(state, Status::Expired, Some(&identity));
        }
        self.drain_waiters(state, Err(WaiterError::TemporarilyUnavailable));
        self.arm_timer(state, state.refresh_retry_period_millis);
      }
      LifecycleState::Established { .. } => {
        state.phase = Phase::Established;
        self.drain_waiters(state, Ok(identity.advertising_token.clone()));
        self.arm_timer(state, state.refresh_retry_period_millis);
      }
      LifecycleState::NoIdentity | LifecycleState::Invalid => {
        unreachable!("a refresh is only ever started with a structurally valid identity")
      }
    }
  }

  async fn handle_refresh_outcome(&self, outcome: RefreshOutcome) {
    let mut state = self.inner.state.lock().await;

    // Disconnect raced the in-flight RPC: the response is discarded, no
    // callback, no cookie write, no waiter notification (those were drained
    // at disconnect already).
    if state.phase == Phase::Disconnected {
      debug!("discarding refresh outcome observed after disconnect");
      return;
    }

    let now = self.inner.clock.now_millis();
    match outcome {
      RefreshOutcome::Success(identity) => {
        self.enter_established(&mut state, identity, Status::Refreshed, now).await;
      }
      RefreshOutcome::Optout => {
        self.finish_unavailable(&mut state, Status::Optout).await;
      }
      // `invalid_token` is treated the same as `expired_token`: both
      // terminate the envelope and clear the cookie.
      RefreshOutcome::ExpiredToken | RefreshOutcome::InvalidToken => {
        self.finish_unavailable(&mut state, Status::RefreshExpired).await;
      }
      RefreshOutcome::Error => {
        self.handle_refresh_error(&mut state, now).await;
      }
    }
  }

  async fn on_timer_fire(&self) {
    let mut state = self.inner.state.lock().await;
    if state.phase != Phase::Established {
      return;
    }
    let Some(identity) = state.identity.clone() else {
      return;
    };

    let now = self.inner.clock.now_millis();
    match classify(Some(&identity), now) {
      LifecycleState::Established { refresh_due: true } => {
        state.phase = Phase::Refreshing;
        self.start_refresh(&state, identity);
      }
      LifecycleState::Expired => {
        state.phase = Phase::RefreshInFlightWithExpiredToken;
        self.start_refresh(&state, identity);
      }
      LifecycleState::RefreshExpired => {
        self.finish_unavailable(&mut state, Status::RefreshExpired).await;
      }
      LifecycleState::Established { refresh_due: false } => {
        // Spurious early wake; rearm defensively rather than refresh early.
        self.arm_timer(&mut state, identity.refresh_from - now);
      }
      LifecycleState::NoIdentity | LifecycleState::Invalid => {}
    }
  }

  fn start_refresh(&self, state: &State, identity: Identity) {
    let manager = self.clone();
    let base_url = state.base_url.clone();
    tokio::spawn(async move {
      let outcome = manager
        .inner
        .transport
        .refresh(&base_url, &identity.refresh_token, &identity.refresh_response_key)
        .await;
      manager.handle_refresh_outcome(outcome).await;
    });
  }

  fn arm_timer(&self, state: &mut State, delay_millis: i64) {
    self.cancel_timer(state);
    let manager = self.clone();
    let delay = Duration::from_millis(delay_millis.max(0) as u64);
    let handle = tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      manager.on_timer_fire().await;
    })
    .abort_handle();
    state.timer = Some(handle);
  }

  fn cancel_timer(&self, state: &mut State) {
    if let Some(handle) = state.timer.take() {
      handle.abort();
    }
  }

  fn emit_callback(&self, state: &State, status: Status, identity: Option<&Identity>) {
    debug!(?status, "emitting lifecycle callback");
    if let Some(callback) = &state.callback {
      callback(Callback::new(status, identity));
    }
  }

  fn drain_waiters(&self, state: &mut State, outcome: Result<String, WaiterError>) {
    for waiter in state.waiters.drain(..) {
      let _ = waiter.send(outcome.clone());
    }
  }

  fn write_cookie(&self, state: &State, identity: &Identity) {
    match serde_json::to_string(identity) {
      Ok(json) => self
        .inner
        .cookie_jar
        .set(&json, &state.cookie_attrs, identity.refresh_expires),
      Err(err) => warn!(%err, "failed to serialize identity for cookie write"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::testing::FakeClock;
  use crate::cookie::InMemoryCookieJar;
  use crate::transport::testing::ScriptedTransport;

  fn identity(refresh_from: i64, identity_expires: i64, refresh_expires: i64) -> Identity {
    return Identity {
      advertising_token: "adv-token".to_string(),
      refresh_token: "refresh-token".to_string(),
      identity_expires,
      refresh_from,
      refresh_expires,
      refresh_response_key: "a2V5".to_string(),
    };
  }

  fn manager(now: i64, outcomes: Vec<RefreshOutcome>) -> LifecycleManager {
    return LifecycleManager::new(
      FakeClock::new(now),
      ScriptedTransport::new(outcomes),
      InMemoryCookieJar::new(),
    );
  }

  #[tokio::test]
  async fn second_init_is_rejected_synchronously() {
    let manager = manager(0, vec![]);
    manager.init(Config::new(|_| {})).await.unwrap();

    assert!(matches!(manager.init(Config::new(|_| {})).await, Err(Error::AlreadyInitialised)));
  }

  #[tokio::test]
  async fn get_advertising_token_is_none_before_init() {
    let manager = manager(0, vec![]);
    assert_eq!(manager.get_advertising_token(), None);
  }

  #[tokio::test]
  async fn get_advertising_token_returns_established_token() {
    let manager = manager(0, vec![]);
    let e = identity(1000, 2000, 3000);
    manager.init(Config::new(|_| {}).with_identity(e.clone())).await.unwrap();

    assert_eq!(manager.get_advertising_token().as_deref(), Some("adv-token"));
  }

  #[tokio::test]
  async fn disconnect_rejects_subsequent_async_calls() {
    let manager = manager(0, vec![]);
    manager.init(Config::new(|_| {})).await.unwrap();
    manager.disconnect().await;

    let outcome = manager.get_advertising_token_async().await.resolve().await;
    assert_eq!(outcome, Err(WaiterError::Disconnected));
  }

  #[tokio::test]
  async fn is_login_required_true_with_no_identity() {
    let manager = manager(0, vec![]);
    manager.init(Config::new(|_| {})).await.unwrap();
    assert!(manager.is_login_required().await);
  }

  #[tokio::test]
  async fn is_login_required_false_with_established_identity() {
    let manager = manager(0, vec![]);
    let e = identity(1000, 2000, 3000);
    manager.init(Config::new(|_| {}).with_identity(e)).await.unwrap();
    assert!(!manager.is_login_required().await);
  }
}
