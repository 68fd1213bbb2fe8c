//! End-to-end lifecycle scenarios, driven against fakes: no live network,
//! no live clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use adid_client::cookie::{CookieAttributes, CookieJar};
use adid_client::transport::{RefreshOutcome, RefreshTransport};
use adid_client::{Callback, Config, Identity, LifecycleManager, Status, WaiterError};
use parking_lot::Mutex;
use tokio::sync::oneshot;

struct FakeClock(AtomicI64);

impl FakeClock {
  fn new(now: i64) -> Self {
    return Self(AtomicI64::new(now));
  }
}

impl adid_client::clock::Clock for FakeClock {
  fn now_millis(&self) -> i64 {
    return self.0.load(Ordering::SeqCst);
  }
}

#[derive(Default)]
struct InMemoryJar {
  slot: Mutex<Option<String>>,
}

impl CookieJar for InMemoryJar {
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

/// A transport that hands out one scripted outcome per call, blocking on a
/// gate the test controls, so races with `disconnect()` can be driven
/// deterministically.
#[derive(Default)]
struct GatedTransport {
  gate: Mutex<Option<oneshot::Receiver<RefreshOutcome>>>,
}

impl GatedTransport {
  fn new(gate: oneshot::Receiver<RefreshOutcome>) -> Self {
    return Self {
      gate: Mutex::new(Some(gate)),
    };
  }
}

#[async_trait::async_trait]
impl RefreshTransport for GatedTransport {
  async fn refresh(&self, _base_url: &str, _refresh_token: &str, _refresh_response_key: &str) -> RefreshOutcome {
    let gate = self.gate.lock().take().expect("refresh called more than once in this test");
    return gate.await.unwrap_or(RefreshOutcome::Error);
  }
}

#[derive(Default)]
struct ScriptedTransport {
  outcome: Mutex<Option<RefreshOutcome>>,
}

impl ScriptedTransport {
  fn new(outcome: RefreshOutcome) -> Self {
    return Self {
      outcome: Mutex::new(Some(outcome)),
    };
  }
}

#[async_trait::async_trait]
impl RefreshTransport for ScriptedTransport {
  async fn refresh(&self, _base_url: &str, _refresh_token: &str, _refresh_response_key: &str) -> RefreshOutcome {
    return self.outcome.lock().take().unwrap_or(RefreshOutcome::Error);
  }
}

fn identity(advertising_token: &str, refresh_from: i64, identity_expires: i64, refresh_expires: i64) -> Identity {
  return Identity {
    advertising_token: advertising_token.to_string(),
    refresh_token: "refresh-token".to_string(),
    identity_expires,
    refresh_from,
    refresh_expires,
    refresh_response_key: "a2V5".to_string(),
  };
}

fn recording_callback() -> (impl Fn(Callback) + Send + Sync + 'static, Arc<Mutex<Vec<Callback>>>) {
  let log = Arc::new(Mutex::new(Vec::new()));
  let recorder = log.clone();
  return (move |cb: Callback| recorder.lock().push(cb), log);
}

#[tokio::test]
async fn queued_resolution_across_init() {
  let manager = LifecycleManager::new(FakeClock::new(0), ScriptedTransport::new(RefreshOutcome::Error), InMemoryJar::default());

  let w1 = manager.get_advertising_token_async().await;
  let w2 = manager.get_advertising_token_async().await;
  let w3 = manager.get_advertising_token_async().await;

  let (callback, log) = recording_callback();
  let e0 = identity("e0-token", 3_600_000, 7_200_000, 10_800_000);
  manager.init(Config::new(callback).with_identity(e0.clone())).await.unwrap();

  for w in [w1, w2, w3] {
    assert_eq!(w.resolve().await, Ok("e0-token".to_string()));
  }

  let callbacks = log.lock();
  assert_eq!(callbacks.len(), 1);
  assert_eq!(callbacks[0].status, Status::Established);
}

#[tokio::test]
async fn refresh_on_init_with_expired_refresh_from() {
  let e2 = identity("e2-token", 100_000, 200_000, 300_000);
  let transport = ScriptedTransport::new(RefreshOutcome::Success(e2.clone()));
  let jar = Arc::new(InMemoryJar::default());
  let manager = LifecycleManager::new(FakeClock::new(0), transport, jar.clone());

  let (callback, log) = recording_callback();
  let e1 = identity("e1-token", -100_000, 3_600_000, 7_200_000);
  let waiter = manager.get_advertising_token_async().await;
  manager.init(Config::new(callback).with_identity(e1)).await.unwrap();

  assert_eq!(waiter.resolve().await, Ok("e2-token".to_string()));

  let callbacks = log.lock();
  assert_eq!(callbacks.len(), 1);
  assert_eq!(callbacks[0].status, Status::Refreshed);
  assert_eq!(callbacks[0].advertising_token.as_deref(), Some("e2-token"));
  drop(callbacks);

  let cookie: Identity = serde_json::from_str(&jar.get().expect("cookie should be written")).unwrap();
  assert_eq!(cookie, e2);
}

#[tokio::test]
async fn optout_on_init_refresh() {
  let transport = ScriptedTransport::new(RefreshOutcome::Optout);
  let manager = LifecycleManager::new(FakeClock::new(0), transport, InMemoryJar::default());

  let (callback, log) = recording_callback();
  let e1 = identity("e1-token", -100_000, 3_600_000, 7_200_000);
  let waiter = manager.get_advertising_token_async().await;
  manager.init(Config::new(callback).with_identity(e1)).await.unwrap();

  assert_eq!(waiter.resolve().await, Err(WaiterError::Optout));

  let callbacks = log.lock();
  assert_eq!(callbacks.len(), 1);
  assert_eq!(callbacks[0].status, Status::Optout);

  assert_eq!(manager.get_advertising_token(), None);
}

#[tokio::test]
async fn error_with_still_valid_token_resolves_waiters_without_a_callback() {
  let transport = ScriptedTransport::new(RefreshOutcome::Error);
  let manager = LifecycleManager::new(FakeClock::new(0), transport, InMemoryJar::default());

  let (callback, log) = recording_callback();
  let e1 = identity("e1-token", -100_000, 3_600_000, 7_200_000);
  let waiter = manager.get_advertising_token_async().await;
  manager.init(Config::new(callback).with_identity(e1)).await.unwrap();

  assert_eq!(waiter.resolve().await, Ok("e1-token".to_string()));
  assert!(log.lock().is_empty());
  assert_eq!(manager.get_advertising_token().as_deref(), Some("e1-token"));
}

#[tokio::test]
async fn error_with_expired_token_rejects_as_temporarily_unavailable() {
  let transport = ScriptedTransport::new(RefreshOutcome::Error);
  let manager = LifecycleManager::new(FakeClock::new(1_000_000), transport, InMemoryJar::default());

  let (callback, log) = recording_callback();
  // identity_expires is already in the past relative to the fake clock.
  let e1 = identity("e1-token", -200_000, -1, 7_200_000);
  let waiter = manager.get_advertising_token_async().await;
  manager.init(Config::new(callback).with_identity(e1)).await.unwrap();

  assert_eq!(waiter.resolve().await, Err(WaiterError::TemporarilyUnavailable));

  let callbacks = log.lock();
  assert_eq!(callbacks.len(), 1);
  assert_eq!(callbacks[0].status, Status::Expired);
}

#[tokio::test]
async fn disconnect_races_refresh() {
  let (tx, rx) = oneshot::channel();
  let transport = GatedTransport::new(rx);
  let manager = LifecycleManager::new(FakeClock::new(0), transport, InMemoryJar::default());

  let (callback, log) = recording_callback();
  // refresh_from due, token still valid: transitions into REFRESHING.
  let e1 = identity("e1-token", -100_000, 3_600_000, 7_200_000);
  manager.init(Config::new(callback).with_identity(e1)).await.unwrap();

  let waiter = manager.get_advertising_token_async().await;

  manager.disconnect().await;

  // The in-flight RPC "arrives" after disconnect; it must be discarded.
  let e2 = identity("e2-token", 100_000, 200_000, 300_000);
  let _ = tx.send(RefreshOutcome::Success(e2));

  assert_eq!(waiter.resolve().await, Err(WaiterError::Disconnected));

  // Only the initial ESTABLISHED callback fired; no REFRESHED after disconnect.
  let callbacks = log.lock();
  assert_eq!(callbacks.len(), 1);
  assert_eq!(callbacks[0].status, Status::Established);

  assert_eq!(manager.get_advertising_token(), None);
}

#[tokio::test]
async fn invalid_explicit_identity_is_rejected_at_ingress() {
  let manager = LifecycleManager::new(FakeClock::new(0), ScriptedTransport::new(RefreshOutcome::Error), InMemoryJar::default());

  let (callback, log) = recording_callback();
  // refresh_from > identity_expires: violates the ordering invariant.
  let bad = identity("adv", 5000, 1000, 6000);
  let waiter = manager.get_advertising_token_async().await;
  manager.init(Config::new(callback).with_identity(bad)).await.unwrap();

  assert_eq!(waiter.resolve().await, Err(WaiterError::InitFailed));
  assert_eq!(log.lock()[0].status, Status::Invalid);
}

#[tokio::test]
async fn no_identity_and_no_cookie_yields_no_identity_status() {
  let manager = LifecycleManager::new(FakeClock::new(0), ScriptedTransport::new(RefreshOutcome::Error), InMemoryJar::default());

  let (callback, log) = recording_callback();
  manager.init(Config::new(callback)).await.unwrap();

  assert!(manager.is_login_required().await);
  assert_eq!(log.lock()[0].status, Status::NoIdentity);
}
