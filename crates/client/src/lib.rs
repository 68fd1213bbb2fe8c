//! Client-side lifecycle manager for a pseudonymous advertising-identity
//! envelope: the state machine that classifies an identity by its
//! timestamps, the scheduler that drives automatic refresh, and the
//! asynchronous token accessor that serializes callers against in-flight
//! transitions.
//!
//! Every externally-observable collaborator (the clock, the refresh
//! transport, the cookie jar) is an injected trait object (see
//! [`clock::Clock`], [`transport::RefreshTransport`], [`cookie::CookieJar`]),
//! never a global, so the manager is equally at home behind a browser-WASM
//! shim or a server-side process acting on a page's behalf.
//!
//! The wire codec for the tokens themselves lives in the sibling
//! `adid-codec` crate; this crate only decodes the refresh endpoint's
//! envelope (see [`transport`]), it does not mint tokens.

#![forbid(unsafe_code)]
#![warn(clippy::await_holding_lock, clippy::inefficient_to_string)]

pub mod callback;
pub mod classifier;
pub mod clock;
pub mod cookie;
pub mod envelope;
pub mod error;
mod manager;
pub mod transport;

pub use callback::{Callback, Status};
pub use classifier::{LifecycleState, classify, token_returnable};
pub use envelope::{Identity, ValidationError};
pub use error::{Error, WaiterError};
pub use manager::{Config, DEFAULT_REFRESH_RETRY_PERIOD_MILLIS, LifecycleManager, TokenWaiter};
