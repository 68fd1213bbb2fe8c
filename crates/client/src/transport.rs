//! The refresh RPC: `POST {base_url}/v2/token/refresh`.
//!
//! The transport is an injected collaborator; the HTTP library, encryption,
//! and JSON framing below are this crate's default production
//! implementation, not part of the contract itself.

use adid_codec::{self as codec};
use base64::Engine;
use serde::Deserialize;
use tracing::warn;

use crate::envelope::Identity;

const CLIENT_VERSION: &str = concat!("adid-client-rust-", env!("CARGO_PKG_VERSION"));

/// The outcome of a single refresh attempt, already normalized: any
/// transport, decode, or decrypt failure collapses to [`RefreshOutcome::Error`].
/// The manager never sees a distinct error kind for those, only this outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
  Success(Identity),
  Optout,
  ExpiredToken,
  InvalidToken,
  Error,
}

/// The refresh endpoint contract, injected so tests never touch the network.
#[async_trait::async_trait]
pub trait RefreshTransport: Send + Sync {
  async fn refresh(&self, base_url: &str, refresh_token: &str, refresh_response_key: &str) -> RefreshOutcome;
}

#[derive(Deserialize)]
struct RefreshResponseBody {
  status: String,
  #[serde(default)]
  body: Option<Identity>,
}

fn decode_response(raw_body: &str, refresh_response_key_b64: &str) -> RefreshOutcome {
  let key_bytes = match base64::engine::general_purpose::STANDARD.decode(refresh_response_key_b64) {
    Ok(bytes) if bytes.len() == codec::KEY_LEN => bytes,
    _ => {
      warn!("refresh_response_key is not a valid base64-encoded 32-byte key");
      return RefreshOutcome::Error;
    }
  };
  let mut key = [0u8; codec::KEY_LEN];
  key.copy_from_slice(&key_bytes);

  let sealed = match base64::engine::general_purpose::STANDARD.decode(raw_body.trim()) {
    Ok(bytes) => bytes,
    Err(err) => {
      warn!(%err, "refresh response body is not valid base64");
      return RefreshOutcome::Error;
    }
  };

  let plaintext = match codec::open(&key, &sealed) {
    Ok(plaintext) => plaintext,
    Err(err) => {
      warn!(%err, "failed to decrypt refresh response");
      return RefreshOutcome::Error;
    }
  };

  let parsed: RefreshResponseBody = match serde_json::from_slice(&plaintext) {
    Ok(parsed) => parsed,
    Err(err) => {
      warn!(%err, "refresh response payload is not valid JSON");
      return RefreshOutcome::Error;
    }
  };

  return match parsed.status.as_str() {
    "success" => match parsed.body.map(Identity::normalized) {
      Some(Ok(identity)) => RefreshOutcome::Success(identity),
      Some(Err(err)) => {
        warn!(%err, "refresh response carried an invalid envelope");
        RefreshOutcome::Error
      }
      None => {
        warn!("refresh response status was 'success' with no envelope body");
        RefreshOutcome::Error
      }
    },
    "optout" => RefreshOutcome::Optout,
    "expired_token" => RefreshOutcome::ExpiredToken,
    // Folded into `expired_token` handling upstream per the resolved Open
    // Question: both terminate the envelope and clear the cookie.
    "invalid_token" => RefreshOutcome::InvalidToken,
    other => {
      warn!(status = other, "unrecognized refresh response status");
      RefreshOutcome::Error
    }
  };
}

/// The production [`RefreshTransport`], backed by `reqwest`.
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new(client: reqwest::Client) -> Self {
    return Self { client };
  }
}

impl Default for ReqwestTransport {
  fn default() -> Self {
    return Self::new(reqwest::Client::new());
  }
}

#[async_trait::async_trait]
impl RefreshTransport for ReqwestTransport {
  async fn refresh(&self, base_url: &str, refresh_token: &str, refresh_response_key: &str) -> RefreshOutcome {
    let url = format!("{}/v2/token/refresh", base_url.trim_end_matches('/'));

    let response = match self
      .client
      .post(&url)
      .header("X-UID2-Client-Version", CLIENT_VERSION)
      .body(refresh_token.to_string())
      .send()
      .await
    {
      Ok(response) => response,
      Err(err) => {
        warn!(%err, "refresh RPC transport error");
        return RefreshOutcome::Error;
      }
    };

    let body = match response.text().await {
      Ok(body) => body,
      Err(err) => {
        warn!(%err, "failed to read refresh RPC response body");
        return RefreshOutcome::Error;
      }
    };

    return decode_response(&body, refresh_response_key);
  }
}
