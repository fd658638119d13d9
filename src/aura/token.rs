//! OAuth2 client-credentials token source for the Aura API
//!
//! Tokens are cached until shortly before they expire and fetched again
//! lazily on the next request.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{Error, Result};

/// Tokens are treated as expired this long before their actual expiry.
const EXPIRY_DELTA: Duration = Duration::from_secs(10);

/// Client id / secret pair resolved from the credential Secret
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_valid(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires_at) => now + EXPIRY_DELTA < expires_at,
            None => true,
        }
    }
}

/// Client-credentials grant against a token endpoint
pub struct TokenSource {
    http: reqwest::Client,
    token_url: Url,
    credentials: ClientCredentials,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(http: reqwest::Client, token_url: Url, credentials: ClientCredentials) -> Self {
        Self {
            http,
            token_url,
            credentials,
            cached: Mutex::new(None),
        }
    }

    pub fn credentials(&self) -> &ClientCredentials {
        &self.credentials
    }

    /// Return a valid access token, exchanging credentials if needed.
    ///
    /// `timeout` bounds the exchange request of this call only.
    pub async fn token(&self, timeout: Duration) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_valid(Instant::now()) {
                return Ok(token.access_token.clone());
            }
        }

        let fresh = self.exchange(timeout).await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    /// Drop the cached token so the next call performs a new exchange
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    #[instrument(skip(self), fields(token_url = %self.token_url))]
    async fn exchange(&self, timeout: Duration) -> Result<CachedToken> {
        debug!("Exchanging client credentials for an access token");

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(self.token_url.clone())
            .timeout(timeout)
            .form(&form)
            .send()
            .await
            .map_err(|source| Error::TransportFailure {
                action: "exchange token",
                source,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| Error::TransportFailure {
                action: "read token response",
                source,
            })?;

        if !status.is_success() {
            return Err(Error::Token(format!(
                "token endpoint returned {} - {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| Error::Token(format!("invalid token response: {e}")))?;
        if parsed.access_token.is_empty() {
            return Err(Error::Token(
                "server response missing access_token".to_string(),
            ));
        }

        let expires_at = parsed
            .expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| Instant::now() + Duration::from_secs(secs));
        debug!(expires_in = ?parsed.expires_in, "Obtained access token");

        Ok(CachedToken {
            access_token: parsed.access_token,
            expires_at,
        })
    }
}
