use anyhow::{anyhow, Result};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Lifetime assumed when the token endpoint does not report one
pub const DEFAULT_EXPIRES_IN: u64 = 1800;

/// Tokens are treated as expired this long before the server says they are
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// A freshly issued access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenData {
    pub access_token: String,
    pub expires_in: u64,
}

impl TokenData {
    pub fn new<S: Into<String>>(access_token: S, expires_in: u64) -> Self {
        Self {
            access_token: access_token.into(),
            expires_in,
        }
    }

    /// Read a standard OAuth token response
    pub fn from_response(response: &Value) -> Result<Self> {
        let access_token = response
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow!("access_token not found in token response"))?;
        let expires_in = response
            .get("expires_in")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_EXPIRES_IN);
        Ok(Self::new(access_token, expires_in))
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// In-memory cache for a client-credentials token, owned by the client that uses it.
///
/// Concurrent callers that all see an expired token will each fetch a new one. Whichever
/// finishes last is what later readers get, which is fine for bearer tokens.
#[derive(Debug, Default)]
pub struct TokenCache {
    state: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token if it has not expired
    pub async fn get(&self) -> Option<String> {
        let state = self.state.read().await;
        state
            .as_ref()
            .filter(|cached| Instant::now() < cached.expires_at)
            .map(|cached| cached.token.clone())
    }

    /// Return the cached token, running `fetch` to replace it when it is missing or expired
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TokenData>>,
    {
        if let Some(token) = self.get().await {
            return Ok(token);
        }

        let data = fetch().await?;
        let lifetime = Duration::from_secs(data.expires_in).saturating_sub(EXPIRY_MARGIN);
        debug!(expires_in = data.expires_in, "refreshed access token");

        let mut state = self.state.write().await;
        *state = Some(CachedToken {
            token: data.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(data.access_token)
    }

    /// Drop the cached token so the next read fetches a new one
    pub async fn invalidate(&self) {
        *self.state.write().await = None;
    }
}

/// Run the OAuth client-credentials grant against `token_url`
pub async fn request_client_credentials(
    client: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<TokenData> {
    let params = [
        ("grant_type", "client_credentials"),
        ("client_id", client_id),
        ("client_secret", client_secret),
    ];

    let resp = client
        .post(token_url)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .form(&params)
        .send()
        .await?;

    if !resp.status().is_success() {
        let err_text = resp.text().await?;
        return Err(anyhow!("Failed to obtain access token: {}", err_text));
    }

    let token_response: Value = resp.json().await?;
    TokenData::from_response(&token_response)
}
