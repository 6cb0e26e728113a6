use crate::client::Link;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tokio::{
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::{debug, info};

/// Tokens are refreshed this long before they expire.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Tokens are refreshed at least this often, whatever their advertised
/// lifetime.
pub const MAX_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// Obtains and caches client-credentials tokens from UAA.
pub struct TokenSource {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    cached: Mutex<Option<Cached>>,
}

struct Cached {
    token: String,
    refresh_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct RootLinks {
    links: Links,
}

#[derive(Deserialize)]
struct Links {
    uaa: Option<Link>,
}

/// Reads the UAA URL from the cloud controller's root document.
pub async fn discover_uaa_url(http: &reqwest::Client, api_url: &str) -> Result<String> {
    let url = format!("{}/", api_url.trim_end_matches('/'));
    let rsp = http
        .get(&url)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .with_context(|| format!("GET {url} failed"))?;
    if !rsp.status().is_success() {
        bail!("GET {url} failed with {}", rsp.status());
    }
    let root = rsp
        .json::<RootLinks>()
        .await
        .with_context(|| format!("failed to decode root document from {url}"))?;
    match root.links.uaa {
        Some(Link { href }) => {
            info!(uaa = %href, "Discovered UAA");
            Ok(href)
        }
        None => bail!("{url} does not advertise a UAA endpoint"),
    }
}

// === impl TokenSource ===

impl TokenSource {
    pub fn new(http: reqwest::Client, uaa_url: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            http,
            token_url: format!("{}/oauth/token", uaa_url.trim_end_matches('/')),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            cached: Mutex::new(None),
        }
    }

    /// Returns a token that is valid for at least [`REFRESH_MARGIN`].
    ///
    /// Concurrent callers wait for a single refresh.
    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(c) = cached.as_ref() {
            if Instant::now() < c.refresh_at {
                return Ok(c.token.clone());
            }
        }

        let rsp = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .with_context(|| format!("POST {} failed", self.token_url))?;
        if !rsp.status().is_success() {
            let status = rsp.status();
            let body = rsp.text().await.unwrap_or_default();
            bail!("token request to {} failed with {status}: {body}", self.token_url);
        }
        let TokenResponse {
            access_token,
            expires_in,
        } = rsp.json().await.context("failed to decode token response")?;

        let lifetime = Duration::from_secs(expires_in)
            .saturating_sub(REFRESH_MARGIN)
            .min(MAX_LIFETIME);
        debug!(?lifetime, "Obtained token");
        let now = Instant::now();
        *cached = Some(Cached {
            token: access_token.clone(),
            refresh_at: now.checked_add(lifetime).unwrap_or(now),
        });
        Ok(access_token)
    }

    /// Drops the cached token so that the next call fetches a new one.
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }
}
