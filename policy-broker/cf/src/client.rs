use crate::token::TokenSource;
use anyhow::{Context, Result};
use reqwest::{Method, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{debug, trace};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The cloud controller's largest page size.
pub(crate) const PER_PAGE: &str = "5000";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_url: String,
    pub uaa_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub skip_tls_validation: bool,
    pub timeout: Duration,
}

/// An authenticated client for the cloud controller and policy server.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    api_url: Arc<str>,
    tokens: Arc<TokenSource>,
}

/// A request completed with an unexpected status.
#[derive(Debug, thiserror::Error)]
#[error("{method} {url} failed with {status}: {body}")]
pub struct ApiError {
    pub method: Method,
    pub url: String,
    pub status: StatusCode,
    pub body: String,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    pagination: Pagination,
    resources: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    next: Option<Link>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Link {
    pub(crate) href: String,
}

// === impl ClientConfig ===

impl ClientConfig {
    /// Builds the underlying HTTP client.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(self.skip_tls_validation)
            .build()
            .context("failed to build HTTP client")
    }
}

// === impl Client ===

impl Client {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = config.http_client()?;
        let tokens = TokenSource::new(
            http.clone(),
            &config.uaa_url,
            &config.client_id,
            &config.client_secret,
        );
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').into(),
            tokens: Arc::new(tokens),
        })
    }

    /// Resolves `path` against the API URL, appending `params` as a query.
    pub fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url> {
        let url = format!("{}{path}", self.api_url);
        if params.is_empty() {
            return Url::parse(&url).with_context(|| format!("invalid URL {url}"));
        }
        Url::parse_with_params(&url, params).with_context(|| format!("invalid URL {url}"))
    }

    pub async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let rsp = self.send(Method::GET, url.clone(), None::<&()>).await?;
        rsp.json()
            .await
            .with_context(|| format!("failed to decode response from {url}"))
    }

    /// Like [`Client::get`], but a 404 yields `None`.
    pub async fn get_opt<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        match self.send(Method::GET, url.clone(), None::<&()>).await {
            Ok(rsp) => rsp
                .json()
                .await
                .map(Some)
                .with_context(|| format!("failed to decode response from {url}")),
            Err(error) => match error.downcast_ref::<ApiError>() {
                Some(e) if e.status == StatusCode::NOT_FOUND => Ok(None),
                _ => Err(error),
            },
        }
    }

    /// Fetches every resource of a paged listing, following `next` links.
    pub async fn get_all<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>> {
        let mut resources = Vec::new();
        let mut next = Some(url);
        while let Some(url) = next.take() {
            let page = self.get::<Page<T>>(url).await?;
            trace!(resources = page.resources.len(), "Fetched page");
            resources.extend(page.resources);
            next = match page.pagination.next {
                Some(Link { href }) => {
                    Some(Url::parse(&href).with_context(|| format!("invalid next link {href}"))?)
                }
                None => None,
            };
        }
        Ok(resources)
    }

    /// Sends a JSON body, discarding the response.
    pub async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<()> {
        self.send(method, url, Some(body)).await?;
        Ok(())
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<Response> {
        let mut retried = false;
        loop {
            let token = self.tokens.token().await?;
            let mut req = self
                .http
                .request(method.clone(), url.clone())
                .bearer_auth(&token);
            if let Some(body) = body {
                req = req.json(body);
            }

            debug!(%method, %url, "Sending request");
            let rsp = req
                .send()
                .await
                .with_context(|| format!("{method} {url} failed"))?;
            let status = rsp.status();
            if status.is_success() {
                return Ok(rsp);
            }

            // The token may have been revoked before it expired.
            if status == StatusCode::UNAUTHORIZED && !retried {
                debug!(%url, "Token rejected; refreshing");
                self.tokens.invalidate().await;
                retried = true;
                continue;
            }

            let body = rsp.text().await.unwrap_or_default();
            return Err(ApiError {
                method,
                url: url.to_string(),
                status,
                body,
            }
            .into());
        }
    }
}
