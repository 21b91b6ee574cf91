#[cfg(test)]
#[path = "token_cache_test.rs"]
mod tests;

use std::sync::Arc;
use std::time;

use chrono::Utc;
use eyre::{Context, Result};
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::auth::jwt;
use crate::config::AuthConfig;
use crate::config::constants::{AUTH_TOKEN_KEY, SESSION_ENDPOINT};
use crate::config::user_agent;
use crate::storage::ArcStore;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("user is not authenticated")]
    AuthenticationRequired,

    #[error("sending authenticated request: {0}")]
    Request(#[from] reqwest::Error),
}

/// Single cached bearer credential for outgoing requests.
///
/// Lookup order is memory, then the persistent store, then the session
/// endpoint. Construct one per process and share it as [`ArcTokenCache`].
/// Concurrent lookups on an empty cache may each hit the session endpoint.
pub struct TokenCache {
    store: ArcStore,
    token: RwLock<Option<String>>,
    token_key: String,
    session_endpoint: String,
    timeout: Option<time::Duration>,
    client: reqwest::Client,
}

pub type ArcTokenCache = Arc<TokenCache>;

impl TokenCache {
    pub fn new(store: ArcStore) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent())
            .build()
            .wrap_err("building http client")?;

        Ok(Self {
            store,
            token: RwLock::new(None),
            token_key: AUTH_TOKEN_KEY.to_string(),
            session_endpoint: SESSION_ENDPOINT.to_string(),
            timeout: None,
            client,
        })
    }

    pub fn from_config(mut self, cfg: &AuthConfig) -> Self {
        self.session_endpoint = cfg.session_endpoint.clone();
        self.token_key = cfg.token_key.clone();
        self.timeout = cfg.timeout();
        self
    }

    pub fn with_session_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.session_endpoint = endpoint.into();
        self
    }

    pub fn with_token_key(mut self, key: impl Into<String>) -> Self {
        self.token_key = key.into();
        self
    }

    pub fn with_timeout(mut self, timeout: time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn session_endpoint(&self) -> &str {
        &self.session_endpoint
    }

    pub fn token_key(&self) -> &str {
        &self.token_key
    }

    /// Request builder on the shared cookie-enabled client.
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    /// Never fails: every lookup problem is logged and reported as `None`.
    pub async fn get_token(&self) -> Option<String> {
        let cached = self.token.read().await.clone();
        if let Some(token) = cached {
            if !jwt::is_expired(&token, Utc::now()) {
                return Some(token);
            }
            log::debug!("Cached auth token expired");
            self.clear_token().await;
        }

        match self.store.get(&self.token_key).await {
            Ok(Some(token)) if !token.is_empty() => {
                if jwt::is_expired(&token, Utc::now()) {
                    log::debug!("Stored auth token expired");
                    self.clear_token().await;
                } else {
                    *self.token.write().await = Some(token.clone());
                    return Some(token);
                }
            }
            Ok(_) => {}
            Err(err) => log::warn!("Could not read auth token from store: {:#}", err),
        }

        match self.fetch_session_token().await {
            Ok(Some(token)) => {
                if let Err(err) = self.cache(&token).await {
                    log::warn!("Could not persist auth token: {:#}", err);
                }
                Some(token)
            }
            Ok(None) => None,
            Err(err) => {
                log::warn!("Could not retrieve auth token: {:#}", err);
                None
            }
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.get_token().await.is_some()
    }

    /// Cache a token obtained out of band, e.g. from a login flow.
    pub async fn set_token(&self, token: &str) -> Result<()> {
        self.cache(token).await
    }

    pub async fn clear_token(&self) {
        *self.token.write().await = None;
        if let Err(err) = self.store.remove(&self.token_key).await {
            log::warn!("Could not remove stored auth token: {:#}", err);
        }
    }

    /// Send `request` with the bearer credential attached. A 401 response
    /// clears the cached token; the response is still handed back.
    pub async fn make_authenticated_request(
        &self,
        request: RequestBuilder,
    ) -> Result<Response, AuthError> {
        let token = self
            .get_token()
            .await
            .ok_or(AuthError::AuthenticationRequired)?;

        let mut request = request.bearer_auth(token).build()?;
        if !request.headers().contains_key(CONTENT_TYPE) {
            request
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        let res = self.client.execute(request).await?;
        if res.status() == StatusCode::UNAUTHORIZED {
            log::warn!("Request was rejected with 401, dropping cached auth token");
            self.clear_token().await;
        }
        Ok(res)
    }

    async fn cache(&self, token: &str) -> Result<()> {
        *self.token.write().await = Some(token.to_string());
        self.store
            .set(&self.token_key, token)
            .await
            .wrap_err("storing auth token")
    }

    async fn fetch_session_token(&self) -> Result<Option<String>> {
        let mut req = self.client.get(&self.session_endpoint);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        let res = req.send().await.wrap_err("requesting session")?;
        if !res.status().is_success() {
            log::debug!(
                "Session endpoint answered {}, no auth token available",
                res.status()
            );
            return Ok(None);
        }

        let session = res
            .json::<SessionResponse>()
            .await
            .wrap_err("parsing session response")?;
        Ok(session.into_token())
    }
}

#[derive(Default, Debug, Deserialize)]
struct SessionResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    session: Option<SessionData>,
}

#[derive(Default, Debug, Deserialize)]
struct SessionData {
    #[serde(default)]
    token: Option<String>,
}

impl SessionResponse {
    fn into_token(self) -> Option<String> {
        self.token
            .or(self.session.and_then(|s| s.token))
            .filter(|token| !token.is_empty())
    }
}
