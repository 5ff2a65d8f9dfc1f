//! Typed HTTP client for the recommendation backend.
//!
//! Routes (all JSON, bearer-authenticated):
//!   POST   /api/register      → store profile at sign-up
//!   GET    /api/me            → current profile
//!   PUT    /api/me            → update profile
//!   POST   /api/analyze       → emotion / music / trail recommendation
//!   GET    /api/history       → past analyses, newest first
//!   DELETE /api/history/{id}  → remove one past analysis

use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use moodwalk_common::config::Config;
use moodwalk_common::protocol::{
    Ack, AnalysisRequest, AnalysisResult, ApiErrorBody, HistoryResponse, MeResponse,
    ProfileUpdate, RegisterRequest, RegisterResponse, UpdateResponse,
};

use crate::error::ClientError;

/// `Authorization` header set for one request.
///
/// Empty when no token could be obtained; the request then goes out
/// unauthenticated and the backend is expected to answer 401.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthHeaders {
    token: Option<String>,
}

impl AuthHeaders {
    pub fn bearer(token: impl Into<String>) -> Self {
        AuthHeaders { token: Some(token.into()) }
    }

    pub fn none() -> Self {
        AuthHeaders::default()
    }

    pub fn from_token(token: Option<String>) -> Self {
        AuthHeaders { token }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// Header value, e.g. `Bearer eyJ…`.
    pub fn authorization(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {t}"))
    }

    fn apply(&self, rb: RequestBuilder) -> RequestBuilder {
        match self.authorization() {
            Some(value) => rb.header(reqwest::header::AUTHORIZATION, value),
            None => rb,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    analyze_timeout: Duration,
    request_timeout: Duration,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        Self::with_base_url(
            &config.api_base_url,
            config.analyze_timeout(),
            config.request_timeout(),
        )
    }

    pub fn with_base_url(
        base_url: &str,
        analyze_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().build()?;
        Ok(ApiClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            analyze_timeout,
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn register(
        &self,
        body: &RegisterRequest,
        auth: &AuthHeaders,
    ) -> Result<RegisterResponse, ClientError> {
        let rb = self.http.post(self.url("/api/register")).json(body);
        self.send(auth.apply(rb), self.request_timeout).await
    }

    pub async fn me(&self, auth: &AuthHeaders) -> Result<MeResponse, ClientError> {
        let rb = self.http.get(self.url("/api/me"));
        self.send(auth.apply(rb), self.request_timeout).await
    }

    pub async fn update_me(
        &self,
        body: &ProfileUpdate,
        auth: &AuthHeaders,
    ) -> Result<UpdateResponse, ClientError> {
        let rb = self.http.put(self.url("/api/me")).json(body);
        self.send(auth.apply(rb), self.request_timeout).await
    }

    pub async fn analyze(
        &self,
        body: &AnalysisRequest,
        auth: &AuthHeaders,
    ) -> Result<AnalysisResult, ClientError> {
        let rb = self.http.post(self.url("/api/analyze")).json(body);
        self.send(auth.apply(rb), self.analyze_timeout).await
    }

    pub async fn history(&self, auth: &AuthHeaders) -> Result<HistoryResponse, ClientError> {
        let rb = self.http.get(self.url("/api/history"));
        self.send(auth.apply(rb), self.request_timeout).await
    }

    pub async fn delete_history(&self, id: &str, auth: &AuthHeaders) -> Result<Ack, ClientError> {
        let rb = self.http.delete(self.url(&format!("/api/history/{id}")));
        self.send(auth.apply(rb), self.request_timeout).await
    }

    // ── helpers ──────────────────────────────────────────────────────────

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        rb: RequestBuilder,
        timeout: Duration,
    ) -> Result<T, ClientError> {
        let resp = rb.timeout(timeout).send().await?;
        let status = resp.status();
        debug!("{} {}", status, resp.url().path());

        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }

        let body = resp.bytes().await?;
        if !status.is_success() {
            let message = serde_json::from_slice::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.message);
            return Err(ClientError::Api { status: status.as_u16(), message });
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_headers() {
        assert_eq!(AuthHeaders::bearer("abc").authorization().as_deref(), Some("Bearer abc"));
        assert!(!AuthHeaders::from_token(None).is_authenticated());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let api = ApiClient::with_base_url(
            "http://localhost:5000/",
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(api.url("/api/me"), "http://localhost:5000/api/me");
    }
}
