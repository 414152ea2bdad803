// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request dispatch: credential attachment, expired-token recovery, and
//! translation of failures into the closed error taxonomy.
//!
//! Every outgoing call flows through [`ApiClient::send`]. Public paths
//! bypass all credential handling; everything else gets a bearer token,
//! and a 401/403-class response is recovered via one coordinated refresh
//! followed by exactly one replay.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::credential::refresh::RefreshCoordinator;
use crate::credential::store::CredentialStore;
use crate::credential::token_shape_ok;
use crate::error::{ApiError, ErrorKind};
use crate::events::{SessionEndReason, SessionEvent, SessionEvents};

/// Path patterns exempt from credential attachment and replay.
///
/// Membership is substring containment against the logical path, matching
/// the platform's historical behavior, and is decided before any
/// credential logic runs.
#[derive(Debug, Clone, Default)]
pub struct PublicPaths {
    patterns: Vec<String>,
}

impl PublicPaths {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| path.contains(p.as_str()))
    }
}

/// An outgoing logical request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self { method: Method::GET, path: path.into(), body: None }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self { method: Method::POST, path: path.into(), body: Some(body) }
    }

    pub fn post_empty(path: impl Into<String>) -> Self {
        Self { method: Method::POST, path: path.into(), body: None }
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self { method: Method::PUT, path: path.into(), body: Some(body) }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self { method: Method::DELETE, path: path.into(), body: None }
    }
}

/// A completed 2xx response: status plus raw body.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ApiResponse {
    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            ApiError::new(ErrorKind::Rejected, format!("unexpected response body: {e}"))
        })
    }
}

/// Dispatches every outgoing call.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    public_paths: PublicPaths,
    store: Arc<CredentialStore>,
    refresher: Arc<RefreshCoordinator>,
    events: SessionEvents,
}

impl ApiClient {
    pub fn new(
        config: &ClientConfig,
        http: reqwest::Client,
        store: Arc<CredentialStore>,
        refresher: Arc<RefreshCoordinator>,
        events: SessionEvents,
    ) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            timeout: config.timeout(),
            public_paths: PublicPaths::new(config.public_paths.clone()),
            store,
            refresher,
            events,
        }
    }

    /// Dispatch a logical request.
    ///
    /// A request is replayed after a refresh at most once; a second
    /// authorization failure is surfaced to the caller, never fed back
    /// into the refresher.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        if self.public_paths.matches(&request.path) {
            let resp = self.transmit(&request, None).await?;
            return finish(resp);
        }

        let Some(credential) = self.store.load() else {
            self.events.emit(SessionEvent::Ended { reason: SessionEndReason::MissingCredential });
            return Err(ApiError::new(ErrorKind::Unauthenticated, "no credential available"));
        };

        if !token_shape_ok(&credential.access_token) {
            tracing::warn!(path = %request.path, "stored access token is malformed");
            self.store.clear(SessionEndReason::MalformedToken);
            return Err(ApiError::new(
                ErrorKind::InvalidCredential,
                "stored access token is malformed",
            ));
        }

        let mut token = credential.access_token;
        let mut retried_after_refresh = false;
        loop {
            let resp = self.transmit(&request, Some(&token)).await?;
            if is_auth_failure(resp.status) && !retried_after_refresh {
                tracing::debug!(path = %request.path, status = resp.status, "expired token, refreshing");
                retried_after_refresh = true;
                token = self.refresher.refresh().await?;
                continue;
            }
            return finish(resp);
        }
    }

    /// Transmit a multipart form through the same public-path/credential
    /// handling as [`send`](Self::send).
    ///
    /// No refresh-triggered replay here: the form body is consumed by the
    /// transport, and retry policy for uploads lives in the upload
    /// pipeline, which re-enters with a fresh form.
    pub async fn send_multipart(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
        timeout: Duration,
    ) -> Result<ApiResponse, ApiError> {
        let bearer = if self.public_paths.matches(path) {
            None
        } else {
            let Some(credential) = self.store.load() else {
                self.events
                    .emit(SessionEvent::Ended { reason: SessionEndReason::MissingCredential });
                return Err(ApiError::new(ErrorKind::Unauthenticated, "no credential available"));
            };
            if !token_shape_ok(&credential.access_token) {
                self.store.clear(SessionEndReason::MalformedToken);
                return Err(ApiError::new(
                    ErrorKind::InvalidCredential,
                    "stored access token is malformed",
                ));
            }
            Some(credential.access_token)
        };

        let url = self.url(path);
        let mut req = self.http.post(&url).multipart(form).timeout(timeout);
        if let Some(token) = &bearer {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.map_err(ApiError::from_transport)?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(ApiError::from_transport)?;
        finish(ApiResponse { status, body })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn transmit(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.url(&request.path);
        let mut req = self.http.request(request.method.clone(), &url).timeout(self.timeout);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(ApiError::from_transport)?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(ApiError::from_transport)?;
        Ok(ApiResponse { status, body })
    }
}

fn is_auth_failure(status: u16) -> bool {
    status == 401 || status == 403
}

/// Map a completed response into the caller-facing result.
fn finish(resp: ApiResponse) -> Result<ApiResponse, ApiError> {
    if (200..300).contains(&resp.status) {
        return Ok(resp);
    }
    Err(ApiError::from_status(resp.status, server_message(&resp.body)))
}

/// Pull the server's `message` field out of an error body, when present.
fn server_message(body: &Bytes) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value.get("message").and_then(|m| m.as_str()).map(str::to_owned)
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
