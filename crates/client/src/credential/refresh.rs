// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight refresh-token exchange.
//!
//! Many requests can hit an expired token at once. The first caller
//! becomes the leader and issues exactly one exchange; everyone else
//! parks on a oneshot waiter and performs no network call of its own.
//! The waiter list is scoped to one exchange: it is drained the moment
//! the exchange resolves, and late arrivals start a fresh cycle.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::{oneshot, Mutex};

use crate::api::Envelope;
use crate::credential::store::CredentialStore;
use crate::credential::{token_shape_ok, Credential};
use crate::error::{ApiError, ErrorKind};
use crate::events::SessionEndReason;

/// Wire shape of the exchange response payload.
#[derive(Debug, Deserialize)]
struct RefreshData {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
}

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    /// Non-empty only while `in_flight`.
    waiters: Vec<oneshot::Sender<Result<String, ApiError>>>,
}

/// Coordinates refresh-token exchanges so that concurrently-failing
/// requests trigger exactly one upstream call.
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
    http: reqwest::Client,
    refresh_url: String,
    timeout: Duration,
    store: Arc<CredentialStore>,
}

impl RefreshCoordinator {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        timeout: Duration,
        store: Arc<CredentialStore>,
    ) -> Self {
        Self {
            state: Mutex::new(RefreshState::default()),
            http,
            refresh_url: format!("{}/auth/refresh", base_url.trim_end_matches('/')),
            timeout,
            store,
        }
    }

    /// Obtain a fresh access token, joining an in-flight exchange if one
    /// exists. Waiters are resumed in arrival order, each exactly once.
    ///
    /// On success the new tokens are persisted in the credential's current
    /// scope; on failure the store is cleared and the session-ended signal
    /// fires before any waiter is resumed.
    pub async fn refresh(&self) -> Result<String, ApiError> {
        let waiter = {
            let mut state = self.state.lock().await;
            if state.in_flight {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                Some(rx)
            } else {
                state.in_flight = true;
                None
            }
        };

        if let Some(rx) = waiter {
            return match rx.await {
                Ok(result) => result,
                // The leader always drains its waiters; a closed channel
                // means the process is tearing down.
                Err(_) => {
                    Err(ApiError::new(ErrorKind::RefreshFailed, "refresh coordinator dropped"))
                }
            };
        }

        let result = self.exchange().await;

        let waiters = {
            let mut state = self.state.lock().await;
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };
        for tx in waiters {
            let _ = tx.send(result.clone());
        }
        result
    }

    /// Perform the upstream exchange and update the credential store.
    async fn exchange(&self) -> Result<String, ApiError> {
        let current = match self.store.load() {
            Some(c) if !c.refresh_token.is_empty() => c,
            _ => {
                self.store.clear(SessionEndReason::RefreshFailed);
                return Err(ApiError::new(
                    ErrorKind::RefreshFailed,
                    "no refresh token available",
                ));
            }
        };

        match self.do_exchange(&current).await {
            Ok(data) if token_shape_ok(&data.access_token) => {
                let credential = Credential {
                    access_token: data.access_token.trim().to_owned(),
                    refresh_token: data.refresh_token.trim().to_owned(),
                    scope: current.scope,
                };
                let profile = self.store.profile();
                self.store.save(&credential, profile.as_ref());
                tracing::debug!("access token refreshed");
                Ok(credential.access_token)
            }
            Ok(_) => {
                tracing::warn!("refresh exchange returned a malformed token, ending session");
                self.store.clear(SessionEndReason::RefreshFailed);
                Err(ApiError::new(ErrorKind::RefreshFailed, "refresh returned a malformed token"))
            }
            Err(e) => {
                tracing::warn!(err = %e, "token refresh failed, ending session");
                self.store.clear(SessionEndReason::RefreshFailed);
                Err(e)
            }
        }
    }

    async fn do_exchange(&self, current: &Credential) -> Result<RefreshData, ApiError> {
        let resp = self
            .http
            .post(&self.refresh_url)
            .json(&serde_json::json!({ "refreshToken": current.refresh_token }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                let transport = ApiError::from_transport(e);
                ApiError::new(
                    ErrorKind::RefreshFailed,
                    format!("refresh exchange failed: {}", transport.message),
                )
            })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ApiError::with_status(
                ErrorKind::RefreshFailed,
                status,
                format!("refresh exchange rejected: {text}"),
            ));
        }

        let envelope: Envelope<RefreshData> = resp.json().await.map_err(|e| {
            ApiError::new(ErrorKind::RefreshFailed, format!("invalid refresh response: {e}"))
        })?;
        if !envelope.success {
            return Err(ApiError::new(
                ErrorKind::RefreshFailed,
                envelope.message.unwrap_or_else(|| "refresh exchange rejected".to_owned()),
            ));
        }
        envelope.data.ok_or_else(|| {
            ApiError::new(ErrorKind::RefreshFailed, "refresh response carried no tokens")
        })
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
