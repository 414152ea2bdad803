// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observable session lifecycle: login, logout, current user.
//!
//! The sole subscriber-facing source of truth for "is a user currently
//! authenticated". The rest of the application goes through this type;
//! it never exposes the credential store or dispatcher directly.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::api::Envelope;
use crate::credential::store::CredentialStore;
use crate::credential::{token_shape_ok, Credential, Scope, UserProfile};
use crate::dispatch::{ApiClient, ApiRequest};
use crate::error::{ApiError, ErrorKind};
use crate::events::{SessionEndReason, SessionEvent, SessionEvents};

/// Wire shape of a successful login payload.
#[derive(Debug, Deserialize)]
struct LoginData {
    token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
    user: UserProfile,
}

/// Owns the observable "current user" state.
pub struct SessionManager {
    store: Arc<CredentialStore>,
    api: Arc<ApiClient>,
    events: SessionEvents,
    current: Arc<RwLock<Option<UserProfile>>>,
}

impl SessionManager {
    /// Create the manager and subscribe to session-ended signals raised
    /// anywhere in the runtime.
    ///
    /// The handler only resets observable state: whichever component
    /// emitted the signal already cleared the storage, and redirect
    /// decisions belong to downstream subscribers.
    pub fn new(store: Arc<CredentialStore>, api: Arc<ApiClient>, events: SessionEvents) -> Self {
        let current = Arc::new(RwLock::new(None));
        let listener = Arc::clone(&current);
        let mut rx = events.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(SessionEvent::Ended { reason }) => {
                        tracing::debug!(?reason, "session ended, dropping current user");
                        *listener.write() = None;
                    }
                    Ok(SessionEvent::Changed) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
        });
        Self { store, api, events, current }
    }

    /// Restore a session from storage.
    ///
    /// Uses the cached profile when present; otherwise performs one
    /// profile fetch through the dispatcher to populate it. Returns the
    /// restored user, or `None` when no usable session exists.
    pub async fn hydrate(&self) -> Option<UserProfile> {
        let credential = self.store.load()?;
        if !token_shape_ok(&credential.access_token) {
            self.store.clear(SessionEndReason::MalformedToken);
            return None;
        }

        if let Some(profile) = self.store.profile() {
            *self.current.write() = Some(profile.clone());
            return Some(profile);
        }

        match self.api.fetch_profile().await {
            Ok(profile) => {
                self.store.cache_profile(&profile);
                *self.current.write() = Some(profile.clone());
                Some(profile)
            }
            Err(e) => {
                tracing::warn!(err = %e, "profile fetch failed during hydration");
                // Auth-class failures already cleared the store and
                // signalled; anything else leaves no usable session either.
                self.store.clear_silent();
                None
            }
        }
    }

    /// Authenticate and store credentials in the scope chosen by
    /// `keep_login`. Both scopes are scrubbed before the attempt.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        keep_login: bool,
    ) -> Result<UserProfile, ApiError> {
        self.store.clear_silent();

        let body = serde_json::json!({ "email": email, "password": password });
        let resp = self.api.send(ApiRequest::post("/user/login", body)).await?;
        let data: LoginData = resp.json::<Envelope<LoginData>>()?.into_data()?;

        if !token_shape_ok(&data.token) {
            self.store.clear_silent();
            return Err(ApiError::new(
                ErrorKind::InvalidCredential,
                "login returned a malformed token",
            ));
        }

        let scope = if keep_login { Scope::Persistent } else { Scope::Session };
        let credential = Credential {
            access_token: data.token.trim().to_owned(),
            refresh_token: data.refresh_token.trim().to_owned(),
            scope,
        };
        self.store.save(&credential, Some(&data.user));
        *self.current.write() = Some(data.user.clone());
        self.events.emit(SessionEvent::Changed);
        tracing::info!(user = data.user.id, "login succeeded");
        Ok(data.user)
    }

    /// End the session. The server call is best-effort; local state is
    /// always cleared.
    pub async fn logout(&self) {
        if self.store.load().is_some() {
            if let Err(e) = self.api.send(ApiRequest::post_empty("/user/logout")).await {
                tracing::debug!(err = %e, "logout request failed");
            }
        }
        self.store.clear(SessionEndReason::LoggedOut);
        *self.current.write() = None;
        self.events.emit(SessionEvent::Changed);
    }

    /// The currently-authenticated user, if any.
    pub fn current_user(&self) -> Option<UserProfile> {
        self.current.read().clone()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
