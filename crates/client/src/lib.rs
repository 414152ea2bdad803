// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated request runtime for the Haven support-platform client.
//!
//! The runtime owns credential storage, a single-flight token refresher,
//! the request dispatcher, the resilient upload pipeline, and the session
//! lifecycle. UI layers call into [`Runtime`] and subscribe to
//! [`events::SessionEvent`]s; they never touch credential storage
//! directly.

pub mod api;
pub mod config;
pub mod credential;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod session;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::{Arc, Once};

use crate::config::ClientConfig;
use crate::credential::refresh::RefreshCoordinator;
use crate::credential::store::{CredentialStore, MemoryScope, ScopeStorage};
use crate::dispatch::ApiClient;
use crate::events::SessionEvents;
use crate::session::SessionManager;
use crate::upload::Uploader;

/// Fully wired client runtime.
///
/// Construction spawns the session-event listener, so it must happen
/// inside a tokio runtime.
pub struct Runtime {
    pub events: SessionEvents,
    pub store: Arc<CredentialStore>,
    pub api: Arc<ApiClient>,
    pub uploader: Uploader,
    pub session: SessionManager,
}

static CRYPTO_PROVIDER: Once = Once::new();

/// Install the process-wide rustls crypto provider, if not already done.
///
/// `reqwest` is built against the `rustls-no-provider` feature, so every
/// code path that constructs an HTTP client (production or test) must
/// call this first.
pub fn ensure_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

impl Runtime {
    /// Wire the runtime against the given storage scopes.
    pub fn new(
        config: ClientConfig,
        session_scope: Box<dyn ScopeStorage>,
        persistent_scope: Box<dyn ScopeStorage>,
    ) -> Runtime {
        ensure_crypto_provider();
        let events = SessionEvents::new();
        let store =
            Arc::new(CredentialStore::new(session_scope, persistent_scope, events.clone()));
        let http =
            reqwest::Client::builder().timeout(config.timeout()).build().unwrap_or_default();
        let refresher = Arc::new(RefreshCoordinator::new(
            http.clone(),
            &config.base_url,
            config.timeout(),
            Arc::clone(&store),
        ));
        let api = Arc::new(ApiClient::new(
            &config,
            http,
            Arc::clone(&store),
            refresher,
            events.clone(),
        ));
        let uploader = Uploader::new(Arc::clone(&api), config.upload.clone());
        let session = SessionManager::new(Arc::clone(&store), Arc::clone(&api), events.clone());
        Runtime { events, store, api, uploader, session }
    }

    /// Runtime with in-memory scopes (tests, ephemeral embeddings).
    pub fn in_memory(config: ClientConfig) -> Runtime {
        Self::new(config, Box::new(MemoryScope::new()), Box::new(MemoryScope::new()))
    }
}
