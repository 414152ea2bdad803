// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dual-scope credential persistence.
//!
//! Two key-value scopes back the store: an ephemeral one for plain logins
//! and a durable one for "keep me signed in". All credential mutation in
//! the runtime funnels through [`CredentialStore`]; no other component
//! touches the scopes directly.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::credential::{Credential, Scope, UserProfile};
use crate::events::{SessionEndReason, SessionEvent, SessionEvents};

pub const KEY_TOKEN: &str = "token";
pub const KEY_REFRESH_TOKEN: &str = "refreshToken";
pub const KEY_LOGGED_IN: &str = "isLoggedIn";
pub const KEY_USER: &str = "user";
pub const KEY_KEEP_LOGIN: &str = "keepLogin";

const ALL_KEYS: &[&str] = &[KEY_TOKEN, KEY_REFRESH_TOKEN, KEY_LOGGED_IN, KEY_USER, KEY_KEEP_LOGIN];

/// A single key-value storage scope.
///
/// Implementations never fail; absence of a key is a valid state, not an
/// error.
pub trait ScopeStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// In-memory scope (session lifetime).
#[derive(Default)]
pub struct MemoryScope {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryScope {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScopeStorage for MemoryScope {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
    }

    fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }
}

/// File-backed scope (durable across restarts).
///
/// The whole scope is one JSON object, rewritten atomically (write tmp +
/// rename) after every mutation. Uses a unique temp filename (PID +
/// counter) to avoid corruption when concurrent saves race on the same
/// `.tmp` file.
pub struct FileScope {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileScope {
    /// Open a scope at `path`, loading any existing contents. A missing
    /// or unreadable file is an empty scope.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = std::fs::read_to_string(&path)
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default();
        Self { path, entries: Mutex::new(entries) }
    }

    fn flush(&self, entries: &HashMap<String, String>) {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                if let Err(e) = std::fs::create_dir_all(dir) {
                    tracing::warn!(err = %e, "failed to create credential dir");
                    return;
                }
            }
        }

        let json = match serde_json::to_string_pretty(entries) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(err = %e, "failed to serialize credential scope");
                return;
            }
        };
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
            seq,
        );
        let tmp_path = self.path.with_file_name(tmp_name);
        if let Err(e) =
            std::fs::write(&tmp_path, json).and_then(|_| std::fs::rename(&tmp_path, &self.path))
        {
            tracing::warn!(err = %e, "failed to persist credential scope");
        }
    }
}

impl ScopeStorage for FileScope {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.entries.lock();
        entries.insert(key.to_owned(), value.to_owned());
        self.flush(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.flush(&entries);
        }
    }
}

/// Resolve the directory for durable client state.
///
/// Checks `HAVEN_STATE_DIR`, then `$XDG_STATE_HOME/haven`,
/// then `$HOME/.local/state/haven`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("HAVEN_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("haven");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/haven");
    }
    PathBuf::from(".haven")
}

/// Default durable-scope file path.
pub fn default_credential_path() -> PathBuf {
    state_dir().join("credentials.json")
}

/// Owns both storage scopes and every credential mutation.
pub struct CredentialStore {
    session: Box<dyn ScopeStorage>,
    persistent: Box<dyn ScopeStorage>,
    events: SessionEvents,
}

impl CredentialStore {
    pub fn new(
        session: Box<dyn ScopeStorage>,
        persistent: Box<dyn ScopeStorage>,
        events: SessionEvents,
    ) -> Self {
        Self { session, persistent, events }
    }

    /// Store with in-memory scopes only (tests, ephemeral embeddings).
    pub fn in_memory(events: SessionEvents) -> Self {
        Self::new(Box::new(MemoryScope::new()), Box::new(MemoryScope::new()), events)
    }

    fn scope(&self, scope: Scope) -> &dyn ScopeStorage {
        match scope {
            Scope::Session => self.session.as_ref(),
            Scope::Persistent => self.persistent.as_ref(),
        }
    }

    /// The scope holding live credentials: persistent when its keep-login
    /// marker is set, session otherwise.
    pub fn active_scope(&self) -> Scope {
        if self.persistent.get(KEY_KEEP_LOGIN).as_deref() == Some("true") {
            Scope::Persistent
        } else {
            Scope::Session
        }
    }

    /// Write tokens, logged-in marker, and profile into the credential's
    /// scope, clearing the other scope entirely. Last writer wins.
    pub fn save(&self, credential: &Credential, profile: Option<&UserProfile>) {
        let target = self.scope(credential.scope);
        let other = self.scope(credential.scope.other());
        for key in ALL_KEYS {
            other.remove(key);
        }
        target.set(KEY_TOKEN, credential.access_token.trim());
        target.set(KEY_REFRESH_TOKEN, credential.refresh_token.trim());
        target.set(KEY_LOGGED_IN, "true");
        target.set(
            KEY_KEEP_LOGIN,
            if credential.scope == Scope::Persistent { "true" } else { "false" },
        );
        if let Some(profile) = profile {
            if let Ok(json) = serde_json::to_string(profile) {
                target.set(KEY_USER, &json);
            }
        }
    }

    /// Load the credential from the active scope. `None` when no token is
    /// stored; shape validation is the dispatcher's job.
    pub fn load(&self) -> Option<Credential> {
        let scope = self.active_scope();
        let store = self.scope(scope);
        let access_token = store.get(KEY_TOKEN)?;
        let refresh_token = store.get(KEY_REFRESH_TOKEN).unwrap_or_default();
        Some(Credential { access_token, refresh_token, scope })
    }

    /// Cached profile from the active scope.
    pub fn profile(&self) -> Option<UserProfile> {
        let json = self.scope(self.active_scope()).get(KEY_USER)?;
        serde_json::from_str(&json).ok()
    }

    /// Cache a profile alongside the active credential.
    pub fn cache_profile(&self, profile: &UserProfile) {
        if let Ok(json) = serde_json::to_string(profile) {
            self.scope(self.active_scope()).set(KEY_USER, &json);
        }
    }

    /// Remove every field from both scopes and broadcast the session-ended
    /// signal. Subscribers must not clear again in response.
    pub fn clear(&self, reason: SessionEndReason) {
        self.wipe();
        self.events.emit(SessionEvent::Ended { reason });
    }

    /// Clear both scopes without signalling (pre-login scrub, failed
    /// hydration).
    pub(crate) fn clear_silent(&self) {
        self.wipe();
    }

    fn wipe(&self) {
        for scope in [self.session.as_ref(), self.persistent.as_ref()] {
            for key in ALL_KEYS {
                scope.remove(key);
            }
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
