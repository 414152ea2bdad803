// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide session signals.
//!
//! UI collaborators subscribe here instead of reaching into credential
//! storage. Signals are a side channel: components that emit them still
//! return an error to their immediate caller.

use tokio::sync::broadcast;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEndReason {
    /// The user logged out.
    LoggedOut,
    /// The refresh exchange failed.
    RefreshFailed,
    /// An authenticated call found no stored credential.
    MissingCredential,
    /// A stored token failed shape validation.
    MalformedToken,
}

/// Signals broadcast to the rest of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Credentials were invalidated; subscribers decide what to do next
    /// (e.g. a redirect) — the runtime never does it for them.
    Ended { reason: SessionEndReason },
    /// A user logged in or out.
    Changed,
}

/// Broadcast hub for session signals.
#[derive(Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Send with no subscribers is fine; signals are best-effort.
    pub(crate) fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}
