// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration.

use std::time::Duration;

use crate::upload::UploadPolicy;

/// Default per-request timeout in milliseconds.
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Endpoints exempt from credential attachment and refresh handling.
///
/// Supplied by the integrating application; these defaults mirror the
/// platform's anonymous surface (chat upload, anonymous analysis, chatbot,
/// account entry points, and the refresh exchange itself).
const DEFAULT_PUBLIC_PATHS: &[&str] = &[
    "/upload/chat",
    "/analysis",
    "/analysis/",
    "/analysis/generate-pdf",
    "/chatbot",
    "/login",
    "/signup",
    "/auth/refresh",
];

/// Configuration for the client runtime.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Root URL of the platform API, e.g. `http://localhost:8080/api`.
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Path patterns exempt from auth handling (substring match).
    pub public_paths: Vec<String>,
    /// Upload pipeline policy.
    pub upload: UploadPolicy,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            public_paths: DEFAULT_PUBLIC_PATHS.iter().map(|p| (*p).to_owned()).collect(),
            upload: UploadPolicy::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
