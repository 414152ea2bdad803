// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential model, dual-scope storage, and single-flight refresh.

pub mod refresh;
pub mod store;

use serde::{Deserialize, Serialize};

/// Storage lifetime class for a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Lives only as long as the process.
    Session,
    /// Survives a restart ("keep me signed in").
    Persistent,
}

impl Scope {
    pub fn other(&self) -> Scope {
        match self {
            Self::Session => Self::Persistent,
            Self::Persistent => Self::Session,
        }
    }
}

/// A bearer credential pair bound to a storage scope.
///
/// Exactly one scope holds live credentials at a time; writing one scope
/// clears the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    /// Empty when the server issued no refresh token.
    pub refresh_token: String,
    pub scope: Scope,
}

/// Profile of the authenticated user, as returned by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Whether a token is syntactically a three-part signed token.
///
/// Malformed tokens are treated as absent and force re-authentication.
pub fn token_shape_ok(token: &str) -> bool {
    let token = token.trim();
    !token.is_empty() && token.split('.').count() == 3
}
