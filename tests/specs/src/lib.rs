// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `haven` binary as a subprocess against an in-process
//! mock platform server, with an isolated durable state directory per
//! instance.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;

/// Resolve the path to the compiled `haven` binary.
pub fn haven_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("haven")
}

/// A syntactically valid three-part token.
pub fn token(tag: &str) -> String {
    format!("header.{tag}.sig")
}

fn envelope(data: serde_json::Value) -> serde_json::Value {
    serde_json::json!({ "success": true, "message": null, "data": data })
}

fn user_json() -> serde_json::Value {
    serde_json::json!({ "id": 3, "email": "user@example.com", "name": "User" })
}

/// Call counters for the mock platform.
#[derive(Default)]
pub struct PlatformCalls {
    pub login: AtomicU32,
    pub me: AtomicU32,
    pub logout: AtomicU32,
    pub upload: AtomicU32,
}

/// Serve a mock platform on an ephemeral port.
pub async fn mock_platform() -> anyhow::Result<(SocketAddr, Arc<PlatformCalls>)> {
    platform(true).await
}

/// Mock platform whose login endpoint rejects every attempt.
pub async fn mock_platform_rejecting_login() -> anyhow::Result<(SocketAddr, Arc<PlatformCalls>)> {
    platform(false).await
}

async fn platform(login_ok: bool) -> anyhow::Result<(SocketAddr, Arc<PlatformCalls>)> {
    let calls = Arc::new(PlatformCalls::default());

    let login_calls = Arc::clone(&calls);
    let me_calls = Arc::clone(&calls);
    let logout_calls = Arc::clone(&calls);
    let upload_calls = Arc::clone(&calls);

    let app = Router::new()
        .route(
            "/user/login",
            post(move |_body: String| {
                let calls = Arc::clone(&login_calls);
                async move {
                    calls.login.fetch_add(1, Ordering::Relaxed);
                    if login_ok {
                        Json(envelope(serde_json::json!({
                            "token": token("issued"),
                            "refreshToken": "refresh-1",
                            "user": user_json(),
                        })))
                    } else {
                        Json(serde_json::json!({
                            "success": false,
                            "message": "wrong password",
                        }))
                    }
                }
            }),
        )
        .route(
            "/user/me",
            get(move |headers: HeaderMap| {
                let calls = Arc::clone(&me_calls);
                async move {
                    calls.me.fetch_add(1, Ordering::Relaxed);
                    let authed = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .is_some_and(|auth| auth == format!("Bearer {}", token("issued")));
                    if authed {
                        (
                            StatusCode::OK,
                            Json(envelope(serde_json::json!({ "user": user_json() }))),
                        )
                    } else {
                        (
                            StatusCode::UNAUTHORIZED,
                            Json(serde_json::json!({ "message": "authentication required" })),
                        )
                    }
                }
            }),
        )
        .route(
            "/user/logout",
            post(move || {
                let calls = Arc::clone(&logout_calls);
                async move {
                    calls.logout.fetch_add(1, Ordering::Relaxed);
                    Json(envelope(serde_json::Value::Null))
                }
            }),
        )
        .route(
            "/upload/chat",
            post(move |_body: axum::body::Bytes| {
                let calls = Arc::clone(&upload_calls);
                async move {
                    calls.upload.fetch_add(1, Ordering::Relaxed);
                    Json(envelope(serde_json::json!({ "id": 11, "riskLevel": "HIGH" })))
                }
            }),
        )
        .route(
            "/analysis/{id}",
            get(|| async {
                Json(envelope(serde_json::json!({
                    "id": 11,
                    "riskLevel": "HIGH",
                    "keywords": [],
                })))
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok((addr, calls))
}

/// Drives the `haven` binary against a mock platform.
///
/// Every instance gets its own durable state directory, so "keep me
/// signed in" flows are isolated between tests; runs of the same instance
/// share it, like restarts of the same client.
pub struct HavenCli {
    base_url: String,
    state_dir: tempfile::TempDir,
}

impl HavenCli {
    pub fn new(addr: SocketAddr) -> anyhow::Result<Self> {
        let binary = haven_binary();
        anyhow::ensure!(binary.exists(), "haven binary not found at {}", binary.display());
        Ok(Self { base_url: format!("http://{addr}"), state_dir: tempfile::tempdir()? })
    }

    /// Run one subcommand to completion, capturing its output.
    pub async fn run(&self, args: &[&str]) -> anyhow::Result<Output> {
        let output = tokio::process::Command::new(haven_binary())
            .args(args)
            .env("HAVEN_BASE_URL", &self.base_url)
            .env("HAVEN_TIMEOUT_MS", "2000")
            .env("HAVEN_STATE_DIR", self.state_dir.path())
            .env("RUST_LOG", "warn")
            .output()
            .await?;
        Ok(output)
    }
}

/// Stdout of a completed run as UTF-8.
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}
