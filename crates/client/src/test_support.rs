// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for unit tests: in-process mock platform servers.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;

use crate::config::ClientConfig;
use crate::credential::store::CredentialStore;
use crate::credential::{Credential, Scope};
use crate::Runtime;

/// Serve a router on an ephemeral local port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    addr
}

pub fn test_config(addr: SocketAddr) -> ClientConfig {
    let mut config = ClientConfig::new(format!("http://{addr}"));
    config.timeout_ms = 2_000;
    config
}

pub fn test_runtime(addr: SocketAddr) -> Runtime {
    Runtime::in_memory(test_config(addr))
}

/// A syntactically valid three-part token.
pub fn token(tag: &str) -> String {
    format!("header.{tag}.sig")
}

/// Seed a logged-in credential directly into the store.
pub fn seed_credential(store: &CredentialStore, scope: Scope) {
    store.save(
        &Credential {
            access_token: token("seeded"),
            refresh_token: "refresh-1".to_owned(),
            scope,
        },
        None,
    );
}

/// Standard success envelope body.
pub fn envelope(data: serde_json::Value) -> serde_json::Value {
    serde_json::json!({ "success": true, "message": null, "data": data })
}
