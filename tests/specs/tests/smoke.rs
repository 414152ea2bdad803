// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `haven` binary and exercise
//! login, rehydration across processes, upload, and logout.

use std::sync::atomic::Ordering;

use haven_specs::{mock_platform, mock_platform_rejecting_login, stdout, HavenCli};

// -- Session lifecycle --------------------------------------------------------

#[tokio::test]
async fn kept_login_roundtrip() -> anyhow::Result<()> {
    let (addr, calls) = mock_platform().await?;
    let cli = HavenCli::new(addr)?;

    let out = cli.run(&["login", "user@example.com", "--password", "pw", "--keep"]).await?;
    assert!(out.status.success(), "login failed: {}", stdout(&out));
    assert!(stdout(&out).contains("logged in as user@example.com"));

    // A separate process rehydrates from the durable scope without a
    // second login prompt.
    let out = cli.run(&["whoami"]).await?;
    assert!(out.status.success());
    assert!(stdout(&out).contains("user@example.com"));
    assert_eq!(calls.login.load(Ordering::Relaxed), 1);

    let out = cli.run(&["logout"]).await?;
    assert!(out.status.success());
    assert!(stdout(&out).contains("logged out"));
    assert_eq!(calls.logout.load(Ordering::Relaxed), 1);

    let out = cli.run(&["whoami"]).await?;
    assert!(out.status.success());
    assert!(stdout(&out).contains("not logged in"));

    Ok(())
}

#[tokio::test]
async fn plain_login_dies_with_the_process() -> anyhow::Result<()> {
    let (addr, calls) = mock_platform().await?;
    let cli = HavenCli::new(addr)?;

    let out = cli.run(&["login", "user@example.com", "--password", "pw"]).await?;
    assert!(out.status.success(), "login failed: {}", stdout(&out));
    assert_eq!(calls.login.load(Ordering::Relaxed), 1);

    // Without --keep, nothing lands in the durable scope.
    let out = cli.run(&["whoami"]).await?;
    assert!(out.status.success());
    assert!(stdout(&out).contains("not logged in"));

    Ok(())
}

#[tokio::test]
async fn rejected_login_exits_nonzero() -> anyhow::Result<()> {
    let (addr, _calls) = mock_platform_rejecting_login().await?;
    let cli = HavenCli::new(addr)?;

    let out = cli.run(&["login", "user@example.com", "--password", "nope"]).await?;
    assert!(!out.status.success());

    let out = cli.run(&["whoami"]).await?;
    assert!(stdout(&out).contains("not logged in"));

    Ok(())
}

// -- Upload and analysis ------------------------------------------------------

#[tokio::test]
async fn anonymous_upload_prints_analysis() -> anyhow::Result<()> {
    let (addr, calls) = mock_platform().await?;
    let cli = HavenCli::new(addr)?;

    let dir = tempfile::tempdir()?;
    let export = dir.path().join("chat.txt").display().to_string();
    std::fs::write(&export, "[alice] [AM 10:23] hey\n[bob] [AM 10:24] hi there\n")?;

    let out = cli.run(&["upload", &export, "--name", "alice"]).await?;
    assert!(out.status.success(), "upload failed: {}", stdout(&out));
    assert!(stdout(&out).contains("\"riskLevel\": \"HIGH\""));
    assert_eq!(calls.upload.load(Ordering::Relaxed), 1);

    let out = cli.run(&["analysis", "11"]).await?;
    assert!(out.status.success());
    assert!(stdout(&out).contains("\"riskLevel\": \"HIGH\""));

    Ok(())
}

#[tokio::test]
async fn upload_rejects_an_unrecognized_file() -> anyhow::Result<()> {
    let (addr, calls) = mock_platform().await?;
    let cli = HavenCli::new(addr)?;

    let dir = tempfile::tempdir()?;
    let export = dir.path().join("notes.txt").display().to_string();
    std::fs::write(&export, "just some prose without any structure")?;

    let out = cli.run(&["upload", &export, "--name", "alice"]).await?;
    assert!(!out.status.success());
    assert_eq!(calls.upload.load(Ordering::Relaxed), 0, "validation must not reach the network");

    Ok(())
}
