// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::error;

use haven_client::config::ClientConfig;
use haven_client::credential::store::{default_credential_path, FileScope, MemoryScope};
use haven_client::upload::{ProgressFn, UploadHandle, UploadMeta, UploadProgress, UploadSource};
use haven_client::Runtime;

#[derive(Parser)]
#[command(name = "haven", about = "Support-platform client")]
struct Cli {
    /// Root URL of the platform API.
    #[arg(long, default_value = "http://localhost:8080/api", env = "HAVEN_BASE_URL")]
    base_url: String,

    /// Per-request timeout in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "HAVEN_TIMEOUT_MS")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and store credentials.
    Login {
        email: String,
        #[arg(long)]
        password: String,
        /// Keep the session across restarts.
        #[arg(long)]
        keep: bool,
    },
    /// Print the current user.
    Whoami,
    /// Upload a chat export for analysis.
    Upload {
        file: PathBuf,
        /// Display name the analysis should focus on.
        #[arg(long)]
        name: String,
    },
    /// Fetch an analysis result.
    Analysis { id: i64 },
    /// End the session.
    Logout,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = rustls::crypto::ring::default_provider().install_default();

    if let Err(e) = run(cli).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ClientConfig::new(cli.base_url);
    config.timeout_ms = cli.timeout_ms;

    // The session scope dies with the process, like a closed browser tab;
    // only --keep logins survive via the durable file scope.
    let runtime = Runtime::new(
        config,
        Box::new(MemoryScope::new()),
        Box::new(FileScope::new(default_credential_path())),
    );

    match cli.command {
        Command::Login { email, password, keep } => {
            let user = runtime.session.login(&email, &password, keep).await?;
            println!("logged in as {}", user.email);
        }
        Command::Whoami => {
            runtime.session.hydrate().await;
            match runtime.session.current_user() {
                Some(user) => println!("{} (id {})", user.email, user.id),
                None => println!("not logged in"),
            }
        }
        Command::Upload { file, name } => {
            runtime.session.hydrate().await;
            let contents = tokio::fs::read(&file).await?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "export.txt".to_owned());
            let source = UploadSource {
                file_name,
                mime_type: "text/plain".to_owned(),
                contents: contents.into(),
            };
            let meta = UploadMeta {
                user_name: name,
                user_id: runtime.session.current_user().map(|u| u.id),
            };

            let handle = UploadHandle::new();
            let cancel_handle = handle.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel_handle.cancel();
                }
            });

            let progress: Arc<ProgressFn> = Arc::new(|p: UploadProgress| {
                let pct = p.bytes_sent * 100 / p.total_bytes.max(1);
                eprint!("\ruploading: {pct}% (attempt {})", p.attempt);
            });
            let outcome = runtime.uploader.upload(source, meta, &handle, Some(progress)).await?;
            eprintln!();
            println!("{}", serde_json::to_string_pretty(&outcome.analysis)?);
        }
        Command::Analysis { id } => {
            runtime.session.hydrate().await;
            let analysis = runtime.api.analysis_result(id).await?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        Command::Logout => {
            runtime.session.logout().await;
            println!("logged out");
        }
    }

    Ok(())
}
