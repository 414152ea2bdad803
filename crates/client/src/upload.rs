// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Resilient chat-export upload: validation, streamed progress, bounded
//! retry, and cooperative cancellation.
//!
//! Transmission goes through the request dispatcher; the pipeline owns
//! retry policy on top. Transient failures (timeout, unreachable, 5xx)
//! are retried from byte zero with a fixed delay; validation, payload-
//! too-large, and authentication failures are terminal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use regex::Regex;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::api::Envelope;
use crate::dispatch::ApiClient;
use crate::error::{ApiError, ErrorKind};

/// Maximum accepted export size (10 MiB).
const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
/// Declared MIME types accepted for chat exports.
const ALLOWED_MIME_TYPES: &[&str] = &["text/plain", "application/txt"];
/// Per-attempt transmission deadline (3 minutes; analysis runs inline).
const UPLOAD_TIMEOUT_MS: u64 = 180_000;
/// Retries after the initial attempt.
const MAX_RETRIES: u32 = 3;
/// Fixed delay between attempts.
const RETRY_DELAY_MS: u64 = 2_000;
/// Chunk size for the progress-reporting body stream.
const CHUNK_SIZE: usize = 64 * 1024;
/// How much of the file the export-format sniff reads.
const SNIFF_LEN: usize = 4096;

/// Upload pipeline policy. Defaults mirror the platform limits.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_file_size: u64,
    pub allowed_mime_types: Vec<String>,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            allowed_mime_types: ALLOWED_MIME_TYPES.iter().map(|t| (*t).to_owned()).collect(),
            timeout_ms: UPLOAD_TIMEOUT_MS,
            max_retries: MAX_RETRIES,
            retry_delay_ms: RETRY_DELAY_MS,
        }
    }
}

impl UploadPolicy {
    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// File payload handed to the pipeline.
#[derive(Debug, Clone)]
pub struct UploadSource {
    pub file_name: String,
    /// Declared MIME type, checked against the allow-list.
    pub mime_type: String,
    pub contents: Bytes,
}

/// Upload metadata: whose messages the analysis should focus on, and the
/// owning account when logged in.
#[derive(Debug, Clone)]
pub struct UploadMeta {
    pub user_name: String,
    pub user_id: Option<i64>,
}

/// Progress snapshot passed to the caller's callback.
#[derive(Debug, Clone, Copy)]
pub struct UploadProgress {
    pub bytes_sent: u64,
    pub total_bytes: u64,
    /// Instantaneous throughput in bytes per second.
    pub rate: f64,
    /// Estimated remaining time; `None` while throughput is zero.
    pub eta: Option<Duration>,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// Cancellation handle for an upload job.
///
/// A one-way latch: once cancelled, any in-flight transmission for the
/// job is aborted and no further attempts or progress callbacks happen.
/// Cancelling a completed job is a no-op.
#[derive(Clone, Default)]
pub struct UploadHandle {
    cancel: CancellationToken,
}

impl UploadHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}

/// Successful outcome: the server-assigned upload id plus the structured
/// analysis payload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub upload_id: i64,
    pub analysis: serde_json::Value,
}

/// Progress callback type.
pub type ProgressFn = dyn Fn(UploadProgress) + Send + Sync;

/// Drives chat-export submissions through the request dispatcher.
pub struct Uploader {
    api: Arc<ApiClient>,
    policy: UploadPolicy,
}

impl Uploader {
    pub fn new(api: Arc<ApiClient>, policy: UploadPolicy) -> Self {
        Self { api, policy }
    }

    /// Validate and transmit an export, retrying transient failures.
    ///
    /// Preconditions are checked before any network activity. Attempts are
    /// bounded at `max_retries + 1`; each resubmits from byte zero.
    pub async fn upload(
        &self,
        source: UploadSource,
        meta: UploadMeta,
        handle: &UploadHandle,
        on_progress: Option<Arc<ProgressFn>>,
    ) -> Result<UploadOutcome, ApiError> {
        self.validate(&source, &meta)?;

        let job = uuid::Uuid::new_v4();
        let total = source.contents.len() as u64;
        let mut attempt: u32 = 1;
        loop {
            if handle.is_cancelled() {
                return Err(cancelled_error());
            }

            tracing::debug!(job = %job, attempt, total_bytes = total, "starting upload attempt");
            match self.attempt(&source, &meta, handle, on_progress.clone(), attempt).await {
                Ok(outcome) => {
                    tracing::info!(job = %job, upload_id = outcome.upload_id, "upload complete");
                    return Ok(outcome);
                }
                Err(e) if e.kind == ErrorKind::Cancelled => return Err(e),
                Err(e) if !e.is_retryable() => {
                    tracing::debug!(job = %job, attempt, err = %e, "upload failed, not retryable");
                    return Err(e);
                }
                Err(e) => {
                    if attempt > self.policy.max_retries {
                        tracing::warn!(job = %job, attempt, err = %e, "upload retries exhausted");
                        return Err(ApiError {
                            kind: ErrorKind::RetriesExhausted,
                            status: e.status,
                            message: format!(
                                "upload failed after {attempt} attempts: {}",
                                e.message
                            ),
                        });
                    }
                    tracing::debug!(job = %job, attempt, err = %e, "upload attempt failed, retrying");
                    attempt += 1;
                    tokio::select! {
                        biased;
                        _ = handle.cancelled() => return Err(cancelled_error()),
                        _ = tokio::time::sleep(self.policy.retry_delay()) => {}
                    }
                }
            }
        }
    }

    /// Precondition checks; violations never reach the network.
    fn validate(&self, source: &UploadSource, meta: &UploadMeta) -> Result<(), ApiError> {
        if meta.user_name.trim().is_empty() {
            return Err(ApiError::new(ErrorKind::Validation, "a display name is required"));
        }
        if source.contents.is_empty() {
            return Err(ApiError::new(ErrorKind::Validation, "no file provided"));
        }
        if source.contents.len() as u64 > self.policy.max_file_size {
            return Err(ApiError::new(
                ErrorKind::Validation,
                format!(
                    "file exceeds the {} MiB limit",
                    self.policy.max_file_size / (1024 * 1024)
                ),
            ));
        }
        if !self.policy.allowed_mime_types.iter().any(|t| t == &source.mime_type) {
            return Err(ApiError::new(
                ErrorKind::Validation,
                "only plain-text exports can be uploaded",
            ));
        }
        if !looks_like_chat_export(&source.contents) {
            return Err(ApiError::new(
                ErrorKind::Validation,
                "file is not a recognized messenger export",
            ));
        }
        Ok(())
    }

    async fn attempt(
        &self,
        source: &UploadSource,
        meta: &UploadMeta,
        handle: &UploadHandle,
        on_progress: Option<Arc<ProgressFn>>,
        attempt: u32,
    ) -> Result<UploadOutcome, ApiError> {
        let total = source.contents.len() as u64;
        let body = progress_body(source.contents.clone(), total, attempt, handle, on_progress);

        let part = reqwest::multipart::Part::stream_with_length(body, total)
            .file_name(source.file_name.clone())
            .mime_str(&source.mime_type)
            .map_err(|e| ApiError::new(ErrorKind::Validation, format!("invalid mime type: {e}")))?;
        let mut form = reqwest::multipart::Form::new()
            .text("userName", meta.user_name.clone())
            .part("file", part);
        if let Some(id) = meta.user_id {
            form = form.text("userId", id.to_string());
        }

        let fut = self.api.send_multipart("/upload/chat", form, self.policy.timeout());
        let resp = tokio::select! {
            biased;
            _ = handle.cancelled() => return Err(cancelled_error()),
            resp = fut => resp?,
        };

        let data = resp.json::<Envelope<serde_json::Value>>()?.into_data()?;
        let upload_id = data
            .get("id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ApiError::new(ErrorKind::Rejected, "upload response carried no id"))?;
        Ok(UploadOutcome { upload_id, analysis: data })
    }
}

fn cancelled_error() -> ApiError {
    ApiError::new(ErrorKind::Cancelled, "upload cancelled")
}

/// Build the streaming request body, invoking the progress callback as
/// chunks are handed to the transport. Callbacks are suppressed once the
/// job is cancelled.
fn progress_body(
    contents: Bytes,
    total: u64,
    attempt: u32,
    handle: &UploadHandle,
    on_progress: Option<Arc<ProgressFn>>,
) -> reqwest::Body {
    let mut chunks = Vec::with_capacity(contents.len() / CHUNK_SIZE + 1);
    let mut offset = 0;
    while offset < contents.len() {
        let end = usize::min(offset + CHUNK_SIZE, contents.len());
        chunks.push(contents.slice(offset..end));
        offset = end;
    }

    let sent = Arc::new(AtomicU64::new(0));
    let started = Instant::now();
    let handle = handle.clone();
    let stream = futures_util::stream::iter(chunks.into_iter().map(move |chunk| {
        let bytes_sent = sent.fetch_add(chunk.len() as u64, Ordering::Relaxed) + chunk.len() as u64;
        if !handle.is_cancelled() {
            if let Some(cb) = &on_progress {
                cb(snapshot(bytes_sent, total, started.elapsed(), attempt));
            }
        }
        Ok::<Bytes, std::io::Error>(chunk)
    }));
    reqwest::Body::wrap_stream(stream)
}

/// Compute a progress snapshot from raw counters.
fn snapshot(bytes_sent: u64, total_bytes: u64, elapsed: Duration, attempt: u32) -> UploadProgress {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 { bytes_sent as f64 / secs } else { 0.0 };
    let eta = if rate > 0.0 {
        Some(Duration::from_secs_f64(total_bytes.saturating_sub(bytes_sent) as f64 / rate))
    } else {
        None
    };
    UploadProgress { bytes_sent, total_bytes, rate, eta, attempt }
}

/// Whether the payload starts like a messenger chat export.
///
/// Patterns cover the export header variants the analysis engine accepts:
/// `[name] [am/pm hh:mm]`, `[am/pm hh:mm] name :`, `name :`, `[name] `.
fn looks_like_chat_export(contents: &Bytes) -> bool {
    let head = &contents[..usize::min(contents.len(), SNIFF_LEN)];
    let text = String::from_utf8_lossy(head);
    export_patterns().iter().any(|re| re.is_match(&text))
}

fn export_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"^\[([^\]]+)\] \[(오전|오후|AM|PM) \d{1,2}:\d{2}\]",
            r"^\[(오전|오후|AM|PM) \d{1,2}:\d{2}\] ([^:]+) :",
            r"^([^:\[]+) :",
            r"^\[([^\]]+)\] ",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

#[cfg(test)]
#[path = "upload_tests.rs"]
mod tests;
