//! Structured access logging.
//!
//! # Responsibilities
//! - Record one entry per request outcome (success, rejection, timeout,
//!   backend error)
//! - Never block or fail a request on behalf of the log sink
//!
//! # Design Decisions
//! - Entries travel over a bounded channel to a writer task; a full
//!   channel or dead sink drops the entry and bumps a counter
//! - One JSON object per line, immutable once emitted

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::config::AccessLogConfig;
use crate::observability::metrics;

/// Terminal state of a dispatched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    Completed,
    TimedOut,
    BackendError,
    RateRejected,
    BodyTooLarge,
}

/// One access log record. Created per request, never mutated after
/// emission.
#[derive(Debug, Clone, Serialize)]
pub struct AccessLogEntry {
    /// Milliseconds since the Unix epoch at emission.
    pub timestamp_ms: u64,
    /// Immediate client socket IP.
    pub client_ip: String,
    /// X-Forwarded-For chain as sent upstream.
    pub forwarded_for: Option<String>,
    /// Transport protocol, e.g. "HTTP/1.1".
    pub protocol: String,
    /// Request line: method, path and query.
    pub request: String,
    /// Response status sent to the client.
    pub status: u16,
    /// Response body bytes relayed to the client.
    pub body_bytes_sent: u64,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    /// Total time from receipt to the terminal state, in milliseconds.
    pub request_time_ms: f64,
    /// Address of the backend that served the request, if one was chosen.
    pub upstream_addr: Option<String>,
    /// Time to establish the backend connection (absent when reused).
    pub upstream_connect_time_ms: Option<f64>,
    /// Time until the backend response head arrived.
    pub upstream_header_time_ms: Option<f64>,
    /// Time until the backend response was fully relayed.
    pub upstream_response_time_ms: Option<f64>,
    pub request_id: String,
    pub outcome: RequestOutcome,
}

/// Current wall-clock reading for entry timestamps.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Where access log lines are written.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LogSink {
    Stdout,
    File(PathBuf),
}

impl LogSink {
    fn from_config(sink: &str) -> Self {
        match sink {
            "stdout" | "" => LogSink::Stdout,
            path => LogSink::File(PathBuf::from(path)),
        }
    }
}

/// Handle for emitting access log entries.
///
/// Cheap to clone; all clones feed the same writer task.
#[derive(Debug, Clone)]
pub struct AccessLogger {
    tx: mpsc::Sender<AccessLogEntry>,
    dropped: Arc<AtomicU64>,
}

impl AccessLogger {
    /// Spawn the writer task and return the emitting handle.
    pub fn spawn(config: &AccessLogConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.buffer.max(1));
        let sink = LogSink::from_config(&config.sink);
        tokio::spawn(writer_task(rx, sink));
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an entry, best-effort. Never blocks the caller.
    pub fn emit(&self, entry: AccessLogEntry) {
        if self.tx.try_send(entry).is_err() {
            // Writer is gone or backed up; the request must not wait.
            self.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::record_access_log_dropped();
        }
    }

    /// Number of entries dropped due to backpressure or a dead sink.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Logger wired to an inspectable channel instead of a sink. Test support.
#[cfg(test)]
pub(crate) fn test_logger(buffer: usize) -> (AccessLogger, mpsc::Receiver<AccessLogEntry>) {
    let (tx, rx) = mpsc::channel(buffer);
    let logger = AccessLogger {
        tx,
        dropped: Arc::new(AtomicU64::new(0)),
    };
    (logger, rx)
}

async fn writer_task(mut rx: mpsc::Receiver<AccessLogEntry>, sink: LogSink) {
    let mut file = match &sink {
        LogSink::Stdout => None,
        LogSink::File(path) => {
            match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
            {
                Ok(f) => Some(f),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Access log sink unavailable; entries will be dropped");
                    // Drain the channel so senders keep not-blocking.
                    while rx.recv().await.is_some() {}
                    return;
                }
            }
        }
    };

    let mut stdout = tokio::io::stdout();
    while let Some(entry) = rx.recv().await {
        let mut line = match serde_json::to_vec(&entry) {
            Ok(line) => line,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to serialize access log entry");
                continue;
            }
        };
        line.push(b'\n');

        let result = match &mut file {
            Some(f) => f.write_all(&line).await,
            None => stdout.write_all(&line).await,
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, "Access log write failed; entry dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(status: u16) -> AccessLogEntry {
        AccessLogEntry {
            timestamp_ms: now_ms(),
            client_ip: "203.0.113.7".into(),
            forwarded_for: Some("203.0.113.7".into()),
            protocol: "HTTP/1.1".into(),
            request: "GET / HTTP/1.1".into(),
            status,
            body_bytes_sent: 12,
            referer: None,
            user_agent: Some("curl/8.0".into()),
            request_time_ms: 1.25,
            upstream_addr: Some("127.0.0.1:3000".into()),
            upstream_connect_time_ms: Some(0.3),
            upstream_header_time_ms: Some(0.9),
            upstream_response_time_ms: Some(1.1),
            request_id: "req-1".into(),
            outcome: RequestOutcome::Completed,
        }
    }

    #[test]
    fn test_entry_serializes_as_json_line() {
        let json = serde_json::to_string(&entry(200)).unwrap();
        assert!(json.contains("\"status\":200"));
        assert!(json.contains("\"outcome\":\"completed\""));
        assert!(!json.contains('\n'));
    }

    #[test]
    fn test_outcome_labels() {
        let json = serde_json::to_string(&RequestOutcome::RateRejected).unwrap();
        assert_eq!(json, "\"rate_rejected\"");
        let json = serde_json::to_string(&RequestOutcome::BodyTooLarge).unwrap();
        assert_eq!(json, "\"body_too_large\"");
    }

    #[tokio::test]
    async fn test_emit_to_file_sink() {
        let path = std::env::temp_dir().join("dispatch_proxy_access_log_test.jsonl");
        let _ = tokio::fs::remove_file(&path).await;

        let logger = AccessLogger::spawn(&AccessLogConfig {
            sink: path.display().to_string(),
            buffer: 16,
        });
        logger.emit(entry(200));
        logger.emit(entry(502));

        // Give the writer task a moment to flush.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.lines().count(), 2);
        assert_eq!(logger.dropped(), 0);

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_backpressure_drops_instead_of_blocking() {
        // No writer task: the channel fills and emit must not block.
        let (tx, _rx) = mpsc::channel(1);
        let logger = AccessLogger {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };

        logger.emit(entry(200));
        logger.emit(entry(200));
        logger.emit(entry(200));

        assert_eq!(logger.dropped(), 2);
    }
}
