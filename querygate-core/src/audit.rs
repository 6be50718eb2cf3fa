//! Append-only audit trail.
//!
//! One [`AuditEntry`] is written per pipeline invocation, serialized as a
//! single JSON line. Entries are never updated or deleted.
//!
//! # Security
//! - Input parameters are capped at [`MAX_PARAMETER_CHARS`] characters
//! - Each entry is written with one `write_all` while holding the sink's
//!   async lock, so concurrent invocations never interleave within a line
//! - File writes go through `tokio::fs`, so appending never blocks a worker

use crate::{Result, config::ServerConfig, error::QueryGateError, outcome::Outcome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Maximum characters of serialized input kept in an entry
pub const MAX_PARAMETER_CHARS: usize = 500;

/// Appended to input parameters cut at [`MAX_PARAMETER_CHARS`]
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// RFC 3339 UTC timestamp of emission
    pub timestamp: String,
    /// Operation name
    pub tool_called: String,
    /// Serialized (unredacted) input, truncated
    pub input_parameters: String,
    /// Size of the serialized outcome returned to the caller
    pub output_size_bytes: usize,
    /// Number of masked values
    pub redaction_count: usize,
    /// Categories that were masked
    pub redacted_types: Vec<String>,
    /// Time spent running and redacting the operation
    pub execution_time_ms: u64,
    /// `success` or `error`
    pub status: String,
    /// Failure message for `error` entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AuditEntry {
    /// Builds an entry for a finished invocation.
    ///
    /// Status and error message come from the outcome's tag.
    pub fn new(
        tool: &str,
        params: &Value,
        outcome: &Outcome,
        redaction_count: usize,
        redacted_types: Vec<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            tool_called: tool.to_string(),
            input_parameters: truncate_parameters(params),
            output_size_bytes: outcome.serialized_len(),
            redaction_count,
            redacted_types,
            execution_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            status: outcome.status_label().to_string(),
            error_message: outcome.error_message().map(ToString::to_string),
        }
    }
}

/// Serializes parameters, keeping at most [`MAX_PARAMETER_CHARS`] characters.
pub fn truncate_parameters(params: &Value) -> String {
    let serialized = params.to_string();
    if serialized.chars().count() <= MAX_PARAMETER_CHARS {
        return serialized;
    }
    let mut truncated: String = serialized.chars().take(MAX_PARAMETER_CHARS).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

/// Destination for serialized audit lines.
///
/// # Object Safety
/// This trait is object-safe, allowing for dynamic dispatch through
/// `Arc<dyn AuditSink>`.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends one line. `line` carries no trailing newline.
    ///
    /// # Errors
    /// Returns an I/O error if the line cannot be written.
    async fn append(&self, line: &str) -> Result<()>;
}

/// JSON-lines file opened in append mode.
#[derive(Debug)]
pub struct FileAuditSink {
    path: PathBuf,
    file: tokio::sync::Mutex<tokio::fs::File>,
}

impl FileAuditSink {
    /// Opens (creating if needed) the audit file for appending.
    ///
    /// # Errors
    /// Returns an I/O error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| QueryGateError::Io {
                context: format!("Failed to open audit log {}", path.display()),
                source,
            })?;

        Ok(Self {
            path,
            file: tokio::sync::Mutex::new(tokio::fs::File::from_std(file)),
        })
    }

    /// Location of the audit file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditSink for FileAuditSink {
    async fn append(&self, line: &str) -> Result<()> {
        let mut record = String::with_capacity(line.len().saturating_add(1));
        record.push_str(line);
        record.push('\n');

        let mut file = self.file.lock().await;
        let written = async {
            file.write_all(record.as_bytes()).await?;
            file.flush().await
        }
        .await;

        written.map_err(|source| QueryGateError::Io {
            context: format!("Failed to append to audit log {}", self.path.display()),
            source,
        })
    }
}

/// In-memory sink for tests and embedders that ship entries elsewhere.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    lines: Mutex<Vec<String>>,
}

impl MemoryAuditSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw lines recorded so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Recorded entries, skipping lines that fail to parse.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lines()
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, line: &str) -> Result<()> {
        self.lines
            .lock()
            .map_err(|_| QueryGateError::configuration("Audit buffer poisoned"))?
            .push(line.to_string());
        Ok(())
    }
}

/// Emits audit entries when auditing is enabled.
#[derive(Clone)]
pub struct AuditLogger {
    enabled: bool,
    sink: Arc<dyn AuditSink>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl AuditLogger {
    /// Creates a logger over `sink`.
    pub fn new(enabled: bool, sink: Arc<dyn AuditSink>) -> Self {
        Self { enabled, sink }
    }

    /// Logger that never writes.
    pub fn disabled() -> Self {
        Self::new(false, Arc::new(MemoryAuditSink::new()))
    }

    /// Logger writing to the configured file, or disabled per configuration.
    ///
    /// # Errors
    /// Returns an I/O error if auditing is enabled and the file cannot be opened.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        if !config.audit_enabled {
            return Ok(Self::disabled());
        }
        let sink = FileAuditSink::open(&config.audit_log_path)?;
        Ok(Self::new(true, Arc::new(sink)))
    }

    /// Whether entries are written.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Writes `entry` as one line. Failures are logged, never propagated.
    pub async fn record(&self, entry: &AuditEntry) {
        if !self.enabled {
            return;
        }

        let line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(tool = %entry.tool_called, "Failed to serialize audit entry: {}", e);
                return;
            }
        };

        if let Err(e) = self.sink.append(&line).await {
            tracing::warn!(tool = %entry.tool_called, "Failed to write audit entry: {}", e);
        }
    }
}
