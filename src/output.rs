//! Request and result types exchanged with the conversion engine.

use crate::config::ConversionOptions;
use crate::format::InputFormat;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One conversion: where to read, where to write, what to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Target format identifier, e.g. `"html"` or `"jpg"`.
    pub target: String,
    #[serde(default)]
    pub options: ConversionOptions,
}

impl ConversionRequest {
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            target: target.into(),
            options: ConversionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }
}

/// Outcome of a successful conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    /// Human-readable status message.
    pub message: String,
    /// The file that was actually written.
    pub written: PathBuf,
    /// Set when the requested format could not be produced directly and a
    /// substitute file (e.g. RTF for DOCX) was written instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate_output: Option<PathBuf>,
    /// True when the bytes came from the result cache.
    pub from_cache: bool,
}

/// File metadata plus format-specific extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub path: PathBuf,
    pub name: String,
    pub extension: String,
    pub mime_type: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<InputFormat>,

    // ── Format-specific enrichment ───────────────────────────────────────
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheets: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_count: Option<usize>,

    /// Enrichment failure note; baseline fields are still valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentInfo {
    /// Baseline info with every enrichment field unset.
    pub fn baseline(path: &Path, meta: &std::fs::Metadata) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();
        Self {
            path: path.to_path_buf(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            extension,
            mime_type: crate::format::mime_type_for(path).to_string(),
            size: meta.len(),
            created: meta.created().ok().map(DateTime::<Utc>::from),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            format: InputFormat::from_path(path),
            pages: None,
            text_length: None,
            sheets: None,
            sheet_count: None,
            error: None,
        }
    }
}

/// Whether a batch entry converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Success,
    Failed,
}

/// Per-file result of a batch conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    /// File name relative to the input directory.
    pub file: String,
    pub status: BatchStatus,
    /// Output file name on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchEntry {
    pub fn is_success(&self) -> bool {
        self.status == BatchStatus::Success
    }
}

impl fmt::Display for BatchEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            BatchStatus::Success => write!(
                f,
                "✓ {} -> {}",
                self.file,
                self.output.as_deref().unwrap_or("?")
            ),
            BatchStatus::Failed => write!(
                f,
                "✗ {}: {}",
                self.file,
                self.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

/// Aggregate result of a batch conversion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub success: usize,
    pub failed: usize,
    /// One entry per input file, in file-name order.
    pub entries: Vec<BatchEntry>,
}

impl BatchOutcome {
    pub fn from_entries(entries: Vec<BatchEntry>) -> Self {
        let success = entries.iter().filter(|e| e.is_success()).count();
        Self {
            success,
            failed: entries.len() - success,
            entries,
        }
    }

    /// Detail lines prefixed with `✓` or `✗`.
    pub fn details(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.to_string()).collect()
    }
}
