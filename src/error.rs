//! Error types for the docconv library.
//!
//! Two distinct error types reflect two distinct failure sources:
//!
//! * [`ConvertError`]: returned by every [`crate::engine::ConversionEngine`]
//!   method. Carries the operation, the path(s) involved and the cause.
//!
//! * [`BackendError`]: returned by a rendering backend. Backends know
//!   nothing about the request that invoked them, so the engine wraps the
//!   error in [`ConvertError::Backend`] with source/target context before it
//!   reaches the caller.
//!
//! Batch conversion never returns a per-file `ConvertError`; it records the
//! message in a failed [`crate::output::BatchEntry`] instead.

use crate::format::{InputFormat, OutputFormat};
use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the conversion engine.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The (input, target) pair is not registered or has no pipeline.
    #[error("{operation}: unsupported conversion for '{path}': {from} -> {to}")]
    UnsupportedConversion {
        operation: &'static str,
        path: PathBuf,
        from: String,
        to: String,
    },

    /// An option or request field failed validation.
    #[error("{operation}: invalid {field}: {reason}")]
    Validation {
        operation: &'static str,
        field: &'static str,
        reason: String,
    },

    // ── Input errors ──────────────────────────────────────────────────────
    /// The input file or directory could not be statted or read.
    #[error("{operation}: cannot access '{path}': {source}")]
    InputAccess {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input path exists but is not a regular file.
    #[error("{operation}: '{path}' is not a regular file")]
    NotAFile {
        operation: &'static str,
        path: PathBuf,
    },

    // ── Backend errors ────────────────────────────────────────────────────
    /// A rendering backend failed while running the pipeline.
    #[error("convert: {from} -> {to} failed for '{input}' (output '{output}'): {source}")]
    Backend {
        input: PathBuf,
        output: PathBuf,
        from: InputFormat,
        to: OutputFormat,
        #[source]
        source: BackendError,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the output directory or write the output file.
    #[error("{operation}: failed to write '{path}': {source}")]
    OutputWrite {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// The dispatch table and the format registry disagree.
    #[error(
        "Dispatch table diverges from the format registry \
         (declared without pipeline: [{}]; pipeline without declaration: [{}])",
        missing.join(", "),
        undeclared.join(", ")
    )]
    DispatchMismatch {
        missing: Vec<String>,
        undeclared: Vec<String>,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// A background task failed unexpectedly (panicked or was cancelled).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// True for errors raised before any filesystem or backend call.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            ConvertError::UnsupportedConversion { .. } | ConvertError::Validation { .. }
        )
    }
}

/// A failure reported by a rendering backend.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum BackendError {
    /// The backend ran and reported an error.
    #[error("{backend}: {detail}")]
    Failed { backend: String, detail: String },

    /// The backend could not be started (library or executable missing).
    #[error("{backend} is unavailable: {detail}")]
    Unavailable { backend: String, detail: String },

    /// The pipeline did not finish within the configured timeout.
    #[error("{backend} timed out after {secs}s")]
    Timeout { backend: String, secs: u64 },
}

impl BackendError {
    pub fn failed(backend: &str, detail: impl ToString) -> Self {
        BackendError::Failed {
            backend: backend.to_string(),
            detail: detail.to_string(),
        }
    }

    pub fn unavailable(backend: &str, detail: impl ToString) -> Self {
        BackendError::Unavailable {
            backend: backend.to_string(),
            detail: detail.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_display_names_path_and_pair() {
        let e = ConvertError::UnsupportedConversion {
            operation: "convert",
            path: PathBuf::from("/tmp/c.unsupported"),
            from: ".unsupported".into(),
            to: "html".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("convert"), "got: {msg}");
        assert!(msg.contains("/tmp/c.unsupported"), "got: {msg}");
        assert!(msg.contains("html"), "got: {msg}");
        assert!(e.is_request_error());
    }

    #[test]
    fn backend_display_wraps_context() {
        let e = ConvertError::Backend {
            input: PathBuf::from("in.md"),
            output: PathBuf::from("out.pdf"),
            from: InputFormat::Markdown,
            to: OutputFormat::Pdf,
            source: BackendError::failed("browser", "exit status 1"),
        };
        let msg = e.to_string();
        assert!(msg.contains("in.md"));
        assert!(msg.contains("out.pdf"));
        assert!(msg.contains("md -> pdf"), "got: {msg}");
        assert!(msg.contains("exit status 1"));
        assert!(!e.is_request_error());
    }

    #[test]
    fn timeout_display() {
        let e = BackendError::Timeout {
            backend: "pipeline".into(),
            secs: 30,
        };
        assert!(e.to_string().contains("30s"));
    }

    #[test]
    fn dispatch_mismatch_lists_pairs() {
        let e = ConvertError::DispatchMismatch {
            missing: vec!["pdf -> png".into()],
            undeclared: vec![],
        };
        assert!(e.to_string().contains("pdf -> png"));
    }
}
