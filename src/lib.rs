//! # docconv
//!
//! Convert documents between formats: PDF, Word, spreadsheets, Markdown,
//! HTML, plain text and images.
//!
//! The heavy lifting (PDF parsing, spreadsheet reading, page rendering) is
//! delegated to backends behind traits. This crate decides *which* pipeline
//! runs for a request, caches its output, extracts document metadata and
//! drives batch conversion of whole directories.
//!
//! ## Pipeline Overview
//!
//! ```text
//! ConversionRequest
//!  │
//!  ├─ 1. Resolve   extension → InputFormat, target → OutputFormat (registry)
//!  ├─ 2. Validate  options (quality, page_range) before any I/O
//!  ├─ 3. Cache     key = (input, target, options, mtime); hit → write bytes
//!  ├─ 4. Dispatch  (InputFormat, OutputFormat) → pipeline fn
//!  ├─ 5. Backends  pdfium / docx reader / calamine / CommonMark / browser
//!  └─ 6. Output    atomic write + cache insert
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docconv::{ConversionEngine, ConversionRequest, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = ConversionEngine::new(EngineConfig::default())?;
//!
//!     let result = engine
//!         .convert(&ConversionRequest::new("README.md", "out/README.html", "html"))
//!         .await?;
//!     println!("{} → {}", result.message, result.written.display());
//!
//!     let batch = engine.batch_convert("docs", "out", "pdf", Some("*.md")).await?;
//!     for line in batch.details() {
//!         println!("{line}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Conversions
//!
//! | Input | Extensions | Targets |
//! |-------|-----------|---------|
//! | pdf   | `.pdf` | txt, md, html, png, jpg |
//! | docx  | `.docx` | txt, md, html, pdf |
//! | xlsx  | `.xlsx`, `.xls` | csv, json, html |
//! | md    | `.md`, `.markdown` | html, pdf, docx (written as RTF) |
//! | html  | `.html`, `.htm` | pdf, md, png, jpg |
//! | txt   | `.txt` | md, html, pdf |
//!
//! Outputs to PDF and images of HTML need a Chromium-family browser on
//! `PATH` (or [`EngineConfig::browser_path`]); PDF inputs need the pdfium
//! shared library.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docconv` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docconv = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod output;
pub mod pattern;
pub mod pipeline;
pub mod progress;
pub mod tools;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::Backends;
pub use cache::{BoundedCache, EvictionPolicy};
pub use config::{ConversionOptions, EngineConfig, EngineConfigBuilder, PageSelection};
pub use engine::ConversionEngine;
pub use error::{BackendError, ConvertError};
pub use format::{
    is_pair_supported, list_formats, resolve_format, FormatCatalog, InputFormat, OutputFormat,
};
pub use output::{
    BatchEntry, BatchOutcome, BatchStatus, ConversionRequest, ConversionResult, DocumentInfo,
};
pub use pattern::FilePattern;
pub use progress::{BatchProgress, BatchProgressCallback, NoopProgress};
pub use tools::{ToolDefinition, ToolDispatcher, ToolError, ToolRequest, ToolResponse};
