//! Rendering backends: the opaque capability providers pipelines call into.
//!
//! Each capability sits behind a trait so the engine can be driven by real
//! libraries in production and by fakes in tests:
//!
//! | Trait | Default | Used for |
//! |-------|---------|----------|
//! | [`PdfBackend`]         | [`pdf::PdfiumBackend`]          | PDF text, page count, page raster |
//! | [`WordBackend`]        | [`word::ZipWordBackend`]        | `.docx` paragraphs |
//! | [`MarkupBackend`]      | [`markup::CommonMarkBackend`]   | Markdown → HTML, HTML → Markdown |
//! | [`SpreadsheetBackend`] | [`spreadsheet::CalamineBackend`] | workbook sheets and cells |
//! | [`PageRenderer`]       | [`browser::ChromiumRenderer`]   | HTML → PDF, HTML → screenshot |
//!
//! Backends that wrap blocking libraries move the work onto
//! `tokio::task::spawn_blocking` themselves; callers only ever `.await`.

pub mod browser;
pub mod markup;
pub mod pdf;
pub mod spreadsheet;
pub mod word;

use crate::config::EngineConfig;
use crate::error::BackendError;
use async_trait::async_trait;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

// ── Backend data model ───────────────────────────────────────────────────

/// Text of a PDF, one string per extracted page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfText {
    /// Total pages in the document, whether extracted or not.
    pub page_count: usize,
    /// `(page_index_0based, text)` for every selected page.
    pub pages: Vec<(usize, String)>,
}

impl PdfText {
    /// Selected pages joined by blank lines.
    pub fn joined(&self) -> String {
        self.pages
            .iter()
            .map(|(_, t)| t.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// A paragraph of a word-processor document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paragraph {
    /// Heading level 1–6, or None for body text.
    pub heading: Option<u8>,
    pub text: String,
}

/// Paragraph model of a word-processor document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordDocument {
    pub paragraphs: Vec<Paragraph>,
}

impl WordDocument {
    /// Raw text, one paragraph per line.
    pub fn plain_text(&self) -> String {
        self.paragraphs
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A spreadsheet cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Display form used in CSV and HTML tables.
    pub fn display(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            Cell::Number(n) => n.to_string(),
            Cell::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        }
    }
}

/// One worksheet.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<Cell>>,
}

/// A workbook, sheets in workbook order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    /// The named sheet, or the first sheet when `name` is None.
    pub fn sheet(&self, name: Option<&str>) -> Option<&Sheet> {
        match name {
            Some(n) => self.sheets.iter().find(|s| s.name == n),
            None => self.sheets.first(),
        }
    }
}

/// Page settings for HTML → PDF printing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintOptions {
    pub print_background: bool,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            print_background: true,
        }
    }
}

// ── Capability traits ────────────────────────────────────────────────────

/// Page-description (PDF) reading and rasterising.
#[async_trait]
pub trait PdfBackend: Send + Sync {
    /// Extract text of the pages at `page_indices` (all pages when None).
    async fn extract_text(
        &self,
        path: &Path,
        page_indices: Option<&[usize]>,
    ) -> Result<PdfText, BackendError>;

    /// Number of pages in the document.
    async fn page_count(&self, path: &Path) -> Result<usize, BackendError>;

    /// Rasterise one page, longest edge capped at `max_pixels`.
    async fn render_page(
        &self,
        path: &Path,
        page_index: usize,
        max_pixels: u32,
    ) -> Result<DynamicImage, BackendError>;
}

/// Word-processor (`.docx`) reading.
#[async_trait]
pub trait WordBackend: Send + Sync {
    async fn read_document(&self, path: &Path) -> Result<WordDocument, BackendError>;
}

/// Markup conversion. Pure and in-memory.
pub trait MarkupBackend: Send + Sync {
    /// Render Markdown to an HTML fragment.
    fn markdown_to_html(&self, markdown: &str) -> Result<String, BackendError>;

    /// Convert an HTML document or fragment to Markdown.
    fn html_to_markdown(&self, html: &str) -> Result<String, BackendError>;
}

/// Spreadsheet reading.
#[async_trait]
pub trait SpreadsheetBackend: Send + Sync {
    async fn read_workbook(&self, path: &Path) -> Result<Workbook, BackendError>;

    /// Sheet names only; the default reads the whole workbook.
    async fn sheet_names(&self, path: &Path) -> Result<Vec<String>, BackendError> {
        Ok(self.read_workbook(path).await?.sheet_names())
    }
}

/// Headless-browser page rendering.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Print the HTML file at `html` to a PDF at `output`.
    async fn print_pdf(
        &self,
        html: &Path,
        output: &Path,
        options: &PrintOptions,
    ) -> Result<(), BackendError>;

    /// Screenshot the HTML file at `html`; returns PNG bytes.
    async fn screenshot(&self, html: &Path, width: u32, height: u32)
        -> Result<Vec<u8>, BackendError>;
}

// ── Backend set ──────────────────────────────────────────────────────────

/// The set of backends an engine dispatches to.
///
/// Cloning is cheap; every backend is shared behind an `Arc`.
#[derive(Clone)]
pub struct Backends {
    pub pdf: Arc<dyn PdfBackend>,
    pub word: Arc<dyn WordBackend>,
    pub markup: Arc<dyn MarkupBackend>,
    pub spreadsheet: Arc<dyn SpreadsheetBackend>,
    pub renderer: Arc<dyn PageRenderer>,
}

impl Backends {
    /// Production backends configured from `config`.
    ///
    /// Nothing is loaded or launched here: pdfium binds on first use and
    /// the browser is located on the first render.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            pdf: Arc::new(pdf::PdfiumBackend::new(config.pdfium_library_dir.clone())),
            word: Arc::new(word::ZipWordBackend),
            markup: Arc::new(markup::CommonMarkBackend),
            spreadsheet: Arc::new(spreadsheet::CalamineBackend),
            renderer: Arc::new(browser::ChromiumRenderer::new(config.browser_path.clone())),
        }
    }

    pub fn with_pdf(mut self, backend: Arc<dyn PdfBackend>) -> Self {
        self.pdf = backend;
        self
    }

    pub fn with_word(mut self, backend: Arc<dyn WordBackend>) -> Self {
        self.word = backend;
        self
    }

    pub fn with_markup(mut self, backend: Arc<dyn MarkupBackend>) -> Self {
        self.markup = backend;
        self
    }

    pub fn with_spreadsheet(mut self, backend: Arc<dyn SpreadsheetBackend>) -> Self {
        self.spreadsheet = backend;
        self
    }

    pub fn with_renderer(mut self, backend: Arc<dyn PageRenderer>) -> Self {
        self.renderer = backend;
        self
    }
}

impl Default for Backends {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

/// Run a blocking backend call on the blocking pool.
pub(crate) async fn run_blocking<T, F>(backend: &str, f: F) -> Result<T, BackendError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, BackendError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BackendError::failed(backend, format!("task panicked: {e}")))?
}
