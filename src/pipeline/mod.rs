//! Conversion pipelines and the dispatch table that selects them.
//!
//! A pipeline turns one input file into the bytes of one output format. It
//! never writes the final output itself: the engine persists the returned
//! [`Produced`] bytes atomically and caches them. Pipelines that need a
//! browser render intermediate HTML into a scratch file next to the output;
//! scratch files are `NamedTempFile` guards and vanish when the pipeline
//! finishes, fails or is dropped by a timeout.
//!
//! ## Data Flow
//!
//! ```text
//! (InputFormat, OutputFormat) ──▶ DISPATCH ──▶ pipeline fn ──▶ backends ──▶ Produced
//! ```
//!
//! | Module | Inputs |
//! |--------|--------|
//! | [`pdf`]    | `.pdf` |
//! | [`word`]   | `.docx` |
//! | [`sheet`]  | `.xlsx`, `.xls` |
//! | [`markup`] | `.md`, `.html` |
//! | [`text`]   | `.txt` |
//! | [`encode`] | raster encoding shared by the image outputs |

pub mod encode;
pub mod markup;
pub mod pdf;
pub mod sheet;
pub mod text;
pub mod word;

use crate::backend::{Backends, PrintOptions};
use crate::config::{ConversionOptions, EngineConfig};
use crate::error::{BackendError, ConvertError};
use crate::format::{declared_pairs, InputFormat, OutputFormat};
use futures::future::BoxFuture;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Everything a pipeline may look at.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub input: PathBuf,
    pub output: PathBuf,
    pub from: InputFormat,
    pub to: OutputFormat,
    pub options: ConversionOptions,
    pub backends: Backends,
    pub config: Arc<EngineConfig>,
}

impl PipelineContext {
    /// Directory scratch files are created in: the output's parent.
    pub fn scratch_dir(&self) -> &Path {
        match self.output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }

    /// Raster quality requested, or the configured default.
    pub fn quality(&self) -> u8 {
        self.options.quality_or(self.config.default_quality)
    }

    /// Read the input as text, replacing invalid UTF-8.
    pub async fn read_text(&self) -> Result<String, StepError> {
        let bytes = tokio::fs::read(&self.input)
            .await
            .map_err(StepError::ReadInput)?;
        Ok(match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    /// File stem of the input, used as document title.
    pub fn title(&self) -> String {
        self.input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    }
}

/// What a pipeline produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Produced {
    pub bytes: Vec<u8>,
    pub message: String,
    /// Extension actually produced when it differs from the requested
    /// format (e.g. `"rtf"` for a DOCX request).
    pub substitute_extension: Option<&'static str>,
}

impl Produced {
    pub fn new(bytes: impl Into<Vec<u8>>, message: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            message: message.into(),
            substitute_extension: None,
        }
    }

    pub fn substituted(mut self, extension: &'static str) -> Self {
        self.substitute_extension = Some(extension);
        self
    }
}

/// A pipeline failure, before the engine attaches request context.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("reading input: {0}")]
    ReadInput(#[source] std::io::Error),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("scratch file in '{}': {source}", dir.display())]
    Scratch {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type PipelineResult = Result<Produced, StepError>;

/// A conversion pipeline.
pub type PipelineFn = fn(&PipelineContext) -> BoxFuture<'_, PipelineResult>;

/// One row of the dispatch table.
pub struct Route {
    pub from: InputFormat,
    pub to: OutputFormat,
    pub name: &'static str,
    pub run: PipelineFn,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("name", &self.name)
            .finish()
    }
}

macro_rules! route {
    ($from:ident => $to:ident, $name:literal, $run:path) => {
        Route {
            from: InputFormat::$from,
            to: OutputFormat::$to,
            name: $name,
            run: |ctx| Box::pin($run(ctx)),
        }
    };
}

/// Every implemented conversion.
pub static DISPATCH: &[Route] = &[
    route!(Pdf => Text, "pdf_to_text", pdf::to_text),
    route!(Pdf => Markdown, "pdf_to_markdown", pdf::to_markdown),
    route!(Pdf => Html, "pdf_to_html", pdf::to_html),
    route!(Pdf => Png, "pdf_to_png", pdf::to_image),
    route!(Pdf => Jpg, "pdf_to_jpg", pdf::to_image),
    route!(Docx => Text, "docx_to_text", word::to_text),
    route!(Docx => Markdown, "docx_to_markdown", word::to_markdown),
    route!(Docx => Html, "docx_to_html", word::to_html),
    route!(Docx => Pdf, "docx_to_pdf", word::to_pdf),
    route!(Xlsx => Csv, "xlsx_to_csv", sheet::to_csv),
    route!(Xlsx => Json, "xlsx_to_json", sheet::to_json),
    route!(Xlsx => Html, "xlsx_to_html", sheet::to_html),
    route!(Markdown => Html, "markdown_to_html", markup::markdown_to_html),
    route!(Markdown => Pdf, "markdown_to_pdf", markup::markdown_to_pdf),
    route!(Markdown => Docx, "markdown_to_docx", markup::markdown_to_rtf),
    route!(Html => Pdf, "html_to_pdf", markup::html_to_pdf),
    route!(Html => Markdown, "html_to_markdown", markup::html_to_markdown),
    route!(Html => Png, "html_to_png", markup::html_to_image),
    route!(Html => Jpg, "html_to_jpg", markup::html_to_image),
    route!(Text => Markdown, "text_to_markdown", text::to_markdown),
    route!(Text => Html, "text_to_html", text::to_html),
    route!(Text => Pdf, "text_to_pdf", text::to_pdf),
];

/// The route for a pair, if one is implemented.
pub fn lookup(from: InputFormat, to: OutputFormat) -> Option<&'static Route> {
    DISPATCH.iter().find(|r| r.from == from && r.to == to)
}

/// Check that the dispatch table implements exactly the declared pairs.
pub fn verify_dispatch() -> Result<(), ConvertError> {
    verify_routes(DISPATCH)
}

fn verify_routes(routes: &[Route]) -> Result<(), ConvertError> {
    let declared: BTreeSet<(InputFormat, OutputFormat)> = declared_pairs().collect();
    let implemented: BTreeSet<(InputFormat, OutputFormat)> =
        routes.iter().map(|r| (r.from, r.to)).collect();
    let show = |pairs: Vec<&(InputFormat, OutputFormat)>| -> Vec<String> {
        pairs.into_iter().map(|(a, b)| format!("{a} -> {b}")).collect()
    };
    let missing = show(declared.difference(&implemented).collect());
    let undeclared = show(implemented.difference(&declared).collect());
    if missing.is_empty() && undeclared.is_empty() {
        Ok(())
    } else {
        Err(ConvertError::DispatchMismatch {
            missing,
            undeclared,
        })
    }
}

// ── Shared helpers ───────────────────────────────────────────────────────

/// Create an empty scratch file with `suffix` next to the output.
pub(crate) fn scratch_file(ctx: &PipelineContext, suffix: &str) -> Result<NamedTempFile, StepError> {
    let dir = ctx.scratch_dir();
    tempfile::Builder::new()
        .prefix(".docconv-")
        .suffix(suffix)
        .tempfile_in(dir)
        .map_err(|source| StepError::Scratch {
            dir: dir.to_path_buf(),
            source,
        })
}

/// Print the HTML file at `html` to PDF and return the PDF bytes.
pub(crate) async fn print_file(ctx: &PipelineContext, html: &Path) -> Result<Vec<u8>, StepError> {
    let pdf = scratch_file(ctx, ".pdf")?;
    ctx.backends
        .renderer
        .print_pdf(html, pdf.path(), &PrintOptions::default())
        .await?;
    tokio::fs::read(pdf.path())
        .await
        .map_err(|source| StepError::Scratch {
            dir: ctx.scratch_dir().to_path_buf(),
            source,
        })
}

/// Write `html` to a scratch page, print it to PDF and return the PDF bytes.
pub(crate) async fn print_html(ctx: &PipelineContext, html: &str) -> Result<Vec<u8>, StepError> {
    let page = scratch_file(ctx, ".html")?;
    tokio::fs::write(page.path(), html)
        .await
        .map_err(|source| StepError::Scratch {
            dir: ctx.scratch_dir().to_path_buf(),
            source,
        })?;
    print_file(ctx, page.path()).await
}

/// Escape text for inclusion in HTML.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

pub(crate) const BASE_STYLE: &str = "\
body { font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; line-height: 1.6; }
h1, h2, h3, h4, h5, h6 { color: #333; margin-top: 1.5em; margin-bottom: 0.5em; }
code { background-color: #f4f4f4; padding: 2px 4px; border-radius: 3px; font-family: monospace; }
pre { background-color: #f4f4f4; padding: 10px; border-radius: 5px; overflow-x: auto; white-space: pre-wrap; }
blockquote { border-left: 4px solid #ddd; margin: 0; padding-left: 1em; color: #666; }
table { border-collapse: collapse; width: 100%; }
th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
th { background-color: #f2f2f2; }
img { max-width: 100%; }";

/// Wrap an HTML fragment in a standalone UTF-8 document.
pub fn html_document(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<title>{}</title>\n<style>\n{}\n</style>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        escape_html(title),
        BASE_STYLE,
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::INPUT_FORMATS;

    #[test]
    fn dispatch_matches_registry() {
        verify_dispatch().unwrap();
        let declared: usize = INPUT_FORMATS.iter().map(|d| d.targets.len()).sum();
        assert_eq!(DISPATCH.len(), declared);
    }

    #[test]
    fn divergence_is_reported_both_ways() {
        let partial: Vec<Route> = vec![
            route!(Markdown => Html, "markdown_to_html", markup::markdown_to_html),
            route!(Text => Png, "bogus", text::to_markdown),
        ];
        match verify_routes(&partial) {
            Err(ConvertError::DispatchMismatch { missing, undeclared }) => {
                assert!(missing.contains(&"pdf -> txt".to_string()));
                assert!(!missing.contains(&"md -> html".to_string()));
                assert_eq!(undeclared, vec!["txt -> png".to_string()]);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn lookup_finds_routes() {
        assert_eq!(
            lookup(InputFormat::Markdown, OutputFormat::Docx).unwrap().name,
            "markdown_to_docx"
        );
        assert!(lookup(InputFormat::Text, OutputFormat::Png).is_none());
    }

    #[test]
    fn escape_and_wrap() {
        assert_eq!(escape_html("<a & 'b'>"), "&lt;a &amp; &#39;b&#39;&gt;");
        let doc = html_document("R&D", "<p>x</p>");
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains("<title>R&amp;D</title>"));
        assert!(doc.contains("<p>x</p>"));
    }
}
