//! Integration tests for the conversion engine.
//!
//! Backends that need native libraries (pdfium, a headless browser) are
//! replaced with in-process fakes injected through `Backends`, so these
//! tests run anywhere.

use async_trait::async_trait;
use docconv::backend::{
    Cell, MarkupBackend, PageRenderer, PrintOptions, Sheet, SpreadsheetBackend, Workbook,
};
use docconv::{
    BackendError, BatchProgress, BatchStatus, ConversionEngine, ConversionOptions,
    ConversionRequest, ConvertError, EngineConfig, InputFormat,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── Fakes ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct CountingMarkup {
    calls: AtomicUsize,
}

impl MarkupBackend for CountingMarkup {
    fn markdown_to_html(&self, markdown: &str) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("<p>{}</p>", markdown.trim()))
    }

    fn html_to_markdown(&self, html: &str) -> Result<String, BackendError> {
        Ok(html.to_string())
    }
}

#[derive(Default)]
struct ThreeSheets {
    reads: AtomicUsize,
}

#[async_trait]
impl SpreadsheetBackend for ThreeSheets {
    async fn read_workbook(&self, _path: &Path) -> Result<Workbook, BackendError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let sheet = |name: &str| Sheet {
            name: name.to_string(),
            rows: vec![
                vec![Cell::Text("item".into()), Cell::Text("qty".into())],
                vec![Cell::Text(format!("{name}-row")), Cell::Number(2.0)],
            ],
        };
        Ok(Workbook {
            sheets: vec![sheet("Q1"), sheet("Q2"), sheet("Summary")],
        })
    }
}

/// Writes a fixed PDF stub, optionally after a delay.
struct FakeRenderer {
    delay: Duration,
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn print_pdf(
        &self,
        _html: &Path,
        output: &Path,
        _options: &PrintOptions,
    ) -> Result<(), BackendError> {
        tokio::time::sleep(self.delay).await;
        tokio::fs::write(output, b"%PDF-1.4 fake")
            .await
            .map_err(|e| BackendError::failed("fake-renderer", e))
    }

    async fn screenshot(&self, _html: &Path, _w: u32, _h: u32) -> Result<Vec<u8>, BackendError> {
        Err(BackendError::unavailable("fake-renderer", "no screenshots"))
    }
}

/// Fails every print the way a crashed browser would.
struct FailingRenderer;

#[async_trait]
impl PageRenderer for FailingRenderer {
    async fn print_pdf(
        &self,
        _html: &Path,
        _output: &Path,
        _options: &PrintOptions,
    ) -> Result<(), BackendError> {
        Err(BackendError::failed("fake-renderer", "exit status 1"))
    }

    async fn screenshot(&self, _html: &Path, _w: u32, _h: u32) -> Result<Vec<u8>, BackendError> {
        Err(BackendError::failed("fake-renderer", "exit status 1"))
    }
}

#[derive(Default)]
struct CountingProgress {
    started: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    total: AtomicUsize,
}

impl BatchProgress for CountingProgress {
    fn on_batch_start(&self, total_files: usize) {
        self.total.store(total_files, Ordering::SeqCst);
    }
    fn on_file_start(&self, _file: &str, _index: usize, _total: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_file_complete(&self, _file: &str, _index: usize, _total: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_file_error(&self, _file: &str, _index: usize, _total: usize, _error: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Route engine logs to the test harness; `RUST_LOG` overrides the filter.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn engine() -> ConversionEngine {
    engine_with(EngineConfig::default(), docconv::Backends::default())
}

fn engine_with(config: EngineConfig, backends: docconv::Backends) -> ConversionEngine {
    init_tracing();
    ConversionEngine::with_backends(config, backends).unwrap()
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn dir_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ── Single conversion ────────────────────────────────────────────────────────

#[tokio::test]
async fn unsupported_pair_does_not_create_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();

    let input = write(dir.path(), "c.unsupported", "data");
    let out_dir = dir.path().join("never");
    let err = engine
        .convert(&ConversionRequest::new(&input, out_dir.join("c.html"), "html"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConvertError::UnsupportedConversion { .. }), "{err}");
    assert!(!out_dir.exists());

    // Known input, undeclared target.
    let input = write(dir.path(), "notes.txt", "hello");
    let err = engine
        .convert(&ConversionRequest::new(&input, out_dir.join("notes.png"), "png"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConvertError::UnsupportedConversion { .. }), "{err}");
    assert!(err.to_string().contains("notes.txt"));
    assert!(!out_dir.exists());
}

#[tokio::test]
async fn invalid_options_fail_before_io() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "a.md", "# hi");
    let out_dir = dir.path().join("out");

    let options = ConversionOptions {
        quality: Some(150),
        ..Default::default()
    };
    let err = engine()
        .convert_file(&input, out_dir.join("a.html"), "html", options)
        .await
        .unwrap_err();
    assert!(matches!(err, ConvertError::Validation { field: "quality", .. }), "{err}");
    assert!(!out_dir.exists());
}

#[tokio::test]
async fn missing_input_and_directory_input() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();

    let err = engine
        .convert(&ConversionRequest::new(
            dir.path().join("missing.md"),
            dir.path().join("missing.html"),
            "html",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ConvertError::InputAccess { .. }), "{err}");

    let folder = dir.path().join("folder.md");
    std::fs::create_dir(&folder).unwrap();
    let err = engine
        .convert(&ConversionRequest::new(&folder, dir.path().join("f.html"), "html"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConvertError::NotAFile { .. }), "{err}");
}

#[tokio::test]
async fn repeat_conversion_is_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let markup = Arc::new(CountingMarkup::default());
    let engine = engine_with(
        EngineConfig::default(),
        docconv::Backends::default().with_markup(markup.clone()),
    );

    let input = write(dir.path(), "notes.md", "hello");
    let request = ConversionRequest::new(&input, dir.path().join("out/notes.html"), "html");

    let first = engine.convert(&request).await.unwrap();
    let first_bytes = std::fs::read(&first.written).unwrap();
    assert!(!first.from_cache);

    std::fs::remove_file(&first.written).unwrap();
    let second = engine.convert(&request).await.unwrap();
    let second_bytes = std::fs::read(&second.written).unwrap();

    assert!(second.from_cache);
    assert!(second.message.starts_with("Served from cache"));
    assert_eq!(first_bytes, second_bytes);
    assert_eq!(markup.calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.cached_results(), 1);

    // Different options are a different key.
    let with_opts = request.clone().with_options(ConversionOptions {
        sheet: Some("unused".into()),
        ..Default::default()
    });
    assert!(!engine.convert(&with_opts).await.unwrap().from_cache);
    assert_eq!(markup.calls.load(Ordering::SeqCst), 2);

    engine.clear_caches();
    assert!(!engine.convert(&request).await.unwrap().from_cache);
    assert_eq!(markup.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn path_only_key_serves_stale_result() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::builder().validate_mtime(false).build().unwrap();
    let engine = engine_with(config, docconv::Backends::default());

    let input = write(dir.path(), "a.txt", "first");
    let request = ConversionRequest::new(&input, dir.path().join("a.md"), "md");
    engine.convert(&request).await.unwrap();

    write(dir.path(), "a.txt", "second version");
    let again = engine.convert(&request).await.unwrap();
    assert!(again.from_cache);
    assert_eq!(std::fs::read_to_string(&again.written).unwrap(), "first\n");
}

#[tokio::test]
async fn result_cache_evicts_oldest_insert_first() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine();
    let out = dir.path().join("out");

    let request = |i: usize| {
        let input = dir.path().join(format!("f{i:03}.txt"));
        ConversionRequest::new(input, out.join(format!("f{i:03}.md")), "md")
    };
    for i in 0..=100 {
        write(dir.path(), &format!("f{i:03}.txt"), &format!("file {i}"));
    }

    for i in 0..100 {
        assert!(!engine.convert(&request(i)).await.unwrap().from_cache);
    }
    assert_eq!(engine.cached_results(), 100);

    // A hit does not protect the oldest entry from eviction.
    assert!(engine.convert(&request(0)).await.unwrap().from_cache);

    engine.convert(&request(100)).await.unwrap();
    assert_eq!(engine.cached_results(), 100);

    assert!(engine.convert(&request(100)).await.unwrap().from_cache);
    assert!(engine.convert(&request(1)).await.unwrap().from_cache);
    assert!(!engine.convert(&request(0)).await.unwrap().from_cache);
}

#[tokio::test]
async fn markdown_to_docx_writes_rtf_instead() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "notes.md", "# Title\n\nSome *text*.\n");
    let requested = dir.path().join("out/notes.docx");

    let result = engine()
        .convert(&ConversionRequest::new(&input, &requested, "docx"))
        .await
        .unwrap();

    let rtf_path = dir.path().join("out/notes.rtf");
    assert_eq!(result.written, rtf_path);
    assert_eq!(result.alternate_output.as_deref(), Some(rtf_path.as_path()));
    assert!(!requested.exists());
    assert!(result.message.contains("notes.rtf"), "{}", result.message);

    let rtf = std::fs::read_to_string(&rtf_path).unwrap();
    assert!(rtf.starts_with("{\\rtf1"));
    assert!(rtf.contains("Title"));
}

#[tokio::test]
async fn text_to_pdf_uses_renderer() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(
        EngineConfig::default(),
        docconv::Backends::default().with_renderer(Arc::new(FakeRenderer {
            delay: Duration::ZERO,
        })),
    );

    let input = write(dir.path(), "memo.txt", "hello");
    let result = engine
        .convert(&ConversionRequest::new(&input, dir.path().join("out/memo.pdf"), "pdf"))
        .await
        .unwrap();
    assert_eq!(std::fs::read(&result.written).unwrap(), b"%PDF-1.4 fake");
    assert_eq!(dir_names(&dir.path().join("out")), vec!["memo.pdf"]);
}

#[tokio::test]
async fn timeout_leaves_no_partial_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::builder().backend_timeout_secs(1).build().unwrap();
    let engine = engine_with(
        config,
        docconv::Backends::default().with_renderer(Arc::new(FakeRenderer {
            delay: Duration::from_secs(30),
        })),
    );

    let input = write(dir.path(), "memo.txt", "hello");
    let out_dir = dir.path().join("out");
    let err = engine
        .convert(&ConversionRequest::new(&input, out_dir.join("memo.pdf"), "pdf"))
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            ConvertError::Backend {
                source: BackendError::Timeout { secs: 1, .. },
                ..
            }
        ),
        "{err}"
    );
    assert!(dir_names(&out_dir).is_empty());
    assert_eq!(engine.cached_results(), 0);
}

#[tokio::test]
async fn renderer_failure_names_both_paths() {
    let dir = tempfile::tempdir().unwrap();
    let engine = engine_with(
        EngineConfig::default(),
        docconv::Backends::default().with_renderer(Arc::new(FailingRenderer)),
    );

    let input = write(dir.path(), "report.md", "# Report\n\nbody");
    let out_dir = dir.path().join("out");
    let output = out_dir.join("report.pdf");
    let err = engine
        .convert(&ConversionRequest::new(&input, &output, "pdf"))
        .await
        .unwrap_err();

    assert!(
        matches!(
            err,
            ConvertError::Backend {
                source: BackendError::Failed { .. },
                ..
            }
        ),
        "{err}"
    );
    let message = err.to_string();
    assert!(message.contains(&input.display().to_string()), "{message}");
    assert!(message.contains(&output.display().to_string()), "{message}");
    assert!(message.contains("exit status 1"), "{message}");
    let left = dir_names(&out_dir);
    assert!(!left.iter().any(|n| n.starts_with(".docconv-")), "{left:?}");
    assert!(!output.exists());
    assert_eq!(engine.cached_results(), 0);
}

#[tokio::test]
async fn struct_literal_config_is_validated() {
    let zero_concurrency = EngineConfig {
        batch_concurrency: 0,
        ..Default::default()
    };
    let err = ConversionEngine::new(zero_concurrency).unwrap_err();
    assert!(matches!(err, ConvertError::InvalidConfig(_)), "{err}");

    let zero_viewport = EngineConfig {
        screenshot_width: 0,
        ..Default::default()
    };
    let err = ConversionEngine::with_backends(zero_viewport, docconv::Backends::default())
        .unwrap_err();
    assert!(matches!(err, ConvertError::InvalidConfig(_)), "{err}");
}

// ── Metadata ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn workbook_info_lists_sheets() {
    let dir = tempfile::tempdir().unwrap();
    let sheets = Arc::new(ThreeSheets::default());
    let engine = engine_with(
        EngineConfig::default(),
        docconv::Backends::default().with_spreadsheet(sheets.clone()),
    );

    let book = write(dir.path(), "budget.xlsx", "not really a workbook");
    let info = engine.get_document_info(&book).await.unwrap();
    assert_eq!(info.format, Some(InputFormat::Xlsx));
    assert_eq!(info.sheet_count, Some(3));
    assert_eq!(
        info.sheets.as_deref(),
        Some(&["Q1".to_string(), "Q2".to_string(), "Summary".to_string()][..])
    );
    assert!(info.error.is_none());

    let again = engine.get_document_info(&book).await.unwrap();
    assert_eq!(again, info);
    assert_eq!(sheets.reads.load(Ordering::SeqCst), 1);
    assert_eq!(engine.cached_infos(), 1);
}

#[tokio::test]
async fn text_info_has_no_sheets() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "readme.txt", "héllo");
    let info = engine().get_document_info(&path).await.unwrap();

    assert_eq!(info.name, "readme.txt");
    assert_eq!(info.mime_type, "text/plain");
    assert_eq!(info.size, 6);
    assert_eq!(info.text_length, Some(5));
    assert!(info.sheets.is_none());
    assert!(info.sheet_count.is_none());
    assert!(info.pages.is_none());
}

#[tokio::test]
async fn unreadable_details_are_reported_not_raised() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "broken.docx", "not a zip archive");
    let info = engine().get_document_info(&path).await.unwrap();

    assert_eq!(info.size, 17);
    assert!(info.text_length.is_none());
    let note = info.error.unwrap();
    assert!(note.starts_with("could not read details"), "{note}");
}

#[tokio::test]
async fn info_on_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = engine()
        .get_document_info(dir.path().join("ghost.pdf"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConvertError::InputAccess { .. }), "{err}");
}

// ── Batch ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_mixed_directory() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    std::fs::create_dir(&input).unwrap();
    write(&input, "a.md", "# A");
    write(&input, "b.txt", "bee");
    write(&input, "c.unsupported", "???");
    std::fs::create_dir(input.join("nested")).unwrap();

    let output = dir.path().join("out");
    let outcome = engine()
        .batch_convert(&input, &output, "html", None)
        .await
        .unwrap();

    assert_eq!(outcome.success, 2);
    assert_eq!(outcome.failed, 1);
    let details = outcome.details();
    assert_eq!(details[0], "✓ a.md -> a.html");
    assert_eq!(details[1], "✓ b.txt -> b.html");
    assert!(details[2].starts_with("✗ c.unsupported: "), "{}", details[2]);
    assert_eq!(dir_names(&output), vec!["a.html", "b.html"]);
}

#[tokio::test]
async fn batch_counts_successes_and_failures() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    std::fs::create_dir(&input).unwrap();
    for i in 0..5 {
        write(&input, &format!("ok{i}.txt"), "text");
    }
    for i in 0..2 {
        write(&input, &format!("bad{i}.xyz"), "junk");
    }

    let progress = Arc::new(CountingProgress::default());
    let config = EngineConfig::builder()
        .progress_callback(progress.clone())
        .build()
        .unwrap();
    let outcome = engine_with(config, docconv::Backends::default())
        .batch_convert(&input, dir.path().join("out"), "md", None)
        .await
        .unwrap();

    assert_eq!((outcome.success, outcome.failed), (5, 2));
    assert_eq!(outcome.entries.len(), 7);
    let files: Vec<&str> = outcome.entries.iter().map(|e| e.file.as_str()).collect();
    let mut sorted = files.clone();
    sorted.sort();
    assert_eq!(files, sorted);
    for entry in &outcome.entries {
        let line = entry.to_string();
        match entry.status {
            BatchStatus::Success => assert!(line.starts_with('✓'), "{line}"),
            BatchStatus::Failed => assert!(line.starts_with('✗'), "{line}"),
        }
    }

    assert_eq!(progress.total.load(Ordering::SeqCst), 7);
    assert_eq!(progress.started.load(Ordering::SeqCst), 7);
    assert_eq!(progress.completed.load(Ordering::SeqCst), 5);
    assert_eq!(progress.failed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn batch_pattern_filters_files() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.md", "a");
    write(dir.path(), "b.txt", "b");
    write(dir.path(), "c.html", "<p>c</p>");

    let outcome = engine()
        .batch_convert(dir.path(), dir.path().join("out"), "pdf", Some("*.zzz"))
        .await
        .unwrap();
    assert_eq!(outcome.entries.len(), 0);

    let outcome = engine()
        .batch_convert(dir.path(), dir.path().join("out"), "html", Some("*.MD,*.txt"))
        .await
        .unwrap();
    let files: Vec<&str> = outcome.entries.iter().map(|e| e.file.as_str()).collect();
    assert_eq!(files, vec!["a.md", "b.txt"]);
}

#[tokio::test]
async fn batch_shared_stem_is_not_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    std::fs::create_dir(&input).unwrap();
    write(&input, "a.md", "# From markdown");
    write(&input, "a.txt", "plain words");

    let progress = Arc::new(CountingProgress::default());
    let config = EngineConfig::builder()
        .progress_callback(progress.clone())
        .build()
        .unwrap();
    let output = dir.path().join("out");
    let outcome = engine_with(config, docconv::Backends::default())
        .batch_convert(&input, &output, "html", None)
        .await
        .unwrap();

    assert_eq!((outcome.success, outcome.failed), (1, 1));
    let details = outcome.details();
    assert_eq!(details[0], "✓ a.md -> a.html");
    assert!(details[1].starts_with("✗ a.txt: "), "{}", details[1]);
    assert!(details[1].contains("a.md"), "{}", details[1]);
    assert_eq!(dir_names(&output), vec!["a.html"]);

    let html = std::fs::read_to_string(output.join("a.html")).unwrap();
    assert!(html.contains("From markdown"), "{html}");
    assert!(!html.contains("plain words"), "{html}");
    assert_eq!(progress.started.load(Ordering::SeqCst), 2);
    assert_eq!(progress.completed.load(Ordering::SeqCst), 1);
    assert_eq!(progress.failed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn batch_directory_errors() {
    let dir = tempfile::tempdir().unwrap();
    let err = engine()
        .batch_convert(dir.path().join("nope"), dir.path().join("out"), "md", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ConvertError::InputAccess { .. }), "{err}");

    let err = engine()
        .batch_convert(dir.path(), dir.path().join("out"), "md", Some(" , "))
        .await
        .unwrap_err();
    assert!(matches!(err, ConvertError::Validation { field: "pattern", .. }), "{err}");
}

#[tokio::test]
async fn concurrent_batch_yields_distinct_entries() {
    const K: usize = 24;
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    std::fs::create_dir(&input).unwrap();
    for i in 0..K {
        write(&input, &format!("doc{i:02}.txt"), &format!("document {i}"));
    }

    let config = EngineConfig::builder().batch_concurrency(6).build().unwrap();
    let engine = Arc::new(engine_with(config, docconv::Backends::default()));
    let output = dir.path().join("out");

    // Two batches racing on the same engine.
    let (a, b) = tokio::join!(
        engine.batch_convert(&input, &output, "md", None),
        engine.batch_convert(&input, &output, "html", None),
    );
    for outcome in [a.unwrap(), b.unwrap()] {
        assert_eq!(outcome.success, K);
        let files: HashSet<&str> = outcome.entries.iter().map(|e| e.file.as_str()).collect();
        assert_eq!(files.len(), K);
        let outputs: HashSet<&str> = outcome
            .entries
            .iter()
            .filter_map(|e| e.output.as_deref())
            .collect();
        assert_eq!(outputs.len(), K);
    }
    assert_eq!(dir_names(&output).len(), 2 * K);
    assert_eq!(
        std::fs::read_to_string(output.join("doc07.md")).unwrap(),
        "document 7\n"
    );
}
