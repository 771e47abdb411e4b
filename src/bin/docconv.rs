//! CLI binary for docconv.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `EngineConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docconv::{
    BatchProgress, BatchProgressCallback, ConversionEngine, ConversionOptions, ConversionRequest,
    EngineConfig, EvictionPolicy, ToolDispatcher,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress for `docconv batch`: one bar plus a log line per file.
/// Files finish out of order when the batch runs concurrently.
struct CliBatchProgress {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliBatchProgress {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_batch_start
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Listing files…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    fn elapsed(&self, index: usize) -> String {
        let ms = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }
}

impl BatchProgress for CliBatchProgress {
    fn on_batch_start(&self, total_files: usize) {
        self.activate_bar(total_files);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_files} files…"))
        ));
    }

    fn on_file_start(&self, file: &str, index: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(file.to_string());
    }

    fn on_file_complete(&self, file: &str, index: usize, total: usize) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            green("✓"),
            index + 1,
            total,
            file,
            self.elapsed(index),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, file: &str, index: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = match error.char_indices().nth(79) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index + 1,
            total,
            file,
            red(&msg),
            self.elapsed(index),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let failed = total_files.saturating_sub(success_count);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} files converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files converted  ({} failed)",
                if failed == total_files { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Markdown to HTML
  docconv convert notes.md -o out/notes.html

  # Target inferred from the output extension
  docconv convert report.pdf -o report.md

  # Pages 1-3 of a PDF as a JPEG at quality 70
  docconv convert slides.pdf -o cover.jpg --pages 1-3 --quality 70

  # One worksheet as CSV
  docconv convert budget.xlsx -o q1.csv --sheet Q1

  # Document metadata as JSON
  docconv info budget.xlsx --json

  # Every Markdown and text file in a directory to PDF
  docconv batch docs/ out/ --to pdf --pattern "*.md,*.txt"

  # Conversion matrix
  docconv formats

  # Line-delimited JSON tool protocol on stdin/stdout
  echo '{"id":1,"tool":"list_supported_formats"}' | docconv serve

CONVERSIONS:
  pdf           → txt, md, html, png, jpg
  docx          → txt, md, html, pdf
  xlsx, xls     → csv, json, html
  md, markdown  → html, pdf, docx (written as .rtf)
  html, htm     → pdf, md, png, jpg
  txt           → md, html, pdf

ENVIRONMENT VARIABLES:
  DOCCONV_BROWSER         Headless Chromium/Chrome/Edge executable
  DOCCONV_PDFIUM_DIR      Directory holding the pdfium shared library
  DOCCONV_CACHE_CAPACITY  Entries per cache (default 100)
  DOCCONV_CONCURRENCY     Parallel conversions in a batch (default 8)
  DOCCONV_TIMEOUT         Per-conversion timeout in seconds
  RUST_LOG                Override the log filter (e.g. docconv=debug)

SETUP:
  PDF inputs need libpdfium; outputs to PDF and HTML screenshots need a
  Chromium-family browser. Everything else works out of the box.
"#;

/// Convert documents between PDF, Word, spreadsheet, Markdown, HTML, text
/// and image formats.
#[derive(Parser, Debug)]
#[command(
    name = "docconv",
    version,
    about = "Convert documents between PDF, Word, spreadsheet, Markdown, HTML, text and image formats",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCCONV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCCONV_QUIET")]
    quiet: bool,

    /// Entries kept in each of the result and metadata caches.
    #[arg(long, global = true, env = "DOCCONV_CACHE_CAPACITY", default_value_t = 100)]
    cache_capacity: usize,

    /// Evict least-recently-used cache entries instead of oldest-inserted.
    #[arg(long, global = true, env = "DOCCONV_LRU")]
    lru: bool,

    /// Key caches on path only, ignoring the input's modification time.
    #[arg(long, global = true, env = "DOCCONV_NO_MTIME_CHECK")]
    no_mtime_check: bool,

    /// Parallel conversions during a batch.
    #[arg(short, long, global = true, env = "DOCCONV_CONCURRENCY", default_value_t = 8)]
    concurrency: usize,

    /// Per-conversion timeout in seconds.
    #[arg(long, global = true, env = "DOCCONV_TIMEOUT")]
    timeout: Option<u64>,

    /// Headless browser executable used for PDF output and screenshots.
    #[arg(long, global = true, env = "DOCCONV_BROWSER")]
    browser: Option<PathBuf>,

    /// Directory holding the pdfium shared library.
    #[arg(long, global = true, env = "DOCCONV_PDFIUM_DIR")]
    pdfium_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert one file.
    Convert {
        /// Input document.
        input: PathBuf,

        /// Output path.
        #[arg(short, long)]
        output: PathBuf,

        /// Target format (defaults to the output extension).
        #[arg(short, long)]
        to: Option<String>,

        /// Raster quality, 0–100.
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=100))]
        quality: Option<u32>,

        /// PDF pages: 5, 3-15, or 1,3,5-7.
        #[arg(long)]
        pages: Option<String>,

        /// Embed rendered pages in PDF → HTML output.
        #[arg(long)]
        extract_images: bool,

        /// Worksheet for CSV/HTML output.
        #[arg(long)]
        sheet: Option<String>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show document metadata.
    Info {
        file: PathBuf,

        /// Print the record as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Convert every matching file in a directory.
    Batch {
        input_dir: PathBuf,
        output_dir: PathBuf,

        /// Target format.
        #[arg(short, long)]
        to: String,

        /// File-name pattern, e.g. "*.md,*.txt".
        #[arg(short, long)]
        pattern: Option<String>,

        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,

        /// Disable progress bar.
        #[arg(long, env = "DOCCONV_NO_PROGRESS")]
        no_progress: bool,
    },

    /// List supported formats and conversions.
    Formats {
        /// Print the catalog as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Serve the tool protocol: one JSON request per stdin line, one JSON
    /// response per stdout line.
    Serve,
}

impl Command {
    fn wants_json(&self) -> bool {
        match self {
            Command::Convert { json, .. }
            | Command::Info { json, .. }
            | Command::Batch { json, .. }
            | Command::Formats { json } => *json,
            Command::Serve => true,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The batch progress bar gives all the feedback that matters, so INFO
    // logs are suppressed while it is shown.
    let show_progress = match &cli.command {
        Command::Batch {
            json, no_progress, ..
        } => !cli.quiet && !*json && !*no_progress,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress || cli.command.wants_json() {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<BatchProgressCallback> = if show_progress {
        Some(CliBatchProgress::new_dynamic() as Arc<dyn BatchProgress>)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;
    let engine = ConversionEngine::new(config).context("Failed to initialise engine")?;

    match cli.command {
        Command::Convert {
            input,
            output,
            to,
            quality,
            pages,
            extract_images,
            sheet,
            json,
        } => {
            let target = match to {
                Some(t) => t,
                None => output
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .context("No --to given and the output path has no extension")?,
            };
            let options = ConversionOptions {
                quality,
                page_range: pages,
                extract_images: extract_images.then_some(true),
                sheet,
                ..Default::default()
            };
            let request = ConversionRequest::new(&input, &output, target).with_options(options);
            let result = engine.convert(&request).await.context("Conversion failed")?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&result).context("Failed to serialise result")?
                );
            } else if !cli.quiet {
                eprintln!(
                    "{}  {}  →  {}{}",
                    green("✔"),
                    result.message,
                    bold(&result.written.display().to_string()),
                    if result.from_cache { dim("  (cached)") } else { String::new() },
                );
            }
        }

        Command::Info { file, json } => {
            let info = engine
                .get_document_info(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&info).context("Failed to serialise metadata")?
                );
            } else {
                println!("File:         {}", info.path.display());
                println!("Size:         {} bytes", info.size);
                println!("MIME type:    {}", info.mime_type);
                if let Some(f) = info.format {
                    println!("Format:       {}", f);
                }
                if let Some(ref m) = info.modified {
                    println!("Modified:     {}", m.to_rfc3339());
                }
                if let Some(p) = info.pages {
                    println!("Pages:        {}", p);
                }
                if let Some(n) = info.text_length {
                    println!("Text length:  {} chars", n);
                }
                if let Some(ref sheets) = info.sheets {
                    println!("Sheets:       {} ({})", sheets.len(), sheets.join(", "));
                }
                if let Some(ref e) = info.error {
                    println!("Note:         {}", red(e));
                }
            }
        }

        Command::Batch {
            input_dir,
            output_dir,
            to,
            pattern,
            json,
            ..
        } => {
            let outcome = engine
                .batch_convert(&input_dir, &output_dir, &to, pattern.as_deref())
                .await
                .context("Batch conversion failed")?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?
                );
            } else if !show_progress && !cli.quiet {
                for line in outcome.details() {
                    println!("{line}");
                }
                eprintln!(
                    "Succeeded: {}  Failed: {}",
                    outcome.success, outcome.failed
                );
            }
            if outcome.failed > 0 && outcome.success == 0 {
                anyhow::bail!("every file in {} failed", input_dir.display());
            }
        }

        Command::Formats { json } => {
            let catalog = engine.list_formats();
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&catalog).context("Failed to serialise catalog")?
                );
            } else {
                println!("{}", bold("Inputs"));
                for d in catalog.inputs {
                    println!(
                        "  {:<6} {:<22} {}",
                        d.format.id(),
                        d.extensions.join(", "),
                        dim(d.description)
                    );
                }
                println!("{}", bold("Outputs"));
                for d in catalog.outputs {
                    println!("  {:<6} {:<22} {}", d.format.id(), d.extension, dim(d.description));
                }
                println!("{}", bold("Conversions"));
                for (from, targets) in &catalog.conversion_matrix {
                    let targets: Vec<&str> = targets.iter().map(|t| t.id()).collect();
                    println!("  {:<6} → {}", from.id(), targets.join(", "));
                }
            }
        }

        Command::Serve => serve(ToolDispatcher::new(Arc::new(engine))).await?,
    }

    Ok(())
}

/// Map CLI args to `EngineConfig`.
fn build_config(cli: &Cli, progress: Option<BatchProgressCallback>) -> Result<EngineConfig> {
    let mut builder = EngineConfig::builder()
        .cache_capacity(cli.cache_capacity)
        .eviction(if cli.lru {
            EvictionPolicy::Lru
        } else {
            EvictionPolicy::Fifo
        })
        .validate_mtime(!cli.no_mtime_check)
        .batch_concurrency(cli.concurrency);

    if let Some(secs) = cli.timeout {
        builder = builder.backend_timeout_secs(secs);
    }
    if let Some(ref path) = cli.browser {
        builder = builder.browser_path(path);
    }
    if let Some(ref dir) = cli.pdfium_dir {
        builder = builder.pdfium_library_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Read requests from stdin until EOF, answering each on its own line.
async fn serve(dispatcher: ToolDispatcher) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let response = dispatcher.handle_line(&line).await;
        let mut encoded =
            serde_json::to_string(&response).context("Failed to serialise response")?;
        encoded.push('\n');
        stdout
            .write_all(encoded.as_bytes())
            .await
            .context("Failed to write to stdout")?;
        stdout.flush().await.context("Failed to flush stdout")?;
    }
    Ok(())
}
