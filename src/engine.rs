//! The conversion engine: request resolution, result caching, metadata
//! extraction and batch conversion.
//!
//! ## Order of checks in [`ConversionEngine::convert`]
//!
//! 1. Resolve the `(input, target)` pair, validate options and find the
//!    pipeline. Nothing touches the filesystem until all three pass, so an
//!    unsupported request never creates the output directory.
//! 2. Stat the input and build the cache key. A hit is written straight to
//!    the output path.
//! 3. On a miss, create the output directory, run the pipeline (optionally
//!    under a timeout), write the bytes atomically and cache them.

use crate::backend::Backends;
use crate::cache::BoundedCache;
use crate::config::{ConversionOptions, EngineConfig};
use crate::error::{BackendError, ConvertError};
use crate::format::{self, FormatCatalog, InputFormat, OutputFormat};
use crate::output::{BatchEntry, BatchOutcome, BatchStatus, ConversionRequest, ConversionResult, DocumentInfo};
use crate::pattern::FilePattern;
use crate::pipeline::{self, PipelineContext, Produced, Route, StepError};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResultKey {
    input: PathBuf,
    target: OutputFormat,
    options: String,
    modified: Option<SystemTime>,
}

#[derive(Debug, Clone)]
struct CachedOutput {
    bytes: Arc<[u8]>,
    message: String,
    substitute_extension: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InfoKey {
    path: PathBuf,
    modified: Option<SystemTime>,
}

/// Converts documents between formats.
///
/// One engine owns one result cache and one metadata cache. It is `Send +
/// Sync`; share it behind an `Arc` to convert from several tasks at once.
///
/// # Example
/// ```rust,no_run
/// use docconv::{ConversionEngine, ConversionRequest, EngineConfig};
///
/// # async fn run() -> Result<(), docconv::ConvertError> {
/// let engine = ConversionEngine::new(EngineConfig::default())?;
/// let result = engine
///     .convert(&ConversionRequest::new("notes.md", "out/notes.html", "html"))
///     .await?;
/// println!("{}", result.message);
/// # Ok(())
/// # }
/// ```
pub struct ConversionEngine {
    config: Arc<EngineConfig>,
    backends: Backends,
    results: BoundedCache<ResultKey, CachedOutput>,
    infos: BoundedCache<InfoKey, DocumentInfo>,
}

impl std::fmt::Debug for ConversionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionEngine")
            .field("config", &self.config)
            .field("cached_results", &self.results.len())
            .field("cached_infos", &self.infos.len())
            .finish()
    }
}

impl ConversionEngine {
    /// Engine with the production backends.
    pub fn new(config: EngineConfig) -> Result<Self, ConvertError> {
        let backends = Backends::from_config(&config);
        Self::with_backends(config, backends)
    }

    /// Engine with caller-supplied backends.
    ///
    /// Fails with [`ConvertError::InvalidConfig`] if `config` breaks a
    /// builder constraint, and with [`ConvertError::DispatchMismatch`] if the
    /// dispatch table and the format registry disagree.
    pub fn with_backends(config: EngineConfig, backends: Backends) -> Result<Self, ConvertError> {
        config.validate()?;
        pipeline::verify_dispatch()?;
        Ok(Self {
            results: BoundedCache::new(config.cache_capacity, config.eviction),
            infos: BoundedCache::new(config.cache_capacity, config.eviction),
            config: Arc::new(config),
            backends,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of cached conversion results.
    pub fn cached_results(&self) -> usize {
        self.results.len()
    }

    /// Number of cached metadata records.
    pub fn cached_infos(&self) -> usize {
        self.infos.len()
    }

    /// Drop every cached result and metadata record.
    pub fn clear_caches(&self) {
        self.results.clear();
        self.infos.clear();
    }

    pub fn list_formats(&self) -> FormatCatalog {
        format::list_formats()
    }

    /// True iff `target` is a declared output of files like `input`.
    pub fn is_pair_supported(&self, input: &Path, target: &str) -> bool {
        match (InputFormat::from_path(input), OutputFormat::parse(target)) {
            (Some(from), Some(to)) => format::is_pair_supported(from, to),
            _ => false,
        }
    }

    // ── Single conversion ────────────────────────────────────────────────

    /// Convert one file.
    pub async fn convert(&self, request: &ConversionRequest) -> Result<ConversionResult, ConvertError> {
        const OP: &str = "convert";
        let started = Instant::now();

        // ── Step 1: Resolve (no I/O) ─────────────────────────────────────
        let (from, to, route) = resolve(request)?;
        request.options.validate()?;

        // ── Step 2: Stat input, consult cache ────────────────────────────
        let meta = tokio::fs::metadata(&request.input)
            .await
            .map_err(|source| ConvertError::InputAccess {
                operation: OP,
                path: request.input.clone(),
                source,
            })?;
        if !meta.is_file() {
            return Err(ConvertError::NotAFile {
                operation: OP,
                path: request.input.clone(),
            });
        }
        if meta.len() > self.config.max_input_bytes {
            return Err(ConvertError::Validation {
                operation: OP,
                field: "input",
                reason: format!(
                    "'{}' is {} bytes, limit is {}",
                    request.input.display(),
                    meta.len(),
                    self.config.max_input_bytes
                ),
            });
        }

        let key = ResultKey {
            input: absolute(&request.input),
            target: to,
            options: request.options.canonical(),
            modified: self.mtime(&meta),
        };

        if let Some(hit) = self.results.get(&key) {
            ensure_parent_dir(&request.output).await?;
            let written = written_path(&request.output, hit.substitute_extension);
            write_atomic(&written, Arc::clone(&hit.bytes)).await?;
            debug!("Cache hit for {} -> {}", request.input.display(), to);
            return Ok(ConversionResult {
                message: format!("Served from cache: {}", hit.message),
                alternate_output: hit.substitute_extension.map(|_| written.clone()),
                written,
                from_cache: true,
            });
        }

        // ── Step 3: Run the pipeline ─────────────────────────────────────
        info!(
            "Converting {} ({} -> {}) via {}",
            request.input.display(),
            from,
            to,
            route.name
        );
        ensure_parent_dir(&request.output).await?;

        let ctx = PipelineContext {
            input: request.input.clone(),
            output: request.output.clone(),
            from,
            to,
            options: request.options.clone(),
            backends: self.backends.clone(),
            config: Arc::clone(&self.config),
        };
        let produced = self
            .run_route(route, &ctx)
            .await
            .map_err(|e| step_error(e, request, from, to))?;

        // ── Step 4: Persist and cache ────────────────────────────────────
        let Produced {
            bytes,
            message,
            substitute_extension,
        } = produced;
        let written = written_path(&request.output, substitute_extension);
        let bytes: Arc<[u8]> = Arc::from(bytes);
        write_atomic(&written, Arc::clone(&bytes)).await?;

        if let Some(evicted) = self.results.insert(
            key,
            CachedOutput {
                bytes,
                message: message.clone(),
                substitute_extension,
            },
        ) {
            debug!(
                "Result cache full; evicted {} -> {}",
                evicted.input.display(),
                evicted.target
            );
        }

        info!(
            "Wrote {} in {}ms",
            written.display(),
            started.elapsed().as_millis()
        );
        Ok(ConversionResult {
            message,
            alternate_output: substitute_extension.map(|_| written.clone()),
            written,
            from_cache: false,
        })
    }

    /// Convenience wrapper around [`convert`](Self::convert).
    pub async fn convert_file(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        target: &str,
        options: ConversionOptions,
    ) -> Result<ConversionResult, ConvertError> {
        let request = ConversionRequest::new(input.as_ref(), output.as_ref(), target)
            .with_options(options);
        self.convert(&request).await
    }

    async fn run_route(&self, route: &Route, ctx: &PipelineContext) -> Result<Produced, StepError> {
        match self.config.backend_timeout_secs {
            None => (route.run)(ctx).await,
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), (route.run)(ctx))
                .await
                .unwrap_or_else(|_| {
                    warn!("{} timed out after {}s", route.name, secs);
                    Err(StepError::Backend(BackendError::Timeout {
                        backend: route.name.to_string(),
                        secs,
                    }))
                }),
        }
    }

    fn mtime(&self, meta: &std::fs::Metadata) -> Option<SystemTime> {
        if self.config.validate_mtime {
            meta.modified().ok()
        } else {
            None
        }
    }

    // ── Metadata ─────────────────────────────────────────────────────────

    /// File metadata plus format-specific details.
    ///
    /// Failing to read the details is not an error: the baseline record is
    /// returned with [`DocumentInfo::error`] set.
    pub async fn get_document_info(&self, path: impl AsRef<Path>) -> Result<DocumentInfo, ConvertError> {
        let path = path.as_ref();
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|source| ConvertError::InputAccess {
                operation: "get_document_info",
                path: path.to_path_buf(),
                source,
            })?;

        let key = InfoKey {
            path: absolute(path),
            modified: self.mtime(&meta),
        };
        if let Some(info) = self.infos.get(&key) {
            debug!("Metadata cache hit for {}", path.display());
            return Ok(info);
        }

        let mut info = DocumentInfo::baseline(path, &meta);
        if meta.is_file() {
            if let Err(e) = self.enrich(&mut info).await {
                warn!("Could not read details of {}: {}", path.display(), e);
                info.error = Some(format!("could not read details: {e}"));
            }
        }

        self.infos.insert(key, info.clone());
        Ok(info)
    }

    async fn enrich(&self, info: &mut DocumentInfo) -> Result<(), BackendError> {
        let path = info.path.clone();
        match info.format {
            Some(InputFormat::Pdf) => {
                let text = self.backends.pdf.extract_text(&path, None).await?;
                info.pages = Some(text.page_count);
                info.text_length = Some(text.joined().chars().count());
            }
            Some(InputFormat::Xlsx) => {
                let sheets = self.backends.spreadsheet.sheet_names(&path).await?;
                info.sheet_count = Some(sheets.len());
                info.sheets = Some(sheets);
            }
            Some(InputFormat::Docx) => {
                let doc = self.backends.word.read_document(&path).await?;
                info.text_length = Some(doc.plain_text().chars().count());
            }
            Some(InputFormat::Markdown | InputFormat::Html | InputFormat::Text) => {
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| BackendError::failed("file", e))?;
                info.text_length = Some(String::from_utf8_lossy(&bytes).chars().count());
            }
            None => {}
        }
        Ok(())
    }

    // ── Batch ────────────────────────────────────────────────────────────

    /// Convert every regular file directly under `input_dir` to `target`.
    ///
    /// Per-file failures become failed entries; only directory-level
    /// problems and an invalid `pattern` are returned as errors. Output names
    /// are `<stem><extension>`; when two inputs share a stem, the first in
    /// name order is converted and the rest fail without writing anything.
    pub async fn batch_convert(
        &self,
        input_dir: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
        target: &str,
        pattern: Option<&str>,
    ) -> Result<BatchOutcome, ConvertError> {
        const OP: &str = "batch_convert";
        let input_dir = input_dir.as_ref();
        let output_dir = output_dir.as_ref();
        let matcher = match pattern {
            Some(p) => FilePattern::parse(p)?,
            None => FilePattern::default(),
        };

        let files = list_files(input_dir, &matcher).await?;
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| ConvertError::OutputWrite {
                operation: OP,
                path: output_dir.to_path_buf(),
                source,
            })?;

        let total = files.len();
        info!(
            "Batch: {} files in {} -> {} ({}, pattern '{}')",
            total,
            input_dir.display(),
            output_dir.display(),
            target,
            matcher.as_str()
        );
        let callback = self.config.progress_callback.clone();
        if let Some(ref cb) = callback {
            cb.on_batch_start(total);
        }

        let extension = OutputFormat::parse(target)
            .map(|f| f.extension().to_string())
            .unwrap_or_else(|| format!(".{}", target.trim().trim_start_matches('.')));

        let planned = plan_outputs(files, &extension);

        let entries: Vec<BatchEntry> = stream::iter(planned.into_iter().enumerate().map(|(index, (file, out_name))| {
            let callback = callback.clone();
            async move {
                if let Some(ref cb) = callback {
                    cb.on_file_start(&file, index, total);
                }
                let out_name = match out_name {
                    Ok(name) => name,
                    Err(message) => {
                        warn!("Batch: {} skipped: {}", file, message);
                        if let Some(ref cb) = callback {
                            cb.on_file_error(&file, index, total, &message);
                        }
                        return BatchEntry {
                            file,
                            status: BatchStatus::Failed,
                            output: None,
                            error: Some(message),
                        };
                    }
                };
                let request = ConversionRequest::new(
                    input_dir.join(&file),
                    output_dir.join(&out_name),
                    target,
                );
                match self.convert(&request).await {
                    Ok(result) => {
                        if let Some(ref cb) = callback {
                            cb.on_file_complete(&file, index, total);
                        }
                        let written = result
                            .written
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or(out_name);
                        BatchEntry {
                            file,
                            status: BatchStatus::Success,
                            output: Some(written),
                            error: None,
                        }
                    }
                    Err(e) => {
                        warn!("Batch: {} failed: {}", file, e);
                        let message = e.to_string();
                        if let Some(ref cb) = callback {
                            cb.on_file_error(&file, index, total, &message);
                        }
                        BatchEntry {
                            file,
                            status: BatchStatus::Failed,
                            output: None,
                            error: Some(message),
                        }
                    }
                }
            }
        }))
        .buffered(self.config.batch_concurrency.max(1))
        .collect()
        .await;

        let outcome = BatchOutcome::from_entries(entries);
        if let Some(ref cb) = callback {
            cb.on_batch_complete(total, outcome.success);
        }
        info!(
            "Batch complete: {} succeeded, {} failed",
            outcome.success, outcome.failed
        );
        Ok(outcome)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// Resolve a request to its formats and route without touching the disk.
fn resolve(request: &ConversionRequest) -> Result<(InputFormat, OutputFormat, &'static Route), ConvertError> {
    let unsupported = || ConvertError::UnsupportedConversion {
        operation: "convert",
        path: request.input.clone(),
        from: request
            .input
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
            .unwrap_or_else(|| "(no extension)".to_string()),
        to: request.target.clone(),
    };
    let from = InputFormat::from_path(&request.input).ok_or_else(unsupported)?;
    let to = OutputFormat::parse(&request.target).ok_or_else(unsupported)?;
    if !format::is_pair_supported(from, to) {
        return Err(unsupported());
    }
    let route = pipeline::lookup(from, to).ok_or_else(unsupported)?;
    Ok((from, to, route))
}

fn step_error(e: StepError, request: &ConversionRequest, from: InputFormat, to: OutputFormat) -> ConvertError {
    match e {
        StepError::ReadInput(source) => ConvertError::InputAccess {
            operation: "convert",
            path: request.input.clone(),
            source,
        },
        StepError::Backend(source) => ConvertError::Backend {
            input: request.input.clone(),
            output: request.output.clone(),
            from,
            to,
            source,
        },
        StepError::Scratch { dir, source } => ConvertError::OutputWrite {
            operation: "convert",
            path: dir,
            source,
        },
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// The path actually written: `output`, or `output` with the substitute
/// extension.
fn written_path(output: &Path, substitute: Option<&str>) -> PathBuf {
    match substitute {
        Some(ext) => output.with_extension(ext),
        None => output.to_path_buf(),
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

async fn ensure_parent_dir(output: &Path) -> Result<(), ConvertError> {
    let dir = parent_dir(output);
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| ConvertError::OutputWrite {
            operation: "convert",
            path: dir.to_path_buf(),
            source,
        })
}

/// Pair each file with its output name, `<stem><extension>`.
///
/// `files` must be sorted; a name already claimed by an earlier file maps to
/// an error message instead.
fn plan_outputs(files: Vec<String>, extension: &str) -> Vec<(String, Result<String, String>)> {
    let mut claimed: HashMap<String, String> = HashMap::new();
    files
        .into_iter()
        .map(|file| {
            let stem = Path::new(&file)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.clone());
            let out_name = format!("{stem}{extension}");
            let planned = match claimed.get(&out_name) {
                Some(first) => Err(format!(
                    "output name '{out_name}' is already produced by '{first}'"
                )),
                None => {
                    claimed.insert(out_name.clone(), file.clone());
                    Ok(out_name)
                }
            };
            (file, planned)
        })
        .collect()
}

/// Write `bytes` to a temp sibling of `path`, then rename it into place.
async fn write_atomic(path: &Path, bytes: Arc<[u8]>) -> Result<(), ConvertError> {
    let target = path.to_path_buf();
    let dir = parent_dir(path).to_path_buf();
    let written = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix(".docconv-")
            .suffix(".part")
            .tempfile_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| ConvertError::Internal(format!("writing '{}': task failed: {e}", path.display())))?;

    written.map_err(|source| ConvertError::OutputWrite {
        operation: "convert",
        path: path.to_path_buf(),
        source,
    })
}

/// Regular files directly under `dir` whose names match, sorted by name.
async fn list_files(dir: &Path, matcher: &FilePattern) -> Result<Vec<String>, ConvertError> {
    let access = |source: std::io::Error| ConvertError::InputAccess {
        operation: "batch_convert",
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(access)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(access)? {
        let is_file = tokio::fs::metadata(entry.path())
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if matcher.matches(&name) {
            files.push(name);
        } else {
            debug!("Batch: skipping {} (pattern)", name);
        }
    }
    files.sort();
    Ok(files)
}
