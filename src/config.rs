//! Configuration types for the conversion engine.
//!
//! Engine-wide behaviour is controlled through [`EngineConfig`], built via
//! its [`EngineConfigBuilder`]. Per-request knobs live in
//! [`ConversionOptions`], which is also what the result cache keys on.

use crate::cache::EvictionPolicy;
use crate::error::ConvertError;
use crate::progress::BatchProgressCallback;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Configuration for a [`crate::engine::ConversionEngine`].
///
/// Built via [`EngineConfig::builder()`] or using [`EngineConfig::default()`].
///
/// # Example
/// ```rust
/// use docconv::{EngineConfig, EvictionPolicy};
///
/// let config = EngineConfig::builder()
///     .cache_capacity(200)
///     .eviction(EvictionPolicy::Lru)
///     .batch_concurrency(4)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct EngineConfig {
    /// Maximum entries in each of the result and metadata caches. Default: 100.
    pub cache_capacity: usize,

    /// Eviction order for both caches. Default: [`EvictionPolicy::Fifo`].
    pub eviction: EvictionPolicy,

    /// Include the input file's modification time in cache keys. Default: true.
    ///
    /// With this off, a cached result is served even after the source file
    /// changed on disk.
    pub validate_mtime: bool,

    /// Maximum number of in-flight conversions during a batch. Default: 8.
    pub batch_concurrency: usize,

    /// Quality used for raster outputs when the request sets none. Default: 80.
    pub default_quality: u8,

    /// Largest input file accepted, in bytes. Default: 100 MiB.
    pub max_input_bytes: u64,

    /// Longest edge of a rasterised PDF page, in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Browser viewport used for HTML screenshots. Default: 1280 × 1024.
    pub screenshot_width: u32,
    pub screenshot_height: u32,

    /// Per-conversion timeout in seconds. Default: None (no timeout).
    pub backend_timeout_secs: Option<u64>,

    /// Headless browser executable. If None, well-known names are searched on PATH.
    pub browser_path: Option<PathBuf>,

    /// Directory holding the pdfium shared library. If None, the system
    /// library search path is used.
    pub pdfium_library_dir: Option<PathBuf>,

    /// Batch progress events. Default: None.
    pub progress_callback: Option<BatchProgressCallback>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 100,
            eviction: EvictionPolicy::Fifo,
            validate_mtime: true,
            batch_concurrency: 8,
            default_quality: 80,
            max_input_bytes: 100 * 1024 * 1024,
            max_rendered_pixels: 2000,
            screenshot_width: 1280,
            screenshot_height: 1024,
            backend_timeout_secs: None,
            browser_path: None,
            pdfium_library_dir: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("cache_capacity", &self.cache_capacity)
            .field("eviction", &self.eviction)
            .field("validate_mtime", &self.validate_mtime)
            .field("batch_concurrency", &self.batch_concurrency)
            .field("default_quality", &self.default_quality)
            .field("max_input_bytes", &self.max_input_bytes)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("backend_timeout_secs", &self.backend_timeout_secs)
            .field("browser_path", &self.browser_path)
            .field("pdfium_library_dir", &self.pdfium_library_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl EngineConfig {
    /// Create a new builder for `EngineConfig`.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Check the constraints [`EngineConfigBuilder::build`] enforces.
    ///
    /// Fields are public, so a struct literal can skip the builder; the
    /// engine runs this again when it is constructed.
    pub fn validate(&self) -> Result<(), ConvertError> {
        if self.batch_concurrency == 0 {
            return Err(ConvertError::InvalidConfig(
                "batch concurrency must be ≥ 1".into(),
            ));
        }
        if self.screenshot_width == 0 || self.screenshot_height == 0 {
            return Err(ConvertError::InvalidConfig(format!(
                "screenshot size must be non-zero, got {}x{}",
                self.screenshot_width, self.screenshot_height
            )));
        }
        if self.backend_timeout_secs == Some(0) {
            return Err(ConvertError::InvalidConfig(
                "backend timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn cache_capacity(mut self, n: usize) -> Self {
        self.config.cache_capacity = n;
        self
    }

    pub fn eviction(mut self, policy: EvictionPolicy) -> Self {
        self.config.eviction = policy;
        self
    }

    pub fn validate_mtime(mut self, v: bool) -> Self {
        self.config.validate_mtime = v;
        self
    }

    pub fn batch_concurrency(mut self, n: usize) -> Self {
        self.config.batch_concurrency = n.max(1);
        self
    }

    pub fn default_quality(mut self, q: u8) -> Self {
        self.config.default_quality = q.min(100);
        self
    }

    pub fn max_input_bytes(mut self, n: u64) -> Self {
        self.config.max_input_bytes = n;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn screenshot_size(mut self, width: u32, height: u32) -> Self {
        self.config.screenshot_width = width;
        self.config.screenshot_height = height;
        self
    }

    pub fn backend_timeout_secs(mut self, secs: u64) -> Self {
        self.config.backend_timeout_secs = Some(secs);
        self
    }

    pub fn browser_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.browser_path = Some(path.into());
        self
    }

    pub fn pdfium_library_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_dir = Some(dir.into());
        self
    }

    pub fn progress_callback(mut self, cb: BatchProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EngineConfig, ConvertError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Per-request options ──────────────────────────────────────────────────

static RE_PAGE_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(-\d+)?(,\d+(-\d+)?)*$").unwrap());

/// Options attached to a single conversion request.
///
/// Unknown keys are preserved in `extra` so callers can pass options a
/// future pipeline understands; they still take part in the cache key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionOptions {
    /// Raster output quality, 0–100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u32>,

    /// Page selection for PDF inputs, e.g. `"1-5"` or `"1,3,5"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_range: Option<String>,

    /// Embed rasterised pages when converting PDF to HTML.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_images: Option<bool>,

    /// Worksheet for single-sheet spreadsheet outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ConversionOptions {
    /// Parse and validate options from a loosely-typed JSON object.
    ///
    /// `null` is treated as "no options".
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ConvertError> {
        let invalid = |field: &'static str, reason: String| ConvertError::Validation {
            operation: "convert",
            field,
            reason,
        };
        let obj = match value {
            serde_json::Value::Null => return Ok(Self::default()),
            serde_json::Value::Object(obj) => obj,
            other => return Err(invalid("options", format!("expected an object, got {other}"))),
        };

        let mut options = Self::default();
        for (key, v) in obj {
            match key.as_str() {
                "quality" => {
                    let q = v
                        .as_f64()
                        .filter(|q| (0.0..=100.0).contains(q))
                        .ok_or_else(|| {
                            invalid("quality", format!("must be a number between 0 and 100, got {v}"))
                        })?;
                    options.quality = Some(q.round() as u32);
                }
                "page_range" => {
                    let s = v.as_str().ok_or_else(|| {
                        invalid("page_range", format!("must be a string, got {v}"))
                    })?;
                    options.page_range = Some(s.to_string());
                }
                "extract_images" => {
                    let b = v.as_bool().ok_or_else(|| {
                        invalid("extract_images", format!("must be a boolean, got {v}"))
                    })?;
                    options.extract_images = Some(b);
                }
                "sheet" => {
                    let s = v
                        .as_str()
                        .ok_or_else(|| invalid("sheet", format!("must be a string, got {v}")))?;
                    options.sheet = Some(s.to_string());
                }
                _ => {
                    options.extra.insert(key.clone(), v.clone());
                }
            }
        }
        options.validate()?;
        Ok(options)
    }

    /// Check every recognised option. Runs before any I/O.
    pub fn validate(&self) -> Result<(), ConvertError> {
        if let Some(q) = self.quality {
            if q > 100 {
                return Err(ConvertError::Validation {
                    operation: "convert",
                    field: "quality",
                    reason: format!("must be between 0 and 100, got {q}"),
                });
            }
        }
        if let Some(ref range) = self.page_range {
            PageSelection::parse(range)?;
        }
        Ok(())
    }

    /// Deterministic serialisation used in cache keys.
    pub fn canonical(&self) -> String {
        // Struct fields serialise in declaration order and `extra` is a
        // BTreeMap, so equal options always produce equal strings.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parsed page selection; `All` when no range was given.
    pub fn pages(&self) -> PageSelection {
        self.page_range
            .as_deref()
            .and_then(|r| PageSelection::parse(r).ok())
            .unwrap_or_default()
    }

    pub fn quality_or(&self, default: u8) -> u8 {
        self.quality.map(|q| q.min(100) as u8).unwrap_or(default)
    }
}

/// Specifies which pages of a PDF to convert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Convert all pages (default).
    #[default]
    All,
    /// Convert specific 1-indexed inclusive ranges, e.g. `1-3,7`.
    Ranges(Vec<(usize, usize)>),
}

impl PageSelection {
    /// Parse a `page_range` option such as `"1-5"` or `"1,3,5-7"`.
    pub fn parse(s: &str) -> Result<Self, ConvertError> {
        let invalid = |reason: String| ConvertError::Validation {
            operation: "convert",
            field: "page_range",
            reason,
        };
        let s = s.trim();
        if !RE_PAGE_RANGE.is_match(s) {
            return Err(invalid(format!(
                "'{s}' is not a page range; use \"1-5\" or \"1,3,5\""
            )));
        }
        let mut ranges = Vec::new();
        for part in s.split(',') {
            let (start, end) = match part.split_once('-') {
                Some((a, b)) => (a, b),
                None => (part, part),
            };
            let start: usize = start
                .parse()
                .map_err(|_| invalid(format!("page number '{start}' is too large")))?;
            let end: usize = end
                .parse()
                .map_err(|_| invalid(format!("page number '{end}' is too large")))?;
            if start < 1 {
                return Err(invalid("pages are 1-indexed, minimum is 1".into()));
            }
            if start > end {
                return Err(invalid(format!("range {start}-{end}: start must be <= end")));
            }
            ranges.push((start, end));
        }
        Ok(PageSelection::Ranges(ranges))
    }

    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Ranges(ranges) => ranges
                .iter()
                .flat_map(|&(start, end)| {
                    let s = start.max(1) - 1;
                    let e = end.min(total_pages);
                    s..e
                })
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_defaults() {
        let c = EngineConfig::builder().build().unwrap();
        assert_eq!(c.cache_capacity, 100);
        assert_eq!(c.eviction, EvictionPolicy::Fifo);
        assert_eq!(c.default_quality, 80);
        assert!(c.validate_mtime);
        assert!(c.backend_timeout_secs.is_none());
    }

    #[test]
    fn builder_clamps_and_validates() {
        let c = EngineConfig::builder()
            .batch_concurrency(0)
            .default_quality(250)
            .build()
            .unwrap();
        assert_eq!(c.batch_concurrency, 1);
        assert_eq!(c.default_quality, 100);

        let err = EngineConfig::builder().backend_timeout_secs(0).build();
        assert!(matches!(err, Err(ConvertError::InvalidConfig(_))));
    }

    #[test]
    fn struct_literal_is_validated() {
        let c = EngineConfig {
            batch_concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(ConvertError::InvalidConfig(_))));
        let c = EngineConfig {
            screenshot_height: 0,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(ConvertError::InvalidConfig(_))));
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn options_from_json_accepts_known_keys() {
        let opts = ConversionOptions::from_json(&json!({
            "quality": 90,
            "page_range": "1-3,5",
            "extract_images": true,
            "dpi": 300
        }))
        .unwrap();
        assert_eq!(opts.quality, Some(90));
        assert_eq!(opts.page_range.as_deref(), Some("1-3,5"));
        assert_eq!(opts.extract_images, Some(true));
        assert_eq!(opts.extra.get("dpi"), Some(&json!(300)));
    }

    #[test]
    fn options_from_json_rejects_bad_values() {
        for bad in [
            json!({"quality": 101}),
            json!({"quality": -1}),
            json!({"quality": "high"}),
            json!({"page_range": "1-"}),
            json!({"page_range": "5-2"}),
            json!({"page_range": 3}),
            json!({"extract_images": "yes"}),
            json!(["quality"]),
        ] {
            let err = ConversionOptions::from_json(&bad).unwrap_err();
            assert!(matches!(err, ConvertError::Validation { .. }), "{bad} -> {err}");
        }
        assert_eq!(
            ConversionOptions::from_json(&serde_json::Value::Null).unwrap(),
            ConversionOptions::default()
        );
    }

    #[test]
    fn canonical_is_order_independent() {
        let a = ConversionOptions::from_json(&json!({"b": 1, "a": 2, "quality": 50})).unwrap();
        let b = ConversionOptions::from_json(&json!({"quality": 50, "a": 2, "b": 1})).unwrap();
        assert_eq!(a.canonical(), b.canonical());
        assert_ne!(a.canonical(), ConversionOptions::default().canonical());
    }

    #[test]
    fn page_selection_to_indices() {
        assert_eq!(PageSelection::All.to_indices(3), vec![0, 1, 2]);
        let sel = PageSelection::parse("3-10").unwrap();
        assert_eq!(sel.to_indices(4), vec![2, 3]);
        let sel = PageSelection::parse("3,1,3,2").unwrap();
        assert_eq!(sel.to_indices(5), vec![0, 1, 2]);
        let sel = PageSelection::parse("100").unwrap();
        assert_eq!(sel.to_indices(4), Vec::<usize>::new());
    }

    #[test]
    fn page_selection_rejects_zero() {
        assert!(PageSelection::parse("0-2").is_err());
    }

    #[test]
    fn quality_or_default() {
        let opts = ConversionOptions::default();
        assert_eq!(opts.quality_or(80), 80);
        let opts = ConversionOptions {
            quality: Some(35),
            ..Default::default()
        };
        assert_eq!(opts.quality_or(80), 35);
    }
}
