//! Page renderer driving a headless Chromium-family browser.
//!
//! The executable is located once, on the first render, and reused for the
//! lifetime of the renderer. Each render is a separate `--headless` run with
//! its own throwaway profile directory; the child is spawned with
//! `kill_on_drop(true)` so a cancelled or timed-out conversion does not leave
//! a browser process behind.

use super::{PageRenderer, PrintOptions};
use crate::error::BackendError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const NAME: &str = "browser";

/// Executables tried on `PATH`, in order, when no browser path is configured.
pub const BROWSER_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
    "msedge",
];

/// [`PageRenderer`] that shells out to a headless browser.
#[derive(Debug, Default)]
pub struct ChromiumRenderer {
    configured: Option<PathBuf>,
    executable: OnceCell<PathBuf>,
}

impl ChromiumRenderer {
    pub fn new(configured: Option<PathBuf>) -> Self {
        Self {
            configured,
            executable: OnceCell::new(),
        }
    }

    /// The browser executable, located on first call.
    pub async fn executable(&self) -> Result<&Path, BackendError> {
        let path = self
            .executable
            .get_or_try_init(|| locate(self.configured.clone()))
            .await?;
        Ok(path.as_path())
    }

    async fn run(&self, args: Vec<String>) -> Result<(), BackendError> {
        let exe = self.executable().await?;
        let profile = tempfile::tempdir()
            .map_err(|e| BackendError::failed(NAME, format!("profile dir: {e}")))?;

        let mut cmd = Command::new(exe);
        cmd.arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--no-first-run")
            .arg(format!("--user-data-dir={}", profile.path().display()))
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("browser run {} {:?}", exe.display(), args);
        let output = cmd
            .output()
            .await
            .map_err(|e| BackendError::failed(NAME, format!("spawning {}: {e}", exe.display())))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::failed(
                NAME,
                format!("{} exited with {}: {}", exe.display(), output.status, stderr.trim()),
            ));
        }
        Ok(())
    }
}

async fn is_runnable(candidate: &Path) -> bool {
    Command::new(candidate)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

async fn locate(configured: Option<PathBuf>) -> Result<PathBuf, BackendError> {
    if let Some(path) = configured {
        if is_runnable(&path).await {
            info!("Using browser {}", path.display());
            return Ok(path);
        }
        return Err(BackendError::unavailable(
            NAME,
            format!("configured browser '{}' does not run", path.display()),
        ));
    }
    for name in BROWSER_CANDIDATES {
        let path = PathBuf::from(name);
        if is_runnable(&path).await {
            info!("Using browser {}", name);
            return Ok(path);
        }
    }
    Err(BackendError::unavailable(
        NAME,
        format!(
            "no headless browser found (tried {}); set DOCCONV_BROWSER",
            BROWSER_CANDIDATES.join(", ")
        ),
    ))
}

/// `file://` URL for a local HTML file.
pub fn file_url(path: &Path) -> Result<String, BackendError> {
    let abs = std::path::absolute(path)
        .map_err(|e| BackendError::failed(NAME, format!("resolving '{}': {e}", path.display())))?;
    let raw = abs.to_string_lossy().replace('\\', "/");
    let mut url = String::from("file://");
    if !raw.starts_with('/') {
        url.push('/');
    }
    for ch in raw.chars() {
        match ch {
            ' ' => url.push_str("%20"),
            '#' => url.push_str("%23"),
            '?' => url.push_str("%3F"),
            '%' => url.push_str("%25"),
            c => url.push(c),
        }
    }
    Ok(url)
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn print_pdf(
        &self,
        html: &Path,
        output: &Path,
        options: &PrintOptions,
    ) -> Result<(), BackendError> {
        let mut args = vec![
            "--no-pdf-header-footer".to_string(),
            format!("--print-to-pdf={}", output.display()),
        ];
        if !options.print_background {
            args.push("--disable-print-background".into());
        }
        args.push(file_url(html)?);
        self.run(args).await?;
        let written = tokio::fs::metadata(output).await.map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            return Err(BackendError::failed(NAME, "browser produced no PDF"));
        }
        Ok(())
    }

    async fn screenshot(
        &self,
        html: &Path,
        width: u32,
        height: u32,
    ) -> Result<Vec<u8>, BackendError> {
        let shot = tempfile::Builder::new()
            .prefix(".docconv-shot-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| BackendError::failed(NAME, format!("screenshot file: {e}")))?;
        let args = vec![
            format!("--screenshot={}", shot.path().display()),
            format!("--window-size={width},{height}"),
            "--hide-scrollbars".to_string(),
            file_url(html)?,
        ];
        self.run(args).await?;
        let bytes = tokio::fs::read(shot.path())
            .await
            .map_err(|e| BackendError::failed(NAME, format!("reading screenshot: {e}")))?;
        if bytes.is_empty() {
            return Err(BackendError::failed(NAME, "browser produced an empty screenshot"));
        }
        Ok(bytes)
    }
}
