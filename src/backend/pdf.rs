//! PDF backend built on pdfium.
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks for the whole of a parse or render. Every call therefore
//! runs on `tokio::task::spawn_blocking`, binding the library afresh on the
//! blocking thread.
//!
//! Rasterising caps the longest edge at `max_pixels`.

use super::{run_blocking, PdfBackend, PdfText};
use crate::error::BackendError;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const NAME: &str = "pdfium";

/// [`PdfBackend`] backed by a pdfium shared library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    library_dir: Option<PathBuf>,
}

impl PdfiumBackend {
    /// `library_dir` holds the pdfium shared library; None searches the
    /// system library path.
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self { library_dir }
    }
}

fn bind(library_dir: Option<&Path>) -> Result<Pdfium, BackendError> {
    let bindings = match library_dir {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| BackendError::unavailable(NAME, format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

fn open<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, BackendError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| BackendError::failed(NAME, format!("cannot open '{}': {e:?}", path.display())))
}

fn extract_text_blocking(
    library_dir: Option<&Path>,
    path: &Path,
    page_indices: Option<&[usize]>,
) -> Result<PdfText, BackendError> {
    let pdfium = bind(library_dir)?;
    let document = open(&pdfium, path)?;
    let pages = document.pages();
    let page_count = pages.len() as usize;

    let indices: Vec<usize> = match page_indices {
        Some(sel) => sel.to_vec(),
        None => (0..page_count).collect(),
    };

    let mut out = Vec::with_capacity(indices.len());
    for idx in indices {
        if idx >= page_count {
            warn!("Skipping page {} (out of range, total={})", idx + 1, page_count);
            continue;
        }
        let page = pages
            .get(idx as u16)
            .map_err(|e| BackendError::failed(NAME, format!("page {}: {e:?}", idx + 1)))?;
        let text = page
            .text()
            .map_err(|e| BackendError::failed(NAME, format!("page {} text: {e:?}", idx + 1)))?
            .all();
        debug!("Extracted page {} → {} chars", idx + 1, text.len());
        out.push((idx, text));
    }

    Ok(PdfText {
        page_count,
        pages: out,
    })
}

fn render_page_blocking(
    library_dir: Option<&Path>,
    path: &Path,
    page_index: usize,
    max_pixels: u32,
) -> Result<DynamicImage, BackendError> {
    let pdfium = bind(library_dir)?;
    let document = open(&pdfium, path)?;
    let pages = document.pages();
    let total = pages.len() as usize;
    if page_index >= total {
        return Err(BackendError::failed(
            NAME,
            format!("page {} out of range (document has {total})", page_index + 1),
        ));
    }

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let page = pages
        .get(page_index as u16)
        .map_err(|e| BackendError::failed(NAME, format!("page {}: {e:?}", page_index + 1)))?;
    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| BackendError::failed(NAME, format!("render page {}: {e:?}", page_index + 1)))?;
    let image = bitmap.as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        page_index + 1,
        image.width(),
        image.height()
    );
    Ok(image)
}

#[async_trait]
impl PdfBackend for PdfiumBackend {
    async fn extract_text(
        &self,
        path: &Path,
        page_indices: Option<&[usize]>,
    ) -> Result<PdfText, BackendError> {
        let dir = self.library_dir.clone();
        let path = path.to_path_buf();
        let indices = page_indices.map(|s| s.to_vec());
        run_blocking(NAME, move || {
            extract_text_blocking(dir.as_deref(), &path, indices.as_deref())
        })
        .await
    }

    async fn page_count(&self, path: &Path) -> Result<usize, BackendError> {
        let dir = self.library_dir.clone();
        let path = path.to_path_buf();
        run_blocking(NAME, move || {
            let pdfium = bind(dir.as_deref())?;
            let document = open(&pdfium, &path)?;
            Ok(document.pages().len() as usize)
        })
        .await
    }

    async fn render_page(
        &self,
        path: &Path,
        page_index: usize,
        max_pixels: u32,
    ) -> Result<DynamicImage, BackendError> {
        let dir = self.library_dir.clone();
        let path = path.to_path_buf();
        run_blocking(NAME, move || {
            render_page_blocking(dir.as_deref(), &path, page_index, max_pixels)
        })
        .await
    }
}
