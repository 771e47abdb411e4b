//! Raster encoding: `DynamicImage` → PNG/JPEG bytes and base64 data URIs.
//!
//! PNG is lossless and used wherever the image is embedded in a document.
//! JPEG honours the request's `quality`; its encoder has no alpha channel,
//! so images are flattened to RGB first.

use crate::error::BackendError;
use crate::format::OutputFormat;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

const NAME: &str = "image";

pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| BackendError::failed(NAME, format!("PNG encode: {e}")))?;
    Ok(buf)
}

pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(encoder)
        .map_err(|e| BackendError::failed(NAME, format!("JPEG encode: {e}")))?;
    Ok(buf)
}

/// Encode `img` for a raster output format.
pub fn encode_for(img: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>, BackendError> {
    let bytes = match format {
        OutputFormat::Jpg => encode_jpeg(img, quality)?,
        _ => encode_png(img)?,
    };
    debug!(
        "Encoded {}x{} image as {} → {} bytes",
        img.width(),
        img.height(),
        format,
        bytes.len()
    );
    Ok(bytes)
}

/// Re-encode PNG bytes (e.g. a browser screenshot) for `format`.
///
/// PNG targets pass the bytes through unchanged.
pub fn reencode_png(png: Vec<u8>, format: OutputFormat, quality: u8) -> Result<Vec<u8>, BackendError> {
    if format != OutputFormat::Jpg {
        return Ok(png);
    }
    let img = image::load_from_memory_with_format(&png, ImageFormat::Png)
        .map_err(|e| BackendError::failed(NAME, format!("decoding screenshot: {e}")))?;
    encode_jpeg(&img, quality)
}

/// `data:image/png;base64,…` URI for embedding in HTML.
pub fn png_data_uri(img: &DynamicImage) -> Result<String, BackendError> {
    let png = encode_png(img)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(&png)))
}
