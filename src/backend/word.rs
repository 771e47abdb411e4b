//! Word-processor backend: reads the paragraph stream of a `.docx`.
//!
//! A `.docx` is a zip archive; the body lives in `word/document.xml`. Only
//! paragraphs, their run text and `Heading N` styles are read. Tables are
//! flattened into their cell paragraphs, and images and fields are dropped.

use super::{run_blocking, Paragraph, WordBackend, WordDocument};
use crate::error::BackendError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;

const NAME: &str = "docx";
const BODY_PART: &str = "word/document.xml";

static RE_PARAGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<w:p(?:\s[^>]*)?>(.*?)</w:p>").unwrap());
static RE_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<w:pStyle\s+w:val="(?i:heading)\s?(\d)""#).unwrap());
static RE_RUN_PIECE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<w:t(?:\s[^>]*)?>(.*?)</w:t>|<w:tab\s*/>|<w:br\s*/>").unwrap()
});

/// [`WordBackend`] reading `word/document.xml` straight out of the archive.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipWordBackend;

fn read_body_xml(path: &Path) -> Result<String, BackendError> {
    let file = File::open(path)
        .map_err(|e| BackendError::failed(NAME, format!("cannot open '{}': {e}", path.display())))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|e| BackendError::failed(NAME, format!("not a docx archive: {e}")))?;
    let mut part = archive
        .by_name(BODY_PART)
        .map_err(|e| BackendError::failed(NAME, format!("missing {BODY_PART}: {e}")))?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| BackendError::failed(NAME, format!("reading {BODY_PART}: {e}")))?;
    Ok(xml)
}

/// Parse the body XML of a `.docx` into paragraphs.
///
/// Empty paragraphs are dropped.
pub fn parse_document_xml(xml: &str) -> WordDocument {
    let paragraphs = RE_PARAGRAPH
        .captures_iter(xml)
        .filter_map(|cap| {
            let inner = cap.get(1).map_or("", |m| m.as_str());
            let heading = RE_STYLE
                .captures(inner)
                .and_then(|c| c[1].parse::<u8>().ok())
                .filter(|lvl| (1..=6).contains(lvl));
            let mut text = String::new();
            for piece in RE_RUN_PIECE.captures_iter(inner) {
                match piece.get(1) {
                    Some(t) => text.push_str(&decode_entities(t.as_str())),
                    None if piece[0].starts_with("<w:tab") => text.push('\t'),
                    None => text.push('\n'),
                }
            }
            (!text.trim().is_empty()).then_some(Paragraph { heading, text })
        })
        .collect();
    WordDocument { paragraphs }
}

/// Decode the five predefined XML entities and numeric references.
pub(crate) fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    static RE_ENTITY: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"&(#x[0-9a-fA-F]+|#\d+|amp|lt|gt|quot|apos|nbsp);").unwrap());
    RE_ENTITY
        .replace_all(s, |c: &regex::Captures| {
            let name = &c[1];
            match name {
                "amp" => "&".to_string(),
                "lt" => "<".to_string(),
                "gt" => ">".to_string(),
                "quot" => "\"".to_string(),
                "apos" => "'".to_string(),
                "nbsp" => "\u{a0}".to_string(),
                _ => {
                    let code = if let Some(hex) = name.strip_prefix("#x") {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        name[1..].parse::<u32>().ok()
                    };
                    code.and_then(char::from_u32)
                        .map(String::from)
                        .unwrap_or_else(|| c[0].to_string())
                }
            }
        })
        .into_owned()
}

#[async_trait]
impl WordBackend for ZipWordBackend {
    async fn read_document(&self, path: &Path) -> Result<WordDocument, BackendError> {
        let path = path.to_path_buf();
        run_blocking(NAME, move || {
            let xml = read_body_xml(&path)?;
            let doc = parse_document_xml(&xml);
            debug!("Read {} paragraphs from {}", doc.paragraphs.len(), path.display());
            Ok(doc)
        })
        .await
    }
}
