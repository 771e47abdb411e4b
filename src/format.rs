//! Format registry: the static table of known formats and legal conversions.
//!
//! The registry lists *declared* support. The dispatch table in
//! [`crate::pipeline`] lists *implemented* support, and
//! [`crate::pipeline::verify_dispatch`] refuses to build an engine when the
//! two disagree.
//!
//! Formats are resolved purely from the file extension, case-insensitively.
//! Content is never sniffed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// A format the engine can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InputFormat {
    #[serde(rename = "pdf")]
    Pdf,
    #[serde(rename = "docx")]
    Docx,
    #[serde(rename = "xlsx")]
    Xlsx,
    #[serde(rename = "md")]
    Markdown,
    #[serde(rename = "html")]
    Html,
    #[serde(rename = "txt")]
    Text,
}

/// A format the engine can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutputFormat {
    #[serde(rename = "pdf")]
    Pdf,
    #[serde(rename = "docx")]
    Docx,
    #[serde(rename = "html")]
    Html,
    #[serde(rename = "md")]
    Markdown,
    #[serde(rename = "txt")]
    Text,
    #[serde(rename = "csv")]
    Csv,
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "png")]
    Png,
    #[serde(rename = "jpg")]
    Jpg,
}

/// Declaration of one input format.
#[derive(Debug, Serialize)]
pub struct InputDescriptor {
    pub format: InputFormat,
    pub extensions: &'static [&'static str],
    pub mime_types: &'static [&'static str],
    pub description: &'static str,
    pub targets: &'static [OutputFormat],
}

/// Declaration of one output format.
#[derive(Debug, Serialize)]
pub struct OutputDescriptor {
    pub format: OutputFormat,
    pub extension: &'static str,
    pub mime_type: &'static str,
    pub description: &'static str,
}

pub static INPUT_FORMATS: &[InputDescriptor] = &[
    InputDescriptor {
        format: InputFormat::Pdf,
        extensions: &[".pdf"],
        mime_types: &["application/pdf"],
        description: "PDF document",
        targets: &[
            OutputFormat::Text,
            OutputFormat::Markdown,
            OutputFormat::Html,
            OutputFormat::Png,
            OutputFormat::Jpg,
        ],
    },
    InputDescriptor {
        format: InputFormat::Docx,
        extensions: &[".docx"],
        mime_types: &["application/vnd.openxmlformats-officedocument.wordprocessingml.document"],
        description: "Microsoft Word document",
        targets: &[
            OutputFormat::Text,
            OutputFormat::Markdown,
            OutputFormat::Html,
            OutputFormat::Pdf,
        ],
    },
    InputDescriptor {
        format: InputFormat::Xlsx,
        extensions: &[".xlsx", ".xls"],
        mime_types: &[
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "application/vnd.ms-excel",
        ],
        description: "Microsoft Excel spreadsheet",
        targets: &[OutputFormat::Csv, OutputFormat::Json, OutputFormat::Html],
    },
    InputDescriptor {
        format: InputFormat::Markdown,
        extensions: &[".md", ".markdown"],
        mime_types: &["text/markdown"],
        description: "Markdown document",
        targets: &[OutputFormat::Html, OutputFormat::Pdf, OutputFormat::Docx],
    },
    InputDescriptor {
        format: InputFormat::Html,
        extensions: &[".html", ".htm"],
        mime_types: &["text/html"],
        description: "HTML page",
        targets: &[
            OutputFormat::Pdf,
            OutputFormat::Markdown,
            OutputFormat::Png,
            OutputFormat::Jpg,
        ],
    },
    InputDescriptor {
        format: InputFormat::Text,
        extensions: &[".txt"],
        mime_types: &["text/plain"],
        description: "Plain text file",
        targets: &[OutputFormat::Markdown, OutputFormat::Html, OutputFormat::Pdf],
    },
];

pub static OUTPUT_FORMATS: &[OutputDescriptor] = &[
    OutputDescriptor {
        format: OutputFormat::Pdf,
        extension: ".pdf",
        mime_type: "application/pdf",
        description: "PDF document",
    },
    OutputDescriptor {
        format: OutputFormat::Docx,
        extension: ".docx",
        mime_type: "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        description: "Microsoft Word document (produced as RTF)",
    },
    OutputDescriptor {
        format: OutputFormat::Html,
        extension: ".html",
        mime_type: "text/html",
        description: "HTML page",
    },
    OutputDescriptor {
        format: OutputFormat::Markdown,
        extension: ".md",
        mime_type: "text/markdown",
        description: "Markdown document",
    },
    OutputDescriptor {
        format: OutputFormat::Text,
        extension: ".txt",
        mime_type: "text/plain",
        description: "Plain text file",
    },
    OutputDescriptor {
        format: OutputFormat::Csv,
        extension: ".csv",
        mime_type: "text/csv",
        description: "CSV file",
    },
    OutputDescriptor {
        format: OutputFormat::Json,
        extension: ".json",
        mime_type: "application/json",
        description: "JSON file",
    },
    OutputDescriptor {
        format: OutputFormat::Png,
        extension: ".png",
        mime_type: "image/png",
        description: "PNG image",
    },
    OutputDescriptor {
        format: OutputFormat::Jpg,
        extension: ".jpg",
        mime_type: "image/jpeg",
        description: "JPEG image",
    },
];

impl InputFormat {
    pub fn id(self) -> &'static str {
        match self {
            InputFormat::Pdf => "pdf",
            InputFormat::Docx => "docx",
            InputFormat::Xlsx => "xlsx",
            InputFormat::Markdown => "md",
            InputFormat::Html => "html",
            InputFormat::Text => "txt",
        }
    }

    pub fn descriptor(self) -> &'static InputDescriptor {
        INPUT_FORMATS
            .iter()
            .find(|d| d.format == self)
            .unwrap_or_else(|| unreachable!("every InputFormat has a descriptor"))
    }

    /// Resolve the input format of `path` from its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(resolve_format)
    }
}

impl OutputFormat {
    pub fn id(self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Docx => "docx",
            OutputFormat::Html => "html",
            OutputFormat::Markdown => "md",
            OutputFormat::Text => "txt",
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
            OutputFormat::Png => "png",
            OutputFormat::Jpg => "jpg",
        }
    }

    pub fn descriptor(self) -> &'static OutputDescriptor {
        OUTPUT_FORMATS
            .iter()
            .find(|d| d.format == self)
            .unwrap_or_else(|| unreachable!("every OutputFormat has a descriptor"))
    }

    /// Canonical file extension including the leading dot.
    pub fn extension(self) -> &'static str {
        self.descriptor().extension
    }

    /// Parse a target format identifier (`"html"`, `".HTML"`, `"jpeg"`).
    pub fn parse(id: &str) -> Option<Self> {
        let id = id.trim().trim_start_matches('.').to_ascii_lowercase();
        if id == "jpeg" {
            return Some(OutputFormat::Jpg);
        }
        OUTPUT_FORMATS
            .iter()
            .find(|d| d.format.id() == id)
            .map(|d| d.format)
    }

    pub fn is_raster(self) -> bool {
        matches!(self, OutputFormat::Png | OutputFormat::Jpg)
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Map a file extension (with or without the leading dot) to an input format.
pub fn resolve_format(extension: &str) -> Option<InputFormat> {
    let ext = format!(".{}", extension.trim_start_matches('.').to_ascii_lowercase());
    INPUT_FORMATS
        .iter()
        .find(|d| d.extensions.contains(&ext.as_str()))
        .map(|d| d.format)
}

/// True iff `output` is one of `input`'s declared targets.
pub fn is_pair_supported(input: InputFormat, output: OutputFormat) -> bool {
    input.descriptor().targets.contains(&output)
}

/// Every declared `(input, output)` pair, in table order.
pub fn declared_pairs() -> impl Iterator<Item = (InputFormat, OutputFormat)> {
    INPUT_FORMATS
        .iter()
        .flat_map(|d| d.targets.iter().map(move |t| (d.format, *t)))
}

/// MIME type for a path, looked up in both tables by extension.
pub fn mime_type_for(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return "application/octet-stream";
    };
    let ext = format!(".{}", ext.to_ascii_lowercase());
    if let Some(d) = INPUT_FORMATS.iter().find(|d| d.extensions.contains(&ext.as_str())) {
        let idx = d.extensions.iter().position(|e| *e == ext).unwrap_or(0);
        return d.mime_types.get(idx).copied().unwrap_or(d.mime_types[0]);
    }
    OUTPUT_FORMATS
        .iter()
        .find(|d| d.extension == ext)
        .map(|d| d.mime_type)
        .unwrap_or("application/octet-stream")
}

/// Capability listing for format-discovery callers.
#[derive(Debug, Serialize)]
pub struct FormatCatalog {
    pub inputs: &'static [InputDescriptor],
    pub outputs: &'static [OutputDescriptor],
    pub conversion_matrix: BTreeMap<InputFormat, Vec<OutputFormat>>,
}

/// Enumerate every registered format and the full conversion matrix.
pub fn list_formats() -> FormatCatalog {
    FormatCatalog {
        inputs: INPUT_FORMATS,
        outputs: OUTPUT_FORMATS,
        conversion_matrix: INPUT_FORMATS
            .iter()
            .map(|d| (d.format, d.targets.to_vec()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_is_case_insensitive_and_dot_optional() {
        assert_eq!(resolve_format(".PDF"), Some(InputFormat::Pdf));
        assert_eq!(resolve_format("md"), Some(InputFormat::Markdown));
        assert_eq!(resolve_format("Markdown"), Some(InputFormat::Markdown));
        assert_eq!(resolve_format(".htm"), Some(InputFormat::Html));
        assert_eq!(resolve_format(".xls"), Some(InputFormat::Xlsx));
        assert_eq!(resolve_format(".unsupported"), None);
        assert_eq!(resolve_format(""), None);
    }

    #[test]
    fn from_path_uses_extension_only() {
        assert_eq!(
            InputFormat::from_path(Path::new("/a/b/Report.DOCX")),
            Some(InputFormat::Docx)
        );
        assert_eq!(InputFormat::from_path(Path::new("/a/b/README")), None);
    }

    #[test]
    fn pair_support_follows_table() {
        assert!(is_pair_supported(InputFormat::Markdown, OutputFormat::Html));
        assert!(is_pair_supported(InputFormat::Xlsx, OutputFormat::Json));
        assert!(!is_pair_supported(InputFormat::Text, OutputFormat::Png));
        assert!(!is_pair_supported(InputFormat::Html, OutputFormat::Html));
    }

    #[test]
    fn output_parse_accepts_aliases() {
        assert_eq!(OutputFormat::parse("HTML"), Some(OutputFormat::Html));
        assert_eq!(OutputFormat::parse(".jpg"), Some(OutputFormat::Jpg));
        assert_eq!(OutputFormat::parse("jpeg"), Some(OutputFormat::Jpg));
        assert_eq!(OutputFormat::parse("pptx"), None);
    }

    #[test]
    fn every_target_has_output_descriptor() {
        for (_, out) in declared_pairs() {
            assert!(OUTPUT_FORMATS.iter().any(|d| d.format == out));
        }
    }

    #[test]
    fn mime_lookup() {
        assert_eq!(mime_type_for(Path::new("x.pdf")), "application/pdf");
        assert_eq!(mime_type_for(Path::new("x.xls")), "application/vnd.ms-excel");
        assert_eq!(mime_type_for(Path::new("x.PNG")), "image/png");
        assert_eq!(mime_type_for(Path::new("x.bin")), "application/octet-stream");
        assert_eq!(mime_type_for(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn catalog_serialises_matrix_with_ids() {
        let json = serde_json::to_value(list_formats()).unwrap();
        let matrix = json["conversion_matrix"].as_object().unwrap();
        assert_eq!(matrix.len(), INPUT_FORMATS.len());
        assert_eq!(matrix["md"], serde_json::json!(["html", "pdf", "docx"]));
        assert_eq!(json["outputs"].as_array().unwrap().len(), OUTPUT_FORMATS.len());
    }
}
