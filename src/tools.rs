//! Tool adapter: named tools with JSON arguments on top of the engine.
//!
//! Four tools are exposed, each returning a human-readable text payload:
//!
//! | Tool | Engine call |
//! |------|-------------|
//! | `convert_document`       | [`ConversionEngine::convert`] |
//! | `get_document_info`      | [`ConversionEngine::get_document_info`] |
//! | `list_supported_formats` | [`ConversionEngine::list_formats`] |
//! | `batch_convert`          | [`ConversionEngine::batch_convert`] |
//!
//! [`ToolRequest`] / [`ToolResponse`] are the line-delimited JSON envelope
//! used by `docconv serve`.

use crate::config::ConversionOptions;
use crate::engine::ConversionEngine;
use crate::error::ConvertError;
use crate::output::ConversionRequest;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors returned by [`ToolDispatcher::call`].
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("{tool}: invalid arguments: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("{tool} failed: {source}")]
    Engine {
        tool: String,
        #[source]
        source: ConvertError,
    },
}

/// Name, description and JSON input schema of one tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct ConvertArgs {
    input_path: PathBuf,
    output_path: PathBuf,
    target_format: String,
    #[serde(default)]
    options: Value,
}

#[derive(Debug, Deserialize)]
struct InfoArgs {
    file_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct BatchArgs {
    input_directory: PathBuf,
    output_directory: PathBuf,
    target_format: String,
    #[serde(default)]
    file_pattern: Option<String>,
}

/// Routes tool calls to a shared engine.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    engine: Arc<ConversionEngine>,
}

impl ToolDispatcher {
    pub fn new(engine: Arc<ConversionEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &ConversionEngine {
        &self.engine
    }

    /// The schemas of every tool.
    pub fn definitions() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "convert_document",
                description: "Convert a document from one format to another",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "input_path": {"type": "string", "description": "Path of the input document"},
                        "output_path": {"type": "string", "description": "Path of the output document"},
                        "target_format": {
                            "type": "string",
                            "description": "Target format (pdf, docx, html, md, txt, csv, json, png, jpg)"
                        },
                        "options": {
                            "type": "object",
                            "description": "Conversion options (optional)",
                            "properties": {
                                "quality": {"type": "number", "minimum": 0, "maximum": 100,
                                            "description": "Image quality (0-100)"},
                                "page_range": {"type": "string",
                                               "description": "PDF page range, e.g. \"1-5\" or \"1,3,5\""},
                                "extract_images": {"type": "boolean",
                                                   "description": "Embed page images in HTML output"},
                                "sheet": {"type": "string",
                                          "description": "Worksheet for CSV/HTML output"}
                            }
                        }
                    },
                    "required": ["input_path", "output_path", "target_format"]
                }),
            },
            ToolDefinition {
                name: "get_document_info",
                description: "Get basic information about a document",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "file_path": {"type": "string", "description": "Path of the document"}
                    },
                    "required": ["file_path"]
                }),
            },
            ToolDefinition {
                name: "list_supported_formats",
                description: "List every supported document format and conversion",
                input_schema: json!({"type": "object", "properties": {}}),
            },
            ToolDefinition {
                name: "batch_convert",
                description: "Convert every file in a directory",
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "input_directory": {"type": "string", "description": "Input directory"},
                        "output_directory": {"type": "string", "description": "Output directory"},
                        "target_format": {"type": "string", "description": "Target format"},
                        "file_pattern": {"type": "string",
                                         "description": "File-name pattern, e.g. \"*.md,*.txt\" (optional)"}
                    },
                    "required": ["input_directory", "output_directory", "target_format"]
                }),
            },
        ]
    }

    /// Run tool `name` with `args` and render the result as text.
    pub async fn call(&self, name: &str, args: Value) -> Result<String, ToolError> {
        debug!("tool call {} {}", name, args);
        let engine_err = |source: ConvertError| ToolError::Engine {
            tool: name.to_string(),
            source,
        };
        match name {
            "convert_document" => {
                let a: ConvertArgs = parse_args(name, args)?;
                let options = ConversionOptions::from_json(&a.options).map_err(|e| {
                    ToolError::InvalidArguments {
                        tool: name.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                let request = ConversionRequest::new(&a.input_path, &a.output_path, &a.target_format)
                    .with_options(options);
                let result = self.engine.convert(&request).await.map_err(engine_err)?;
                Ok(format!(
                    "Document converted.\nInput: {}\nOutput: {}\nFormat: {}\n{}",
                    a.input_path.display(),
                    result.written.display(),
                    a.target_format,
                    result.message
                ))
            }
            "get_document_info" => {
                let a: InfoArgs = parse_args(name, args)?;
                let info = self
                    .engine
                    .get_document_info(&a.file_path)
                    .await
                    .map_err(engine_err)?;
                Ok(format!("Document info:\n{}", pretty(&info)))
            }
            "list_supported_formats" => Ok(format!(
                "Supported formats:\n{}",
                pretty(&self.engine.list_formats())
            )),
            "batch_convert" => {
                let a: BatchArgs = parse_args(name, args)?;
                let outcome = self
                    .engine
                    .batch_convert(
                        &a.input_directory,
                        &a.output_directory,
                        &a.target_format,
                        a.file_pattern.as_deref(),
                    )
                    .await
                    .map_err(engine_err)?;
                Ok(format!(
                    "Batch conversion complete.\nSucceeded: {}\nFailed: {}\nDetails:\n{}",
                    outcome.success,
                    outcome.failed,
                    outcome.details().join("\n")
                ))
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    /// Handle one line of the stdio protocol.
    pub async fn handle_line(&self, line: &str) -> ToolResponse {
        let request: ToolRequest = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => return ToolResponse::failure(Value::Null, format!("malformed request: {e}")),
        };
        match self.call(&request.tool, request.arguments).await {
            Ok(text) => ToolResponse::success(request.id, text),
            Err(e) => ToolResponse::failure(request.id, e.to_string()),
        }
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

fn pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("<unserialisable: {e}>"))
}

/// One request line: `{"id": …, "tool": "…", "arguments": {…}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolRequest {
    #[serde(default)]
    pub id: Value,
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

/// One response line: `{"id": …, "ok": true, "text": "…"}` or
/// `{"id": …, "ok": false, "error": "…"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResponse {
    pub id: Value,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResponse {
    pub fn success(id: Value, text: String) -> Self {
        Self {
            id,
            ok: true,
            text: Some(text),
            error: None,
        }
    }

    pub fn failure(id: Value, error: String) -> Self {
        Self {
            id,
            ok: false,
            text: None,
            error: Some(error),
        }
    }
}
