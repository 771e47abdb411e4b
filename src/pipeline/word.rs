//! Word-processor (`.docx`) pipelines.

use super::{escape_html, html_document, print_html, PipelineContext, PipelineResult, Produced};
use crate::backend::WordDocument;

pub fn document_to_markdown(doc: &WordDocument) -> String {
    let mut md = doc
        .paragraphs
        .iter()
        .map(|p| match p.heading {
            Some(level) => format!("{} {}", "#".repeat(level as usize), p.text.trim()),
            None => p.text.trim().to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    md.push('\n');
    md
}

/// HTML fragment, one element per paragraph.
pub fn document_to_html(doc: &WordDocument) -> String {
    doc.paragraphs
        .iter()
        .map(|p| match p.heading {
            Some(level) => format!("<h{level}>{}</h{level}>", escape_html(p.text.trim())),
            None => format!("<p>{}</p>", escape_html(&p.text).replace('\n', "<br>")),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn to_text(ctx: &PipelineContext) -> PipelineResult {
    let doc = ctx.backends.word.read_document(&ctx.input).await?;
    Ok(Produced::new(
        doc.plain_text(),
        format!("Extracted text from {} paragraphs", doc.paragraphs.len()),
    ))
}

pub async fn to_markdown(ctx: &PipelineContext) -> PipelineResult {
    let doc = ctx.backends.word.read_document(&ctx.input).await?;
    Ok(Produced::new(
        document_to_markdown(&doc),
        "Converted Word document to Markdown",
    ))
}

pub async fn to_html(ctx: &PipelineContext) -> PipelineResult {
    let doc = ctx.backends.word.read_document(&ctx.input).await?;
    Ok(Produced::new(
        html_document(&ctx.title(), &document_to_html(&doc)),
        "Converted Word document to HTML",
    ))
}

pub async fn to_pdf(ctx: &PipelineContext) -> PipelineResult {
    let doc = ctx.backends.word.read_document(&ctx.input).await?;
    let html = html_document(&ctx.title(), &document_to_html(&doc));
    let pdf = print_html(ctx, &html).await?;
    Ok(Produced::new(pdf, "Converted Word document to PDF"))
}
