//! Plain-text pipelines.

use super::{escape_html, html_document, print_html, PipelineContext, PipelineResult, Produced};

/// Split on blank lines, trim each paragraph and drop empty ones.
pub fn paragraphs(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalise plain text into Markdown paragraphs.
pub fn text_to_markdown(text: &str) -> String {
    let mut md = paragraphs(text).join("\n\n");
    md.push('\n');
    md
}

pub fn text_to_html(title: &str, text: &str) -> String {
    html_document(title, &format!("<pre>{}</pre>", escape_html(text)))
}

pub async fn to_markdown(ctx: &PipelineContext) -> PipelineResult {
    let text = ctx.read_text().await?;
    Ok(Produced::new(text_to_markdown(&text), "Converted text to Markdown"))
}

pub async fn to_html(ctx: &PipelineContext) -> PipelineResult {
    let text = ctx.read_text().await?;
    Ok(Produced::new(
        text_to_html(&ctx.title(), &text),
        "Converted text to HTML",
    ))
}

pub async fn to_pdf(ctx: &PipelineContext) -> PipelineResult {
    let text = ctx.read_text().await?;
    let pdf = print_html(ctx, &text_to_html(&ctx.title(), &text)).await?;
    Ok(Produced::new(pdf, "Converted text to PDF"))
}
