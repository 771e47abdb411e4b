//! PDF pipelines: text, Markdown, HTML and page images.

use super::encode::{encode_for, png_data_uri};
use super::{escape_html, html_document, PipelineContext, PipelineResult, Produced, StepError};
use crate::backend::PdfText;
use crate::config::PageSelection;
use crate::error::BackendError;
use tracing::{debug, info};

/// Page indices selected by the request, or None for "every page".
async fn selected_pages(ctx: &PipelineContext) -> Result<Option<Vec<usize>>, StepError> {
    match ctx.options.pages() {
        PageSelection::All => Ok(None),
        sel => {
            let total = ctx.backends.pdf.page_count(&ctx.input).await?;
            Ok(Some(sel.to_indices(total)))
        }
    }
}

async fn extract(ctx: &PipelineContext) -> Result<PdfText, StepError> {
    let pages = selected_pages(ctx).await?;
    let text = ctx
        .backends
        .pdf
        .extract_text(&ctx.input, pages.as_deref())
        .await?;
    info!(
        "Extracted {} of {} pages from {}",
        text.pages.len(),
        text.page_count,
        ctx.input.display()
    );
    Ok(text)
}

/// Promote short paragraphs without a full stop to `##` headings.
pub fn text_to_markdown(text: &str) -> String {
    let mut md = super::text::paragraphs(text)
        .into_iter()
        .map(|p| {
            if p.chars().count() < 100 && !p.contains('.') {
                format!("## {p}")
            } else {
                p
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    md.push('\n');
    md
}

pub async fn to_text(ctx: &PipelineContext) -> PipelineResult {
    let text = extract(ctx).await?;
    Ok(Produced::new(
        text.joined(),
        format!("Extracted text from {} pages", text.pages.len()),
    ))
}

pub async fn to_markdown(ctx: &PipelineContext) -> PipelineResult {
    let text = extract(ctx).await?;
    Ok(Produced::new(
        text_to_markdown(&text.joined()),
        format!("Converted {} pages to Markdown", text.pages.len()),
    ))
}

pub async fn to_html(ctx: &PipelineContext) -> PipelineResult {
    let text = extract(ctx).await?;
    let mut body = format!("<pre>{}</pre>", escape_html(&text.joined()));

    let mut embedded = 0;
    if ctx.options.extract_images.unwrap_or(false) {
        for (idx, _) in &text.pages {
            let img = ctx
                .backends
                .pdf
                .render_page(&ctx.input, *idx, ctx.config.max_rendered_pixels)
                .await?;
            let uri = png_data_uri(&img)?;
            body.push_str(&format!(
                "\n<figure><img src=\"{uri}\" alt=\"Page {n}\"><figcaption>Page {n}</figcaption></figure>",
                n = idx + 1
            ));
            embedded += 1;
        }
        debug!("Embedded {} page images", embedded);
    }

    let message = if embedded > 0 {
        format!(
            "Converted {} pages to HTML with {embedded} page images",
            text.pages.len()
        )
    } else {
        format!("Converted {} pages to HTML", text.pages.len())
    };
    Ok(Produced::new(html_document(&ctx.title(), &body), message))
}

/// Rasterise the first selected page.
pub async fn to_image(ctx: &PipelineContext) -> PipelineResult {
    let page = match selected_pages(ctx).await? {
        None => 0,
        Some(pages) => *pages.first().ok_or_else(|| {
            BackendError::failed("pdfium", "page_range selects no pages of this document")
        })?,
    };
    let img = ctx
        .backends
        .pdf
        .render_page(&ctx.input, page, ctx.config.max_rendered_pixels)
        .await?;
    let bytes = encode_for(&img, ctx.to, ctx.quality())?;
    Ok(Produced::new(
        bytes,
        format!("Rendered page {} as {}", page + 1, ctx.to.id().to_uppercase()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_heuristic() {
        let text = "Introduction\n\nThis is a sentence. It has periods.\n\n  \n\nResults and Discussion";
        let md = text_to_markdown(text);
        assert_eq!(
            md,
            "## Introduction\n\nThis is a sentence. It has periods.\n\n## Results and Discussion\n"
        );
    }

    #[test]
    fn long_paragraph_is_not_a_heading() {
        let long = "word ".repeat(30);
        let md = text_to_markdown(&long);
        assert!(!md.starts_with("##"));
    }
}
