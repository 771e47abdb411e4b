//! Markdown and HTML pipelines.
//!
//! Markdown → DOCX has no native writer: the rendered HTML is rewritten as
//! RTF, which word processors open directly, and written next to the
//! requested path with an `.rtf` extension.

use super::encode::reencode_png;
use super::{html_document, print_file, print_html, PipelineContext, PipelineResult, Produced};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

async fn render_markdown(ctx: &PipelineContext) -> Result<String, super::StepError> {
    let markdown = ctx.read_text().await?;
    Ok(ctx.backends.markup.markdown_to_html(&markdown)?)
}

pub async fn markdown_to_html(ctx: &PipelineContext) -> PipelineResult {
    let fragment = render_markdown(ctx).await?;
    Ok(Produced::new(
        html_document(&ctx.title(), &fragment),
        "Converted Markdown to HTML",
    ))
}

pub async fn markdown_to_pdf(ctx: &PipelineContext) -> PipelineResult {
    let fragment = render_markdown(ctx).await?;
    let pdf = print_html(ctx, &html_document(&ctx.title(), &fragment)).await?;
    Ok(Produced::new(pdf, "Converted Markdown to PDF"))
}

pub async fn markdown_to_rtf(ctx: &PipelineContext) -> PipelineResult {
    let fragment = render_markdown(ctx).await?;
    let alternate = ctx.output.with_extension("rtf");
    Ok(Produced::new(
        html_to_rtf(&fragment),
        format!(
            "Converted Markdown to RTF ({}); open it in a word processor and save as DOCX",
            alternate.display()
        ),
    )
    .substituted("rtf"))
}

pub async fn html_to_markdown(ctx: &PipelineContext) -> PipelineResult {
    let html = ctx.read_text().await?;
    let markdown = ctx.backends.markup.html_to_markdown(&html)?;
    Ok(Produced::new(markdown, "Converted HTML to Markdown"))
}

pub async fn html_to_pdf(ctx: &PipelineContext) -> PipelineResult {
    let pdf = print_file(ctx, &ctx.input).await?;
    Ok(Produced::new(pdf, "Converted HTML to PDF"))
}

pub async fn html_to_image(ctx: &PipelineContext) -> PipelineResult {
    let png = ctx
        .backends
        .renderer
        .screenshot(
            &ctx.input,
            ctx.config.screenshot_width,
            ctx.config.screenshot_height,
        )
        .await?;
    let bytes = reencode_png(png, ctx.to, ctx.quality())?;
    Ok(Produced::new(
        bytes,
        format!("Converted HTML to {}", ctx.to.id().to_uppercase()),
    ))
}

// ── HTML → RTF ───────────────────────────────────────────────────────────

const RTF_HEADER: &str =
    "{\\rtf1\\ansi\\deff0 {\\fonttbl {\\f0 Times New Roman;}{\\f1 Courier New;}}\\f0\\fs24 ";

static RE_RTF_HEADINGS: Lazy<Vec<(Regex, u32)>> = Lazy::new(|| {
    [(1, 32), (2, 28), (3, 26), (4, 24), (5, 24), (6, 24)]
        .into_iter()
        .map(|(n, size)| {
            (
                Regex::new(&format!(r"(?is)<h{n}(?:\s[^>]*)?>(.*?)</h{n}>")).unwrap(),
                size,
            )
        })
        .collect()
});

static RE_RTF_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?is)<p(?:\s[^>]*)?>(.*?)</p>", "$1\\par "),
        (r"(?is)<li(?:\s[^>]*)?>(.*?)</li>", "\\bullet  $1\\par "),
        (r"(?is)<blockquote[^>]*>(.*?)</blockquote>", "{\\li720 $1}"),
        (r"(?is)<(?:strong|b)(?:\s[^>]*)?>(.*?)</(?:strong|b)>", "\\b $1\\b0 "),
        (r"(?is)<(?:em|i)(?:\s[^>]*)?>(.*?)</(?:em|i)>", "\\i $1\\i0 "),
        (r"(?is)<code[^>]*>(.*?)</code>", "{\\f1 $1}"),
        (r"(?i)<br\s*/?>", "\\line "),
        (r"(?i)<hr\s*/?>", "\\par "),
    ]
    .into_iter()
    .map(|(pat, rep)| (Regex::new(pat).unwrap(), rep))
    .collect()
});

static RE_RTF_PRE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<pre[^>]*>(?:<code[^>]*>)?(.*?)(?:</code>)?</pre>").unwrap());
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());
static RE_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#x[0-9a-fA-F]+|#\d+|amp|lt|gt|quot|apos|nbsp);").unwrap());

/// Escape one character for RTF: backslash, braces and non-ASCII.
fn push_rtf_char(out: &mut String, c: char) {
    match c {
        '\\' => out.push_str("\\\\"),
        '{' => out.push_str("\\{"),
        '}' => out.push_str("\\}"),
        c if c.is_ascii() => out.push(c),
        c => {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{}?", *unit as i16));
            }
        }
    }
}

fn rtf_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        push_rtf_char(&mut out, c);
    }
    out
}

fn rtf_entity(c: &Captures) -> String {
    let decoded = match &c[1] {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        num => {
            let code = match num.strip_prefix("#x") {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => num[1..].parse().ok(),
            };
            code.and_then(char::from_u32)
        }
    };
    match decoded {
        Some(ch) => {
            let mut out = String::new();
            push_rtf_char(&mut out, ch);
            out
        }
        None => String::new(),
    }
}

/// Rewrite an HTML fragment as a minimal RTF document.
///
/// Headings become bold runs at larger sizes, paragraphs and list items end
/// with `\par`, code switches to the monospace font. Other tags are dropped.
pub fn html_to_rtf(html: &str) -> String {
    let mut body = rtf_escape(html);

    // Raw newlines are ignored by RTF readers; only preformatted text keeps them.
    body = RE_RTF_PRE
        .replace_all(&body, |c: &Captures| {
            format!("{{\\f1 {}}}\\par ", c[1].replace('\n', "\\line "))
        })
        .into_owned();

    for (re, size) in RE_RTF_HEADINGS.iter() {
        body = re
            .replace_all(&body, |c: &Captures| format!("\\fs{size}\\b {}\\b0\\fs24\\par ", &c[1]))
            .into_owned();
    }
    for (re, rep) in RE_RTF_RULES.iter() {
        body = re.replace_all(&body, *rep).into_owned();
    }
    body = RE_TAG.replace_all(&body, "").into_owned();
    body = RE_ENTITY.replace_all(&body, rtf_entity).into_owned();

    let mut rtf = String::with_capacity(RTF_HEADER.len() + body.len() + 1);
    rtf.push_str(RTF_HEADER);
    rtf.push_str(body.trim_end_matches("\\line ").trim());
    rtf.push('}');
    rtf
}
