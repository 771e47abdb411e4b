//! Markup backend: CommonMark rendering and a rule-based HTML → Markdown pass.

use super::MarkupBackend;
use crate::backend::word::decode_entities;
use crate::error::BackendError;
use once_cell::sync::Lazy;
use pulldown_cmark::{html, Options, Parser};
use regex::{Captures, Regex};

/// [`MarkupBackend`] using `pulldown-cmark` for Markdown and regex rewriting
/// for HTML.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonMarkBackend;

fn markdown_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES
}

macro_rules! re {
    ($name:ident, $pat:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| Regex::new($pat).unwrap());
    };
}

re!(RE_DROP_BLOCKS, r"(?is)<(head|script|style|noscript)[^>]*>.*?</(head|script|style|noscript)>");
re!(RE_COMMENT, r"(?s)<!--.*?-->");
re!(RE_PRE, r"(?is)<pre[^>]*>(?:\s*<code[^>]*>)?(.*?)(?:</code>\s*)?</pre>");
re!(RE_CODE, r"(?is)<code[^>]*>(.*?)</code>");
re!(RE_STRONG, r"(?is)<(?:strong|b)(?:\s[^>]*)?>(.*?)</(?:strong|b)>");
re!(RE_EM, r"(?is)<(?:em|i)(?:\s[^>]*)?>(.*?)</(?:em|i)>");
re!(RE_DEL, r"(?is)<(?:del|s|strike)(?:\s[^>]*)?>(.*?)</(?:del|s|strike)>");
re!(RE_LINK, r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a>"#);
re!(RE_IMG, r#"(?is)<img\s[^>]*?src\s*=\s*["']([^"']*)["'][^>]*?>"#);
re!(RE_IMG_ALT, r#"(?is)alt\s*=\s*["']([^"']*)["']"#);
re!(RE_LI, r"(?is)<li(?:\s[^>]*)?>(.*?)</li>");
re!(RE_BLOCKQUOTE, r"(?is)<blockquote[^>]*>(.*?)</blockquote>");
re!(RE_BR, r"(?i)<br\s*/?>");
re!(RE_HR, r"(?i)<hr\s*/?>");
re!(RE_BLOCK_END, r"(?i)</(p|div|ul|ol|table|section|article|header|footer|h[1-6])>");
re!(RE_ROW_END, r"(?i)</tr>");
re!(RE_CELL_END, r"(?i)</t[dh]>");
re!(RE_ANY_TAG, r"(?s)<[^>]+>");
re!(RE_BLANK_RUN, r"\n[ \t]*\n(?:[ \t]*\n)+");
re!(RE_TRAILING_WS, r"(?m)[ \t]+$");

static RE_HEADINGS: Lazy<Vec<Regex>> = Lazy::new(|| {
    (1..=6)
        .map(|n| Regex::new(&format!(r"(?is)<h{n}(?:\s[^>]*)?>(.*?)</h{n}>")).unwrap())
        .collect()
});

fn inline_text(s: &str) -> String {
    RE_ANY_TAG.replace_all(s, "").trim().to_string()
}

/// Rewrite HTML into Markdown.
///
/// Covers headings, emphasis, code, links, images, lists, block quotes and
/// rules. Anything else is reduced to its text content.
pub fn html_to_markdown(input: &str) -> String {
    let mut s = RE_DROP_BLOCKS.replace_all(input, "").into_owned();
    s = RE_COMMENT.replace_all(&s, "").into_owned();

    s = RE_PRE
        .replace_all(&s, |c: &Captures| {
            format!("\n\n```\n{}\n```\n\n", RE_ANY_TAG.replace_all(&c[1], "").trim_end())
        })
        .into_owned();

    for (i, re) in RE_HEADINGS.iter().enumerate() {
        s = re
            .replace_all(&s, |c: &Captures| {
                format!("\n\n{} {}\n\n", "#".repeat(i + 1), inline_text(&c[1]))
            })
            .into_owned();
    }

    s = RE_CODE.replace_all(&s, "`$1`").into_owned();
    s = RE_STRONG.replace_all(&s, "**$1**").into_owned();
    s = RE_EM.replace_all(&s, "*$1*").into_owned();
    s = RE_DEL.replace_all(&s, "~~$1~~").into_owned();
    s = RE_IMG
        .replace_all(&s, |c: &Captures| {
            let alt = RE_IMG_ALT
                .captures(&c[0])
                .map(|a| a[1].to_string())
                .unwrap_or_default();
            format!("![{alt}]({})", &c[1])
        })
        .into_owned();
    s = RE_LINK
        .replace_all(&s, |c: &Captures| format!("[{}]({})", inline_text(&c[2]), &c[1]))
        .into_owned();
    s = RE_LI
        .replace_all(&s, |c: &Captures| format!("\n- {}", inline_text(&c[1])))
        .into_owned();
    s = RE_BLOCKQUOTE
        .replace_all(&s, |c: &Captures| {
            let body = inline_text(&c[1]);
            let quoted: Vec<String> = body.lines().map(|l| format!("> {}", l.trim())).collect();
            format!("\n\n{}\n\n", quoted.join("\n"))
        })
        .into_owned();
    s = RE_BR.replace_all(&s, "  \n").into_owned();
    s = RE_HR.replace_all(&s, "\n\n---\n\n").into_owned();
    s = RE_CELL_END.replace_all(&s, " | ").into_owned();
    s = RE_ROW_END.replace_all(&s, "\n").into_owned();
    s = RE_BLOCK_END.replace_all(&s, "\n\n").into_owned();
    s = RE_ANY_TAG.replace_all(&s, "").into_owned();

    let s = decode_entities(&s);
    let s = RE_TRAILING_WS.replace_all(&s, "");
    let s = RE_BLANK_RUN.replace_all(&s, "\n\n");
    let mut out = s.trim().to_string();
    out.push('\n');
    out
}

impl MarkupBackend for CommonMarkBackend {
    fn markdown_to_html(&self, markdown: &str) -> Result<String, BackendError> {
        let parser = Parser::new_ext(markdown, markdown_options());
        let mut out = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut out, parser);
        Ok(out)
    }

    fn html_to_markdown(&self, html: &str) -> Result<String, BackendError> {
        Ok(html_to_markdown(html))
    }
}
