//! Rich-text field transformation
//!
//! Dump attributes hold HTML that has itself been XML-escaped, so a post body
//! arrives as `&lt;p&gt;Hello&lt;/p&gt;`. The transformer turns that into Markdown
//! in three steps:
//!
//! 1. decode entities (HTML5 named entities and numeric character references);
//!    anything that is not a known entity stays as literal text
//! 2. drop NUL characters and references to code points no store accepts
//!    (NUL, surrogates, values past U+10FFFF)
//! 3. convert the HTML to Markdown with ATX headings and backtick code fences
//!
//! A failure in step 3 is a [`TransformFault`]. It never escapes
//! [`FieldTransformer::markup`]: the caller gets the decoded and cleaned text
//! back with `failed` set, and stores that instead.

use htmd::options::{CodeBlockFence, CodeBlockStyle, HeadingStyle, Options};
use htmd::HtmlToMarkdown;
use quick_xml::escape::resolve_html5_entity;
use regex::Regex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

/// Default limit on element nesting handed to the converter
pub const DEFAULT_MAX_MARKUP_DEPTH: usize = 512;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Reasons a rich-text conversion falls back to its input
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransformFault {
    #[error("markup nested {depth} levels deep (limit {limit})")]
    TooDeep { depth: usize, limit: usize },

    #[error("converter error: {0}")]
    Converter(String),

    #[error("converter panicked")]
    Panicked,
}

/// Result of a rich-text transformation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transformed {
    pub text: String,
    pub failed: bool,
    pub fault: Option<TransformFault>,
}

/// HTML to Markdown converter for rich-text attributes
pub struct FieldTransformer {
    converter: HtmlToMarkdown,
    max_depth: usize,
}

impl Default for FieldTransformer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MARKUP_DEPTH)
    }
}

impl FieldTransformer {
    pub fn new(max_depth: usize) -> Self {
        let converter = HtmlToMarkdown::builder()
            .options(Options {
                heading_style: HeadingStyle::Atx,
                code_block_style: CodeBlockStyle::Fenced,
                code_block_fence: CodeBlockFence::Backticks,
                ..Default::default()
            })
            .build();

        Self {
            converter,
            max_depth,
        }
    }

    /// Convert an encoded HTML attribute value to Markdown. Never fails.
    pub fn markup(&self, raw: &str) -> Transformed {
        let html = remove_nul(&decode_entities(&strip_invalid_char_refs(raw)));

        let depth = markup_depth(&html);
        if depth > self.max_depth {
            return fallback(
                html,
                TransformFault::TooDeep {
                    depth,
                    limit: self.max_depth,
                },
            );
        }

        let converted = panic::catch_unwind(AssertUnwindSafe(|| self.converter.convert(&html)));
        match converted {
            Ok(Ok(markdown)) => Transformed {
                text: normalize_fences(&remove_nul(&markdown)),
                failed: false,
                fault: None,
            },
            Ok(Err(e)) => fallback(html, TransformFault::Converter(e.to_string())),
            Err(_) => fallback(html, TransformFault::Panicked),
        }
    }
}

fn fallback(text: String, fault: TransformFault) -> Transformed {
    debug!(%fault, "rich-text conversion fell back to decoded input");
    Transformed {
        text,
        failed: true,
        fault: Some(fault),
    }
}

/// Decode and clean a plain-text attribute (titles, names, dates).
pub fn plain_text(raw: &str) -> String {
    remove_nul(&decode_entities(&strip_invalid_char_refs(raw)))
}

/// Convert a tag-list attribute to a comma-separated list.
///
/// Handles both the bracketed form (`&lt;c#&gt;&lt;.net&gt;` → `c#, .net`) and the
/// pipe form used by newer dumps (`|c#|.net|` → `c#, .net`).
pub fn tag_list(raw: &str) -> String {
    let decoded = plain_text(raw);

    let bracketed: Vec<&str> = tag_pattern()
        .captures_iter(&decoded)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|t| !t.is_empty())
        .collect();
    if !bracketed.is_empty() {
        return bracketed.join(", ");
    }

    if decoded.contains('|') {
        return decoded
            .split('|')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(", ");
    }

    decoded.trim().to_string()
}

/// Decode HTML5 named entities and numeric character references in one pass.
///
/// Stray ampersands and unknown names (`AT&T`, `&bogus;`) are kept as written.
pub fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    entity_pattern()
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            let code = if let Some(dec) = caps.get(1) {
                dec.as_str().parse::<u32>().ok()
            } else if let Some(hex) = caps.get(2) {
                u32::from_str_radix(hex.as_str(), 16).ok()
            } else {
                return resolve_html5_entity(&caps[3])
                    .map(str::to_string)
                    .unwrap_or_else(|| caps[0].to_string());
            };
            code.and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_default()
        })
        .into_owned()
}

/// Remove numeric character references to NUL, surrogates or out-of-range
/// code points.
pub fn strip_invalid_char_refs(raw: &str) -> String {
    if !raw.contains("&#") {
        return raw.to_string();
    }
    char_ref_pattern()
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            let digits = &caps[1];
            let code = match digits.strip_prefix(|c: char| c == 'x' || c == 'X') {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => digits.parse::<u32>().ok(),
            };
            match code.and_then(char::from_u32) {
                Some(c) if c != '\0' => caps[0].to_string(),
                _ => String::new(),
            }
        })
        .into_owned()
}

fn remove_nul(text: &str) -> String {
    if text.contains('\0') {
        text.replace('\0', "")
    } else {
        text.to_string()
    }
}

/// Deepest element nesting in an HTML fragment; void elements don't nest.
pub fn markup_depth(html: &str) -> usize {
    let mut depth = 0usize;
    let mut deepest = 0usize;
    for caps in html_tag_pattern().captures_iter(html) {
        let closing = caps.get(1).is_some();
        let self_closing = caps.get(3).is_some();
        let name = caps[2].to_ascii_lowercase();
        if VOID_ELEMENTS.contains(&name.as_str()) || self_closing {
            continue;
        }
        if closing {
            depth = depth.saturating_sub(1);
        } else {
            depth += 1;
            deepest = deepest.max(depth);
        }
    }
    deepest
}

/// Rewrite tilde fences to backtick fences.
fn normalize_fences(markdown: &str) -> String {
    fence_pattern().replace_all(markdown, "${1}```").into_owned()
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<([^<>]*)>").expect("tag pattern is valid"))
}

fn entity_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"&(?:#([0-9]+)|#[xX]([0-9A-Fa-f]+)|([A-Za-z][A-Za-z0-9]*));")
            .expect("entity pattern is valid")
    })
}

fn char_ref_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"&#([xX][0-9A-Fa-f]+|[0-9]+);").expect("char ref pattern is valid")
    })
}

fn html_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"<(/)?([A-Za-z][A-Za-z0-9]*)\b[^<>]*?(/)?>").expect("html tag pattern is valid")
    })
}

fn fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?m)^([ \t]*)~{3,}").expect("fence pattern is valid"))
}
