//! Attribute extraction from dump lines
//!
//! Each record in a dump is a self-closing element on its own line:
//!
//! ```text
//! <row Id="1" PostTypeId="1" Score="5" Body="&lt;p&gt;Hello&lt;/p&gt;" />
//! ```
//!
//! [`extract`] finds the first such element on a line and returns its name and
//! attributes in source order. Values are returned exactly as written between the
//! quotes; entity decoding belongs to the field transformer.

use regex::Regex;
use std::sync::OnceLock;

fn element_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"<([A-Za-z_][\w.:-]*)((?:\s+[^\s=<>/"]+\s*=\s*"[^"]*")*)\s*/>"#)
            .expect("element pattern is valid")
    })
}

fn attribute_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"([^\s=<>/"]+)\s*=\s*"([^"]*)""#).expect("attribute pattern is valid")
    })
}

/// Ordered attribute mapping of one record line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    pairs: Vec<(String, String)>,
}

impl Attributes {
    /// Value of `name`; when an attribute is repeated the last occurrence wins.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A record element found on a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRow {
    /// Element name, `row` in standard dumps
    pub element: String,
    pub attributes: Attributes,
}

/// Extract the first record element from `line`.
///
/// Returns `None` for lines that carry no record: blank lines, XML declarations,
/// container open and close tags, and elements whose attribute list is malformed
/// (for instance an unterminated quote). Only the first element is considered
/// when a line holds several.
pub fn extract(line: &str) -> Option<ExtractedRow> {
    let captures = element_pattern().captures(line)?;
    let element = captures.get(1)?.as_str().to_string();
    let attributes = captures
        .get(2)
        .map(|m| {
            attribute_pattern()
                .captures_iter(m.as_str())
                .map(|c| (c[1].to_string(), c[2].to_string()))
                .collect()
        })
        .unwrap_or_default();

    Some(ExtractedRow {
        element,
        attributes,
    })
}
