//! URL shape synthesis: turns a concrete query string into a pattern that
//! matches every URL with the same parameter layout.
//!
//! `?id=5&name=foo` becomes `^.*\?\w*=\w*\&\w*=\w*$`: word runs (ASCII letters,
//! digits, underscore) collapse to `\w*`, divider runs stay literal.

use super::urls::query_of;
use regex::Regex;
use std::fmt;

const WILDCARD: &str = r"\w*";

/// A synthesized, anchored shape pattern.
#[derive(Debug, Clone)]
pub struct UrlShape {
    body: String,
    regex: Regex,
}

impl UrlShape {
    /// Unanchored shape of the query string, e.g. `\w*=\w*\&\w*=\w*`.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Full pattern matched against stored URLs.
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(url)
    }
}

impl PartialEq for UrlShape {
    fn eq(&self, other: &Self) -> bool {
        self.body == other.body
    }
}

impl fmt::Display for UrlShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pattern())
    }
}

/// Why no shape could be synthesized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeRejection {
    NoQuery,
    /// No word run followed by a divider
    NoTokenPair,
    TooShort { len: usize, body: String },
    /// The synthesized pattern failed to compile
    Invalid(String),
}

impl fmt::Display for ShapeRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeRejection::NoQuery => f.write_str("url has no query string"),
            ShapeRejection::NoTokenPair => f.write_str("query has no word/divider pair"),
            ShapeRejection::TooShort { len, body } => {
                write!(f, "shape {body:?} too short ({len} chars)")
            }
            ShapeRejection::Invalid(e) => write!(f, "shape failed to compile: {e}"),
        }
    }
}

pub struct ShapeSynthesizer {
    min_len: usize,
}

impl ShapeSynthesizer {
    pub fn new(min_len: usize) -> Self {
        Self { min_len }
    }

    /// Shape of the query part of `url`.
    pub fn for_url(&self, url: &str) -> Result<UrlShape, ShapeRejection> {
        let query = query_of(url).ok_or(ShapeRejection::NoQuery)?;
        self.synthesize(&query)
    }

    /// Shape of a bare query string (without the leading `?`).
    pub fn synthesize(&self, query: &str) -> Result<UrlShape, ShapeRejection> {
        let runs = split_runs(query);

        // Needs at least one word run that is followed by a divider.
        let has_pair = runs
            .windows(2)
            .any(|w| matches!((w[0], w[1]), (Run::Word(_), Run::Divider(_))));
        if !has_pair {
            return Err(ShapeRejection::NoTokenPair);
        }

        // Length is measured on the layout before dividers are escaped.
        let mut body = String::new();
        let mut layout_len = 0;
        for run in &runs {
            match run {
                Run::Word(_) => {
                    body.push_str(WILDCARD);
                    layout_len += WILDCARD.len();
                }
                Run::Divider(d) => {
                    body.push_str(&regex::escape(d));
                    layout_len += d.len();
                }
            }
        }

        if layout_len < self.min_len {
            return Err(ShapeRejection::TooShort {
                len: layout_len,
                body,
            });
        }

        let regex = Regex::new(&format!(r"^.*\?{body}$"))
            .map_err(|e| ShapeRejection::Invalid(e.to_string()))?;
        Ok(UrlShape { body, regex })
    }
}

impl Default for ShapeSynthesizer {
    fn default() -> Self {
        Self::new(10)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Run<'a> {
    Word(&'a str),
    Divider(&'a str),
}

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Alternating word/divider runs, in order.
fn split_runs(s: &str) -> Vec<Run<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut current: Option<bool> = None;
    for (i, c) in s.char_indices() {
        let w = is_word(c);
        match current {
            Some(prev) if prev == w => {}
            Some(prev) => {
                out.push(make_run(&s[start..i], prev));
                start = i;
                current = Some(w);
            }
            None => current = Some(w),
        }
    }
    if let Some(prev) = current {
        out.push(make_run(&s[start..], prev));
    }
    out
}

fn make_run(text: &str, word: bool) -> Run<'_> {
    if word {
        Run::Word(text)
    } else {
        Run::Divider(text)
    }
}
