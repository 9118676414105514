// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

//! Translation of CQL masking into SQL `LIKE` patterns.
//!
//! | CQL | Pattern | Meaning |
//! |-----|---------|---------|
//! | `*` | `%` | any run of characters |
//! | `?` | `_` | exactly one character |
//! | `\*`, `\?` | `*`, `?` | the literal character |
//! | `%`, `_`, `\` | `\%`, `\_`, `\\` | escaped with [`LIKE_ESCAPE`] |
//!
//! `^` anchoring is not supported and is matched literally. Quotes need no
//! special handling: the pattern is a value, never spliced into query text.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Escape character used in every generated pattern.
pub const LIKE_ESCAPE: char = '\\';

/// A `LIKE` pattern that must match the whole value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LikePattern(String);

impl LikePattern {
    /// Translates a raw CQL term. With `masked == false` the masking
    /// characters are taken literally.
    pub fn from_cql(term: &str, masked: bool) -> Self {
        let mut pattern = String::with_capacity(term.len());
        let mut chars = term.chars();

        while let Some(ch) = chars.next() {
            match ch {
                '\\' => match chars.next() {
                    Some(escaped) => push_literal(&mut pattern, escaped),
                    None => push_literal(&mut pattern, '\\'),
                },
                '*' if masked => pattern.push('%'),
                '?' if masked => pattern.push('_'),
                other => push_literal(&mut pattern, other),
            }
        }

        Self(pattern)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Equivalent anchored regular expression.
    pub fn to_regex(&self) -> Result<Regex, regex::Error> {
        let mut body = String::with_capacity(self.0.len() * 2);
        let mut chars = self.0.chars();

        while let Some(ch) = chars.next() {
            match ch {
                LIKE_ESCAPE => {
                    if let Some(escaped) = chars.next() {
                        body.push_str(&regex::escape(escaped.encode_utf8(&mut [0; 4])));
                    }
                }
                '%' => body.push_str(".*"),
                '_' => body.push('.'),
                other => body.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
            }
        }

        Regex::new(&format!("(?s)^{}$", body))
    }

    /// Evaluates the pattern against a value in memory.
    pub fn matches(&self, candidate: &str) -> bool {
        self.to_regex()
            .map(|re| re.is_match(candidate))
            .unwrap_or(false)
    }
}

fn push_literal(pattern: &mut String, ch: char) {
    if matches!(ch, '%' | '_' | LIKE_ESCAPE) {
        pattern.push(LIKE_ESCAPE);
    }
    pattern.push(ch);
}

/// Drops CQL backslash escapes, for terms compared as plain values.
pub fn unescape(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    let mut chars = term.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            out.push(chars.next().unwrap_or('\\'));
        } else {
            out.push(ch);
        }
    }
    out
}
