// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Guardrail text sanitiser for untrusted agent-supplied strings.
//!
//! Order matters: entities are decoded first so `&lt;script&gt;` cannot
//! smuggle markup past the tag stripper, then secrets are redacted, then
//! whitespace is collapsed.

use regex::Regex;

/// Replacement inserted where a secret was found.
const REDACTED: &str = "[redacted]";

/// Compiled sanitiser patterns.
pub struct Sanitizer {
    html_tag: Regex,
    bearer: Regex,
    api_key: Regex,
    aws_key: Regex,
    github_token: Regex,
}

impl Sanitizer {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            html_tag: Regex::new(r"<[^>]*>")?,
            bearer: Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]+")?,
            api_key: Regex::new(r"\bsk-[A-Za-z0-9_-]{16,}")?,
            aws_key: Regex::new(r"\b(AKIA|ASIA)[0-9A-Z]{16}\b")?,
            github_token: Regex::new(r"\bgh[pousr]_[A-Za-z0-9]{36,}\b")?,
        })
    }

    /// Sanitise one string: decode entities, strip HTML, redact secrets,
    /// collapse whitespace.
    pub fn clean(&self, input: &str) -> String {
        let decoded = decode_entities(input);
        let stripped = self.html_tag.replace_all(&decoded, " ");
        let redacted = self.bearer.replace_all(&stripped, REDACTED);
        let redacted = self.api_key.replace_all(&redacted, REDACTED);
        let redacted = self.aws_key.replace_all(&redacted, REDACTED);
        let redacted = self.github_token.replace_all(&redacted, REDACTED);
        redacted.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Decode the named HTML entities plus numeric `&#NN;` / `&#xHH;` forms.
///
/// Unknown or malformed entities pass through unchanged.
fn decode_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..semi];
        match decode_entity(entity) {
            Some(ch) => out.push(ch),
            None => out.push_str(&tail[..=semi]),
        }
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" | "#39" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = if let Some(hex) = entity.strip_prefix("#x").or(entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok()?
            } else {
                return None;
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
#[path = "sanitize_tests.rs"]
mod tests;
