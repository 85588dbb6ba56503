//! Glob-style URL patterns.
//!
//! A policy pattern is matched against the full URL string (scheme + host +
//! path + query), anchored at both ends:
//!
//! - `*` matches any run of characters not containing `/`
//! - `**` matches any run of characters including `/`
//! - every other character matches itself, case-sensitively
//!
//! Patterns are compiled once at load time. A pattern that fails to compile
//! is kept as never-matching so a bad policy degrades to "unreachable"
//! instead of taking the gateway down.

use regex::Regex;
use tracing::warn;

/// A compiled URL pattern.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    raw: String,
    regex: Option<Regex>,
}

impl UrlPattern {
    /// Compile a glob pattern. Never fails; an uncompilable pattern matches
    /// nothing and is reported with a warning.
    pub fn compile(pattern: &str) -> Self {
        let source = translate(pattern);
        let regex = match Regex::new(&source) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(
                    "failed to compile pattern '{}': {}; treating as never-matching",
                    pattern, e
                );
                None
            }
        };
        Self {
            raw: pattern.to_string(),
            regex,
        }
    }

    /// The pattern text as written in the policy file.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the full URL matches this pattern.
    pub fn matches(&self, url: &str) -> bool {
        match &self.regex {
            Some(re) => re.is_match(url),
            None => false,
        }
    }
}

/// Translate a glob into an anchored regex. Runs of two or more stars match
/// across `/`, a single star stays within one segment, everything else is
/// escaped literally.
fn translate(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '*' {
            let mut stars = 1;
            while chars.peek() == Some(&'*') {
                chars.next();
                stars += 1;
            }
            if stars >= 2 {
                out.push_str(".*");
            } else {
                out.push_str("[^/]*");
            }
        } else {
            match c {
                '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '\\' | '|' | '?' => {
                    out.push('\\');
                    out.push(c);
                }
                _ => out.push(c),
            }
        }
    }
    out.push('$');
    out
}
