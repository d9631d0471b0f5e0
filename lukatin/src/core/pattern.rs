//! Shell-style glob patterns, compiled to anchored regexes.
//!
//! `*` and `?` never cross `/`, `**` spans directories, `[...]` is a
//! character class (`[!...]` negates), and `{a,b}` is alternation.

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("empty glob pattern")]
    Empty,
    #[error("unclosed '{delimiter}' in glob pattern {pattern:?}")]
    Unclosed { delimiter: char, pattern: String },
    #[error("invalid glob pattern {pattern:?}: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone)]
pub struct GlobPattern {
    regex: Regex,
    /// Patterns without `/` are matched against the file name alone.
    name_only: bool,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }
        let translated = translate(pattern)?;
        let regex = Regex::new(&format!("^{translated}$")).map_err(|source| PatternError::Regex {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            regex,
            name_only: !pattern.contains('/'),
        })
    }

    /// `rel_path` is `/`-separated and relative to the search root.
    pub fn matches(&self, rel_path: &str) -> bool {
        if self.name_only {
            let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
            self.regex.is_match(name)
        } else {
            self.regex.is_match(rel_path)
        }
    }
}

fn translate(pattern: &str) -> Result<String, PatternError> {
    let unclosed = |delimiter| PatternError::Unclosed {
        delimiter,
        pattern: pattern.to_string(),
    };
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut chars = pattern.chars().peekable();
    let mut open_braces = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("(?:.*/)?");
                } else {
                    out.push_str(".*");
                }
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                out.push('[');
                if matches!(chars.peek(), Some('!' | '^')) {
                    chars.next();
                    out.push('^');
                }
                let mut closed = false;
                let mut first = true;
                for c in chars.by_ref() {
                    if c == ']' && !first {
                        closed = true;
                        break;
                    }
                    first = false;
                    if matches!(c, '\\' | '[' | ']' | '&' | '~') {
                        out.push('\\');
                    }
                    out.push(c);
                }
                if !closed {
                    return Err(unclosed('['));
                }
                out.push(']');
            }
            '{' => {
                open_braces += 1;
                out.push_str("(?:");
            }
            '}' if open_braces > 0 => {
                open_braces -= 1;
                out.push(')');
            }
            ',' if open_braces > 0 => out.push('|'),
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push_str(&regex::escape(escaped.encode_utf8(&mut [0; 4])));
                }
            }
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    if open_braces > 0 {
        return Err(unclosed('{'));
    }
    Ok(out)
}
