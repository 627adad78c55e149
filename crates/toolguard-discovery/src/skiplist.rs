//! Skip-list matching: exact names and shell-style globs.
//!
//! A pattern without `/` is matched against the executable's file name; a
//! pattern containing `/` is matched against the full path. Glob syntax:
//! `*` (within one path segment), `**` (across segments), `?`, and
//! `[abc]` / `[!abc]` classes.

use crate::error::{DiscoveryError, Result};
use regex::Regex;
use std::path::Path;

#[derive(Debug)]
enum Rule {
    Exact(String),
    Name(Regex),
    Path(Regex),
}

/// Compiled skip-list.
#[derive(Debug, Default)]
pub struct SkipList {
    rules: Vec<Rule>,
}

impl SkipList {
    /// Compiles `patterns`.
    ///
    /// # Errors
    ///
    /// [`DiscoveryError::Pattern`] if a glob translates to an invalid regex
    /// (for example an unterminated `[` class).
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut rules = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let pattern = pattern.as_ref();
            if !pattern.contains(&['*', '?', '['][..]) {
                rules.push(Rule::Exact(pattern.to_string()));
                continue;
            }
            let regex = Regex::new(&glob_to_regex(pattern)).map_err(|source| {
                DiscoveryError::Pattern {
                    pattern: pattern.to_string(),
                    source,
                }
            })?;
            rules.push(if pattern.contains('/') {
                Rule::Path(regex)
            } else {
                Rule::Name(regex)
            });
        }
        Ok(Self { rules })
    }

    /// True if the executable `name` at `path` should be skipped.
    pub fn matches(&self, name: &str, path: &Path) -> bool {
        let full = path.to_string_lossy();
        self.rules.iter().any(|rule| match rule {
            Rule::Exact(p) if p.contains('/') => Path::new(p) == path,
            Rule::Exact(p) => p == name,
            Rule::Name(re) => re.is_match(name),
            Rule::Path(re) => re.is_match(&full),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2 + 2);
    out.push('^');
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str(".*");
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                out.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    out.push('^');
                }
                for c in chars.by_ref() {
                    if c == ']' {
                        out.push(']');
                        break;
                    }
                    if c == '\\' || c == '[' {
                        out.push('\\');
                    }
                    out.push(c);
                }
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    out
}
