//! Node Paths
//!
//! Parses dotted/bracket path strings into an ordered list of segments and
//! renders them back in a single canonical form.
//!
//! ```text
//! src.app            -> ["src", "app"]
//! items[0].name      -> ["items", "0", "name"]
//! src["app.test.js"] -> ["src", "app.test.js"]
//! ```
//!
//! `a.0`, `a[0]` and `a["0"]` all denote the same path and render as `a[0]`.

use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

/// A parsed, canonical node path. The root path has no segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodePath {
    segments: Vec<String>,
}

impl NodePath {
    /// The empty (root) path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a path string. An empty string is the root path.
    pub fn parse(input: &str) -> CoreResult<Self> {
        Parser::new(input).parse()
    }

    /// Build a path from raw segments. Empty segments are rejected.
    pub fn from_segments<I, S>(segments: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(CoreError::validation("path contains an empty segment"));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The immediate parent, or `None` for the root.
    pub fn parent(&self) -> Option<NodePath> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Append one segment.
    pub fn child(&self, segment: impl Into<String>) -> CoreResult<NodePath> {
        let segment = segment.into();
        if segment.is_empty() {
            return Err(CoreError::validation("path contains an empty segment"));
        }
        let mut segments = self.segments.clone();
        segments.push(segment);
        Ok(Self { segments })
    }

    /// Concatenate a relative path onto this one.
    pub fn join(&self, relative: &NodePath) -> NodePath {
        let mut segments = self.segments.clone();
        segments.extend(relative.segments.iter().cloned());
        Self { segments }
    }

    /// Proper, non-root prefixes from shortest to longest.
    pub fn ancestors(&self) -> impl Iterator<Item = NodePath> + '_ {
        (1..self.segments.len()).map(move |n| Self {
            segments: self.segments[..n].to_vec(),
        })
    }

    /// Whether `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &NodePath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if is_index(segment) {
                write!(f, "[{}]", segment)?;
            } else if is_identifier(segment) {
                if i > 0 {
                    f.write_str(".")?;
                }
                f.write_str(segment)?;
            } else {
                f.write_str("[\"")?;
                for c in segment.chars() {
                    if c == '"' || c == '\\' {
                        f.write_str("\\")?;
                    }
                    write!(f, "{}", c)?;
                }
                f.write_str("\"]")?;
            }
        }
        Ok(())
    }
}

impl FromStr for NodePath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Canonical array index: digits without leading zeros.
fn is_index(segment: &str) -> bool {
    !segment.is_empty()
        && segment.bytes().all(|b| b.is_ascii_digit())
        && (segment == "0" || !segment.starts_with('0'))
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '-')
}

/// Strip leading zeros from an unquoted numeric segment.
fn normalize_index(digits: &str) -> String {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

struct Parser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn parse(mut self) -> CoreResult<NodePath> {
        let mut segments = Vec::new();
        if self.chars.is_empty() {
            return Ok(NodePath { segments });
        }

        loop {
            match self.peek() {
                Some('[') => segments.push(self.bracket()?),
                Some(_) => segments.push(self.dotted()?),
                None => return Err(self.empty_segment()),
            }

            match self.peek() {
                None => break,
                Some('.') => {
                    self.pos += 1;
                    // A dot must be followed by a plain segment.
                    if matches!(self.peek(), None | Some('.') | Some('[')) {
                        return Err(self.empty_segment());
                    }
                }
                Some('[') => {}
                Some(c) => {
                    return Err(CoreError::parse(format!(
                        "unexpected '{}' at offset {} in path {:?}",
                        c, self.pos, self.input
                    )))
                }
            }
        }

        Ok(NodePath { segments })
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn empty_segment(&self) -> CoreError {
        CoreError::validation(format!(
            "empty segment at offset {} in path {:?}",
            self.pos, self.input
        ))
    }

    fn dotted(&mut self) -> CoreResult<String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            match c {
                '.' | '[' => break,
                ']' | '"' | '\'' => {
                    return Err(CoreError::parse(format!(
                        "unexpected '{}' at offset {} in path {:?}",
                        c, self.pos, self.input
                    )))
                }
                _ => self.pos += 1,
            }
        }
        if self.pos == start {
            return Err(self.empty_segment());
        }
        let segment: String = self.chars[start..self.pos].iter().collect();
        if segment.bytes().all(|b| b.is_ascii_digit()) {
            Ok(normalize_index(&segment))
        } else {
            Ok(segment)
        }
    }

    fn bracket(&mut self) -> CoreResult<String> {
        self.pos += 1; // '['
        let segment = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let mut key = String::new();
                loop {
                    match self.peek() {
                        None => {
                            return Err(CoreError::parse(format!(
                                "unterminated quoted key in path {:?}",
                                self.input
                            )))
                        }
                        Some('\\') => {
                            self.pos += 1;
                            match self.peek() {
                                Some(escaped) => {
                                    key.push(escaped);
                                    self.pos += 1;
                                }
                                None => {
                                    return Err(CoreError::parse(format!(
                                        "dangling escape in path {:?}",
                                        self.input
                                    )))
                                }
                            }
                        }
                        Some(c) if c == quote => {
                            self.pos += 1;
                            break;
                        }
                        Some(c) => {
                            key.push(c);
                            self.pos += 1;
                        }
                    }
                }
                key
            }
            _ => {
                let start = self.pos;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.pos += 1;
                }
                if self.pos == start {
                    return Err(CoreError::parse(format!(
                        "expected an index or quoted key at offset {} in path {:?}",
                        self.pos, self.input
                    )));
                }
                let digits: String = self.chars[start..self.pos].iter().collect();
                normalize_index(&digits)
            }
        };

        if self.peek() != Some(']') {
            return Err(CoreError::parse(format!(
                "expected ']' at offset {} in path {:?}",
                self.pos, self.input
            )));
        }
        self.pos += 1;

        if segment.is_empty() {
            return Err(self.empty_segment());
        }
        Ok(segment)
    }
}
