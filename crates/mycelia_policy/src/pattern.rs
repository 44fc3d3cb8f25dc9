//! Path pattern matching.
//!
//! Patterns are '/'-separated segment lists. `*` matches exactly one segment;
//! a trailing `**` matches any remaining suffix, including an empty one. `**`
//! anywhere but last is rejected at parse time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pattern parse error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    /// `**` followed by more segments
    #[error("'**' must be the last segment of pattern '{0}'")]
    MisplacedRest(String),

    /// Empty segment, e.g. `a//b`
    #[error("Empty segment in pattern '{0}'")]
    EmptySegment(String),
}

/// One pattern segment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Must equal the path segment
    Exact(String),
    /// `*`, any single segment
    Any,
}

impl Segment {
    fn parse(raw: &str) -> Self {
        if raw == "*" {
            Self::Any
        } else {
            Self::Exact(raw.to_string())
        }
    }

    /// Check a single concrete segment
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == value,
            Self::Any => true,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(s) => f.write_str(s),
            Self::Any => f.write_str("*"),
        }
    }
}

/// Resource path pattern
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathPattern {
    segments: Vec<Segment>,
    /// Trailing `**`
    rest: bool,
}

impl PathPattern {
    /// Parse a pattern string
    ///
    /// The empty string is the zero-segment pattern and only matches the empty path.
    ///
    /// # Errors
    ///
    /// Returns error if `**` is not last or a segment is empty
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Ok(Self {
                segments: Vec::new(),
                rest: false,
            });
        }

        let raw: Vec<&str> = pattern.split('/').collect();
        let last = raw.len() - 1;
        let mut segments = Vec::with_capacity(raw.len());
        let mut rest = false;

        for (i, segment) in raw.into_iter().enumerate() {
            match segment {
                "" => return Err(PatternError::EmptySegment(pattern.to_string())),
                "**" if i == last => rest = true,
                "**" => return Err(PatternError::MisplacedRest(pattern.to_string())),
                other => segments.push(Segment::parse(other)),
            }
        }

        Ok(Self { segments, rest })
    }

    /// Pattern matching every path
    #[must_use]
    pub fn any() -> Self {
        Self {
            segments: Vec::new(),
            rest: true,
        }
    }

    /// Match a concrete path
    #[must_use]
    pub fn matches<S: AsRef<str>>(&self, path: &[S]) -> bool {
        let fixed = self.segments.len();
        let length_ok = if self.rest {
            path.len() >= fixed
        } else {
            path.len() == fixed
        };

        length_ok
            && self
                .segments
                .iter()
                .zip(path)
                .all(|(segment, value)| segment.matches(value.as_ref()))
    }

    /// Leading fixed segments
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether the pattern ends in `**`
    #[must_use]
    pub fn has_rest(&self) -> bool {
        self.rest
    }
}

/// Match `pattern` against `path`; a malformed pattern matches nothing.
#[must_use]
pub fn matches<S: AsRef<str>>(pattern: &str, path: &[S]) -> bool {
    PathPattern::parse(pattern).is_ok_and(|p| p.matches(path))
}

impl FromStr for PathPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PathPattern {
    type Error = PatternError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PathPattern> for String {
    fn from(pattern: PathPattern) -> Self {
        pattern.to_string()
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.segments.iter().map(ToString::to_string).collect();
        if self.rest {
            parts.push("**".to_string());
        }
        f.write_str(&parts.join("/"))
    }
}

/// Action pattern: an exact verb or `*`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ActionPattern(Segment);

impl ActionPattern {
    /// Pattern matching every action
    #[must_use]
    pub fn any() -> Self {
        Self(Segment::Any)
    }

    /// Pattern matching one action
    #[must_use]
    pub fn exact(action: impl Into<String>) -> Self {
        Self(Segment::Exact(action.into()))
    }

    /// Match a concrete action
    #[must_use]
    pub fn matches(&self, action: &str) -> bool {
        self.0.matches(action)
    }
}

impl From<&str> for ActionPattern {
    fn from(value: &str) -> Self {
        Self(Segment::parse(value))
    }
}

impl From<String> for ActionPattern {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<ActionPattern> for String {
    fn from(pattern: ActionPattern) -> Self {
        pattern.0.to_string()
    }
}

impl fmt::Display for ActionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
