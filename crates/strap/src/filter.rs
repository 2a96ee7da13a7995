//! Bundle eligibility of type names
//!
//! A type is eligible iff it matches no exclude pattern and at least one
//! include pattern. Excludes always win, and a name matching neither list is
//! rejected.

use regex::{Regex, RegexBuilder};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid type pattern `{pattern}`")]
pub struct PatternError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

#[derive(Debug, Clone, Default)]
pub struct ClassFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl ClassFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_patterns<I, E>(include: I, exclude: E) -> Result<Self, PatternError>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        let mut filter = Self::new();
        for pattern in include {
            filter.add_include_pattern(pattern.as_ref())?;
        }
        for pattern in exclude {
            filter.add_exclude_pattern(pattern.as_ref())?;
        }
        Ok(filter)
    }

    pub fn add_include_pattern(&mut self, pattern: &str) -> Result<&mut Self, PatternError> {
        self.include.push(compile_pattern(pattern)?);
        Ok(self)
    }

    pub fn add_exclude_pattern(&mut self, pattern: &str) -> Result<&mut Self, PatternError> {
        self.exclude.push(compile_pattern(pattern)?);
        Ok(self)
    }

    pub fn is_allowed(&self, type_name: &str) -> bool {
        if self.exclude.iter().any(|re| re.is_match(type_name)) {
            return false;
        }
        self.include.iter().any(|re| re.is_match(type_name))
    }

    pub fn include_patterns(&self) -> impl Iterator<Item = &str> {
        self.include.iter().map(Regex::as_str)
    }

    pub fn exclude_patterns(&self) -> impl Iterator<Item = &str> {
        self.exclude.iter().map(Regex::as_str)
    }
}

/// Compile a bare regex, or a delimited one such as `/^Vendor_/i`
///
/// Matching is case-sensitive and unanchored unless the pattern says otherwise.
fn compile_pattern(pattern: &str) -> Result<Regex, PatternError> {
    let (body, flags) = split_delimited(pattern).unwrap_or((pattern, ""));

    let mut builder = RegexBuilder::new(body);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            'U' => builder.swap_greed(true),
            _ => &mut builder,
        };
    }

    builder.build().map_err(|source| PatternError {
        pattern: pattern.to_owned(),
        source,
    })
}

fn split_delimited(pattern: &str) -> Option<(&str, &str)> {
    let delimiter = pattern.chars().next().filter(|c| "/#~!@%|".contains(*c))?;
    let close = pattern.rfind(delimiter).filter(|&i| i > 0)?;
    let flags = &pattern[close + 1..];
    flags
        .chars()
        .all(|c| "imsxuUD".contains(c))
        .then(|| (&pattern[1..close], flags))
}
