// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Replacement rules and the line-oriented rules file.
//!
//! ```text
//! seattletimes.nwsource.com,d1.seattletimes.nwsource.com
//! #top,#content
//! ```
//!
//! One `match,replacement` pair per line.  Commas cannot be escaped and
//! there is no comment syntax: every non-blank line is a rule, so `#top`
//! above is a literal pattern.  Blank lines are skipped.

use std::fmt;
use std::fs;
use std::io::{self, BufRead, Read};
use std::path::Path;

use bytes::Bytes;

use super::chain::FilterChain;
use super::error::RuleError;
use super::source::ReadSource;
use crate::{debug_fmt, warn_fmt};

/// A literal `(match, replacement)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementRule {
    pattern: Bytes,
    replacement: Bytes,
}

impl ReplacementRule {
    pub fn new(pattern: impl Into<Bytes>, replacement: impl Into<Bytes>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }

    pub fn pattern(&self) -> &Bytes {
        &self.pattern
    }

    pub fn replacement(&self) -> &Bytes {
        &self.replacement
    }

    /// Rules with an empty pattern never change anything.
    pub fn is_noop(&self) -> bool {
        self.pattern.is_empty()
    }
}

impl fmt::Display for ReplacementRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}/{}]",
            String::from_utf8_lossy(&self.pattern),
            String::from_utf8_lossy(&self.replacement)
        )
    }
}

/// Ordered rules with unique patterns.
///
/// Iteration follows insertion order, which is also the order the filters
/// are stacked in, so earlier rules see the raw input and later rules see
/// the output of earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<ReplacementRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a rule set from `(match, replacement)` pairs.
    pub fn from_pairs<I, P, R>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (P, R)>,
        P: Into<Bytes>,
        R: Into<Bytes>,
    {
        let mut rules = Self::new();
        for (pattern, replacement) in pairs {
            rules.insert(pattern, replacement);
        }
        rules
    }

    /// Add a rule.  If the pattern is already present its replacement is
    /// swapped in place and the previous one returned.
    pub fn insert(&mut self, pattern: impl Into<Bytes>, replacement: impl Into<Bytes>) -> Option<Bytes> {
        let rule = ReplacementRule::new(pattern, replacement);
        match self.rules.iter_mut().find(|r| r.pattern == rule.pattern) {
            Some(existing) => Some(std::mem::replace(&mut existing.replacement, rule.replacement)),
            None => {
                self.rules.push(rule);
                None
            }
        }
    }

    pub fn get(&self, pattern: &[u8]) -> Option<&Bytes> {
        self.rules
            .iter()
            .find(|r| r.pattern.as_ref() == pattern)
            .map(|r| &r.replacement)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ReplacementRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Load rules from a file on disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RuleError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let rules = Self::parse(&content)?;
        debug_fmt!("Rules", "Loaded {} rule(s) from {}", rules.len(), path.display());
        Ok(rules)
    }

    /// Read rules from any buffered reader.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, RuleError> {
        let mut rules = Self::new();
        for (index, line) in reader.lines().enumerate() {
            rules.add_line(index + 1, &line?)?;
        }
        Ok(rules)
    }

    /// Parse the contents of a rules file.
    pub fn parse(content: &str) -> Result<Self, RuleError> {
        let mut rules = Self::new();
        for (index, line) in content.lines().enumerate() {
            rules.add_line(index + 1, line)?;
        }
        Ok(rules)
    }

    fn add_line(&mut self, number: usize, raw: &str) -> Result<(), RuleError> {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.trim().is_empty() {
            return Ok(());
        }

        let Some((pattern, rest)) = line.split_once(',') else {
            return Err(RuleError::malformed(number, line));
        };
        let replacement = match rest.split_once(',') {
            Some((replacement, extra)) => {
                warn_fmt!("Rules", "Line {}: ignoring extra fields '{}'", number, extra);
                replacement
            }
            None => rest,
        };

        if pattern.is_empty() {
            warn_fmt!("Rules", "Line {}: empty match, rule has no effect", number);
        }
        if self.insert(pattern.to_owned(), replacement.to_owned()).is_some() {
            warn_fmt!("Rules", "Line {}: duplicate match '{}', later replacement wins", number, pattern);
        }
        Ok(())
    }

    /// Run `input` through every rule, as a response body would be.
    pub fn rewrite_bytes(&self, input: &[u8]) -> io::Result<Vec<u8>> {
        let mut chain = FilterChain::from_rules(ReadSource::new(input), self);
        let mut output = Vec::with_capacity(input.len());
        chain.read_to_end(&mut output)?;
        Ok(output)
    }

    /// String form of [`RuleSet::rewrite_bytes`], used for header values.
    pub fn rewrite_str(&self, input: &str) -> io::Result<String> {
        let output = self.rewrite_bytes(input.as_bytes())?;
        String::from_utf8(output).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a ReplacementRule;
    type IntoIter = std::slice::Iter<'a, ReplacementRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
