// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ordered composition of pattern filters.
//!
//! Stage `n` reads the output of stage `n - 1`; stage `0` reads the root
//! source.  The chain keeps the root reachable so an async driver can keep
//! feeding it while the stages hold partial matches.

use std::fmt;
use std::io::{self, Read};

use super::filter::{read_bytes, Matcher};
use super::rules::{ReplacementRule, RuleSet};
use super::source::ByteSource;

/// One [`Matcher`] per rule, stacked over a single root source.
#[derive(Debug)]
pub struct FilterChain<S> {
    stages: Vec<Matcher>,
    source: S,
    applied: Vec<String>,
}

impl<S: ByteSource> FilterChain<S> {
    /// A chain with no stages; reads straight through to `source`.
    pub fn new(source: S) -> Self {
        Self {
            stages: Vec::new(),
            source,
            applied: Vec::new(),
        }
    }

    /// Build a chain applying every rule of `rules`, in configuration order.
    pub fn from_rules(source: S, rules: &RuleSet) -> Self {
        rules
            .iter()
            .fold(Self::new(source), |chain, rule| chain.wrap(rule))
    }

    /// Put a new filter for `rule` on top of the current head.
    pub fn wrap(mut self, rule: &ReplacementRule) -> Self {
        self.stages
            .push(Matcher::new(rule.pattern().clone(), rule.replacement().clone()));
        self.applied.push(rule.to_string());
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[Matcher] {
        &self.stages
    }

    /// Descriptions of the applied rules, innermost first.
    pub fn applied_rules(&self) -> &[String] {
        &self.applied
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }
}

impl<S> fmt::Display for FilterChain<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.applied.is_empty() {
            return f.write_str("[passthrough]");
        }
        f.write_str(&self.applied.join(" / "))
    }
}

impl<S: ByteSource> ByteSource for FilterChain<S> {
    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        Upstream {
            stages: &mut self.stages,
            root: &mut self.source,
        }
        .next_byte()
    }
}

impl<S: ByteSource> Read for FilterChain<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        read_bytes(self, buf)
    }
}

/// The view a stage has of everything beneath it.
struct Upstream<'a, S: ?Sized> {
    stages: &'a mut [Matcher],
    root: &'a mut S,
}

impl<S: ByteSource + ?Sized> ByteSource for Upstream<'_, S> {
    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        match self.stages.split_last_mut() {
            Some((head, below)) => head.next_byte(&mut Upstream {
                stages: below,
                root: &mut *self.root,
            }),
            None => self.root.next_byte(),
        }
    }
}
