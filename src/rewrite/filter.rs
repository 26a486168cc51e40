// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The pattern filter: one literal search-and-replace rule over a byte stream.
//!
//! The [`Matcher`] is an explicit three-state machine.  It never holds more
//! than `pattern.len()` bytes of lookahead and never recurses, so a long run
//! of near-matches costs constant stack.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read};

use bytes::Bytes;

use super::source::ByteSource;

/// What currently drives the filter's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    /// Reading from the source, possibly part-way through a match.
    Passthrough,
    /// A partial match failed; the consumed bytes are being handed back.
    ReplayingBuffer,
    /// A full match was confirmed; the replacement is being emitted from
    /// the given offset.
    EmittingReplacement(usize),
}

/// Source-independent matching state for a single rule.
#[derive(Clone)]
pub struct Matcher {
    pattern: Bytes,
    replacement: Bytes,
    lookahead: VecDeque<u8>,
    state: FilterState,
}

impl Matcher {
    pub fn new(pattern: impl Into<Bytes>, replacement: impl Into<Bytes>) -> Self {
        let pattern = pattern.into();
        Self {
            lookahead: VecDeque::with_capacity(pattern.len()),
            pattern,
            replacement: replacement.into(),
            state: FilterState::Passthrough,
        }
    }

    pub fn pattern(&self) -> &[u8] {
        &self.pattern
    }

    pub fn replacement(&self) -> &[u8] {
        &self.replacement
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    /// Bytes read from the source but not yet returned or replaced.
    pub fn lookahead_len(&self) -> usize {
        self.lookahead.len()
    }

    /// Produce the next output byte, pulling from `source` as needed.
    ///
    /// Errors from `source` are returned unchanged and leave the matcher
    /// where it was, so the call can simply be repeated.
    pub fn next_byte<S: ByteSource + ?Sized>(&mut self, source: &mut S) -> io::Result<Option<u8>> {
        loop {
            match self.state {
                FilterState::EmittingReplacement(pos) => {
                    if let Some(&byte) = self.replacement.get(pos) {
                        if pos + 1 == self.replacement.len() {
                            self.finish_replacement();
                        } else {
                            self.state = FilterState::EmittingReplacement(pos + 1);
                        }
                        return Ok(Some(byte));
                    }
                    // empty replacement: the match is simply dropped
                    self.finish_replacement();
                }
                FilterState::ReplayingBuffer => match self.lookahead.pop_front() {
                    Some(byte) => {
                        if self.lookahead.is_empty() {
                            self.state = FilterState::Passthrough;
                        }
                        return Ok(Some(byte));
                    }
                    None => self.state = FilterState::Passthrough,
                },
                FilterState::Passthrough => {
                    if self.pattern.is_empty() {
                        return source.next_byte();
                    }

                    let Some(byte) = source.next_byte()? else {
                        if self.lookahead.is_empty() {
                            return Ok(None);
                        }
                        // source ended mid-match: hand back what we hold
                        self.state = FilterState::ReplayingBuffer;
                        continue;
                    };

                    if byte == self.pattern[self.lookahead.len()] {
                        self.lookahead.push_back(byte);
                        if self.lookahead.len() == self.pattern.len() {
                            self.state = FilterState::EmittingReplacement(0);
                        }
                    } else if self.lookahead.is_empty() {
                        return Ok(Some(byte));
                    } else {
                        self.lookahead.push_back(byte);
                        self.state = FilterState::ReplayingBuffer;
                    }
                }
            }
        }
    }

    fn finish_replacement(&mut self) {
        self.lookahead.clear();
        self.state = FilterState::Passthrough;
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("pattern", &String::from_utf8_lossy(&self.pattern))
            .field("replacement", &String::from_utf8_lossy(&self.replacement))
            .field("lookahead", &self.lookahead.len())
            .field("state", &self.state)
            .finish()
    }
}

/// A [`Matcher`] bundled with the source it reads from.
#[derive(Debug)]
pub struct PatternFilter<S> {
    matcher: Matcher,
    source: S,
}

impl<S: ByteSource> PatternFilter<S> {
    pub fn new(source: S, pattern: impl Into<Bytes>, replacement: impl Into<Bytes>) -> Self {
        Self {
            matcher: Matcher::new(pattern, replacement),
            source,
        }
    }

    pub fn state(&self) -> FilterState {
        self.matcher.state()
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }
}

impl<S: ByteSource> ByteSource for PatternFilter<S> {
    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        self.matcher.next_byte(&mut self.source)
    }
}

impl<S: ByteSource> Read for PatternFilter<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        read_bytes(self, buf)
    }
}

/// Fill `buf` from a byte source.
///
/// A source error after some bytes were copied is deferred: the next call
/// asks the source again and reports it then.
pub(crate) fn read_bytes<S: ByteSource + ?Sized>(source: &mut S, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.next_byte() {
            Ok(Some(byte)) => {
                buf[filled] = byte;
                filled += 1;
            }
            Ok(None) => break,
            Err(e) if filled == 0 => return Err(e),
            Err(_) => break,
        }
    }
    Ok(filled)
}
