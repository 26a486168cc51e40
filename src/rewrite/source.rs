// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Byte sources the pattern filters pull from.
//!
//! A [`ByteSource`] yields one byte per call, `Ok(None)` at end-of-stream and
//! an `io::Error` on failure.  Filters never lose state when their source
//! errors, so a source may report [`io::ErrorKind::WouldBlock`] to say "no
//! byte yet" and be polled again later.

use std::collections::VecDeque;
use std::io::{self, BufRead};

use bytes::{Buf, Bytes};

/// Pull-based producer of single bytes.
pub trait ByteSource {
    /// Return the next byte, `Ok(None)` once the source is exhausted.
    fn next_byte(&mut self) -> io::Result<Option<u8>>;
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        (**self).next_byte()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        (**self).next_byte()
    }
}

/// Adapts any buffered reader into a [`ByteSource`].
#[derive(Debug)]
pub struct ReadSource<R> {
    inner: R,
}

impl<R: BufRead> ReadSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: BufRead> ByteSource for ReadSource<R> {
    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = match self.inner.fill_buf()? {
            [] => return Ok(None),
            [first, ..] => *first,
        };
        self.inner.consume(1);
        Ok(Some(byte))
    }
}

/// A source that is fed chunk by chunk from the outside.
///
/// While it is empty but not yet [finished](ChunkFeed::finish) it reports
/// `WouldBlock`; after `finish` it drains what is left and then reports
/// end-of-stream forever.
#[derive(Debug, Default)]
pub struct ChunkFeed {
    chunks: VecDeque<Bytes>,
    finished: bool,
}

impl ChunkFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue another chunk of input.  Empty chunks are ignored.
    pub fn push(&mut self, chunk: Bytes) {
        if !chunk.is_empty() {
            self.chunks.push_back(chunk);
        }
    }

    /// Mark the input as complete.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of queued bytes not yet pulled.
    pub fn pending(&self) -> usize {
        self.chunks.iter().map(Bytes::len).sum()
    }
}

impl ByteSource for ChunkFeed {
    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        while let Some(front) = self.chunks.front_mut() {
            if front.has_remaining() {
                return Ok(Some(front.get_u8()));
            }
            self.chunks.pop_front();
        }

        if self.finished {
            Ok(None)
        } else {
            Err(io::ErrorKind::WouldBlock.into())
        }
    }
}
