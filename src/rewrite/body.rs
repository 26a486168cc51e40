// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Streaming adapter between an async chunk stream and a [`FilterChain`].
//!
//! Each upstream chunk is pushed into the chain's [`ChunkFeed`] and the
//! chain is drained until it needs more input.  Partial matches stay inside
//! the filters across chunk boundaries.

use std::error::Error as StdError;
use std::io;
use std::pin::Pin;

use bytes::{BufMut, Bytes, BytesMut};
use futures_util::stream::{self, Stream, StreamExt};

use super::chain::FilterChain;
use super::rules::RuleSet;
use super::source::{ByteSource, ChunkFeed};
use crate::trace_fmt;

/// Largest chunk handed downstream in one piece.
pub const OUTPUT_BUFFER_SIZE: usize = 8 * 1024;

type BoxError = Box<dyn StdError + Send + Sync>;

enum Drain {
    /// The output buffer filled up; more may be ready.
    Full,
    /// The feed is empty and waits for another chunk.
    NeedInput,
    /// The chain has reported end-of-stream.
    End,
}

struct RewriteState<S> {
    input: Pin<Box<S>>,
    chain: FilterChain<ChunkFeed>,
    done: bool,
}

/// Rewrite a stream of body chunks through every rule in `rules`.
pub fn rewrite_stream<S, E>(
    input: S,
    rules: &RuleSet,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + use<S, E>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    let chain = FilterChain::from_rules(ChunkFeed::new(), rules);
    rewrite_with_chain(input, chain)
}

/// Same as [`rewrite_stream`] with an already constructed chain.
pub fn rewrite_with_chain<S, E>(
    input: S,
    chain: FilterChain<ChunkFeed>,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
{
    let state = RewriteState {
        input: Box::pin(input),
        chain,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.done {
                return None;
            }

            match drain(&mut state.chain, OUTPUT_BUFFER_SIZE) {
                Ok((buf, status)) => {
                    if !buf.is_empty() {
                        return Some((Ok(buf.freeze()), state));
                    }
                    match status {
                        Drain::End => return None,
                        Drain::NeedInput | Drain::Full => {}
                    }
                }
                Err(e) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
            }

            match state.input.next().await {
                Some(Ok(chunk)) => {
                    trace_fmt!("Rewrite", "Feeding {} byte chunk", chunk.len());
                    state.chain.source_mut().push(chunk);
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(io::Error::other(e)), state));
                }
                None => state.chain.source_mut().finish(),
            }
        }
    })
}

/// Pull from the chain into a fresh buffer of at most `limit` bytes.
fn drain(chain: &mut FilterChain<ChunkFeed>, limit: usize) -> io::Result<(BytesMut, Drain)> {
    let mut buf = BytesMut::with_capacity(limit.min(chain.source_mut().pending().max(64)));
    while buf.len() < limit {
        match chain.next_byte() {
            Ok(Some(byte)) => buf.put_u8(byte),
            Ok(None) => return Ok((buf, Drain::End)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok((buf, Drain::NeedInput)),
            Err(e) => return Err(e),
        }
    }
    Ok((buf, Drain::Full))
}
