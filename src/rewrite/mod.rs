// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Streaming literal search-and-replace.
//!
//! This is the engine behind response rewriting.  It works on raw bytes,
//! matches literal patterns only, and never buffers more than one pattern's
//! worth of input per rule.
//!
//! ```rust
//! use replacer::rewrite::RuleSet;
//!
//! let rules = RuleSet::from_pairs([("origin.example.com", "cdn.example.com")]);
//! let out = rules.rewrite_str("http://origin.example.com/a.css").unwrap();
//! assert_eq!(out, "http://cdn.example.com/a.css");
//! ```
//!
//! | piece | role |
//! |-------|------|
//! | [`ByteSource`]   | pull one byte at a time |
//! | [`PatternFilter`] | one rule over one source |
//! | [`FilterChain`]  | every rule, in order, over one root source |
//! | [`rewrite_stream`] | drives a chain from an async chunk stream |

mod body;
mod chain;
pub mod error;
mod filter;
mod rules;
mod source;


pub use body::{rewrite_stream, rewrite_with_chain, OUTPUT_BUFFER_SIZE};
pub use chain::FilterChain;
pub use error::RuleError;
pub use filter::{FilterState, Matcher, PatternFilter};
pub use rules::{ReplacementRule, RuleSet};
pub use source::{ByteSource, ChunkFeed, ReadSource};
