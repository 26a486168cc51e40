// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for loading replacement rules.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or parsing a rules file.
///
/// All of these are fatal at startup; none can occur while serving.
#[derive(Error, Debug)]
pub enum RuleError {
    /// The rules file could not be opened or read.
    #[error("failed to read rules file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A line that is not of the form `match,replacement`.
    #[error("malformed rule on line {line}: expected 'match,replacement', got '{content}'")]
    Malformed { line: usize, content: String },

    /// Reading rules from an arbitrary reader failed.
    #[error("IO error: {0}")]
    Read(#[from] io::Error),

    /// No rules file was configured and no rules were supplied in code.
    #[error("no rules file configured (set `rewrite.rules_file`)")]
    NotConfigured,
}

impl RuleError {
    /// Create a malformed-line error.
    pub fn malformed<C: Into<String>>(line: usize, content: C) -> Self {
        Self::Malformed {
            line,
            content: content.into(),
        }
    }
}
