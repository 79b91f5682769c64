//! Command-line derivation: split on unquoted pipes, then tokenize each
//! segment into argv.

pub mod split;
pub mod tokenize;

pub use split::split_segments;
pub use tokenize::tokenize;

use crate::error::PipelineError;

/// One `|`-delimited unit of a command line, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Trimmed source text, used in failure messages.
    pub text: String,
    pub program: String,
    pub args: Vec<String>,
}

/// Derive the full pipeline for a command line.
///
/// An empty `Vec` means the line was blank.
pub fn parse(line: &str) -> Result<Vec<Segment>, PipelineError> {
    split_segments(line)?
        .iter()
        .enumerate()
        .map(|(index, text)| tokenize(text).map_err(|source| PipelineError::Tokenize { index, source }))
        .collect()
}
