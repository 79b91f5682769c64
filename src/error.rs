//! Error types for pipeline derivation, execution and reporting.

use std::io;

use thiserror::Error;

/// Failure to split a command line into segments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformatted command string: mismatched quotes {opened} & {attempted}")]
    MismatchedQuote { opened: char, attempted: char },

    #[error("malformatted command string: unclosed quote {quote}")]
    UnterminatedQuote { quote: char },

    #[error("Syntax error: missing command between pipes")]
    EmptySegment,
}

/// Failure to turn one segment into argv.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to parse command {segment}: {detail}")]
pub struct TokenizeError {
    pub segment: String,
    pub detail: String,
}

/// Why a single stage did not succeed.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("exit status {0}")]
    Exit(i32),

    #[error("terminated by signal {0}")]
    Signaled(i32),

    #[error("timed out after {0}s")]
    TimedOut(u64),

    #[error("wait: {0}")]
    Wait(#[source] io::Error),
}

/// Any failure that turns an invocation into `PipelineResult::Failure`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{source}")]
    Tokenize {
        index: usize,
        #[source]
        source: TokenizeError,
    },

    /// `message` is the stage's trimmed stderr, or the `StageError` text when
    /// stderr was empty.
    #[error("Error: Command '{segment}' failed. {message}")]
    Stage {
        index: usize,
        segment: String,
        message: String,
    },
}

impl PipelineError {
    /// Index of the segment the failure is attributed to, if any.
    pub fn stage(&self) -> Option<usize> {
        match self {
            PipelineError::Parse(_) => None,
            PipelineError::Tokenize { index, .. } | PipelineError::Stage { index, .. } => {
                Some(*index)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine channel closed")]
    Disconnected,

    #[error("spawn worker thread: {0}")]
    Worker(#[source] io::Error),
}
