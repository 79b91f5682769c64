//! Live command-pipeline engine.
//!
//! A typed line such as `grep foo | sort | uniq -c` is split on unquoted
//! pipes, tokenized, and run stage by stage against an input buffer that may
//! keep growing while the pipeline is being edited.

pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod executor;
pub mod ingest;
pub mod pipeline;
pub mod report;

pub use engine::{Engine, EngineHandle, EngineOptions, ExecutionState, Presenter, Session};
pub use executor::{execute, run_command_line, ExecOptions, Execution, Failure, PipelineResult};
