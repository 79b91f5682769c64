use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::Session;
use crate::error::ReportError;
use crate::executor::PipelineResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Output,
    Failure,
    NotRun,
}

/// JSON summary of the last execution of a session.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub command_line: String,
    pub generation: u64,
    pub status: RunStatus,
    pub failed_stage: Option<usize>,
    pub message: Option<String>,
    pub pipestatus: Vec<i32>,
    pub output_bytes: usize,
    pub source_bytes: usize,
    pub elapsed_ms: u64,
    pub timed_out: bool,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn from_session(session: &Session) -> Self {
        let mut report = RunReport {
            command_line: session.command_line.clone(),
            generation: session.generation,
            status: RunStatus::NotRun,
            failed_stage: None,
            message: None,
            pipestatus: Vec::new(),
            output_bytes: 0,
            source_bytes: session.source.len(),
            elapsed_ms: 0,
            timed_out: false,
            finished_at: Utc::now(),
        };
        if let Some(exec) = &session.last {
            report.pipestatus = exec.pipestatus.clone();
            report.elapsed_ms = exec.elapsed_ms;
            report.timed_out = exec.timed_out;
            match &exec.result {
                PipelineResult::Output(bytes) => {
                    report.status = RunStatus::Output;
                    report.output_bytes = bytes.len();
                }
                PipelineResult::Failure(failure) => {
                    report.status = RunStatus::Failure;
                    report.failed_stage = failure.stage;
                    report.message = Some(failure.message.clone());
                }
            }
        }
        report
    }
}

pub fn write_report(path: &Path, report: &RunReport) -> Result<(), ReportError> {
    let json = serde_json::to_string(report)?;
    fs::write(path, json).map_err(|source| ReportError::Write {
        path: path.display().to_string(),
        source,
    })
}
