//! Stage-by-stage pipeline execution.
//!
//! Each segment runs as its own process. Output is fully buffered before the
//! next stage starts, so stage i+1 always sees the complete stdout of stage i.

use std::borrow::Cow;
use std::io::{Read, Write};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{PipelineError, StageError};
use crate::pipeline::{self, Segment};

/// Outcome of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineResult {
    Output(Vec<u8>),
    Failure(Failure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// Segment the failure belongs to; `None` for whole-line parse errors.
    pub stage: Option<usize>,
    pub message: String,
}

impl From<PipelineError> for Failure {
    fn from(err: PipelineError) -> Self {
        Failure {
            stage: err.stage(),
            message: err.to_string(),
        }
    }
}

impl PipelineResult {
    pub fn is_output(&self) -> bool {
        matches!(self, PipelineResult::Output(_))
    }

    pub fn output_text(&self) -> Option<Cow<'_, str>> {
        match self {
            PipelineResult::Output(bytes) => Some(String::from_utf8_lossy(bytes)),
            PipelineResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            PipelineResult::Failure(f) => Some(f),
            PipelineResult::Output(_) => None,
        }
    }
}

/// A finished invocation plus the bookkeeping that goes into run reports.
#[derive(Debug, Clone)]
pub struct Execution {
    pub result: PipelineResult,
    /// Exit code per stage that ran, in order. 127 marks a stage that never
    /// launched; 128+N a stage killed by signal N.
    pub pipestatus: Vec<i32>,
    pub elapsed_ms: u64,
    pub timed_out: bool,
}

#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Per-stage limit. `None` waits forever.
    pub timeout: Option<Duration>,
    pub poll_interval: Duration,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl ExecOptions {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            timeout: (cfg.stage_timeout_secs > 0)
                .then(|| Duration::from_secs(cfg.stage_timeout_secs)),
            poll_interval: Duration::from_millis(cfg.wait_poll_ms.max(1)),
        }
    }
}

/// Parse and execute a raw command line against `input`.
pub fn run_command_line(line: &str, input: &[u8], opts: &ExecOptions) -> Execution {
    match pipeline::parse(line) {
        Ok(segments) => execute(&segments, input, opts),
        Err(err) => {
            debug!(error = %err, "command line rejected");
            Execution {
                result: PipelineResult::Failure(err.into()),
                pipestatus: Vec::new(),
                elapsed_ms: 0,
                timed_out: false,
            }
        }
    }
}

/// Run `segments` in order, feeding `input` to the first one.
///
/// No segments means the identity pipeline: `input` comes back unchanged.
pub fn execute(segments: &[Segment], input: &[u8], opts: &ExecOptions) -> Execution {
    let start = Instant::now();
    let mut pipestatus = Vec::with_capacity(segments.len());
    let mut timed_out = false;
    let mut data = input.to_vec();
    let mut result = None;

    for (index, segment) in segments.iter().enumerate() {
        let captured = match run_stage(segment, std::mem::take(&mut data), opts) {
            Ok(child) => child.finish(opts),
            Err(err) => {
                pipestatus.push(127);
                result = Some(stage_failure(index, segment, &[], err));
                break;
            }
        };
        pipestatus.push(captured.code);
        if let Some(err) = captured.error {
            timed_out = matches!(err, StageError::TimedOut(_));
            result = Some(stage_failure(index, segment, &captured.stderr, err));
            break;
        }
        debug!(stage = index, bytes = captured.stdout.len(), "stage ok");
        data = captured.stdout;
    }

    Execution {
        result: result.unwrap_or(PipelineResult::Output(data)),
        pipestatus,
        elapsed_ms: start.elapsed().as_millis() as u64,
        timed_out,
    }
}

fn stage_failure(index: usize, segment: &Segment, stderr: &[u8], err: StageError) -> PipelineResult {
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();
    let message = if stderr.is_empty() || matches!(err, StageError::TimedOut(_)) {
        err.to_string()
    } else {
        stderr.to_string()
    };
    debug!(stage = index, segment = %segment.text, "stage failed: {}", message);
    PipelineResult::Failure(
        PipelineError::Stage {
            index,
            segment: segment.text.clone(),
            message,
        }
        .into(),
    )
}

/// A spawned stage with its I/O threads attached.
struct RunningStage {
    child: Child,
    stdin: Option<JoinHandle<()>>,
    stdout: Option<JoinHandle<Vec<u8>>>,
    stderr: Option<JoinHandle<Vec<u8>>>,
}

struct Captured {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    code: i32,
    error: Option<StageError>,
}

fn run_stage(
    segment: &Segment,
    input: Vec<u8>,
    opts: &ExecOptions,
) -> Result<RunningStage, StageError> {
    let mut command = Command::new(&segment.program);
    command
        .args(&segment.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if opts.timeout.is_some() {
        // Own process group so a timeout can kill the stage's children too.
        // Without a timeout the stage stays in ours and keeps terminal signals.
        unsafe {
            command.pre_exec(|| {
                libc::setpgid(0, 0);
                Ok(())
            });
        }
    }

    let mut child = command.spawn().map_err(|source| StageError::Launch {
        program: segment.program.clone(),
        source,
    })?;
    debug!(pid = child.id(), program = %segment.program, "stage spawned");

    // Writer and readers must run concurrently: a stage may fill its stdout
    // pipe before it has consumed all of stdin.
    let stdin = child.stdin.take().map(|mut pipe| {
        thread::spawn(move || {
            // EPIPE just means the stage stopped reading early
            let _ = pipe.write_all(&input);
        })
    });
    let stdout = child.stdout.take().map(|pipe| thread::spawn(move || drain(pipe)));
    let stderr = child.stderr.take().map(|pipe| thread::spawn(move || drain(pipe)));

    Ok(RunningStage {
        child,
        stdin,
        stdout,
        stderr,
    })
}

impl RunningStage {
    fn finish(mut self, opts: &ExecOptions) -> Captured {
        let waited = wait_child(&mut self.child, opts);

        if let Some(handle) = self.stdin {
            let _ = handle.join();
        }
        let stdout = self
            .stdout
            .map(|h| h.join().unwrap_or_default())
            .unwrap_or_default();
        let stderr = self
            .stderr
            .map(|h| h.join().unwrap_or_default())
            .unwrap_or_default();

        let (code, error) = match waited {
            Ok(status) => classify(status),
            Err(err) => (-1, Some(err)),
        };
        Captured {
            stdout,
            stderr,
            code,
            error,
        }
    }
}

fn drain<R: Read>(mut pipe: R) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf) {
        debug!("pipe read ended early: {}", e);
    }
    buf
}

fn classify(status: ExitStatus) -> (i32, Option<StageError>) {
    if status.success() {
        return (0, None);
    }
    match (status.code(), status.signal()) {
        (Some(code), _) => (code, Some(StageError::Exit(code))),
        (None, Some(sig)) => (128 + sig, Some(StageError::Signaled(sig))),
        (None, None) => (-1, Some(StageError::Exit(-1))),
    }
}

fn wait_child(child: &mut Child, opts: &ExecOptions) -> Result<ExitStatus, StageError> {
    let Some(timeout) = opts.timeout else {
        return child.wait().map_err(StageError::Wait);
    };

    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if start.elapsed() >= timeout {
                    // Kill entire process group (stage + its subprocesses)
                    let pgid = Pid::from_raw(child.id() as i32);
                    if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                        warn!(pid = child.id(), "killpg failed: {}", e);
                        let _ = child.kill();
                    }
                    let _ = child.wait();
                    return Err(StageError::TimedOut(timeout.as_secs()));
                }
                thread::sleep(opts.poll_interval);
            }
            Err(e) => return Err(StageError::Wait(e)),
        }
    }
}
