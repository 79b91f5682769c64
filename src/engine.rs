//! Control loop: owns the source buffer, the command line and the display
//! state, and serializes pipeline executions.
//!
//! Triggers (`submit`, `ingest_chunk`) arrive as events from `EngineHandle`s.
//! At most one execution runs at a time. A trigger that lands while one is in
//! flight marks a rerun; when the in-flight result comes back, exactly one
//! fresh execution starts against the then-current command line and buffer.
//! Intermediate triggers are coalesced, so results reach the presenter in
//! trigger order and never overlap.
//!
//! Workers report on a separate channel the engine owns. Once every handle
//! is dropped, the loop finishes what is running or pending and returns.

use std::thread;

use crossbeam_channel::{never, select, unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::display::DisplayState;
use crate::error::EngineError;
use crate::executor::{run_command_line, ExecOptions, Execution, PipelineResult};

pub enum Event {
    Submit(String),
    Chunk(String),
    IngestClosed,
    Shutdown,
}

/// What a worker sends back when its execution is done.
struct Finished {
    generation: u64,
    execution: Execution,
}

/// Receives every result, on the control-loop thread.
pub trait Presenter {
    fn on_result(&mut self, result: &PipelineResult, display: &DisplayState);
}

impl<F> Presenter for F
where
    F: FnMut(&PipelineResult, &DisplayState),
{
    fn on_result(&mut self, result: &PipelineResult, display: &DisplayState) {
        self(result, display)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionState {
    Idle,
    Running { generation: u64 },
    Done(PipelineResult),
}

/// Cloneable entry point for the presentation layer and ingestion thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: Sender<Event>,
}

impl EngineHandle {
    /// Replace the command line and re-run it.
    pub fn submit(&self, line: impl Into<String>) -> Result<(), EngineError> {
        self.send(Event::Submit(line.into()))
    }

    /// Append to the source buffer and re-run the current command line.
    pub fn ingest_chunk(&self, text: impl Into<String>) -> Result<(), EngineError> {
        self.send(Event::Chunk(text.into()))
    }

    /// Mark the source buffer as frozen.
    pub fn close_ingest(&self) -> Result<(), EngineError> {
        self.send(Event::IngestClosed)
    }

    pub fn shutdown(&self) -> Result<(), EngineError> {
        self.send(Event::Shutdown)
    }

    fn send(&self, event: Event) -> Result<(), EngineError> {
        self.tx.send(event).map_err(|_| EngineError::Disconnected)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub exec: ExecOptions,
    /// Return from `run` once ingestion is closed and nothing is running or
    /// pending. Otherwise the loop ends on `Shutdown`, or once every handle
    /// is gone and nothing is running or pending.
    pub exit_when_settled: bool,
    pub show_line_numbers: bool,
}

/// Final engine state, handed back when the loop ends.
#[derive(Debug, Clone)]
pub struct Session {
    pub command_line: String,
    pub source: String,
    pub display: DisplayState,
    /// Generation of `last`; 0 if nothing ever ran.
    pub generation: u64,
    pub last: Option<Execution>,
}

pub struct Engine<P: Presenter> {
    options: EngineOptions,
    presenter: P,
    events: Receiver<Event>,
    done_tx: Sender<Finished>,
    done_rx: Receiver<Finished>,
    source: String,
    command_line: String,
    state: ExecutionState,
    rerun_pending: bool,
    generation: u64,
    ingest_closed: bool,
    handles_gone: bool,
    display: DisplayState,
    last: Option<Execution>,
}

impl<P: Presenter> Engine<P> {
    /// Build an engine and the first handle to it. Clone the handle for
    /// more producers.
    pub fn new(presenter: P, options: EngineOptions) -> (Self, EngineHandle) {
        let (tx, events) = unbounded();
        let (done_tx, done_rx) = unbounded();
        let display = DisplayState::new(options.show_line_numbers);
        let engine = Self {
            options,
            presenter,
            events,
            done_tx,
            done_rx,
            source: String::new(),
            command_line: String::new(),
            state: ExecutionState::Idle,
            rerun_pending: false,
            generation: 0,
            ingest_closed: false,
            handles_gone: false,
            display,
            last: None,
        };
        (engine, EngineHandle { tx })
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    fn is_quiet(&self) -> bool {
        self.state == ExecutionState::Idle && !self.rerun_pending
    }

    fn should_exit(&self) -> bool {
        let settled = self.options.exit_when_settled && self.ingest_closed;
        (settled || self.handles_gone) && self.is_quiet()
    }

    /// Drive the loop on the current thread until shutdown, until every
    /// handle is dropped, or until settled if configured.
    pub fn run(mut self) -> Result<Session, EngineError> {
        let closed = never();
        let done_rx = self.done_rx.clone();
        loop {
            if self.should_exit() {
                debug!(handles_gone = self.handles_gone, "engine settled");
                break;
            }
            let events = if self.handles_gone {
                closed.clone()
            } else {
                self.events.clone()
            };
            select! {
                recv(events) -> msg => match msg {
                    Ok(Event::Shutdown) => {
                        info!("engine shutdown");
                        break;
                    }
                    Ok(event) => self.handle_event(event)?,
                    Err(_) => {
                        debug!("all handles dropped");
                        self.handles_gone = true;
                    }
                },
                recv(done_rx) -> msg => {
                    // done_tx lives on self, so this channel never disconnects
                    if let Ok(Finished { generation, execution }) = msg {
                        self.finish(generation, execution)?;
                    }
                }
            }
        }

        Ok(Session {
            command_line: self.command_line,
            source: self.source,
            display: self.display,
            generation: self.generation,
            last: self.last,
        })
    }

    fn handle_event(&mut self, event: Event) -> Result<(), EngineError> {
        match event {
            Event::Submit(line) => {
                debug!(line = %line, "submit");
                self.command_line = line;
                self.display.clear_error();
                self.trigger()
            }
            Event::Chunk(text) => {
                if self.ingest_closed {
                    warn!("chunk after ingestion closed, dropping");
                    return Ok(());
                }
                self.source.push_str(&text);
                if !text.ends_with('\n') {
                    self.source.push('\n');
                }
                self.display.clear_error();
                self.trigger()
            }
            Event::IngestClosed => {
                debug!(bytes = self.source.len(), "ingestion closed");
                self.ingest_closed = true;
                Ok(())
            }
            Event::Shutdown => Ok(()),
        }
    }

    fn trigger(&mut self) -> Result<(), EngineError> {
        if let ExecutionState::Running { generation } = self.state {
            if !self.rerun_pending {
                debug!(generation, "execution in flight, queueing rerun");
            }
            self.rerun_pending = true;
            return Ok(());
        }
        self.start()
    }

    fn start(&mut self) -> Result<(), EngineError> {
        self.generation += 1;
        let generation = self.generation;
        let line = self.command_line.clone();
        let snapshot = self.source.clone().into_bytes();
        let opts = self.options.exec.clone();
        let done = self.done_tx.clone();

        info!(generation, line = %line, input_bytes = snapshot.len(), "starting execution");
        thread::Builder::new()
            .name(format!("livepipe-run-{}", generation))
            .spawn(move || {
                let execution = run_command_line(&line, &snapshot, &opts);
                // Receiver gone means the engine already shut down
                let _ = done.send(Finished {
                    generation,
                    execution,
                });
            })
            .map_err(EngineError::Worker)?;

        self.state = ExecutionState::Running { generation };
        Ok(())
    }

    fn finish(&mut self, generation: u64, execution: Execution) -> Result<(), EngineError> {
        match self.state {
            ExecutionState::Running { generation: running } if running == generation => {}
            _ => {
                warn!(generation, "result for an execution that is not running, ignoring");
                return Ok(());
            }
        }

        info!(
            generation,
            ok = execution.result.is_output(),
            elapsed_ms = execution.elapsed_ms,
            "execution finished"
        );
        self.display.apply(&execution.result);
        self.state = ExecutionState::Done(execution.result.clone());
        if let ExecutionState::Done(result) = &self.state {
            self.presenter.on_result(result, &self.display);
        }
        self.last = Some(execution);
        self.state = ExecutionState::Idle;

        if std::mem::take(&mut self.rerun_pending) {
            self.start()?;
        }
        Ok(())
    }
}
