//! Line-by-line ingestion of source data into the engine.

use std::io::{self, BufRead, BufReader, ErrorKind};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::engine::EngineHandle;

/// Whether fd 0 is an interactive terminal.
pub fn stdin_is_terminal() -> bool {
    unsafe { libc::isatty(libc::STDIN_FILENO) == 1 }
}

/// Stream process stdin into the engine.
///
/// A terminal on stdin has nothing to ingest: the stream closes immediately
/// and no thread is started.
pub fn spawn_stdin(handle: EngineHandle) -> io::Result<Option<JoinHandle<()>>> {
    if stdin_is_terminal() {
        debug!("stdin is a terminal, nothing to ingest");
        let _ = handle.close_ingest();
        return Ok(None);
    }
    spawn_reader(BufReader::new(io::stdin()), handle).map(Some)
}

/// Stream any reader into the engine, one chunk per line, then close.
pub fn spawn_reader<R>(reader: R, handle: EngineHandle) -> io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("livepipe-ingest".into())
        .spawn(move || {
            let lines = pump(reader, &handle);
            debug!(lines, "end of input");
            let _ = handle.close_ingest();
        })
}

/// Forward lines until EOF, a read error, or the engine going away.
/// Returns the number of lines forwarded.
fn pump<R: BufRead>(mut reader: R, handle: &EngineHandle) -> usize {
    let mut buf = Vec::new();
    let mut count = 0;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                if handle.ingest_chunk(line).is_err() {
                    debug!("engine gone, stopping ingestion");
                    break;
                }
                count += 1;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("input read failed: {}", e);
                break;
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, EngineOptions, ExecutionState};
    use crate::executor::PipelineResult;
    use crate::display::DisplayState;
    use std::io::Cursor;

    #[test]
    fn test_reader_feeds_engine_then_settles() {
        let options = EngineOptions {
            exit_when_settled: true,
            ..EngineOptions::default()
        };
        let (engine, handle) = Engine::new(|_: &PipelineResult, _: &DisplayState| {}, options);
        assert_eq!(engine.state(), &ExecutionState::Idle);
        handle.submit("sort -r").unwrap();

        let input = Cursor::new(b"b\r\na\nc".to_vec());
        let reader = spawn_reader(input, handle).unwrap();
        let session = engine.run().unwrap();
        reader.join().unwrap();

        assert_eq!(session.source, "b\na\nc\n");
        assert_eq!(session.display.output, "c\nb\na");
    }

    #[test]
    fn test_empty_input_closes() {
        let options = EngineOptions {
            exit_when_settled: true,
            ..EngineOptions::default()
        };
        let (engine, handle) = Engine::new(|_: &PipelineResult, _: &DisplayState| {}, options);
        let reader = spawn_reader(Cursor::new(Vec::new()), handle).unwrap();
        let session = engine.run().unwrap();
        reader.join().unwrap();
        assert!(session.source.is_empty());
        assert!(session.last.is_none());
    }
}
