use std::env;
use std::io::{self, Write};
use std::path::Path;
use std::process;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use livepipe::config::Config;
use livepipe::display::DisplayState;
use livepipe::report::{self, RunReport};
use livepipe::{ingest, Engine, EngineOptions, ExecOptions, PipelineResult, Presenter};

const USAGE: &str = "Usage: livepipe [--timeout <secs>] [--meta <path>] [--follow] [--line-numbers] [--emit-command] [--] <command line>";

fn print_usage(code: i32) -> ! {
    eprintln!("{}", USAGE);
    process::exit(code);
}

struct Args {
    command: String,
    timeout_secs: Option<u64>,
    meta_path: Option<String>,
    follow: bool,
    line_numbers: bool,
    emit_command: bool,
}

fn parse_args() -> Args {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut command = String::new();
    let mut timeout_secs: Option<u64> = None;
    let mut meta_path: Option<String> = None;
    let mut follow = false;
    let mut line_numbers = false;
    let mut emit_command = false;
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--timeout" => {
                i += 1;
                match args.get(i).and_then(|s| s.parse().ok()) {
                    Some(secs) => timeout_secs = Some(secs),
                    None => print_usage(2),
                }
            }
            "--meta" => {
                i += 1;
                match args.get(i) {
                    Some(path) => meta_path = Some(path.clone()),
                    None => print_usage(2),
                }
            }
            "--follow" => follow = true,
            "--line-numbers" => line_numbers = true,
            "--emit-command" => emit_command = true,
            "-h" | "--help" => print_usage(0),
            "--" => {
                command = args[i + 1..].join(" ");
                break;
            }
            _ => {
                // If no --, treat remaining as command
                command = args[i..].join(" ");
                break;
            }
        }
        i += 1;
    }

    Args {
        command,
        timeout_secs,
        meta_path,
        follow,
        line_numbers,
        emit_command,
    }
}

fn init_logging(filter: &str) -> Result<(), String> {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init()
        .map_err(|e| format!("logging: {}", e))
}

/// Prints each result as it lands when following; otherwise silent.
struct HeadlessPresenter {
    follow: bool,
}

impl Presenter for HeadlessPresenter {
    fn on_result(&mut self, result: &PipelineResult, display: &DisplayState) {
        if !self.follow {
            return;
        }
        match result {
            PipelineResult::Output(_) => print_output(display),
            PipelineResult::Failure(failure) => eprintln!("{}", failure.message),
        }
    }
}

fn print_output(display: &DisplayState) {
    let rendered = display.rendered();
    let mut stdout = io::stdout().lock();
    let _ = stdout.write_all(rendered.as_bytes());
    if !rendered.is_empty() && !rendered.ends_with('\n') {
        let _ = stdout.write_all(b"\n");
    }
    let _ = stdout.flush();
}

/// Final output for shell reuse: the pipeline's bytes untouched, unless
/// line numbers were asked for.
fn print_final(display: &DisplayState) {
    if display.show_line_numbers {
        return print_output(display);
    }
    let mut stdout = io::stdout().lock();
    let _ = stdout.write_all(&display.raw);
    let _ = stdout.flush();
}

fn run(args: Args, config: Config) -> Result<(), String> {
    let options = EngineOptions {
        exec: ExecOptions::from_config(&config),
        exit_when_settled: true,
        show_line_numbers: config.show_line_numbers,
    };
    let (engine, handle) = Engine::new(
        HeadlessPresenter {
            follow: args.follow,
        },
        options,
    );
    handle.submit(args.command.clone()).map_err(|e| e.to_string())?;
    let _ingest = ingest::spawn_stdin(handle).map_err(|e| format!("ingest: {}", e))?;

    let session = engine.run().map_err(|e| e.to_string())?;

    if let Some(ref meta_path) = args.meta_path {
        let report = RunReport::from_session(&session);
        if let Err(e) = report::write_report(Path::new(meta_path), &report) {
            eprintln!("livepipe: failed to write meta: {}", e);
        }
    }

    if args.emit_command {
        if !session.command_line.is_empty() {
            println!("{}", session.command_line);
        }
    } else if !args.follow {
        print_final(&session.display);
        if let Some(ref err) = session.display.error {
            eprintln!("{}", err);
        }
    }
    Ok(())
}

fn main() {
    let args = parse_args();

    let mut config = Config::load();
    if let Some(secs) = args.timeout_secs {
        config.stage_timeout_secs = secs;
    }
    if args.line_numbers {
        config.show_line_numbers = true;
    }

    if let Err(e) = init_logging(&config.log_filter) {
        eprintln!("livepipe: {}", e);
        process::exit(1);
    }

    if let Err(e) = run(args, config) {
        eprintln!("livepipe: {}", e);
        process::exit(1);
    }
}
