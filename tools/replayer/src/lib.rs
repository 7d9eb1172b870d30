pub mod config;
pub mod demo;
pub mod errors;
pub mod logging;
pub mod replay;
pub mod source;

pub use errors::{ReplayError, SourceError};
pub use replay::recorder::{Outcome, Recorder, RecorderOptions};
pub use replay::recording::{EventSink, RecorderEvent, RecorderStats};
pub use replay::replayer::{replay, replay_iter, replay_with, SequenceFactory, SequenceView};
pub use source::{
    Characteristics, FallibleIterSource, IterSource, LineSource, SizeHint, SourceCursor,
};

use clap::{error::ErrorKind, Parser};
use config::{load_config, CliOverrides};
use demo::{run_demo, ColumnSource};
use logging::{JsonlLogger, LogEvent};
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Parser)]
#[command(name = "replayer")]
#[command(about = "Replay one column of a delimited log through a memoizing sequence factory")]
pub struct Cli {
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Read from this file instead of stdin.
    #[arg(long)]
    pub input: Option<PathBuf>,
    /// Zero-based column holding the value.
    #[arg(long)]
    pub column: Option<usize>,
    #[arg(long)]
    pub threads: Option<u32>,
    /// Append recorder events as JSON lines to this file.
    #[arg(long)]
    pub log: Option<PathBuf>,
}

pub fn run() -> Result<i32, ReplayError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let mut stdout = std::io::stdout();
    run_with_args(&args, &mut stdout)
}

pub fn run_with_args(args: &[OsString], out: &mut dyn Write) -> Result<i32, ReplayError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                write!(out, "{error}").map_err(|e| ReplayError::Io(e.to_string()))?;
                return Ok(0);
            }
            _ => return Err(ReplayError::Cli(error.to_string())),
        },
    };

    let overrides = CliOverrides {
        config_path: cli.config,
        input: cli.input,
        column: cli.column,
        threads: cli.threads,
        log_path: cli.log,
    };
    let cfg = load_config(&overrides)?;

    let logger = cfg.logging.path.as_ref().map(|path| {
        let mut logger = JsonlLogger::new(path);
        logger.max_payload_bytes = cfg.logging.max_payload_bytes;
        Arc::new(logger)
    });
    let mut options = cfg.recorder_options();
    if let Some(logger) = &logger {
        options = options.with_events(logger.clone());
    }

    let reader: Box<dyn BufRead + Send> = match &cfg.input.path {
        Some(path) => {
            let file = std::fs::File::open(path)
                .map_err(|e| ReplayError::Io(format!("{}: {e}", path.display())))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(std::io::stdin())),
    };
    let input = cfg.input.clone();
    let factory = replay_with(move || ColumnSource::new(reader, &input), options);

    let summary = run_demo(&factory, cfg.demo.threads as usize)?;
    let rendered = serde_json::to_string(&summary).map_err(|e| ReplayError::Io(e.to_string()))?;
    writeln!(out, "{rendered}").map_err(|e| ReplayError::Io(e.to_string()))?;

    if let Some(logger) = &logger {
        logger.append(&LogEvent {
            level: "info",
            event_type: "run_complete",
            payload: serde_json::to_value(&summary).unwrap_or_default(),
        })?;
    }
    Ok(0)
}
