use std::ffi::OsString;
use std::io::Write;

use anyhow::{Context, Result};
use clap::builder::OsStringValueParser;
use clap::error::ErrorKind;
use clap::Parser;
use phobz_segments::pipeline::{analyze_track, FallbackReport};
use serde::Serialize;
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "phobz-segments", version)]
#[command(about = "Find hooks, drops and harmonic transitions in a track", long_about = None)]
struct Args {
    /// Audio file to analyze (WAV, MP3, FLAC, AAC)
    #[arg(value_parser = OsStringValueParser::new(), allow_hyphen_values = true)]
    path: Option<OsString>,

    /// Arguments after the path are ignored
    #[arg(
        hide = true,
        value_parser = OsStringValueParser::new(),
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    extra: Vec<OsString>,

    /// Verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Write one JSON document to stdout.
fn emit<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .context("Failed to serialize report")?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", json).context("Failed to write to stdout")?;
    stdout.flush().context("Failed to flush stdout")
}

fn run() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            init_logging(false);
            let message = err.to_string();
            log::warn!("Invalid arguments: {}", message.trim());
            return emit(&FallbackReport::new(message.trim()), false);
        }
    };

    init_logging(args.verbose);

    if !args.extra.is_empty() {
        log::debug!("Ignoring {} extra argument(s)", args.extra.len());
    }

    let Some(path) = args.path else {
        log::warn!("No input file provided");
        return emit(&json!({ "error": "No input file provided" }), args.pretty);
    };

    let report = analyze_track(&path);
    emit(&report, args.pretty)
}

fn main() {
    // Output problems are logged; the exit status stays 0.
    if let Err(err) = run() {
        log::error!("{:#}", err);
    }
}
