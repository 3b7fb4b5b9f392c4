//! `repsim` binary: feed a command file (or stdin) to the engine.

use std::fs::File;
use std::io::{self, BufReader};
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let stdout = io::stdout().lock();
    let result = match args.next() {
        Some(path) => match File::open(&path) {
            Ok(file) => repsim_cli::run(BufReader::new(file), stdout),
            Err(err) => {
                eprintln!("failed to open input file '{path}': {err}");
                return ExitCode::FAILURE;
            }
        },
        None => repsim_cli::run(io::stdin().lock(), stdout),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("I/O error: {err}");
            ExitCode::FAILURE
        }
    }
}
