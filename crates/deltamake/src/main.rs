//! deltamake CLI entry point.
//!
//! Usage:
//!   deltamake [flags] [build1 build2 ...]
//!
//! Reads `solution.json` from the current directory, schedules the
//! out-of-date compile commands over a worker pool, links, and persists the
//! differential record.

use std::env;
use std::process::ExitCode;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> ExitCode {
    // Initialize tracing (respects RUST_LOG env var)
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let options = deltamake::parse_args(env::args().skip(1));
    if options.show_help {
        deltamake::print_help();
        return ExitCode::SUCCESS;
    }

    match deltamake::run(options) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}
