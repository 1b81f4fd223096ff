//! pipesplit: copy a byte stream into rotating output files.
//!
//! # Usage
//!
//! ```text
//! producer | pipesplit -o /var/spool/app -p app --max-bytes 10M
//! pipesplit --input /run/app.fifo --create-fifo --daemon --continue-read \
//!           -o /var/spool/app -p app --max-age 1h --pending-suffix .part
//! pipesplit --config pipesplit.yaml --print-config
//! ```
//!
//! Exit codes: 0 on a clean end of stream or shutdown, 78 for configuration
//! errors, 66 when the source is unavailable, 74 for read errors and 73 when
//! the output fails.

mod args;

use std::process::ExitCode;

use clap::Parser;

use args::Cli;
use pipesplit_daemon::{exit_code, start_blocking};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.resolve() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("pipesplit: {err:#}");
            return ExitCode::from(exit_code::CONFIG);
        }
    };

    if cli.print_config {
        return match serde_yaml::to_string(&config) {
            Ok(yaml) => {
                print!("{yaml}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("pipesplit: failed to render configuration: {err}");
                ExitCode::from(exit_code::SOFTWARE)
            }
        };
    }

    match start_blocking(config, cli.log_format.into()) {
        Ok(summary) => {
            if cli.summary {
                match serde_json::to_string(&summary) {
                    Ok(json) => println!("{json}"),
                    Err(err) => eprintln!("pipesplit: failed to render summary: {err}"),
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("pipesplit: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}
