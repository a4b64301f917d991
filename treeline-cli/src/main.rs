//! CLI entry point for the treeline clustering engines.
//!
//! Parses command-line arguments with clap, runs the requested engine,
//! renders the result to stdout, and maps errors to exit codes: `0` for
//! success, `1` for validation problems with the caller's arguments or
//! input, `2` for runtime failures. Logging is initialised before the run
//! so the engines can emit structured diagnostics via `tracing`.

use std::io::{self, BufWriter, Write};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::error;

use treeline_cli::{
    cli::{Cli, CliError, ExecutionSummary, render_summary, run_cli},
    logging::{self, LoggingError},
};
use treeline_core::ClusterError;

fn render(summary: &ExecutionSummary) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    render_summary(summary, &mut writer).context("failed to render summary")?;
    writer.flush().context("failed to flush output")?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // clap renders its own usage text; help and version requests
            // arrive here too and exit cleanly.
            let validation = err.use_stderr();
            let _ = err.print();
            return ExitCode::from(u8::from(validation));
        }
    };

    if let Err(err) = logging::init_logging(cli.verbose) {
        report_logging_init_error(&err);
        return ExitCode::from(2);
    }

    match run_cli(cli) {
        Ok(summary) => match render(&summary) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!(error = %err, "failed to write output");
                ExitCode::from(2)
            }
        },
        Err(err) => {
            log_cli_error(&err);
            ExitCode::from(err.exit_code())
        }
    }
}

#[expect(
    clippy::print_stderr,
    reason = "emit one-off diagnostic before tracing is initialised"
)]
fn report_logging_init_error(err: &LoggingError) {
    eprintln!("failed to initialize logging: {err}");
}

fn log_cli_error(err: &CliError) {
    match err {
        CliError::Core(core) => log_core_error(core),
        _ => error!(error = %err, "command execution failed"),
    }
}

fn log_core_error(err: &ClusterError) {
    error!(
        error = %err,
        code = %err.code().as_str(),
        "command execution failed"
    );
}
