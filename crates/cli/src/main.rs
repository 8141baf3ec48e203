// tandem CLI entry point.

use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod client;
mod commands;
mod config;
mod exit_code;
mod output;
mod runtime;
mod session;
mod throttle;

use exit_code::ExitCode;

#[derive(Parser)]
#[command(name = "tandem", about = "Edit text files together through a tandem relay")]
struct Cli {
    #[command(flatten)]
    globals: commands::GlobalArgs,
    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> process::ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match commands::run(cli.command, &cli.globals) {
        Ok(()) => ExitCode::Success.into(),
        Err(err) => {
            output::print_anyhow_error(cli.globals.format(), &err);
            ExitCode::from_error(&err).into()
        }
    }
}
