use auto_archive_files::cli::{Cli, run_cli};
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    run_cli(&cli)
}
