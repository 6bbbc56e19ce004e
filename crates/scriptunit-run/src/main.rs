use std::process::ExitCode;

use clap::Parser;

fn main() -> miette::Result<ExitCode> {
    scriptunit_run::Cli::parse().run()
}
