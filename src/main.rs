use clap::Parser;
use tradeloop::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
