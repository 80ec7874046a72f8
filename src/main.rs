use clap::Parser;
use sticklab::cli::{Cli, run};
use sticklab::logging;

fn main() -> std::process::ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(cli.verbose);
    run(cli)
}
