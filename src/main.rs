use std::process::ExitCode;

use clap::Parser;

use retouch::{cli, log_info, logger};

fn main() -> ExitCode {
    logger::init();
    log_info!("Retouch v{} starting", env!("CARGO_PKG_VERSION"));

    let args = cli::CliArgs::parse();
    let code = cli::run(args);

    log_info!("Retouch exiting");
    code
}
