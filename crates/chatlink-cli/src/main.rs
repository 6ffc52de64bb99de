//! Chatlink CLI entry point

use clap::Parser;
use tracing::error;

use chatlink_cli::{Cli, CommandDispatcher};

fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    match CommandDispatcher::execute(&cli) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
