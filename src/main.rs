//! Binary entry point for graphlore.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::print_stderr)]

use clap::Parser;
use graphlore::cli::{Cli, run};
use tracing_subscriber::EnvFilter;

fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("graphlore=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
