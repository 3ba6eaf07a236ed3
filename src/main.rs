// vehicle_match - main.rs
// Scoring service entry point: load config, load the checkpoint, serve.

use clap::Parser;
use std::process::exit;
use vehicle_match::cli::{run, Cli};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        tracing::error!("{e:#}");
        eprintln!("❌ {e:#}");
        exit(1);
    }
}
