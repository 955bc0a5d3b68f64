//! ledlink CLI: diagnostics for serial LED controllers.
//!
//! Encodes and decodes wire frames, runs the full control path against a
//! simulated controller, and (built with `serial`) talks to real ports.

use clap::Parser;

mod cli;

#[derive(Parser)]
#[command(
    name = "ledlink-cli",
    version,
    about = "Diagnostics for serial LED controllers"
)]
struct Args {
    /// Output as JSON (for encode, decode, config, ports)
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: cli::Command,
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    if let Err(e) = cli::run(args.command, args.json) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
