mod commands;

use clap::Parser;
use commands::split::{SplitArgs, split_command};
use std::io::Write;

#[derive(Parser)]
#[command(
    name = "gpxsplit",
    about = "Thin out a GPX track and split it into a bounded number of route files"
)]
struct Cli {
    #[command(flatten)]
    split: SplitArgs,

    /// Enable debug output
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    if let Err(e) = split_command(cli.split) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
