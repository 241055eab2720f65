use clap::Parser;
use uid_consensus::cli::Args;

fn main() {
    let args = Args::parse();

    uid_consensus::run(&args).unwrap_or_else(|err| {
        eprintln!("Fatal Error: {} occurred during processing", err);
        std::process::exit(1);
    });
}
