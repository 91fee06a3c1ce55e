//! fbuild CLI - incremental builds for C and C++ targets

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("fbuild=debug")
    } else {
        EnvFilter::new("fbuild=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(!cli.no_color)
        .with_target(false)
        .without_time()
        .init();

    let color = !cli.no_color;
    match cli.command {
        Commands::Build(args) => commands::build::execute(args, cli.verbose, color),
        Commands::Plan(args) => commands::plan::execute(args),
        Commands::Clean(args) => commands::clean::execute(args),
        Commands::Toolchain(args) => commands::toolchain::execute(args),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
