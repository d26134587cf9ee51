//! `cfgpatch` command-line entry point.
use anyhow::Result;
use clap::Parser;

use cfgpatch::{cli, commands, logging};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = cli::Cli::parse();

    if matches!(args.command, cli::Command::Version) {
        let version = option_env!("CFGPATCH_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
        println!("cfgpatch {version}");
        return Ok(());
    }

    logging::init_subscriber(args.verbose, args.command.name());
    let log = logging::Logger::new(args.command.name());

    match &args.command {
        cli::Command::Merge(opts) => commands::merge::run(&args.global, opts, &log),
        cli::Command::Check(opts) => commands::check::run(&args.global, opts, &log),
        cli::Command::Order(opts) => commands::order::run(&args.global, opts, &log),
        cli::Command::Query(opts) => commands::query::run(&args.global, opts, &log),
        cli::Command::Version => Ok(()),
    }
}
