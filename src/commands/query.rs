//! `query` subcommand: look up one dotted path in the merged tree.
use anyhow::{Context as _, Result};

use crate::cli::{Format, GlobalOpts, QueryOpts};
use crate::logging::Logger;
use crate::render;

/// Run the query command: merge every fragment and print the value or class
/// found at the requested dotted path.
///
/// # Errors
///
/// Returns an error if the session fails or nothing exists at the path.
pub fn run(global: &GlobalOpts, opts: &QueryOpts, log: &Logger) -> Result<()> {
    let setup = super::CommandSetup::init(global, &opts.input, log)?;
    let outcome = setup.run_session(log)?;

    let entry = outcome
        .tree
        .lookup(&opts.path)
        .with_context(|| format!("querying {} fragment(s)", outcome.report.fragments.len()))?;

    match opts.format {
        Format::Text => print!("{}", render::entry_to_text(entry)),
        Format::Json => println!("{:#}", render::entry_to_json(entry)),
    }
    Ok(())
}
