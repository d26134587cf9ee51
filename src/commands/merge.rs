//! `merge` subcommand: print the merged tree as fragment text or JSON.
use anyhow::Result;

use crate::cli::{Format, GlobalOpts, MergeOpts};
use crate::logging::Logger;
use crate::render;

/// Run the merge command: merge every fragment and print the tree to stdout.
///
/// # Errors
///
/// Returns an error if configuration, loading or any session stage fails.
pub fn run(global: &GlobalOpts, opts: &MergeOpts, log: &Logger) -> Result<()> {
    let setup = super::CommandSetup::init(global, &opts.input, log)?;
    let outcome = match setup.run_session(log) {
        Ok(outcome) => outcome,
        Err(err) => {
            log.print_summary();
            return Err(err);
        }
    };

    match opts.format {
        Format::Text => print!("{}", render::to_text(&outcome.tree)),
        Format::Json => println!("{:#}", render::to_json(&outcome.tree)),
    }

    log.print_summary();
    Ok(())
}
