//! `order` subcommand: print module identities in dependency order.
use anyhow::Result;

use crate::cli::{GlobalOpts, InputOpts};
use crate::error::SessionError;
use crate::logging::Logger;
use crate::session::{FragmentSource, MergeSession};

/// Run the order command: resolve dependencies and print one module
/// identity per line in merge order.
///
/// # Errors
///
/// Returns an error if configuration, loading, parsing, registration or
/// dependency resolution fails.
pub fn run(global: &GlobalOpts, opts: &InputOpts, log: &Logger) -> Result<()> {
    let setup = super::CommandSetup::init(global, opts, log)?;

    log.stage("Resolving merge order");
    let mut session = MergeSession::new(setup.options);
    if let Err(err) = resolve_order(&mut session, setup.sources) {
        return Err(super::report_session_error(err, log));
    }
    for record in session.order() {
        let requires: Vec<&str> = record
            .dependencies
            .iter()
            .map(|d| d.identity.as_str())
            .collect();
        log.debug(&format!(
            "{} from {} requires [{}]",
            record.identity,
            record.provenance.source,
            requires.join(", ")
        ));
        println!("{}", record.identity);
    }
    Ok(())
}

fn resolve_order(
    session: &mut MergeSession,
    sources: Vec<FragmentSource>,
) -> Result<(), SessionError> {
    session.parse(sources)?;
    session.register()?;
    session.resolve()
}
