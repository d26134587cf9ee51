//! `check` subcommand: merge everything, print only the per-fragment summary.
use anyhow::Result;

use crate::cli::{GlobalOpts, InputOpts};
use crate::logging::Logger;
use crate::session::FragmentStatus;

/// Run the check command: merge without printing the tree and report the
/// status of every fragment.
///
/// The exit status follows the recorded summary: any failed fragment fails
/// the check, as does any fragment skipped under the skip policy.
///
/// # Errors
///
/// Returns an error if the session fails, or if any fragment failed or was
/// skipped.
pub fn run(global: &GlobalOpts, opts: &InputOpts, log: &Logger) -> Result<()> {
    let setup = super::CommandSetup::init(global, opts, log)?;
    let result = setup.run_session(log);
    log.print_summary();
    if log.has_failures() {
        anyhow::bail!("check failed: {} fragment(s) rejected", log.failure_count());
    }
    let outcome = result?;

    log.info(&format!(
        "{} module(s), {} top-level class(es)",
        outcome.order.len(),
        outcome.tree.classes().len()
    ));

    let skipped = outcome.report.count(FragmentStatus::Skipped);
    if skipped > 0 {
        anyhow::bail!("{skipped} fragment(s) skipped");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::fs;

    fn global(dir: &std::path::Path) -> GlobalOpts {
        GlobalOpts {
            config: Some(dir.join("cfgpatch.toml")),
            parallel: false,
            require_registration: false,
            skip_invalid: false,
            host_version: None,
        }
    }

    fn input(dir: &std::path::Path) -> InputOpts {
        InputOpts {
            paths: vec![dir.to_path_buf()],
        }
    }

    #[test]
    fn clean_fragments_pass() {
        let (log, tmp, _guard) = crate::logging::isolated_logger();
        let mods = tmp.path().join("mods");
        fs::create_dir(&mods).unwrap();
        fs::write(mods.join("a.cpp"), "class CfgPatches { class A {}; };").unwrap();

        run(&global(tmp.path()), &input(&mods), &log).unwrap();
        assert!(!log.has_failures());
    }

    #[test]
    fn rejected_fragment_fails_the_check() {
        let (log, tmp, _guard) = crate::logging::isolated_logger();
        let mods = tmp.path().join("mods");
        fs::create_dir(&mods).unwrap();
        fs::write(mods.join("a.cpp"), "class CfgPatches { class A {}; };").unwrap();
        fs::write(mods.join("b.cpp"), "class B { x = ; };").unwrap();
        fs::write(mods.join("c.cpp"), "class {").unwrap();

        let err = run(&global(tmp.path()), &input(&mods), &log).unwrap_err();
        assert!(log.has_failures());
        assert_eq!(log.failure_count(), 2);
        assert_eq!(err.to_string(), "check failed: 2 fragment(s) rejected");
    }

    #[test]
    fn skipped_fragment_fails_the_check() {
        let (log, tmp, _guard) = crate::logging::isolated_logger();
        let mods = tmp.path().join("mods");
        fs::create_dir(&mods).unwrap();
        fs::write(mods.join("a.cpp"), "class CfgPatches { class A {}; };").unwrap();
        fs::write(mods.join("b.cpp"), "class B { x = ; };").unwrap();
        let opts = GlobalOpts {
            skip_invalid: true,
            ..global(tmp.path())
        };

        let err = run(&opts, &input(&mods), &log).unwrap_err();
        assert!(!log.has_failures());
        assert_eq!(err.to_string(), "1 fragment(s) skipped");
    }
}
