//! Subcommand orchestration on top of the engine.
//!
//! Each subcommand shares [`CommandSetup`]: load configuration, apply flag
//! overrides, read fragments, then run some or all session stages.
pub mod check;
pub mod merge;
pub mod order;
pub mod query;

use anyhow::{Context as _, Result};

use crate::cli::{GlobalOpts, InputOpts};
use crate::config::{EngineConfig, validation};
use crate::error::SessionError;
use crate::loader;
use crate::logging::Logger;
use crate::session::{
    FragmentErrorPolicy, FragmentSource, FragmentStatus, MergeOutcome, MergeSession,
    SessionOptions,
};

/// Shared state produced by the common command setup sequence.
///
/// Encapsulates configuration loading, CLI overrides and fragment discovery
/// so that each command does not have to repeat the boilerplate.
#[derive(Debug)]
pub struct CommandSetup {
    /// Configuration after command-line overrides.
    pub config: EngineConfig,
    /// Session options derived from `config`.
    pub options: SessionOptions,
    /// Fragments read from the input paths, in load order.
    pub sources: Vec<FragmentSource>,
}

impl CommandSetup {
    /// Load the configuration, apply command-line overrides and read every
    /// fragment named by `input`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be parsed or holds
    /// invalid values, or if any fragment path cannot be read.
    pub fn init(global: &GlobalOpts, input: &InputOpts, log: &Logger) -> Result<Self> {
        log.stage("Loading configuration");
        let (mut config, path) = EngineConfig::load(global.config.as_deref())?;
        apply_overrides(&mut config, global);
        log.debug(&format!("config: {}", path.display()));

        // Validate configuration and display warnings
        let warnings = validation::validate_all(&config, &path.display().to_string());
        if !warnings.is_empty() {
            log.warn(&format!(
                "found {} configuration warning(s):",
                warnings.len()
            ));
            for warning in &warnings {
                log.warn(&format!(
                    "  {} [{}]: {}",
                    warning.source, warning.item, warning.message
                ));
            }
        }
        let options = config
            .session_options()
            .with_context(|| format!("invalid configuration in {}", path.display()))?;

        log.stage("Loading fragments");
        let sources = loader::load_fragments(&input.paths, &config.fragment_extensions)?;
        log.info(&format!("loaded {} fragment(s)", sources.len()));

        Ok(Self {
            config,
            options,
            sources,
        })
    }

    /// Run a full session over the loaded fragments.
    ///
    /// Per-fragment statuses are recorded on `log` whether or not the session
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if any stage of the session fails.
    pub fn run_session(self, log: &Logger) -> Result<MergeOutcome> {
        log.stage("Merging fragments");
        match MergeSession::run(self.sources, &self.options) {
            Ok(outcome) => {
                log.record_report(&outcome.report);
                Ok(outcome)
            }
            Err(err) => Err(report_session_error(err, log)),
        }
    }
}

fn apply_overrides(config: &mut EngineConfig, global: &GlobalOpts) {
    config.parallel &= global.parallel;
    config.require_registration |= global.require_registration;
    if global.skip_invalid {
        config.on_fragment_error = FragmentErrorPolicy::Skip;
    }
    if let Some(version) = &global.host_version {
        config.host_version = Some(version.clone());
    }
}

/// Log a failed session, record every rejected fragment and return the
/// error to propagate.
pub(crate) fn report_session_error(err: SessionError, log: &Logger) -> anyhow::Error {
    if let SessionError::Fragments(errors) = &err {
        for error in errors {
            log.error(&error.to_string());
            log.record_fragment(
                error.source_ref().as_str(),
                None,
                FragmentStatus::Failed,
                None,
            );
        }
    } else {
        log.error(&err.to_string());
    }
    anyhow::Error::new(err)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn global() -> GlobalOpts {
        GlobalOpts {
            config: None,
            parallel: true,
            require_registration: false,
            skip_invalid: false,
            host_version: None,
        }
    }

    #[test]
    fn overrides_only_tighten_or_replace() {
        let mut config = EngineConfig {
            parallel: false,
            require_registration: true,
            ..EngineConfig::default()
        };
        apply_overrides(&mut config, &global());
        assert!(!config.parallel, "file setting kept when flag absent");
        assert!(config.require_registration);
        assert_eq!(config.on_fragment_error, FragmentErrorPolicy::Reject);
    }

    #[test]
    fn overrides_from_flags() {
        let mut config = EngineConfig::default();
        let opts = GlobalOpts {
            parallel: false,
            skip_invalid: true,
            host_version: Some("1.24".to_string()),
            ..global()
        };
        apply_overrides(&mut config, &opts);
        assert!(!config.parallel);
        assert_eq!(config.on_fragment_error, FragmentErrorPolicy::Skip);
        assert_eq!(config.host_version.as_deref(), Some("1.24"));
    }

    #[test]
    fn setup_loads_fragments_with_config_file() {
        let (log, tmp, _guard) = crate::logging::isolated_logger();
        let config = tmp.path().join("cfgpatch.toml");
        std::fs::write(&config, "fragment_extensions = [\"hpp\"]\n").unwrap();
        std::fs::write(tmp.path().join("a.hpp"), "class A {};").unwrap();
        std::fs::write(tmp.path().join("b.cpp"), "class B {};").unwrap();

        let opts = GlobalOpts {
            config: Some(config),
            ..global()
        };
        let input = InputOpts {
            paths: vec![PathBuf::from(tmp.path())],
        };
        let setup = CommandSetup::init(&opts, &input, &log).unwrap();
        assert_eq!(setup.sources.len(), 1);
        assert!(setup.sources[0].source.as_str().ends_with("a.hpp"));
    }

    #[test]
    fn failed_session_records_rejected_fragments() {
        let (log, _tmp, _guard) = crate::logging::isolated_logger();
        let setup = CommandSetup {
            config: EngineConfig::default(),
            options: SessionOptions::default(),
            sources: vec![
                FragmentSource::new("good.cpp", "class A {};"),
                FragmentSource::new("bad.cpp", "class {"),
            ],
        };
        let err = setup.run_session(&log).unwrap_err();
        assert!(err.to_string().contains("1 fragment(s) failed"));
        let entries = log.fragment_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, "bad.cpp");
        assert_eq!(entries[0].status, FragmentStatus::Failed);
    }
}
