//! Engine configuration: a TOML file plus command-line overrides.
//!
//! ```toml
//! registration_class = "CfgPatches"
//! require_registration = false
//! host_version = "1.24"
//! on_fragment_error = "reject"   # or "skip"
//! parallel = true
//! fragment_extensions = ["cpp"]
//! ```
pub mod toml_loader;
pub mod validation;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::registry::{DEFAULT_REGISTRATION_CLASS, ModuleVersion, RegistrationOptions};
use crate::session::{FragmentErrorPolicy, SessionOptions};

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "cfgpatch.toml";

/// Settings for a merge run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Name of the class carrying module metadata.
    pub registration_class: String,
    /// Treat fragments without a registration class as errors.
    pub require_registration: bool,
    /// Host version that `requiredVersion` declarations are checked against.
    pub host_version: Option<String>,
    /// What to do with fragments that fail to parse or register.
    pub on_fragment_error: FragmentErrorPolicy,
    /// Parse and register fragments in parallel.
    pub parallel: bool,
    /// File extensions picked up when a directory is given.
    pub fragment_extensions: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            registration_class: DEFAULT_REGISTRATION_CLASS.to_string(),
            require_registration: false,
            host_version: None,
            on_fragment_error: FragmentErrorPolicy::Reject,
            parallel: true,
            fragment_extensions: vec!["cpp".to_string()],
        }
    }
}

impl EngineConfig {
    /// Load from `path`, or from [`DEFAULT_CONFIG_FILE`] when `None`.
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<(Self, PathBuf)> {
        let path = path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf);
        let config: Self = toml_loader::load_config(&path)
            .with_context(|| format!("loading {}", path.display()))?;
        Ok((config, path))
    }

    /// Build session options, checking the values the engine cannot run
    /// without.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for an empty registration class
    /// or an unparseable host version.
    pub fn session_options(&self) -> Result<SessionOptions, ConfigError> {
        if self.registration_class.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "registration_class",
                message: "must not be empty".to_string(),
            });
        }
        let host_version = self
            .host_version
            .as_deref()
            .map(ModuleVersion::parse)
            .transpose()
            .map_err(|message| ConfigError::InvalidValue {
                key: "host_version",
                message,
            })?;

        Ok(SessionOptions {
            registration: RegistrationOptions {
                registration_class: self.registration_class.trim().to_string(),
                require_registration: self.require_registration,
            },
            host_version,
            on_fragment_error: self.on_fragment_error,
            parallel: self.parallel,
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, path) = EngineConfig::load(Some(&dir.path().join("none.toml"))).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(path.ends_with("none.toml"));
    }

    #[test]
    fn loads_all_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfgpatch.toml");
        std::fs::write(
            &path,
            r#"
registration_class = "Manifest"
require_registration = true
host_version = "1.24"
on_fragment_error = "skip"
parallel = false
fragment_extensions = ["cpp", "hpp"]
"#,
        )
        .unwrap();
        let (config, _) = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.registration_class, "Manifest");
        assert!(config.require_registration);
        assert_eq!(config.on_fragment_error, FragmentErrorPolicy::Skip);
        assert!(!config.parallel);
        assert_eq!(config.fragment_extensions, ["cpp", "hpp"]);

        let options = config.session_options().unwrap();
        assert_eq!(options.host_version.unwrap().to_string(), "1.24");
        assert!(options.registration.require_registration);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfgpatch.toml");
        std::fs::write(&path, "paralel = false\n").unwrap();
        assert!(EngineConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn bad_host_version_is_invalid_value() {
        let config = EngineConfig {
            host_version: Some("soon".to_string()),
            ..EngineConfig::default()
        };
        let err = config.session_options().expect_err("should fail");
        assert!(err.to_string().starts_with("invalid value for 'host_version'"));
    }

    #[test]
    fn empty_registration_class_is_invalid_value() {
        let config = EngineConfig {
            registration_class: "  ".to_string(),
            ..EngineConfig::default()
        };
        assert!(config.session_options().is_err());
    }
}
