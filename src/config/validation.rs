//! Non-fatal checks on a loaded [`EngineConfig`].
use super::EngineConfig;
use crate::session::FragmentErrorPolicy;

/// Default registration class name; anything else gets a heads-up.
const CONVENTIONAL_REGISTRATION_CLASS: &str = crate::registry::DEFAULT_REGISTRATION_CLASS;

/// A validation warning detected during configuration loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    /// The configuration source (e.g., "cfgpatch.toml").
    pub source: String,
    /// The specific key that triggered the warning.
    pub item: String,
    /// Human-readable warning message.
    pub message: String,
}

impl ValidationWarning {
    /// Create a warning about `item` in `source`.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        item: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            item: item.into(),
            message: message.into(),
        }
    }
}

/// Trait for configuration validators.
pub trait ConfigValidator {
    /// Validate the configuration and return any warnings found.
    fn validate(&self, source: &str) -> Vec<ValidationWarning>;

    /// Return a human-readable name for this validator.
    fn name(&self) -> &'static str;
}

/// Validator for the engine settings.
#[derive(Debug)]
pub struct EngineValidator<'a> {
    config: &'a EngineConfig,
}

impl<'a> EngineValidator<'a> {
    /// Create a validator over `config`.
    #[must_use]
    pub const fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }
}

impl ConfigValidator for EngineValidator<'_> {
    fn validate(&self, source: &str) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();
        let config = self.config;

        if config.fragment_extensions.is_empty() {
            warnings.push(ValidationWarning::new(
                source,
                "fragment_extensions",
                "no extensions configured; directories will yield no fragments",
            ));
        }
        for ext in &config.fragment_extensions {
            if ext.starts_with('.') {
                warnings.push(ValidationWarning::new(
                    source,
                    "fragment_extensions",
                    format!("extension '{ext}' should be given without the leading dot"),
                ));
            }
        }

        if !config
            .registration_class
            .eq_ignore_ascii_case(CONVENTIONAL_REGISTRATION_CLASS)
        {
            warnings.push(ValidationWarning::new(
                source,
                "registration_class",
                format!(
                    "'{}' differs from the conventional '{CONVENTIONAL_REGISTRATION_CLASS}'",
                    config.registration_class
                ),
            ));
        }

        if config.require_registration && config.on_fragment_error == FragmentErrorPolicy::Skip {
            warnings.push(ValidationWarning::new(
                source,
                "require_registration",
                "unregistered fragments will be skipped silently under on_fragment_error = \"skip\"",
            ));
        }

        warnings
    }

    fn name(&self) -> &'static str {
        "engine"
    }
}

/// Run every validator over `config`.
#[must_use]
pub fn validate_all(config: &EngineConfig, source: &str) -> Vec<ValidationWarning> {
    let validators: [&dyn ConfigValidator; 1] = [&EngineValidator::new(config)];
    validators
        .iter()
        .flat_map(|v| {
            let warnings = v.validate(source);
            tracing::debug!("{} validator: {} warning(s)", v.name(), warnings.len());
            warnings
        })
        .collect()
}
