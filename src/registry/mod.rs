//! Patch registry: per-fragment module metadata.
//!
//! Each fragment carries one registration class (by convention
//! `CfgPatches`) holding exactly one module class:
//!
//! ```text
//! class CfgPatches
//! {
//!     class ADD_MISSION_SCRIPT
//!     {
//!         units[] = {};
//!         weapons[] = {};
//!         requiredVersion = 0.1;
//!         requiredAddons[] = { "JM_CF_Scripts", "DZ_Data" };
//!     };
//! };
//! ```
//!
//! [`extract_record`] turns that into a [`PatchRecord`]; [`PatchRegistry`]
//! collects records for a session and enforces identity uniqueness.
mod version;

pub use version::{ModuleVersion, split_requirement};

use std::collections::BTreeMap;
use std::fmt;

use semver::VersionReq;
use sha2::{Digest, Sha256};

use crate::error::FragmentError;
use crate::fragment::{FragmentNode, Scalar, Value, find_class, name_key};

/// Default name of the registration class.
pub const DEFAULT_REGISTRATION_CLASS: &str = "CfgPatches";

/// Where a fragment came from, as reported back to the host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceRef(String);

impl SourceRef {
    /// Wrap a host-supplied reference, usually a file path.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// The reference as given.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One fragment as handed to the engine by the loader.
#[derive(Debug, Clone)]
pub struct FragmentSource {
    /// Fragment text.
    pub text: String,
    /// Where the text came from.
    pub source: SourceRef,
    /// Module version supplied by the host, overriding any `version` property.
    pub declared_version: Option<String>,
}

impl FragmentSource {
    /// A fragment with no host-supplied version.
    #[must_use]
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: SourceRef::new(source),
            declared_version: None,
        }
    }

    /// Attach the module version the host knows for this fragment.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.declared_version = Some(version.into());
        self
    }
}

/// A declared dependency on another module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Identity of the required module.
    pub identity: String,
    /// Optional version requirement on that module.
    pub requirement: Option<VersionReq>,
}

/// Where a record came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    /// Source reference of the fragment.
    pub source: SourceRef,
    /// Position of the fragment in the session's input sequence.
    pub index: usize,
    /// Hex SHA-256 of the fragment text.
    pub digest: String,
}

/// Module metadata extracted from one fragment.
#[derive(Debug, Clone)]
pub struct PatchRecord {
    /// Module identity (class name inside the registration class), or the
    /// source reference for unregistered fragments.
    pub identity: String,
    /// `false` when the fragment carries no registration class.
    pub registered: bool,
    /// The module's own version, if declared.
    pub version: Option<ModuleVersion>,
    /// `requiredVersion`: minimum host version the module needs.
    pub required_version: Option<ModuleVersion>,
    /// `requiredAddons[]`, in declaration order, without duplicates.
    pub dependencies: Vec<Dependency>,
    /// `units[]`, carried through for the host.
    pub units: Vec<String>,
    /// `weapons[]`, carried through for the host.
    pub weapons: Vec<String>,
    /// Where this record came from.
    pub provenance: Provenance,
}

impl PatchRecord {
    /// Case-insensitive identity key.
    #[must_use]
    pub fn key(&self) -> String {
        name_key(&self.identity)
    }
}

/// Knobs for registry extraction.
#[derive(Debug, Clone)]
pub struct RegistrationOptions {
    /// Name of the top-level registration class.
    pub registration_class: String,
    /// Treat a missing registration class as an error.
    pub require_registration: bool,
}

impl Default for RegistrationOptions {
    fn default() -> Self {
        Self {
            registration_class: DEFAULT_REGISTRATION_CLASS.to_string(),
            require_registration: false,
        }
    }
}

/// Build the [`PatchRecord`] for one parsed fragment.
///
/// # Errors
///
/// - [`FragmentError::Registration`] if the registration class is required
///   but absent, does not hold exactly one module class, or has malformed
///   `requiredAddons`/`units`/`weapons`.
/// - [`FragmentError::VersionFormat`] if a version does not parse.
pub fn extract_record(
    forest: &[FragmentNode],
    source: &FragmentSource,
    index: usize,
    options: &RegistrationOptions,
) -> Result<PatchRecord, FragmentError> {
    let provenance = Provenance {
        source: source.source.clone(),
        index,
        digest: digest(&source.text),
    };
    let registration_error = |reason: String| FragmentError::Registration {
        source_ref: source.source.clone(),
        index,
        reason,
    };

    let host_version = source
        .declared_version
        .as_deref()
        .map(|text| parse_version(text, "declared version", source, index))
        .transpose()?;

    let Some(registration) = find_class(forest, &options.registration_class) else {
        if options.require_registration {
            return Err(registration_error(format!(
                "no '{}' class found",
                options.registration_class
            )));
        }
        return Ok(PatchRecord {
            identity: source.source.to_string(),
            registered: false,
            version: host_version,
            required_version: None,
            dependencies: Vec::new(),
            units: Vec::new(),
            weapons: Vec::new(),
            provenance,
        });
    };

    let module = match registration.children.as_slice() {
        [module] => module,
        [] => {
            return Err(registration_error(format!(
                "'{}' declares no module class",
                registration.name
            )));
        }
        many => {
            let names: Vec<&str> = many.iter().map(|c| c.name.as_str()).collect();
            return Err(registration_error(format!(
                "'{}' declares {} module classes ({}); expected exactly one",
                registration.name,
                many.len(),
                names.join(", ")
            )));
        }
    };

    let required_version = module
        .property("requiredVersion")
        .map(|p| scalar_text(&p.value, "requiredVersion"))
        .transpose()
        .map_err(registration_error)?
        .map(|text| parse_version(&text, "requiredVersion", source, index))
        .transpose()?;

    let version = match host_version {
        Some(v) => Some(v),
        None => module
            .property("version")
            .map(|p| scalar_text(&p.value, "version"))
            .transpose()
            .map_err(registration_error)?
            .map(|text| parse_version(&text, "version", source, index))
            .transpose()?,
    };

    let mut dependencies: Vec<Dependency> = Vec::new();
    for entry in string_list(module, "requiredAddons").map_err(registration_error)? {
        let (identity, requirement) =
            split_requirement(&entry).map_err(|reason| FragmentError::VersionFormat {
                source_ref: source.source.clone(),
                index,
                field: "requiredAddons".to_string(),
                text: entry.clone(),
                reason,
            })?;
        if identity.is_empty() {
            return Err(registration_error(format!(
                "requiredAddons entry '{entry}' has an empty module identity"
            )));
        }
        if !dependencies
            .iter()
            .any(|d| name_key(&d.identity) == name_key(&identity))
        {
            dependencies.push(Dependency {
                identity,
                requirement,
            });
        }
    }

    Ok(PatchRecord {
        identity: module.name.clone(),
        registered: true,
        version,
        required_version,
        dependencies,
        units: string_list(module, "units").map_err(registration_error)?,
        weapons: string_list(module, "weapons").map_err(registration_error)?,
        provenance,
    })
}

fn digest(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

fn parse_version(
    text: &str,
    field: &str,
    source: &FragmentSource,
    index: usize,
) -> Result<ModuleVersion, FragmentError> {
    ModuleVersion::parse(text).map_err(|reason| FragmentError::VersionFormat {
        source_ref: source.source.clone(),
        index,
        field: field.to_string(),
        text: text.to_string(),
        reason,
    })
}

fn scalar_text(value: &Value, field: &str) -> Result<String, String> {
    match value {
        Value::Scalar(Scalar::Number(raw)) => Ok(raw.clone()),
        Value::Scalar(Scalar::String(s)) => Ok(s.clone()),
        _ => Err(format!("'{field}' must be a number or a string")),
    }
}

/// Read an optional array-of-strings property; absent means empty.
fn string_list(module: &FragmentNode, field: &str) -> Result<Vec<String>, String> {
    let Some(entry) = module.property(field) else {
        return Ok(Vec::new());
    };
    let Value::Array(items) = &entry.value else {
        return Err(format!("'{field}' must be an array"));
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| format!("'{field}' must contain only strings, found {item}"))
        })
        .collect()
}

/// Session registry of extracted records, keyed by case-insensitive identity.
///
/// Insertion order does not matter: when two records claim the same
/// identity, the one with the lower input sequence index keeps it and the
/// other is returned as a [`FragmentError::DuplicateModule`]. This makes the
/// outcome independent of worker scheduling during parallel registration.
#[derive(Debug, Default)]
pub struct PatchRegistry {
    records: BTreeMap<String, PatchRecord>,
}

impl PatchRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record.
    ///
    /// # Errors
    ///
    /// Returns [`FragmentError::DuplicateModule`] describing whichever of the
    /// two conflicting records lost the tie-break.
    pub fn insert(&mut self, record: PatchRecord) -> Result<(), FragmentError> {
        let key = record.key();
        let Some(existing) = self.records.get_mut(&key) else {
            self.records.insert(key, record);
            return Ok(());
        };

        let (winner, loser) = if record.provenance.index < existing.provenance.index {
            let loser = std::mem::replace(existing, record);
            (existing.provenance.source.clone(), loser)
        } else {
            (existing.provenance.source.clone(), record)
        };
        Err(FragmentError::DuplicateModule {
            source_ref: loser.provenance.source,
            index: loser.provenance.index,
            identity: loser.identity,
            first: winner,
        })
    }

    /// Look up a registered module by identity (case-insensitive).
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<&PatchRecord> {
        self.records.get(&name_key(identity))
    }

    /// All records, in ascending identity-key order.
    pub fn records(&self) -> impl Iterator<Item = &PatchRecord> {
        self.records.values()
    }

    /// Number of registered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::fragment::parse_fragment;

    fn extract(text: &str) -> Result<PatchRecord, FragmentError> {
        extract_with(text, &RegistrationOptions::default())
    }

    fn extract_with(text: &str, options: &RegistrationOptions) -> Result<PatchRecord, FragmentError> {
        let source = FragmentSource::new("mod/config.cpp", text);
        let forest = parse_fragment(text).expect("test data should parse");
        extract_record(&forest, &source, 0, options)
    }

    fn record(identity: &str, index: usize) -> PatchRecord {
        PatchRecord {
            identity: identity.to_string(),
            registered: true,
            version: None,
            required_version: None,
            dependencies: Vec::new(),
            units: Vec::new(),
            weapons: Vec::new(),
            provenance: Provenance {
                source: SourceRef::new(format!("{identity}-{index}.cpp")),
                index,
                digest: String::new(),
            },
        }
    }

    // -----------------------------------------------------------------------
    // extract_record
    // -----------------------------------------------------------------------

    #[test]
    fn extracts_fixture_metadata() {
        let r = extract(include_str!("../../tests/fixtures/add_mission_script.cpp"))
            .expect("fixture should register");
        assert_eq!(r.identity, "ADD_MISSION_SCRIPT");
        assert!(r.registered);
        assert_eq!(r.required_version.unwrap().to_string(), "0.1");
        let deps: Vec<&str> = r.dependencies.iter().map(|d| d.identity.as_str()).collect();
        assert_eq!(deps, ["JM_CF_Scripts", "DZ_Data"]);
        assert!(r.units.is_empty());
        assert_eq!(r.provenance.digest.len(), 64);
    }

    #[test]
    fn missing_registration_is_unregistered_by_default() {
        let r = extract("class CfgMods { class A {}; };").expect("should register");
        assert!(!r.registered);
        assert_eq!(r.identity, "mod/config.cpp");
        assert!(r.dependencies.is_empty());
    }

    #[test]
    fn missing_registration_fails_when_mandatory() {
        let options = RegistrationOptions {
            require_registration: true,
            ..RegistrationOptions::default()
        };
        let err = extract_with("class CfgMods {};", &options).expect_err("should fail");
        assert!(matches!(err, FragmentError::Registration { .. }));
    }

    #[test]
    fn custom_registration_class() {
        let options = RegistrationOptions {
            registration_class: "Manifest".to_string(),
            require_registration: true,
        };
        let r = extract_with("class Manifest { class Core {}; };", &options).expect("registers");
        assert_eq!(r.identity, "Core");
    }

    #[test]
    fn empty_registration_class_is_an_error() {
        let err = extract("class CfgPatches {};").expect_err("should fail");
        assert!(err.to_string().contains("declares no module class"));
    }

    #[test]
    fn two_module_classes_is_an_error() {
        let err = extract("class CfgPatches { class A {}; class B {}; };").expect_err("should fail");
        assert!(err.to_string().contains("expected exactly one"));
    }

    #[test]
    fn bad_required_version_is_version_format_error() {
        let err = extract("class CfgPatches { class A { requiredVersion = \"one\"; }; };")
            .expect_err("should fail");
        assert!(matches!(err, FragmentError::VersionFormat { ref field, .. } if field == "requiredVersion"));
    }

    #[test]
    fn two_digit_required_version_is_accepted() {
        let r = extract("class CfgPatches { class A { requiredVersion = 1.00; }; };")
            .expect("1.00 is a valid required version");
        let required = r.required_version.expect("required version");
        assert_eq!(required.to_string(), "1.00");
        assert_eq!(required.semver(), &semver::Version::new(1, 0, 0));
    }

    #[test]
    fn required_addons_must_be_strings() {
        let err = extract("class CfgPatches { class A { requiredAddons[] = {1}; }; };")
            .expect_err("should fail");
        assert!(matches!(err, FragmentError::Registration { .. }));
    }

    #[test]
    fn required_addons_must_be_an_array() {
        let err = extract("class CfgPatches { class A { requiredAddons = \"Core\"; }; };")
            .expect_err("should fail");
        assert!(matches!(err, FragmentError::Registration { .. }));
    }

    #[test]
    fn dependency_requirement_is_parsed() {
        let r = extract("class CfgPatches { class Ext { requiredAddons[] = {\"Core >= 1.2\", \"core\"}; }; };")
            .expect("should register");
        assert_eq!(r.dependencies.len(), 1, "duplicate dependency is collapsed");
        assert_eq!(r.dependencies[0].identity, "Core");
        assert!(r.dependencies[0].requirement.is_some());
    }

    #[test]
    fn empty_dependency_identity_is_an_error() {
        let err = extract("class CfgPatches { class Ext { requiredAddons[] = {\">=1\"}; }; };")
            .expect_err("should fail");
        assert!(err.to_string().contains("empty module identity"));
    }

    #[test]
    fn host_declared_version_wins() {
        let text = "class CfgPatches { class A { version = \"1.0\"; }; };";
        let source = FragmentSource::new("a.cpp", text).with_version("2.5");
        let forest = parse_fragment(text).unwrap();
        let r = extract_record(&forest, &source, 0, &RegistrationOptions::default()).unwrap();
        assert_eq!(r.version.unwrap().to_string(), "2.5");
    }

    #[test]
    fn version_property_is_used() {
        let r = extract("class CfgPatches { class A { version = 1.4; }; };").unwrap();
        assert_eq!(r.version.unwrap().to_string(), "1.4");
    }

    // -----------------------------------------------------------------------
    // PatchRegistry
    // -----------------------------------------------------------------------

    #[test]
    fn registry_rejects_later_duplicate() {
        let mut reg = PatchRegistry::new();
        reg.insert(record("Core", 0)).expect("first insert");
        let err = reg.insert(record("core", 3)).expect_err("duplicate");
        match err {
            FragmentError::DuplicateModule { index, first, .. } => {
                assert_eq!(index, 3);
                assert_eq!(first.as_str(), "Core-0.cpp");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(reg.get("CORE").unwrap().provenance.index, 0);
    }

    #[test]
    fn registry_lower_index_wins_regardless_of_insert_order() {
        let mut reg = PatchRegistry::new();
        reg.insert(record("Core", 5)).expect("first insert");
        let err = reg.insert(record("Core", 1)).expect_err("duplicate");
        assert_eq!(err.index(), 5, "the later fragment is reported");
        assert_eq!(reg.get("Core").unwrap().provenance.index, 1);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn registry_records_are_sorted_by_key() {
        let mut reg = PatchRegistry::new();
        for (i, id) in ["b", "C", "a"].iter().enumerate() {
            reg.insert(record(id, i)).unwrap();
        }
        let ids: Vec<&str> = reg.records().map(|r| r.identity.as_str()).collect();
        assert_eq!(ids, ["a", "b", "C"]);
    }
}
