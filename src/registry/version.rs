//! Ordered module versions and dependency version requirements.
//!
//! Fragment sources write versions loosely (`requiredVersion = 0.1;`), so
//! dotted numeric text is read component by component and zero-padded to
//! three components before being handed to [`semver`].
use std::cmp::Ordering;
use std::fmt;

use semver::{Version, VersionReq};

/// A module version as declared, ordered by semantic-version rules.
///
/// # Examples
///
/// ```
/// use cfgpatch::registry::ModuleVersion;
///
/// let a = ModuleVersion::parse("0.1").unwrap();
/// let b = ModuleVersion::parse("0.10.0").unwrap();
/// assert!(a < b);
/// assert_eq!(a.to_string(), "0.1");
/// ```
#[derive(Debug, Clone)]
pub struct ModuleVersion {
    raw: String,
    version: Version,
}

impl ModuleVersion {
    /// Parse a declared version, padding `1` and `1.2` to three components.
    ///
    /// # Errors
    ///
    /// Returns the parser message if the text is not a version.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("version is empty".to_string());
        }
        let version = Version::parse(&normalize(trimmed)).map_err(|e| e.to_string())?;
        Ok(Self {
            raw: trimmed.to_string(),
            version,
        })
    }

    /// The underlying semantic version.
    #[must_use]
    pub const fn semver(&self) -> &Version {
        &self.version
    }

    /// Whether this version satisfies `req`.
    #[must_use]
    pub fn satisfies(&self, req: &VersionReq) -> bool {
        req.matches(&self.version)
    }
}

/// Rewrite purely numeric text as `major.minor.patch`: components are read
/// as integers (so `1.05` is `1.5.0`) and missing ones are zero-filled.
fn normalize(raw: &str) -> String {
    let components: Option<Vec<u64>> = raw
        .split('.')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            part.parse().ok()
        })
        .collect();
    let Some(mut components) = components else {
        return raw.to_string();
    };
    if components.len() < 3 {
        components.resize(3, 0);
    }
    components
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

impl PartialEq for ModuleVersion {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
    }
}

impl Eq for ModuleVersion {}

impl PartialOrd for ModuleVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModuleVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version.cmp(&other.version)
    }
}

impl fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split a `requiredAddons[]` entry into identity and optional requirement.
///
/// `"Core"` has no requirement; `"Core >= 1.2"` and `"Core^1"` do.
///
/// # Errors
///
/// Returns the parser message when the requirement part is malformed.
pub fn split_requirement(entry: &str) -> Result<(String, Option<VersionReq>), String> {
    let entry = entry.trim();
    let split_at = entry
        .find(|c: char| c.is_whitespace() || matches!(c, '<' | '>' | '=' | '^' | '~' | '*'))
        .unwrap_or(entry.len());
    let (identity, rest) = entry.split_at(split_at);
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok((identity.to_string(), None));
    }
    let req = VersionReq::parse(rest).map_err(|e| e.to_string())?;
    Ok((identity.to_string(), Some(req)))
}
