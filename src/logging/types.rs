//! Summary entries recorded by the [`Logger`](super::Logger).
use crate::session::FragmentStatus;

/// Fragment result for summary reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentEntry {
    /// Source reference of the fragment.
    pub source: String,
    /// Module identity, when the fragment registered.
    pub identity: Option<String>,
    /// Final status of the fragment.
    pub status: FragmentStatus,
    /// Optional detail message (e.g. the error that excluded it).
    pub message: Option<String>,
}

impl FragmentEntry {
    /// Label shown in the summary: the identity when it differs from the
    /// source, otherwise the source alone.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.identity {
            Some(identity) if identity != &self.source => format!("{identity} ({})", self.source),
            _ => self.source.clone(),
        }
    }
}
