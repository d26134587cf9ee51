//! Domain-specific error types for the overlay engine.
//!
//! This module provides a structured error hierarchy using [`thiserror`].
//! Library modules return typed errors while the CLI commands convert them
//! to [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! SessionError
//! ├── Fragments(Vec<FragmentError>) per-fragment parse/registration faults
//! │   ├── Parse(ParseError)
//! │   ├── Registration
//! │   ├── DuplicateModule
//! │   └── VersionFormat
//! ├── Resolve(ResolveError)          missing dependency, version mismatch, cycle
//! ├── Merge(MergeError)              unresolved base class
//! └── InvalidTransition              session stage called out of order
//!
//! QueryError                         dotted-path lookups on the merged tree
//! ConfigError                        engine configuration validation
//! ```

use thiserror::Error;

use crate::fragment::Position;
use crate::registry::SourceRef;
use crate::session::SessionState;

/// Reason a fragment failed to parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A token appeared where the grammar expects something else.
    #[error("unexpected {found}, expected {expected}")]
    UnexpectedToken {
        /// Description of the token that was found.
        found: String,
        /// Description of what the parser was looking for.
        expected: &'static str,
    },

    /// Input ended in the middle of a statement.
    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof {
        /// Description of what the parser was looking for.
        expected: &'static str,
    },

    /// A character that cannot start any token.
    #[error("unexpected character '{0}'")]
    UnexpectedCharacter(char),

    /// A string literal without a closing quote on the same line.
    #[error("unterminated string literal")]
    UnterminatedString,

    /// A `/*` comment without a closing `*/`.
    #[error("unterminated block comment")]
    UnterminatedComment,

    /// An opening `{` that is never closed, or a stray `}`.
    #[error("unbalanced braces: {0}")]
    UnbalancedBraces(&'static str),

    /// A numeric literal that is not well formed.
    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),

    /// `name += value` on a property declared without `[]`.
    #[error("append marker '+=' used on non-array property '{0}'")]
    AppendOnScalar(String),

    /// `name[] += +=` or `name[] += =`.
    #[error("repeated assignment marker on array property '{0}'")]
    RepeatedAppendMarker(String),
}

/// A syntax error in one fragment, with the position it was detected at.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at {position}")]
pub struct ParseError {
    /// Where in the source the error was detected.
    pub position: Position,
    /// What went wrong.
    pub kind: ParseErrorKind,
}

impl ParseError {
    /// Create a parse error at `position`.
    #[must_use]
    pub const fn new(position: Position, kind: ParseErrorKind) -> Self {
        Self { position, kind }
    }
}

/// Errors scoped to a single fragment. Collected per fragment; they never
/// abort processing of sibling fragments.
#[derive(Error, Debug, Clone)]
pub enum FragmentError {
    /// The fragment text is not syntactically valid.
    #[error("{source_ref}: {error}")]
    Parse {
        /// Fragment the error belongs to.
        source_ref: SourceRef,
        /// Input sequence index of the fragment.
        index: usize,
        /// Underlying syntax error.
        #[source]
        error: ParseError,
    },

    /// The registration class is missing (when mandatory) or malformed.
    #[error("{source_ref}: registration error: {reason}")]
    Registration {
        /// Fragment the error belongs to.
        source_ref: SourceRef,
        /// Input sequence index of the fragment.
        index: usize,
        /// Human-readable reason.
        reason: String,
    },

    /// Another fragment earlier in the input sequence registered the same module.
    #[error("{source_ref}: duplicate module '{identity}' (already registered by {first})")]
    DuplicateModule {
        /// Fragment that lost the tie-break.
        source_ref: SourceRef,
        /// Input sequence index of the losing fragment.
        index: usize,
        /// The contested module identity.
        identity: String,
        /// Fragment that keeps the identity.
        first: SourceRef,
    },

    /// A version string does not parse as an ordered semantic version.
    #[error("{source_ref}: invalid {field} '{text}': {reason}")]
    VersionFormat {
        /// Fragment the error belongs to.
        source_ref: SourceRef,
        /// Input sequence index of the fragment.
        index: usize,
        /// Which declaration carried the version (e.g. `requiredVersion`).
        field: String,
        /// The offending text.
        text: String,
        /// Parser message.
        reason: String,
    },
}

impl FragmentError {
    /// Input sequence index of the fragment this error belongs to.
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::Parse { index, .. }
            | Self::Registration { index, .. }
            | Self::DuplicateModule { index, .. }
            | Self::VersionFormat { index, .. } => *index,
        }
    }

    /// Source reference of the fragment this error belongs to.
    #[must_use]
    pub const fn source_ref(&self) -> &SourceRef {
        match self {
            Self::Parse { source_ref, .. }
            | Self::Registration { source_ref, .. }
            | Self::DuplicateModule { source_ref, .. }
            | Self::VersionFormat { source_ref, .. } => source_ref,
        }
    }
}

/// Session-wide dependency graph errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// A declared dependency names a module that was never registered.
    #[error("{source_ref}: module '{module}' requires '{missing}', which is not registered")]
    MissingDependency {
        /// Fragment declaring the dependency.
        source_ref: SourceRef,
        /// Dependent module identity.
        module: String,
        /// The identity that could not be found.
        missing: String,
    },

    /// A version requirement is not met.
    #[error(
        "{source_ref}: module '{module}' requires {subject} {required}, found {}",
        .found.as_deref().unwrap_or("no declared version")
    )]
    VersionMismatch {
        /// Fragment declaring the requirement.
        source_ref: SourceRef,
        /// Module declaring the requirement.
        module: String,
        /// What the requirement is checked against (a module identity or `host`).
        subject: String,
        /// The requirement as written.
        required: String,
        /// The version that was found, if any.
        found: Option<String>,
    },

    /// The dependency graph contains a cycle.
    #[error("dependency cycle detected: {}", .cycle.join(" → "))]
    CyclicDependency {
        /// Identities along the cycle, closing back on the first one.
        cycle: Vec<String>,
    },
}

/// Errors raised while folding fragments into the global tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// A class names a base that is not present in any reachable scope.
    #[error("{source_ref}: class '{class_path}' inherits from unknown class '{base}'")]
    UnresolvedBaseClass {
        /// Fragment containing the class.
        source_ref: SourceRef,
        /// Dotted path of the class being declared.
        class_path: String,
        /// The base name that failed to resolve.
        base: String,
    },
}

/// Errors from dotted-path queries against the merged tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The path is empty or has an empty segment.
    #[error("invalid query path '{0}'")]
    InvalidPath(String),

    /// Nothing exists at the path.
    #[error("'{0}' not found")]
    NotFound(String),

    /// Something exists at the path but has a different shape or type.
    #[error("'{path}' is not {expected}")]
    TypeMismatch {
        /// The queried path.
        path: String,
        /// What the caller asked for.
        expected: &'static str,
    },
}

/// Top-level error for a merge session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// One or more fragments failed to parse or register.
    #[error("{} fragment(s) failed", .0.len())]
    Fragments(Vec<FragmentError>),

    /// Dependency resolution failed.
    #[error("dependency resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    /// Merging failed.
    #[error("merge failed: {0}")]
    Merge(#[from] MergeError),

    /// A session stage was invoked out of order.
    #[error("invalid session transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// State the session was in.
        from: SessionState,
        /// State that was requested.
        to: SessionState,
    },
}

/// Errors from loading and validating the engine configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A configuration value is out of range or malformed.
    #[error("invalid value for '{key}': {message}")]
    InvalidValue {
        /// Configuration key.
        key: &'static str,
        /// Human-readable reason.
        message: String,
    },
}
