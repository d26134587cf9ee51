//! Merge session: the state machine driving parse, register, resolve and merge.
//!
//! ```text
//! Empty → Parsing → Registering → Resolving → Merging → Finalized
//!            └───────────┴────────────┴──────────┴──→ Failed
//! ```
//!
//! Parsing and registration run per fragment, on a rayon pool when
//! [`SessionOptions::parallel`] is set. Registration workers share one
//! mutex-guarded [`PatchRegistry`]; duplicate identities are settled by input
//! sequence index, so the outcome never depends on scheduling. Resolution and
//! merging are single-threaded and start only once every worker has finished.
use std::sync::{Arc, Mutex, PoisonError};

use rayon::prelude::*;
use serde::Deserialize;

use crate::error::{FragmentError, SessionError};
use crate::fragment::{FragmentNode, parse_fragment};
use crate::graph;
use crate::merge::{GlobalTree, MergeEngine};
pub use crate::registry::FragmentSource;
use crate::registry::{
    ModuleVersion, PatchRecord, PatchRegistry, RegistrationOptions, SourceRef, extract_record,
};

/// Lifecycle stage of a [`MergeSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, nothing loaded.
    Empty,
    /// Fragments parsed.
    Parsing,
    /// Module metadata registered.
    Registering,
    /// Merge order computed.
    Resolving,
    /// Folding into the tree.
    Merging,
    /// Tree handed over.
    Finalized,
    /// A stage failed; the session is unusable.
    Failed,
}

/// What to do with fragments that fail to parse or register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentErrorPolicy {
    /// Fail the session, reporting every fragment error at once.
    #[default]
    Reject,
    /// Exclude the invalid fragments and continue with the rest.
    Skip,
}

/// Knobs for one session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Registration class name and whether it is mandatory.
    pub registration: RegistrationOptions,
    /// Host version checked against every `requiredVersion`.
    pub host_version: Option<ModuleVersion>,
    /// Policy for fragment-scoped errors.
    pub on_fragment_error: FragmentErrorPolicy,
    /// Parse and register on the rayon pool.
    pub parallel: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            registration: RegistrationOptions::default(),
            host_version: None,
            on_fragment_error: FragmentErrorPolicy::Reject,
            parallel: true,
        }
    }
}

/// Final status of one input fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentStatus {
    /// Folded into the tree.
    Merged,
    /// Excluded under [`FragmentErrorPolicy::Skip`].
    Skipped,
    /// Rejected; the session did not produce a tree.
    Failed,
}

/// Per-fragment line of a [`SessionReport`].
#[derive(Debug, Clone)]
pub struct FragmentReport {
    /// Input sequence index.
    pub index: usize,
    /// Where the fragment came from.
    pub source: SourceRef,
    /// Module identity, when the fragment registered.
    pub identity: Option<String>,
    /// What happened to it.
    pub status: FragmentStatus,
}

/// Per-fragment outcome of a successful session.
#[derive(Debug, Clone, Default)]
pub struct SessionReport {
    /// One entry per input fragment, in input order.
    pub fragments: Vec<FragmentReport>,
    /// Errors of skipped fragments, sorted by input index.
    pub errors: Vec<FragmentError>,
}

impl SessionReport {
    /// Number of fragments with the given status.
    #[must_use]
    pub fn count(&self, status: FragmentStatus) -> usize {
        self.fragments.iter().filter(|f| f.status == status).count()
    }
}

/// Everything a finalized session hands to the host.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// The merged tree, immutable and shareable across threads.
    pub tree: Arc<GlobalTree>,
    /// Records in the order they were merged.
    pub order: Vec<PatchRecord>,
    /// Per-fragment statuses.
    pub report: SessionReport,
}

/// One merge run over a set of fragments.
///
/// Stages must be called in order: [`parse`](Self::parse),
/// [`register`](Self::register), [`resolve`](Self::resolve),
/// [`merge`](Self::merge). [`run`](Self::run) does all four.
#[derive(Debug)]
pub struct MergeSession {
    options: SessionOptions,
    state: SessionState,
    sources: Vec<FragmentSource>,
    forests: Vec<Option<Vec<FragmentNode>>>,
    errors: Vec<FragmentError>,
    registry: PatchRegistry,
    order: Vec<PatchRecord>,
}

impl MergeSession {
    /// A session in the [`SessionState::Empty`] state.
    #[must_use]
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            state: SessionState::Empty,
            sources: Vec::new(),
            forests: Vec::new(),
            errors: Vec::new(),
            registry: PatchRegistry::new(),
            order: Vec::new(),
        }
    }

    /// Run every stage over `sources`.
    ///
    /// # Errors
    ///
    /// Returns the first [`SessionError`] any stage produces.
    pub fn run(
        sources: Vec<FragmentSource>,
        options: &SessionOptions,
    ) -> Result<MergeOutcome, SessionError> {
        let mut session = Self::new(options.clone());
        session.parse(sources)?;
        session.register()?;
        session.resolve()?;
        session.merge()
    }

    /// Current state of the session.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Fragment errors collected so far, sorted by input index.
    #[must_use]
    pub fn errors(&self) -> &[FragmentError] {
        &self.errors
    }

    /// Registered records (available from the registering stage on).
    #[must_use]
    pub const fn registry(&self) -> &PatchRegistry {
        &self.registry
    }

    /// The resolved order (available after [`resolve`](Self::resolve)).
    #[must_use]
    pub fn order(&self) -> &[PatchRecord] {
        &self.order
    }

    /// Parse every fragment. Syntax errors are collected, not raised.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidTransition`] unless the session is empty.
    pub fn parse(&mut self, sources: Vec<FragmentSource>) -> Result<(), SessionError> {
        self.transition(SessionState::Empty, SessionState::Parsing)?;

        let results = map_each(&sources, self.options.parallel, |index, source| {
            let result = parse_fragment(&source.text).map_err(|error| FragmentError::Parse {
                source_ref: source.source.clone(),
                index,
                error,
            });
            match &result {
                Ok(forest) => tracing::debug!("parsed {} ({} classes)", source.source, forest.len()),
                Err(e) => tracing::debug!("parse failed: {e}"),
            }
            result
        });

        for result in results {
            match result {
                Ok(forest) => self.forests.push(Some(forest)),
                Err(e) => {
                    self.forests.push(None);
                    self.errors.push(e);
                }
            }
        }
        tracing::info!(
            "parsed {} fragment(s), {} with errors",
            sources.len(),
            self.errors.len()
        );
        self.sources = sources;
        Ok(())
    }

    /// Extract and register module metadata for every parsed fragment.
    ///
    /// # Errors
    ///
    /// [`SessionError::Fragments`] with every parse and registration error
    /// when the policy is [`FragmentErrorPolicy::Reject`] and any occurred.
    pub fn register(&mut self) -> Result<(), SessionError> {
        self.transition(SessionState::Parsing, SessionState::Registering)?;

        let registry = Mutex::new(PatchRegistry::new());
        let options = &self.options.registration;
        let work: Vec<(usize, &FragmentSource, &[FragmentNode])> = self
            .sources
            .iter()
            .zip(&self.forests)
            .enumerate()
            .filter_map(|(i, (source, forest))| forest.as_deref().map(|f| (i, source, f)))
            .collect();

        let results = map_each(&work, self.options.parallel, |_, &(index, source, forest)| {
            let record = extract_record(forest, source, index, options)?;
            tracing::debug!(
                "registered {} as '{}'{}",
                source.source,
                record.identity,
                if record.registered { "" } else { " (unregistered)" }
            );
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(record)
        });

        // The parallel iterator returning is the registration barrier.
        self.errors.extend(results.into_iter().filter_map(Result::err));
        self.errors.sort_by_key(FragmentError::index);
        self.registry = registry
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        tracing::info!("registered {} module(s)", self.registry.len());

        if self.errors.is_empty() {
            return Ok(());
        }
        match self.options.on_fragment_error {
            FragmentErrorPolicy::Reject => {
                let errors = self.errors.clone();
                Err(self.fail(SessionError::Fragments(errors)))
            }
            FragmentErrorPolicy::Skip => {
                for e in &self.errors {
                    tracing::warn!("skipping fragment: {e}");
                }
                Ok(())
            }
        }
    }

    /// Compute the merge order.
    ///
    /// # Errors
    ///
    /// [`SessionError::Resolve`] for a missing dependency, version mismatch
    /// or cycle.
    pub fn resolve(&mut self) -> Result<(), SessionError> {
        self.transition(SessionState::Registering, SessionState::Resolving)?;
        let resolved = graph::resolve(&self.registry, self.options.host_version.as_ref())
            .map(|order| order.into_iter().cloned().collect::<Vec<_>>());
        match resolved {
            Ok(order) => {
                self.order = order;
                tracing::info!("resolved order of {} module(s)", self.order.len());
                Ok(())
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Fold every fragment into a fresh tree in resolved order.
    ///
    /// # Errors
    ///
    /// [`SessionError::Merge`] if a base class cannot be resolved; the
    /// partial tree is dropped.
    pub fn merge(&mut self) -> Result<MergeOutcome, SessionError> {
        self.transition(SessionState::Resolving, SessionState::Merging)?;

        let mut engine = MergeEngine::new();
        let applied = self.order.iter().try_for_each(|record| {
            match self.forests.get(record.provenance.index) {
                Some(Some(forest)) => engine.apply(forest, &record.provenance.source),
                _ => Ok(()),
            }
        });
        if let Err(e) = applied {
            return Err(self.fail(e.into()));
        }
        let tree = Arc::new(engine.finish());
        self.state = SessionState::Finalized;
        tracing::info!("merged {} fragment(s)", self.order.len());

        Ok(MergeOutcome {
            tree,
            order: std::mem::take(&mut self.order),
            report: self.report(),
        })
    }

    fn report(&self) -> SessionReport {
        let fragments = self
            .sources
            .iter()
            .enumerate()
            .map(|(index, source)| {
                let failed = self.errors.iter().any(|e| e.index() == index);
                let identity = self
                    .registry
                    .records()
                    .find(|r| r.provenance.index == index)
                    .map(|r| r.identity.clone());
                FragmentReport {
                    index,
                    source: source.source.clone(),
                    identity,
                    status: if failed {
                        FragmentStatus::Skipped
                    } else {
                        FragmentStatus::Merged
                    },
                }
            })
            .collect();
        SessionReport {
            fragments,
            errors: self.errors.clone(),
        }
    }

    fn transition(&mut self, from: SessionState, to: SessionState) -> Result<(), SessionError> {
        if self.state != from {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        tracing::trace!("session {from:?} -> {to:?}");
        self.state = to;
        Ok(())
    }

    fn fail(&mut self, error: SessionError) -> SessionError {
        tracing::debug!("session failed in {:?}: {error}", self.state);
        self.state = SessionState::Failed;
        error
    }
}

/// Map `work` over `items` in input order, on the rayon pool or inline.
fn map_each<T, R, F>(items: &[T], parallel: bool, work: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> R + Sync + Send,
{
    if parallel {
        items
            .par_iter()
            .enumerate()
            .map(|(i, item)| work(i, item))
            .collect()
    } else {
        items
            .iter()
            .enumerate()
            .map(|(i, item)| work(i, item))
            .collect()
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
    use crate::error::ResolveError;
    use crate::fragment::Value;

    fn core() -> FragmentSource {
        FragmentSource::new(
            "core/config.cpp",
            r#"
            class CfgPatches { class Core { requiredAddons[] = {}; }; };
            class CfgMods { class Core { files[] = {"a"}; }; };
            "#,
        )
    }

    fn ext() -> FragmentSource {
        FragmentSource::new(
            "ext/config.cpp",
            r#"
            class CfgPatches { class Ext { requiredAddons[] = {"Core"}; }; };
            class CfgMods { class Core { files[] += {"b"}; }; };
            "#,
        )
    }

    fn sequential() -> SessionOptions {
        SessionOptions {
            parallel: false,
            ..SessionOptions::default()
        }
    }

    fn skip() -> SessionOptions {
        SessionOptions {
            on_fragment_error: FragmentErrorPolicy::Skip,
            ..SessionOptions::default()
        }
    }

    fn files(outcome: &MergeOutcome) -> Vec<String> {
        outcome
            .tree
            .get_array("CfgMods.Core.files")
            .expect("files array")
            .iter()
            .filter_map(|s| s.as_str().map(str::to_string))
            .collect()
    }

    fn identities(outcome: &MergeOutcome) -> Vec<&str> {
        outcome.order.iter().map(|r| r.identity.as_str()).collect()
    }

    // -----------------------------------------------------------------------
    // end to end
    // -----------------------------------------------------------------------

    #[test]
    fn dependent_append_lands_after_base() {
        let outcome = MergeSession::run(vec![ext(), core()], &SessionOptions::default())
            .expect("session should finalize");
        assert_eq!(identities(&outcome), ["Core", "Ext"]);
        assert_eq!(files(&outcome), ["a", "b"]);
        assert_eq!(outcome.report.count(FragmentStatus::Merged), 2);
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let sources = || {
            let mut v = vec![core(), ext()];
            for i in 0..16 {
                v.push(FragmentSource::new(
                    format!("m{i}.cpp"),
                    format!(
                        "class CfgPatches {{ class M{i} {{ requiredAddons[] = {{\"Core\"}}; }}; }};
                         class CfgMods {{ class Core {{ files[] += {{\"m{i}\"}}; }}; }};"
                    ),
                ));
            }
            v
        };
        let par = MergeSession::run(sources(), &SessionOptions::default()).unwrap();
        let seq = MergeSession::run(sources(), &sequential()).unwrap();
        assert_eq!(par.tree, seq.tree);
        assert_eq!(identities(&par), identities(&seq));
    }

    #[test]
    fn permuted_input_gives_same_tree() {
        let a = MergeSession::run(vec![core(), ext()], &SessionOptions::default()).unwrap();
        let b = MergeSession::run(vec![ext(), core()], &SessionOptions::default()).unwrap();
        assert_eq!(a.tree, b.tree);
    }

    #[test]
    fn empty_input_finalizes_with_empty_tree() {
        let outcome = MergeSession::run(Vec::new(), &SessionOptions::default()).unwrap();
        assert!(outcome.tree.is_empty());
        assert!(outcome.order.is_empty());
    }

    #[test]
    fn unregistered_fragment_is_merged_by_source_order_key() {
        let loose = FragmentSource::new("zz_loose.cpp", "class CfgMods { class Core { extra = 1; }; };");
        let outcome = MergeSession::run(vec![loose, core()], &SessionOptions::default()).unwrap();
        assert_eq!(identities(&outcome), ["Core", "zz_loose.cpp"]);
        assert_eq!(
            outcome.tree.get("CfgMods.Core.extra").unwrap(),
            &Value::Scalar(crate::fragment::Scalar::Number("1".to_string()))
        );
    }

    // -----------------------------------------------------------------------
    // failures
    // -----------------------------------------------------------------------

    #[test]
    fn missing_dependency_fails_session() {
        let outcome = MergeSession::run(vec![ext()], &SessionOptions::default());
        assert!(matches!(
            outcome,
            Err(SessionError::Resolve(ResolveError::MissingDependency { .. }))
        ));
    }

    #[test]
    fn cycle_fails_session() {
        let a = FragmentSource::new("a.cpp", "class CfgPatches { class A { requiredAddons[] = {\"B\"}; }; };");
        let b = FragmentSource::new("b.cpp", "class CfgPatches { class B { requiredAddons[] = {\"A\"}; }; };");
        let mut session = MergeSession::new(SessionOptions::default());
        session.parse(vec![a, b]).unwrap();
        session.register().unwrap();
        let err = session.resolve().expect_err("cycle");
        assert!(err.to_string().contains("A → B → A"));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn reject_policy_reports_all_fragment_errors_sorted() {
        let bad_syntax = FragmentSource::new("0.cpp", "class {");
        let bad_registration = FragmentSource::new("1.cpp", "class CfgPatches {};");
        let duplicate = FragmentSource::new("3.cpp", "class CfgPatches { class Core {}; };");
        let err = MergeSession::run(
            vec![bad_syntax, bad_registration, core(), duplicate],
            &SessionOptions::default(),
        )
        .expect_err("should fail");
        let errors = match err {
            SessionError::Fragments(errors) => errors,
            other => panic!("unexpected error: {other}"),
        };
        let indexes: Vec<usize> = errors.iter().map(FragmentError::index).collect();
        assert_eq!(indexes, [0, 1, 3]);
        assert!(matches!(errors[2], FragmentError::DuplicateModule { .. }));
    }

    #[test]
    fn skip_policy_excludes_invalid_fragments() {
        let broken = FragmentSource::new("broken.cpp", "class CfgMods { files[] += ; };");
        let outcome = MergeSession::run(vec![core(), broken, ext()], &skip()).unwrap();
        assert_eq!(files(&outcome), ["a", "b"]);
        assert_eq!(outcome.report.count(FragmentStatus::Skipped), 1);
        assert_eq!(outcome.report.fragments[1].status, FragmentStatus::Skipped);
        assert_eq!(outcome.report.fragments[2].identity.as_deref(), Some("Ext"));
        assert_eq!(outcome.report.errors.len(), 1);
    }

    #[test]
    fn skipped_dependency_surfaces_as_missing() {
        let broken_core = FragmentSource::new("core.cpp", "class CfgPatches { class Core { x = ; }; };");
        let err = MergeSession::run(vec![broken_core, ext()], &skip()).expect_err("should fail");
        assert!(matches!(
            err,
            SessionError::Resolve(ResolveError::MissingDependency { .. })
        ));
    }

    #[test]
    fn duplicate_keeps_lowest_index_under_parallel_registration() {
        let first = FragmentSource::new("first.cpp", "class CfgPatches { class Core {}; }; class Cfg { v = 1; };");
        let second = FragmentSource::new("second.cpp", "class CfgPatches { class Core {}; }; class Cfg { v = 2; };");
        for _ in 0..8 {
            let outcome = MergeSession::run(vec![first.clone(), second.clone()], &skip()).unwrap();
            assert_eq!(outcome.order[0].provenance.source.as_str(), "first.cpp");
            assert_eq!(outcome.report.errors[0].index(), 1);
        }
    }

    #[test]
    fn unresolved_base_fails_merge() {
        let src = FragmentSource::new("a.cpp", "class Cfg { class Child: Nope {}; };");
        let err = MergeSession::run(vec![src], &SessionOptions::default()).expect_err("should fail");
        assert!(matches!(err, SessionError::Merge(_)));
    }

    #[test]
    fn host_version_is_enforced() {
        let src = FragmentSource::new(
            "a.cpp",
            "class CfgPatches { class A { requiredVersion = 2.0; }; };",
        );
        let options = SessionOptions {
            host_version: Some(ModuleVersion::parse("1.5").unwrap()),
            ..SessionOptions::default()
        };
        assert!(matches!(
            MergeSession::run(vec![src], &options),
            Err(SessionError::Resolve(ResolveError::VersionMismatch { .. }))
        ));
    }

    // -----------------------------------------------------------------------
    // state machine
    // -----------------------------------------------------------------------

    #[test]
    fn stages_out_of_order_are_rejected() {
        let mut session = MergeSession::new(SessionOptions::default());
        let err = session.resolve().expect_err("not registered yet");
        assert!(matches!(
            err,
            SessionError::InvalidTransition {
                from: SessionState::Empty,
                to: SessionState::Resolving
            }
        ));
        assert_eq!(session.state(), SessionState::Empty);
    }

    #[test]
    fn stages_are_not_reentrant() {
        let mut session = MergeSession::new(SessionOptions::default());
        session.parse(vec![core()]).unwrap();
        assert!(session.parse(vec![core()]).is_err());
        session.register().unwrap();
        session.resolve().unwrap();
        assert_eq!(session.order().len(), 1);
        session.merge().unwrap();
        assert_eq!(session.state(), SessionState::Finalized);
        assert!(session.merge().is_err());
    }

    #[test]
    fn finalized_tree_is_shareable_across_threads() {
        let outcome = MergeSession::run(vec![core(), ext()], &SessionOptions::default()).unwrap();
        let tree = Arc::clone(&outcome.tree);
        let handle = std::thread::spawn(move || tree.get_array("CfgMods.Core.files").map(<[_]>::len));
        assert_eq!(handle.join().unwrap(), Ok(2));
    }
}
