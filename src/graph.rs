//! Module dependency resolution.
//!
//! Orders registered modules so that every module comes after everything it
//! requires, using Kahn's algorithm with an ordered ready set: among modules
//! whose dependencies are all placed, the smallest identity key goes next.
//! The result depends only on the record set, never on input order.
use std::collections::BTreeSet;
use std::collections::HashMap;

use crate::error::ResolveError;
use crate::fragment::name_key;
use crate::registry::{ModuleVersion, PatchRecord, PatchRegistry};

/// Subject name used when a requirement is checked against the host version.
pub const HOST_SUBJECT: &str = "host";

/// Compute the application order for every record in `registry`.
///
/// Checks run in a fixed sequence over identities in ascending key order:
/// missing dependencies, dependency version requirements, `requiredVersion`
/// against `host_version` (when given), then cycles. The first failure is
/// returned and no partial order is produced.
///
/// # Errors
///
/// Returns [`ResolveError`] for a missing dependency, an unmet version
/// requirement, or a dependency cycle.
pub fn resolve<'a>(
    registry: &'a PatchRegistry,
    host_version: Option<&ModuleVersion>,
) -> Result<Vec<&'a PatchRecord>, ResolveError> {
    let records: Vec<&PatchRecord> = registry.records().collect();
    let key_to_idx: HashMap<String, usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.registered)
        .map(|(i, r)| (r.key(), i))
        .collect();

    let edges = dependency_edges(&records, &key_to_idx)?;
    check_versions(&records, &edges, host_version)?;

    let mut in_degree: Vec<usize> = edges.iter().map(Vec::len).collect();
    let mut reverse_deps: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
    for (i, deps) in edges.iter().enumerate() {
        for &(dep_idx, _) in deps {
            if let Some(rd) = reverse_deps.get_mut(dep_idx) {
                rd.push(i);
            }
        }
    }

    // Records are sorted by key, so the smallest index is the smallest key.
    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter_map(|(i, &d)| (d == 0).then_some(i))
        .collect();
    let mut order = Vec::with_capacity(records.len());

    while let Some(idx) = ready.pop_first() {
        if let Some(record) = records.get(idx) {
            order.push(*record);
        }
        if let Some(dependents) = reverse_deps.get(idx) {
            for &dependent in dependents {
                if let Some(count) = in_degree.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }
    }

    if order.len() != records.len() {
        return Err(ResolveError::CyclicDependency {
            cycle: find_cycle(&records, &edges, &in_degree),
        });
    }

    tracing::debug!(
        "resolved order: {}",
        order
            .iter()
            .map(|r| r.identity.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(order)
}

/// Resolve every declared dependency to a record index.
///
/// Each inner vector pairs the target index with the position of the
/// dependency in the record's `dependencies` list.
fn dependency_edges(
    records: &[&PatchRecord],
    key_to_idx: &HashMap<String, usize>,
) -> Result<Vec<Vec<(usize, usize)>>, ResolveError> {
    records
        .iter()
        .map(|record| {
            record
                .dependencies
                .iter()
                .enumerate()
                .map(|(pos, dep)| {
                    key_to_idx
                        .get(&name_key(&dep.identity))
                        .map(|&idx| (idx, pos))
                        .ok_or_else(|| ResolveError::MissingDependency {
                            source_ref: record.provenance.source.clone(),
                            module: record.identity.clone(),
                            missing: dep.identity.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .collect()
}

fn check_versions(
    records: &[&PatchRecord],
    edges: &[Vec<(usize, usize)>],
    host_version: Option<&ModuleVersion>,
) -> Result<(), ResolveError> {
    for (record, deps) in records.iter().zip(edges) {
        for &(dep_idx, pos) in deps {
            let (Some(dep), Some(target)) = (record.dependencies.get(pos), records.get(dep_idx))
            else {
                continue;
            };
            let Some(requirement) = &dep.requirement else {
                continue;
            };
            let satisfied = target
                .version
                .as_ref()
                .is_some_and(|v| v.satisfies(requirement));
            if !satisfied {
                return Err(ResolveError::VersionMismatch {
                    source_ref: record.provenance.source.clone(),
                    module: record.identity.clone(),
                    subject: target.identity.clone(),
                    required: requirement.to_string(),
                    found: target.version.as_ref().map(ToString::to_string),
                });
            }
        }
    }

    let Some(host) = host_version else {
        return Ok(());
    };
    for record in records {
        if let Some(required) = &record.required_version
            && required > host
        {
            return Err(ResolveError::VersionMismatch {
                source_ref: record.provenance.source.clone(),
                module: record.identity.clone(),
                subject: HOST_SUBJECT.to_string(),
                required: format!(">= {required}"),
                found: Some(host.to_string()),
            });
        }
    }
    Ok(())
}

/// Extract one cycle from the nodes Kahn's algorithm could not place.
///
/// Walks "requires" edges from the smallest unplaced key, always taking the
/// smallest unplaced dependency, until a node repeats. The loop is rotated to
/// start at its smallest member and closed back on it.
fn find_cycle(
    records: &[&PatchRecord],
    edges: &[Vec<(usize, usize)>],
    in_degree: &[usize],
) -> Vec<String> {
    let unplaced = |i: usize| in_degree.get(i).is_some_and(|&d| d > 0);
    let Some(start) = (0..records.len()).find(|&i| unplaced(i)) else {
        return Vec::new();
    };

    let mut path: Vec<usize> = vec![start];
    let mut current = start;
    let cycle_start = loop {
        let next = edges
            .get(current)
            .and_then(|deps| deps.iter().map(|&(idx, _)| idx).filter(|&i| unplaced(i)).min());
        let Some(next) = next else {
            return Vec::new();
        };
        if let Some(pos) = path.iter().position(|&i| i == next) {
            break pos;
        }
        path.push(next);
        current = next;
    };

    let mut cycle: Vec<usize> = path.split_off(cycle_start);
    if let Some(min_pos) = cycle
        .iter()
        .enumerate()
        .min_by_key(|&(_, &idx)| idx)
        .map(|(pos, _)| pos)
    {
        cycle.rotate_left(min_pos);
    }
    if let Some(&first) = cycle.first() {
        cycle.push(first);
    }
    cycle
        .into_iter()
        .filter_map(|i| records.get(i).map(|r| r.identity.clone()))
        .collect()
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
    use crate::registry::{Dependency, Provenance, SourceRef, split_requirement};

    fn record(identity: &str, index: usize, deps: &[&str]) -> PatchRecord {
        PatchRecord {
            identity: identity.to_string(),
            registered: true,
            version: None,
            required_version: None,
            dependencies: deps
                .iter()
                .map(|d| {
                    let (identity, requirement) = split_requirement(d).expect("valid entry");
                    Dependency {
                        identity,
                        requirement,
                    }
                })
                .collect(),
            units: Vec::new(),
            weapons: Vec::new(),
            provenance: Provenance {
                source: SourceRef::new(format!("{}.cpp", identity.to_lowercase())),
                index,
                digest: String::new(),
            },
        }
    }

    fn registry(records: Vec<PatchRecord>) -> PatchRegistry {
        let mut reg = PatchRegistry::new();
        for r in records {
            reg.insert(r).expect("unique identities");
        }
        reg
    }

    fn order_of(reg: &PatchRegistry) -> Vec<String> {
        resolve(reg, None)
            .expect("should resolve")
            .into_iter()
            .map(|r| r.identity.clone())
            .collect()
    }

    fn version(v: &str) -> Option<ModuleVersion> {
        Some(ModuleVersion::parse(v).expect("valid version"))
    }

    // -----------------------------------------------------------------------
    // ordering
    // -----------------------------------------------------------------------

    #[test]
    fn independent_modules_sort_by_identity() {
        let reg = registry(vec![
            record("Gamma", 0, &[]),
            record("alpha", 1, &[]),
            record("Beta", 2, &[]),
        ]);
        assert_eq!(order_of(&reg), ["alpha", "Beta", "Gamma"]);
    }

    #[test]
    fn dependency_comes_first() {
        let reg = registry(vec![record("A", 0, &["Z"]), record("Z", 1, &[])]);
        assert_eq!(order_of(&reg), ["Z", "A"]);
    }

    #[test]
    fn diamond_uses_tie_break_between_ready_modules() {
        let reg = registry(vec![
            record("Top", 0, &["Left", "Right"]),
            record("Right", 1, &["Base"]),
            record("Left", 2, &["Base"]),
            record("Base", 3, &[]),
            record("Aside", 4, &[]),
        ]);
        assert_eq!(order_of(&reg), ["Aside", "Base", "Left", "Right", "Top"]);
    }

    #[test]
    fn order_is_independent_of_input_order() {
        let a = registry(vec![
            record("Ext", 0, &["Core"]),
            record("Core", 1, &[]),
            record("Misc", 2, &[]),
        ]);
        let b = registry(vec![
            record("Misc", 0, &[]),
            record("Core", 1, &[]),
            record("Ext", 2, &["core"]),
        ]);
        assert_eq!(order_of(&a), order_of(&b));
    }

    #[test]
    fn empty_registry_resolves_to_empty_order() {
        assert!(order_of(&PatchRegistry::new()).is_empty());
    }

    // -----------------------------------------------------------------------
    // missing dependencies
    // -----------------------------------------------------------------------

    #[test]
    fn missing_dependency_is_reported() {
        let reg = registry(vec![record("A", 0, &["X"])]);
        let err = resolve(&reg, None).expect_err("should fail");
        assert_eq!(
            err,
            ResolveError::MissingDependency {
                source_ref: SourceRef::new("a.cpp"),
                module: "A".to_string(),
                missing: "X".to_string(),
            }
        );
    }

    #[test]
    fn unregistered_fragment_cannot_be_depended_on() {
        let mut loose = record("loose.cpp", 1, &[]);
        loose.registered = false;
        let reg = registry(vec![record("A", 0, &["loose.cpp"]), loose]);
        assert!(matches!(
            resolve(&reg, None),
            Err(ResolveError::MissingDependency { .. })
        ));
    }

    #[test]
    fn missing_is_reported_before_cycle() {
        let reg = registry(vec![
            record("A", 0, &["B"]),
            record("B", 1, &["A"]),
            record("C", 2, &["Nope"]),
        ]);
        assert!(matches!(
            resolve(&reg, None),
            Err(ResolveError::MissingDependency { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // versions
    // -----------------------------------------------------------------------

    #[test]
    fn satisfied_requirement_resolves() {
        let mut core = record("Core", 0, &[]);
        core.version = version("1.4");
        let reg = registry(vec![core, record("Ext", 1, &["Core >= 1.2"])]);
        assert_eq!(order_of(&reg), ["Core", "Ext"]);
    }

    #[test]
    fn unmet_requirement_is_mismatch() {
        let mut core = record("Core", 0, &[]);
        core.version = version("1.0");
        let reg = registry(vec![core, record("Ext", 1, &["Core >= 1.2"])]);
        match resolve(&reg, None).expect_err("should fail") {
            ResolveError::VersionMismatch {
                module,
                subject,
                found,
                ..
            } => {
                assert_eq!(module, "Ext");
                assert_eq!(subject, "Core");
                assert_eq!(found.as_deref(), Some("1.0"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn requirement_on_unversioned_module_is_mismatch() {
        let reg = registry(vec![record("Core", 0, &[]), record("Ext", 1, &["Core ^1"])]);
        assert!(matches!(
            resolve(&reg, None),
            Err(ResolveError::VersionMismatch { found: None, .. })
        ));
    }

    #[test]
    fn host_version_gate() {
        let mut a = record("A", 0, &[]);
        a.required_version = version("1.2");
        let reg = registry(vec![a]);

        assert!(resolve(&reg, version("1.2").as_ref()).is_ok());
        assert!(resolve(&reg, None).is_ok(), "no host version, no check");
        match resolve(&reg, version("1.1").as_ref()).expect_err("should fail") {
            ResolveError::VersionMismatch { subject, .. } => assert_eq!(subject, HOST_SUBJECT),
            other => panic!("unexpected error: {other}"),
        }
    }

    // -----------------------------------------------------------------------
    // cycles
    // -----------------------------------------------------------------------

    #[test]
    fn two_node_cycle_names_both() {
        let reg = registry(vec![record("B", 0, &["A"]), record("A", 1, &["B"])]);
        assert_eq!(
            resolve(&reg, None).expect_err("should fail"),
            ResolveError::CyclicDependency {
                cycle: vec!["A".to_string(), "B".to_string(), "A".to_string()],
            }
        );
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let reg = registry(vec![record("Solo", 0, &["Solo"])]);
        assert_eq!(
            resolve(&reg, None).expect_err("should fail"),
            ResolveError::CyclicDependency {
                cycle: vec!["Solo".to_string(), "Solo".to_string()],
            }
        );
    }

    #[test]
    fn cycle_behind_a_dependent_is_isolated() {
        // A depends on the B -> C -> D -> B loop but is not part of it.
        let reg = registry(vec![
            record("A", 0, &["B"]),
            record("B", 1, &["C"]),
            record("C", 2, &["D"]),
            record("D", 3, &["B"]),
        ]);
        assert_eq!(
            resolve(&reg, None).expect_err("should fail"),
            ResolveError::CyclicDependency {
                cycle: ["B", "C", "D", "B"].map(String::from).to_vec(),
            }
        );
    }
}
