//! Folding ordered fragments into the global tree.
//!
//! Rules, applied per class against the current tree level:
//!
//! - absent class: create it; a declared base is resolved by name at this
//!   level and then each enclosing level, and its current properties and
//!   children are copied in (a snapshot, not a live link);
//! - present class: properties override, `+=` arrays concatenate, a declared
//!   base must still resolve and replaces the recorded parent name;
//! - forward declarations never create anything.
mod tree;

pub use tree::{Entry, GlobalNode, GlobalProperty, GlobalTree};

use crate::error::MergeError;
use crate::fragment::{FragmentNode, PropertyEntry, Value, name_key};
use crate::registry::SourceRef;

/// Sequentially folds fragments into a [`GlobalTree`].
#[derive(Debug, Default)]
pub struct MergeEngine {
    tree: GlobalTree,
}

impl MergeEngine {
    /// Start from an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fragment's forest into the tree.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::UnresolvedBaseClass`] if a declared base class
    /// cannot be found. The tree may be partially updated at that point and
    /// must be discarded.
    pub fn apply(&mut self, forest: &[FragmentNode], source: &SourceRef) -> Result<(), MergeError> {
        let mut scope = Vec::new();
        for node in forest {
            self.fold(&mut scope, node, source)?;
        }
        tracing::debug!("applied {source}");
        Ok(())
    }

    /// Hand over the merged tree.
    #[must_use]
    pub fn finish(self) -> GlobalTree {
        self.tree
    }

    /// Fold `node` into the class at `scope` (a path of lowercased keys).
    fn fold(
        &mut self,
        scope: &mut Vec<String>,
        node: &FragmentNode,
        source: &SourceRef,
    ) -> Result<(), MergeError> {
        let key = node.key();
        if node.forward {
            tracing::trace!("{source}: forward declaration of '{}' skipped", node.name);
            return Ok(());
        }

        let exists = self
            .tree
            .root()
            .descend(scope)
            .and_then(|level| level.child_by_key(&key))
            .is_some();

        let seed = match &node.parent {
            Some(base) => {
                let found = self.resolve_base(scope, &key, node, base, source)?;
                (!exists).then(|| found.clone())
            }
            None => None,
        };

        // The scope always exists: every level on it was created or found
        // by the enclosing call before recursing.
        let Some(level) = self.tree.root_mut().descend_mut(scope) else {
            return Ok(());
        };

        if exists {
            if let (Some(base), Some(target)) = (&node.parent, level.child_by_key_mut(&key)) {
                target.set_parent(base.clone());
            }
            tracing::debug!("{source}: override {}", display_path(scope, &node.name));
        } else {
            let created = match (&node.parent, seed) {
                (Some(base), Some(snapshot)) => GlobalNode::derived(&node.name, base.clone(), &snapshot),
                _ => GlobalNode::new(&node.name, None),
            };
            level.insert_child(key.clone(), created);
            tracing::debug!("{source}: create {}", display_path(scope, &node.name));
        }

        if let Some(target) = level.child_by_key_mut(&key) {
            for entry in &node.properties {
                apply_property(target, entry, source);
            }
        }

        scope.push(key);
        for child in &node.children {
            self.fold(scope, child, source)?;
        }
        scope.pop();
        Ok(())
    }

    /// Find `base` at the current level, then each enclosing level up to the
    /// root. The class being declared never resolves to itself.
    fn resolve_base(
        &self,
        scope: &[String],
        self_key: &str,
        node: &FragmentNode,
        base: &str,
        source: &SourceRef,
    ) -> Result<&GlobalNode, MergeError> {
        let base_key = name_key(base);
        for depth in (0..=scope.len()).rev() {
            let Some(level) = scope
                .get(..depth)
                .and_then(|keys| self.tree.root().descend(keys))
            else {
                continue;
            };
            if depth == scope.len() && base_key == self_key {
                continue;
            }
            if let Some(found) = level.child_by_key(&base_key) {
                return Ok(found);
            }
        }
        Err(MergeError::UnresolvedBaseClass {
            source_ref: source.clone(),
            class_path: self.class_path(scope, &node.name),
            base: base.to_string(),
        })
    }

    /// Dotted path using declared spellings, for error messages.
    fn class_path(&self, scope: &[String], name: &str) -> String {
        let mut names = Vec::with_capacity(scope.len() + 1);
        let mut level = self.tree.root();
        for key in scope {
            match level.child_by_key(key) {
                Some(next) => {
                    names.push(next.name().to_string());
                    level = next;
                }
                None => names.push(key.clone()),
            }
        }
        names.push(name.to_string());
        names.join(".")
    }
}

fn display_path(scope: &[String], name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{name}", scope.join("."))
    }
}

fn apply_property(target: &mut GlobalNode, entry: &PropertyEntry, source: &SourceRef) {
    let key = name_key(&entry.name);
    let Some(existing) = target.property_mut(&key) else {
        if entry.append {
            tracing::debug!(
                "{source}: '{}' += with no existing array, treated as assignment",
                entry.name
            );
        }
        target.insert_property(
            key,
            GlobalProperty {
                name: entry.name.clone(),
                value: entry.value.clone(),
            },
        );
        return;
    };

    match (&mut existing.value, &entry.value) {
        (Value::Array(current), Value::Array(more)) if entry.append => {
            current.extend(more.iter().cloned());
        }
        (current, new) => {
            if entry.append {
                tracing::warn!(
                    "{source}: '{}' += over a scalar, treated as assignment",
                    entry.name
                );
            } else if current.is_array() != new.is_array() {
                tracing::warn!(
                    "{source}: '{}' changes between scalar and array",
                    entry.name
                );
            }
            current.clone_from(new);
        }
    }
}

/// Fold ordered fragments into a fresh tree.
///
/// # Errors
///
/// Returns the first [`MergeError`]; no tree is produced.
pub fn merge_all<'a, I>(fragments: I) -> Result<GlobalTree, MergeError>
where
    I: IntoIterator<Item = (&'a [FragmentNode], &'a SourceRef)>,
{
    let mut engine = MergeEngine::new();
    for (forest, source) in fragments {
        engine.apply(forest, source)?;
    }
    Ok(engine.finish())
}
