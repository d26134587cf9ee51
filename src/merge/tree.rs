//! The merged global configuration tree.
//!
//! Every level keeps its properties and child classes in insertion-ordered
//! maps keyed by lowercased name, so lookups are case-insensitive and O(1)
//! while iteration still follows first-declaration order.
use indexmap::IndexMap;

use crate::error::QueryError;
use crate::fragment::{Scalar, Value, name_key};

/// A property on a merged class: the first-declared spelling and current value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalProperty {
    /// Name as first declared.
    pub name: String,
    /// Current merged value.
    pub value: Value,
}

/// A merged class.
#[derive(Debug, Clone, Default)]
pub struct GlobalNode {
    name: String,
    parent: Option<String>,
    properties: IndexMap<String, GlobalProperty>,
    children: IndexMap<String, Self>,
}

/// Something found at a dotted path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry<'a> {
    /// A class.
    Class(&'a GlobalNode),
    /// A property value.
    Value(&'a Value),
}

impl GlobalNode {
    /// Create an empty class.
    #[must_use]
    pub fn new(name: impl Into<String>, parent: Option<String>) -> Self {
        Self {
            name: name.into(),
            parent,
            properties: IndexMap::new(),
            children: IndexMap::new(),
        }
    }

    /// Create a class seeded with a copy of `base`'s properties and children.
    #[must_use]
    pub(crate) fn derived(name: impl Into<String>, parent: String, base: &Self) -> Self {
        Self {
            name: name.into(),
            parent: Some(parent),
            properties: base.properties.clone(),
            children: base.children.clone(),
        }
    }

    /// Class name with its original casing.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the class this one was declared to inherit from.
    #[must_use]
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Look up a property value (case-insensitive).
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(&name_key(name)).map(|p| &p.value)
    }

    /// Look up a direct child class (case-insensitive).
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.get(&name_key(name))
    }

    /// Properties in first-declaration order.
    pub fn properties(&self) -> impl ExactSizeIterator<Item = &GlobalProperty> {
        self.properties.values()
    }

    /// Child classes in creation order.
    pub fn children(&self) -> impl ExactSizeIterator<Item = &Self> {
        self.children.values()
    }

    /// `true` when the class has neither properties nor children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.children.is_empty()
    }

    pub(crate) fn child_by_key(&self, key: &str) -> Option<&Self> {
        self.children.get(key)
    }

    pub(crate) fn child_by_key_mut(&mut self, key: &str) -> Option<&mut Self> {
        self.children.get_mut(key)
    }

    /// Walk down a path of child keys.
    pub(crate) fn descend(&self, keys: &[String]) -> Option<&Self> {
        keys.iter()
            .try_fold(self, |node, key| node.children.get(key))
    }

    pub(crate) fn descend_mut(&mut self, keys: &[String]) -> Option<&mut Self> {
        keys.iter()
            .try_fold(self, |node, key| node.children.get_mut(key))
    }

    pub(crate) fn insert_child(&mut self, key: String, child: Self) {
        self.children.insert(key, child);
    }

    pub(crate) fn set_parent(&mut self, parent: String) {
        self.parent = Some(parent);
    }

    pub(crate) fn property_mut(&mut self, key: &str) -> Option<&mut GlobalProperty> {
        self.properties.get_mut(key)
    }

    pub(crate) fn insert_property(&mut self, key: String, property: GlobalProperty) {
        self.properties.insert(key, property);
    }
}

// IndexMap equality ignores order; merged trees are equal only when their
// declaration order matches too.
impl PartialEq for GlobalNode {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.parent == other.parent
            && self.properties.len() == other.properties.len()
            && self.children.len() == other.children.len()
            && self
                .properties
                .iter()
                .zip(&other.properties)
                .all(|(a, b)| a == b)
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(a, b)| a == b)
    }
}

impl Eq for GlobalNode {}

/// The single merged configuration tree handed to the host.
///
/// Read-only once a session finalizes; share it with `Arc<GlobalTree>`.
///
/// # Examples
///
/// ```
/// use cfgpatch::fragment::Value;
/// use cfgpatch::session::{FragmentSource, MergeSession, SessionOptions};
///
/// let outcome = MergeSession::run(
///     vec![FragmentSource::new(
///         "core.cpp",
///         "class CfgPatches { class Core {}; }; class CfgMods { class Core { name = \"Core\"; }; };",
///     )],
///     &SessionOptions::default(),
/// )
/// .unwrap();
/// assert_eq!(outcome.tree.get_str("cfgmods.core.NAME").unwrap(), "Core");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalTree {
    root: GlobalNode,
}

impl GlobalTree {
    /// An empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The unnamed root holding the top-level classes.
    #[must_use]
    pub const fn root(&self) -> &GlobalNode {
        &self.root
    }

    pub(crate) const fn root_mut(&mut self) -> &mut GlobalNode {
        &mut self.root
    }

    /// Top-level classes in creation order.
    pub fn classes(&self) -> impl ExactSizeIterator<Item = &GlobalNode> {
        self.root.children()
    }

    /// `true` when no class has been merged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Resolve a dotted path to a class or a property value.
    ///
    /// Every segment is matched case-insensitively. On the last segment a
    /// property takes precedence over a class of the same name.
    ///
    /// # Errors
    ///
    /// [`QueryError::InvalidPath`] for an empty path or segment,
    /// [`QueryError::NotFound`] when nothing exists there.
    pub fn lookup(&self, path: &str) -> Result<Entry<'_>, QueryError> {
        let segments = split_path(path)?;
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| QueryError::InvalidPath(path.to_string()))?;
        let not_found = || QueryError::NotFound(path.to_string());

        let mut node = &self.root;
        for segment in parents {
            node = node.child_by_key(&name_key(segment)).ok_or_else(not_found)?;
        }
        let key = name_key(last);
        if let Some(property) = node.properties.get(&key) {
            return Ok(Entry::Value(&property.value));
        }
        node.child_by_key(&key)
            .map(Entry::Class)
            .ok_or_else(not_found)
    }

    /// Resolve a dotted path to a property value.
    ///
    /// # Errors
    ///
    /// [`QueryError::NotFound`] if there is no property at `path`.
    pub fn get(&self, path: &str) -> Result<&Value, QueryError> {
        match self.lookup(path)? {
            Entry::Value(value) => Ok(value),
            Entry::Class(_) => Err(QueryError::NotFound(path.to_string())),
        }
    }

    /// Resolve a dotted path to a class.
    ///
    /// # Errors
    ///
    /// [`QueryError::NotFound`] if there is no class at `path`.
    pub fn class(&self, path: &str) -> Result<&GlobalNode, QueryError> {
        let segments = split_path(path)?;
        segments
            .iter()
            .try_fold(&self.root, |node, segment| {
                node.child_by_key(&name_key(segment))
            })
            .ok_or_else(|| QueryError::NotFound(path.to_string()))
    }

    /// String property at `path`.
    ///
    /// # Errors
    ///
    /// [`QueryError::TypeMismatch`] if the value is not a string.
    pub fn get_str(&self, path: &str) -> Result<&str, QueryError> {
        self.get(path)?
            .as_scalar()
            .and_then(Scalar::as_str)
            .ok_or_else(|| mismatch(path, "a string"))
    }

    /// Numeric property at `path`.
    ///
    /// # Errors
    ///
    /// [`QueryError::TypeMismatch`] if the value is not a number.
    pub fn get_f64(&self, path: &str) -> Result<f64, QueryError> {
        self.get(path)?
            .as_scalar()
            .and_then(Scalar::as_f64)
            .ok_or_else(|| mismatch(path, "a number"))
    }

    /// Array property at `path`.
    ///
    /// # Errors
    ///
    /// [`QueryError::TypeMismatch`] if the value is a scalar.
    pub fn get_array(&self, path: &str) -> Result<&[Scalar], QueryError> {
        self.get(path)?
            .as_array()
            .ok_or_else(|| mismatch(path, "an array"))
    }
}

fn mismatch(path: &str, expected: &'static str) -> QueryError {
    QueryError::TypeMismatch {
        path: path.to_string(),
        expected,
    }
}

fn split_path(path: &str) -> Result<Vec<&str>, QueryError> {
    let segments: Vec<&str> = path.trim().split('.').map(str::trim).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(QueryError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn string(s: &str) -> Scalar {
        Scalar::String(s.to_string())
    }

    fn sample() -> GlobalTree {
        let mut module = GlobalNode::new("Core", None);
        module.insert_property(
            "files".to_string(),
            GlobalProperty {
                name: "files".to_string(),
                value: Value::Array(vec![string("a"), string("b")]),
            },
        );
        module.insert_property(
            "name".to_string(),
            GlobalProperty {
                name: "name".to_string(),
                value: Value::Scalar(string("Core")),
            },
        );
        module.insert_property(
            "scale".to_string(),
            GlobalProperty {
                name: "Scale".to_string(),
                value: Value::Scalar(Scalar::Number("0.5".to_string())),
            },
        );
        let mut mods = GlobalNode::new("CfgMods", None);
        mods.insert_child("core".to_string(), module);

        let mut tree = GlobalTree::new();
        tree.root_mut().insert_child("cfgmods".to_string(), mods);
        tree
    }

    // -----------------------------------------------------------------------
    // lookup
    // -----------------------------------------------------------------------

    #[test]
    fn get_is_case_insensitive_per_segment() {
        let tree = sample();
        assert_eq!(
            tree.get("CFGMODS.core.FILES").unwrap(),
            &Value::Array(vec![string("a"), string("b")])
        );
    }

    #[test]
    fn class_lookup_returns_node() {
        let tree = sample();
        let node = tree.class("cfgMods.Core").expect("class exists");
        assert_eq!(node.name(), "Core");
        assert_eq!(node.properties().len(), 3);
    }

    #[test]
    fn lookup_distinguishes_classes_and_values() {
        let tree = sample();
        assert!(matches!(tree.lookup("CfgMods.Core"), Ok(Entry::Class(_))));
        assert!(matches!(tree.lookup("CfgMods.Core.name"), Ok(Entry::Value(_))));
    }

    #[test]
    fn missing_paths_are_not_found() {
        let tree = sample();
        assert_eq!(
            tree.get("CfgMods.Ext.files"),
            Err(QueryError::NotFound("CfgMods.Ext.files".to_string()))
        );
        assert!(matches!(tree.get("CfgMods.Core"), Err(QueryError::NotFound(_))));
        assert!(matches!(
            tree.class("CfgMods.Core.files"),
            Err(QueryError::NotFound(_))
        ));
    }

    #[test]
    fn malformed_paths_are_rejected() {
        let tree = sample();
        assert!(matches!(tree.get(""), Err(QueryError::InvalidPath(_))));
        assert!(matches!(tree.get("CfgMods..x"), Err(QueryError::InvalidPath(_))));
    }

    // -----------------------------------------------------------------------
    // typed helpers
    // -----------------------------------------------------------------------

    #[test]
    fn typed_helpers() {
        let tree = sample();
        assert_eq!(tree.get_str("CfgMods.Core.name").unwrap(), "Core");
        assert!((tree.get_f64("CfgMods.Core.scale").unwrap() - 0.5).abs() < f64::EPSILON);
        assert_eq!(tree.get_array("CfgMods.Core.files").unwrap().len(), 2);
        assert!(matches!(
            tree.get_array("CfgMods.Core.name"),
            Err(QueryError::TypeMismatch { .. })
        ));
        assert!(matches!(
            tree.get_str("CfgMods.Core.scale"),
            Err(QueryError::TypeMismatch { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // equality
    // -----------------------------------------------------------------------

    #[test]
    fn equality_is_order_sensitive() {
        let mut a = GlobalNode::new("X", None);
        let mut b = GlobalNode::new("X", None);
        let one = GlobalProperty {
            name: "one".to_string(),
            value: Value::Scalar(Scalar::Number("1".to_string())),
        };
        let two = GlobalProperty {
            name: "two".to_string(),
            value: Value::Scalar(Scalar::Number("2".to_string())),
        };
        a.insert_property("one".to_string(), one.clone());
        a.insert_property("two".to_string(), two.clone());
        b.insert_property("two".to_string(), two);
        b.insert_property("one".to_string(), one);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn derived_node_copies_base() {
        let tree = sample();
        let base = tree.class("CfgMods.Core").unwrap();
        let derived = GlobalNode::derived("Ext", "Core".to_string(), base);
        assert_eq!(derived.parent(), Some("Core"));
        assert_eq!(derived.properties().len(), 3);
        assert_eq!(derived.name(), "Ext");
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn tree_is_send_sync() {
        assert_send_sync::<GlobalTree>();
    }
}
