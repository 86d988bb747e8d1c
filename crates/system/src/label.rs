//! Named nodes.
//!
//! Every system returns a `Labels` dictionary naming the nodes it wants to
//! expose; composition merges them into one `LabelTable` owned by the
//! composed runtime.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::any::type_name;
use hashbrown::HashMap;
use realm_core::{Error, Result};
use realm_reactive::{AnyNode, Node};

/// Recovers a typed handle, reporting a mismatch under `key`.
pub(crate) fn typed_node<T: 'static>(key: &str, node: AnyNode) -> Result<Node<T>> {
    node.downcast::<T>()
        .ok_or_else(|| Error::type_mismatch(key, type_name::<T>(), node.type_name()))
}

/// Ordered name -> node dictionary returned by a system.
///
/// # Example
///
/// ```ignore
/// let labels = Labels::new()
///     .with("count", count)
///     .with("reset", reset);
/// let count: Node<i32> = labels.node("count")?;
/// ```
#[derive(Clone, Debug, Default)]
pub struct Labels {
    entries: Vec<(String, AnyNode)>,
}

impl Labels {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds a label, builder style.
    pub fn with(mut self, name: impl Into<String>, node: impl Into<AnyNode>) -> Self {
        self.insert(name, node);
        self
    }

    /// Adds a label, replacing an earlier one with the same name.
    pub fn insert(&mut self, name: impl Into<String>, node: impl Into<AnyNode>) {
        let name = name.into();
        let node = node.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = node,
            None => self.entries.push((name, node)),
        }
    }

    /// Looks up a label.
    pub fn get(&self, name: &str) -> Option<AnyNode> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, node)| *node)
    }

    /// Looks up a label as a typed node.
    pub fn node<T: 'static>(&self, name: &str) -> Result<Node<T>> {
        let node = self.get(name).ok_or_else(|| Error::missing_label(name))?;
        typed_node(name, node)
    }

    /// Iterates over the labels in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, AnyNode)> + '_ {
        self.entries.iter().map(|(n, node)| (n.as_str(), *node))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The merged labels of every composed system.
#[derive(Debug, Default)]
pub struct LabelTable {
    nodes: HashMap<String, AnyNode>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Merges `labels` into the table.
    ///
    /// Binding an existing name to the same node again is allowed; binding
    /// it to a different node fails with `LabelConflict` and leaves the table
    /// unchanged.
    pub fn label(&mut self, labels: &Labels) -> Result<()> {
        for (name, node) in labels.iter() {
            if let Some(existing) = self.nodes.get(name) {
                if *existing != node {
                    return Err(Error::label_conflict(name));
                }
            }
        }
        for (name, node) in labels.iter() {
            self.nodes.insert(name.to_string(), node);
        }
        Ok(())
    }

    /// Resolves a name.
    pub fn resolve(&self, name: &str) -> Result<AnyNode> {
        self.nodes
            .get(name)
            .copied()
            .ok_or_else(|| Error::missing_label(name))
    }

    /// Resolves a name to a typed node.
    pub fn resolve_typed<T: 'static>(&self, name: &str) -> Result<Node<T>> {
        typed_node(name, self.resolve(name)?)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realm_reactive::Realm;

    #[test]
    fn test_labels_typed_lookup() {
        let realm = Realm::new();
        let count = realm.cell(0i32);
        let labels = Labels::new().with("count", count);

        assert_eq!(labels.len(), 1);
        assert_eq!(labels.node::<i32>("count").unwrap(), count);
        assert!(labels.node::<i32>("missing").unwrap_err().is_missing_label());
        assert!(matches!(
            labels.node::<String>("count"),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_labels_insert_replaces() {
        let realm = Realm::new();
        let a = realm.node::<i32>();
        let b = realm.node::<i32>();
        let mut labels = Labels::new().with("x", a);
        labels.insert("x", b);

        assert_eq!(labels.len(), 1);
        assert_eq!(labels.get("x"), Some(b.erase()));
    }

    #[test]
    fn test_table_merge_and_resolve() {
        let realm = Realm::new();
        let a = realm.node::<i32>();
        let b = realm.node::<bool>();
        let mut table = LabelTable::new();

        table.label(&Labels::new().with("a", a)).unwrap();
        table.label(&Labels::new().with("b", b).with("a", a)).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve_typed::<bool>("b").unwrap(), b);
        assert_eq!(table.resolve("nope"), Err(Error::missing_label("nope")));
    }

    #[test]
    fn test_table_conflict_leaves_table_unchanged() {
        let realm = Realm::new();
        let a = realm.node::<i32>();
        let other = realm.node::<i32>();
        let fresh = realm.node::<i32>();
        let mut table = LabelTable::new();
        table.label(&Labels::new().with("a", a)).unwrap();

        let err = table
            .label(&Labels::new().with("fresh", fresh).with("a", other))
            .unwrap_err();
        assert_eq!(err, Error::label_conflict("a"));
        assert!(!table.contains("fresh"));
        assert_eq!(table.resolve_typed::<i32>("a").unwrap(), a);
    }
}
