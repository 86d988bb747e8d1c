//! Node handles and the node registry.
//!
//! A node is either an event stream (no persisted value) or a cell (a
//! persisted value readable at any time). Nodes live in an arena owned by the
//! realm; `Node<T>` is a copyable, typed, non-owning handle into it.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::any::{type_name, TypeId};
use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use realm_core::{downcast, AnyValue, NodeId};

/// A typed handle to a node carrying values of type `T`.
pub struct Node<T> {
    id: NodeId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Node<T> {
    #[inline]
    pub(crate) fn from_id(id: NodeId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// Returns the opaque id of this node.
    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl<T: 'static> Node<T> {
    /// Erases the value type, keeping it for runtime checks.
    #[inline]
    pub fn erase(self) -> AnyNode {
        AnyNode {
            id: self.id,
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }
}

impl<T> Clone for Node<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Node<T> {}

impl<T> PartialEq for Node<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Node<T> {}

impl<T> Hash for Node<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Node<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node<{}>({})", type_name::<T>(), self.id)
    }
}

/// A node handle with its value type erased.
///
/// Used where nodes are addressed dynamically, e.g. through the label table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AnyNode {
    id: NodeId,
    type_id: TypeId,
    type_name: &'static str,
}

impl AnyNode {
    /// Returns the opaque id of this node.
    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the `TypeId` of the node's values.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the type name of the node's values.
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns true if the node carries values of type `T`.
    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Recovers the typed handle if the node carries values of type `T`.
    pub fn downcast<T: 'static>(self) -> Option<Node<T>> {
        if self.is::<T>() {
            Some(Node::from_id(self.id))
        } else {
            None
        }
    }
}

impl<T: 'static> From<Node<T>> for AnyNode {
    fn from(node: Node<T>) -> Self {
        node.erase()
    }
}

/// Erased equality comparator stored on a node record.
pub(crate) type Comparator = Rc<dyn Fn(&AnyValue, &AnyValue) -> bool>;

/// Distinctness rule for a node.
///
/// When enabled, a newly computed value equal to the currently persisted
/// value is treated as "did not emit".
pub struct Distinct<T> {
    comparator: Option<Rc<dyn Fn(&T, &T) -> bool>>,
}

impl<T: 'static> Distinct<T> {
    /// Never suppress emissions.
    pub fn never() -> Self {
        Self { comparator: None }
    }

    /// Suppress emissions equal according to `comparator`.
    pub fn by<F>(comparator: F) -> Self
    where
        F: Fn(&T, &T) -> bool + 'static,
    {
        Self {
            comparator: Some(Rc::new(comparator)),
        }
    }

    /// Returns true if a comparator is configured.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.comparator.is_some()
    }

    pub(crate) fn erase(self) -> Option<Comparator> {
        let comparator = self.comparator?;
        Some(Rc::new(move |previous: &AnyValue, next: &AnyValue| {
            match (downcast::<T>(previous), downcast::<T>(next)) {
                (Some(previous), Some(next)) => comparator(previous, next),
                _ => false,
            }
        }))
    }
}

impl<T: PartialEq + 'static> Distinct<T> {
    /// Suppress emissions equal according to `PartialEq`.
    pub fn equality() -> Self {
        Self::by(|a: &T, b: &T| a == b)
    }
}

impl<T: 'static> Default for Distinct<T> {
    fn default() -> Self {
        Self::never()
    }
}

/// Storage for a single node.
pub(crate) struct NodeRecord {
    /// Persisted value; always `None` for event nodes
    value: Option<AnyValue>,
    /// Whether publishes are persisted
    stateful: bool,
    /// Optional distinctness comparator
    distinct: Option<Comparator>,
}

/// Arena of node records indexed by `NodeId`.
#[derive(Default)]
pub(crate) struct NodeRegistry {
    records: Vec<NodeRecord>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Allocates a fresh node. A node with an initial value is a cell.
    pub fn allocate(&mut self, initial: Option<AnyValue>, distinct: Option<Comparator>) -> NodeId {
        let id = NodeId::from_index(self.records.len() as u32);
        self.records.push(NodeRecord {
            stateful: initial.is_some(),
            value: initial,
            distinct,
        });
        id
    }

    fn record(&self, id: NodeId) -> Option<&NodeRecord> {
        self.records.get(id.index() as usize)
    }

    /// Returns the persisted value of a cell.
    pub fn value(&self, id: NodeId) -> Option<AnyValue> {
        self.record(id).and_then(|r| r.value.clone())
    }

    /// Returns true if the node persists its value.
    pub fn is_stateful(&self, id: NodeId) -> bool {
        self.record(id).map(|r| r.stateful).unwrap_or(false)
    }

    /// Returns the distinctness comparator of a node together with its
    /// persisted value, when both exist.
    pub fn distinct_state(&self, id: NodeId) -> Option<(Comparator, AnyValue)> {
        let record = self.record(id)?;
        match (&record.distinct, &record.value) {
            (Some(comparator), Some(value)) => Some((comparator.clone(), value.clone())),
            _ => None,
        }
    }

    /// Persists a value if the node is a cell. Event nodes ignore writes.
    pub fn write(&mut self, id: NodeId, value: AnyValue) {
        if let Some(record) = self.records.get_mut(id.index() as usize) {
            if record.stateful {
                record.value = Some(value);
            }
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }
}
