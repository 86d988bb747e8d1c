//! Projections and the dependency graph.
//!
//! A projection wires a set of source nodes (which trigger it) and pull nodes
//! (which are only sampled) to a single sink node. The graph maps every node
//! to the projections it participates in.

use crate::node::Node;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::marker::PhantomData;
use hashbrown::HashMap;
use realm_core::{downcast, erase, AnyValue, NodeId, ProjectionId};

/// Erased projection closure: receives source values followed by pull
/// values, and writes at most one output into the slot.
pub(crate) type ProjectionFn = Rc<dyn Fn(&Args<'_>, &mut Option<AnyValue>)>;

/// Values handed to a projection: its sources in declaration order, then its
/// pulls in declaration order. A slot is `None` when the node has no value in
/// the current pass (an event node that did not fire, or an empty cell).
#[derive(Clone, Copy)]
pub struct Args<'a> {
    values: &'a [Option<AnyValue>],
}

impl<'a> Args<'a> {
    /// Wraps a slice of sampled values.
    pub fn new(values: &'a [Option<AnyValue>]) -> Self {
        Self { values }
    }

    /// Returns the value at `index` if present and of type `T`.
    pub fn get<T: 'static>(&self, index: usize) -> Option<&'a T> {
        self.values.get(index)?.as_ref().and_then(downcast::<T>)
    }

    /// Returns the erased value at `index`.
    pub fn raw(&self, index: usize) -> Option<&'a AnyValue> {
        self.values.get(index)?.as_ref()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over the erased values.
    pub fn iter(&self) -> impl Iterator<Item = Option<&'a AnyValue>> + 'a {
        let values = self.values;
        values.iter().map(|v| v.as_ref())
    }
}

/// Emission handle passed to a projection whose sink carries `T`.
///
/// Calling `emit` more than once in a single invocation keeps the last value.
pub struct Emit<'a, T> {
    slot: &'a mut Option<AnyValue>,
    _marker: PhantomData<fn(T)>,
}

impl<'a, T: 'static> Emit<'a, T> {
    pub(crate) fn new(slot: &'a mut Option<AnyValue>) -> Self {
        Self {
            slot,
            _marker: PhantomData,
        }
    }

    /// Emits a value into the sink.
    #[inline]
    pub fn emit(&mut self, value: T) {
        *self.slot = Some(erase(value));
    }

    /// Forwards an already erased value without cloning it.
    ///
    /// Only used by operators whose input and output types coincide.
    #[inline]
    pub(crate) fn forward(&mut self, value: &AnyValue) {
        *self.slot = Some(value.clone());
    }

    /// Returns true if this invocation has emitted.
    #[inline]
    pub fn has_emitted(&self) -> bool {
        self.slot.is_some()
    }
}

/// A registered projection.
pub struct Projection {
    id: ProjectionId,
    sources: Vec<NodeId>,
    pulls: Vec<NodeId>,
    sink: NodeId,
    map: ProjectionFn,
}

impl Projection {
    #[inline]
    pub fn id(&self) -> ProjectionId {
        self.id
    }

    #[inline]
    pub fn sources(&self) -> &[NodeId] {
        &self.sources
    }

    #[inline]
    pub fn pulls(&self) -> &[NodeId] {
        &self.pulls
    }

    #[inline]
    pub fn sink(&self) -> NodeId {
        self.sink
    }

    #[inline]
    pub fn has_source(&self, id: NodeId) -> bool {
        self.sources.contains(&id)
    }

    /// Returns the sources followed by the pulls.
    pub fn inputs(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.sources.iter().chain(self.pulls.iter()).copied()
    }

    /// Invokes the projection closure and returns its emission, if any.
    pub(crate) fn run(&self, values: &[Option<AnyValue>]) -> Option<AnyValue> {
        let mut slot = None;
        (self.map)(&Args::new(values), &mut slot);
        slot
    }
}

/// Description of a projection to register with `Realm::connect`.
///
/// # Example
///
/// ```ignore
/// realm.connect(
///     Connection::new(total, |args, emit| {
///         if let (Some(a), Some(b)) = (args.get::<i32>(0), args.get::<i32>(1)) {
///             emit.emit(a + b);
///         }
///     })
///     .source(a)
///     .pull(b),
/// );
/// ```
pub struct Connection<T> {
    sink: Node<T>,
    sources: Vec<NodeId>,
    pulls: Vec<NodeId>,
    map: ProjectionFn,
}

impl<T: 'static> Connection<T> {
    /// Creates a connection into `sink` with the given projection closure.
    pub fn new<F>(sink: Node<T>, map: F) -> Self
    where
        F: Fn(&Args<'_>, &mut Emit<'_, T>) + 'static,
    {
        Self {
            sink,
            sources: Vec::new(),
            pulls: Vec::new(),
            map: Rc::new(move |args: &Args<'_>, slot: &mut Option<AnyValue>| {
                map(args, &mut Emit::new(slot))
            }),
        }
    }

    /// Adds a source: its emission triggers the projection.
    pub fn source<S>(mut self, node: Node<S>) -> Self {
        self.sources.push(node.id());
        self
    }

    /// Adds several erased sources.
    pub fn sources(mut self, ids: impl IntoIterator<Item = NodeId>) -> Self {
        self.sources.extend(ids);
        self
    }

    /// Adds a pull: its current value is sampled, its emission is ignored.
    pub fn pull<P>(mut self, node: Node<P>) -> Self {
        self.pulls.push(node.id());
        self
    }

    /// Adds several erased pulls.
    pub fn pulls(mut self, ids: impl IntoIterator<Item = NodeId>) -> Self {
        self.pulls.extend(ids);
        self
    }

    /// Returns the sink node.
    #[inline]
    pub fn sink(&self) -> Node<T> {
        self.sink
    }

    pub(crate) fn into_parts(self) -> (Vec<NodeId>, Vec<NodeId>, NodeId, ProjectionFn) {
        (self.sources, self.pulls, self.sink.id(), self.map)
    }
}

/// Adjacency structure from a node to the projections consuming it.
pub(crate) struct Graph {
    /// All projections, indexed by `ProjectionId`
    projections: Vec<Rc<Projection>>,
    /// Node -> projections where it is a source or a pull
    consumers: HashMap<NodeId, Vec<ProjectionId>>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self {
            projections: Vec::new(),
            consumers: HashMap::new(),
        }
    }

    /// Registers a projection under every one of its sources and pulls.
    ///
    /// Duplicate inputs are collapsed; a node listed both as source and as
    /// pull is treated as a source.
    pub fn add(
        &mut self,
        sources: Vec<NodeId>,
        pulls: Vec<NodeId>,
        sink: NodeId,
        map: ProjectionFn,
    ) -> ProjectionId {
        let id = ProjectionId::from_index(self.projections.len() as u32);

        let mut unique_sources = Vec::with_capacity(sources.len());
        for source in sources {
            if !unique_sources.contains(&source) {
                unique_sources.push(source);
            }
        }
        let mut unique_pulls = Vec::with_capacity(pulls.len());
        for pull in pulls {
            if !unique_sources.contains(&pull) && !unique_pulls.contains(&pull) {
                unique_pulls.push(pull);
            }
        }

        for &input in unique_sources.iter().chain(unique_pulls.iter()) {
            self.consumers.entry(input).or_default().push(id);
        }

        self.projections.push(Rc::new(Projection {
            id,
            sources: unique_sources,
            pulls: unique_pulls,
            sink,
            map,
        }));
        id
    }

    /// Gets a projection by id.
    pub fn projection(&self, id: ProjectionId) -> Option<&Rc<Projection>> {
        self.projections.get(id.index() as usize)
    }

    /// Returns the projections a node participates in, in registration order.
    pub fn consumers(&self, node: NodeId) -> &[ProjectionId] {
        self.consumers
            .get(&node)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the number of projections.
    #[inline]
    pub fn len(&self) -> usize {
        self.projections.len()
    }
}
