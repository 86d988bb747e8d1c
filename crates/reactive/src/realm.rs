//! The realm: node registry, graph, plan cache, subscriptions and the
//! publish runtime, owned together behind one cheaply clonable handle.
//!
//! A publish walks the cached plan for its root set once, evaluates each
//! participating node at most once, prunes branches whose inputs declined to
//! emit, and finally notifies subscribers in plan order. No internal borrow
//! is held while user closures run, so subscribers are free to publish again.
//!
//! Panics raised by projections or subscribers are not caught: they unwind
//! out of `publish` and abort the rest of that publish's fan-out.

use crate::graph::{Args, Connection, Graph};
use crate::node::{AnyNode, Distinct, Node, NodeRegistry};
use crate::operators::Operator;
use crate::plan::{plan_key, ExecutionPlan, PlanCache};
use crate::scheduler::Scheduler;
use crate::subscription::{SubscriptionId, SubscriptionRegistry, ValueCallback};
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;
use hashbrown::{HashMap, HashSet};
use realm_core::{downcast, erase, value_type_id, AnyValue, NodeId, ProjectionId};
use tracing::trace;

/// Builder for a `Realm`.
///
/// # Example
///
/// ```ignore
/// let scheduler = Rc::new(VirtualScheduler::new());
/// let realm = Realm::builder().scheduler(scheduler.clone()).build();
/// ```
#[derive(Default)]
pub struct RealmBuilder {
    scheduler: Option<Rc<dyn Scheduler>>,
}

impl RealmBuilder {
    pub fn new() -> Self {
        Self { scheduler: None }
    }

    /// Sets the scheduler used by time-based operators.
    pub fn scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn build(self) -> Realm {
        let scheduler = self.scheduler.unwrap_or_else(default_scheduler);
        Realm {
            inner: Rc::new(RealmInner {
                state: RefCell::new(RealmState::new()),
                scheduler,
            }),
        }
    }
}

#[cfg(feature = "tokio")]
fn default_scheduler() -> Rc<dyn Scheduler> {
    Rc::new(crate::scheduler::TokioScheduler::new())
}

#[cfg(not(feature = "tokio"))]
fn default_scheduler() -> Rc<dyn Scheduler> {
    Rc::new(crate::scheduler::VirtualScheduler::new())
}

struct RealmState {
    nodes: NodeRegistry,
    graph: Graph,
    plans: PlanCache,
    subscriptions: SubscriptionRegistry,
}

impl RealmState {
    fn new() -> Self {
        Self {
            nodes: NodeRegistry::new(),
            graph: Graph::new(),
            plans: PlanCache::new(),
            subscriptions: SubscriptionRegistry::new(),
        }
    }
}

struct RealmInner {
    state: RefCell<RealmState>,
    scheduler: Rc<dyn Scheduler>,
}

/// A reactive dataflow runtime.
///
/// Cloning a `Realm` yields another handle to the same runtime.
///
/// # Example
///
/// ```ignore
/// let realm = Realm::new();
/// let count = realm.cell(0i32);
/// let doubled = realm.pipe(count, map(|v: &i32| v * 2));
///
/// realm.subscribe(doubled, |v| println!("doubled: {}", v));
/// realm.publish(count, 21); // prints "doubled: 42"
/// ```
#[derive(Clone)]
pub struct Realm {
    inner: Rc<RealmInner>,
}

/// A non-owning handle to a realm, held by pending timers.
#[derive(Clone)]
pub struct WeakRealm {
    inner: Weak<RealmInner>,
}

impl WeakRealm {
    /// Returns the realm if it is still alive.
    pub fn upgrade(&self) -> Option<Realm> {
        self.inner.upgrade().map(|inner| Realm { inner })
    }
}

impl Default for Realm {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Realm")
            .field("nodes", &state.nodes.len())
            .field("projections", &state.graph.len())
            .field("cached_plans", &state.plans.len())
            .finish()
    }
}

impl Realm {
    /// Creates a realm with the default scheduler: `TokioScheduler` with
    /// the `tokio` feature, a `VirtualScheduler` otherwise.
    pub fn new() -> Self {
        RealmBuilder::new().build()
    }

    pub fn builder() -> RealmBuilder {
        RealmBuilder::new()
    }

    pub fn downgrade(&self) -> WeakRealm {
        WeakRealm {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Returns the scheduler used by time-based operators.
    pub fn scheduler(&self) -> Rc<dyn Scheduler> {
        self.inner.scheduler.clone()
    }

    // ==================== Node registry ====================

    /// Creates an event node: emissions are delivered, never persisted.
    pub fn node<T: 'static>(&self) -> Node<T> {
        self.node_with(None, Distinct::never())
    }

    /// Creates an event node carrying an equality rule.
    ///
    /// Event nodes persist nothing to compare against, so every emission
    /// still goes through.
    pub fn distinct_node<T: PartialEq + 'static>(&self) -> Node<T> {
        self.node_with(None, Distinct::equality())
    }

    /// Creates a cell holding `initial`.
    pub fn cell<T: 'static>(&self, initial: T) -> Node<T> {
        self.node_with(Some(initial), Distinct::never())
    }

    /// Creates a cell whose publishes are ignored when equal to its value.
    pub fn distinct_cell<T: PartialEq + 'static>(&self, initial: T) -> Node<T> {
        self.node_with(Some(initial), Distinct::equality())
    }

    /// Creates a node. With an initial value the node is a cell.
    pub fn node_with<T: 'static>(&self, initial: Option<T>, distinct: Distinct<T>) -> Node<T> {
        let id = self
            .inner
            .state
            .borrow_mut()
            .nodes
            .allocate(initial.map(erase), distinct.erase());
        Node::from_id(id)
    }

    /// Returns true if the node persists its value.
    pub fn is_cell(&self, id: NodeId) -> bool {
        self.inner.state.borrow().nodes.is_stateful(id)
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.inner.state.borrow().nodes.len()
    }

    // ==================== Graph ====================

    /// Registers a projection and invalidates every cached plan.
    ///
    /// Must not be called from inside a publish.
    pub fn connect<T: 'static>(&self, connection: Connection<T>) -> ProjectionId {
        let (sources, pulls, sink, map) = connection.into_parts();
        let mut state = self.inner.state.borrow_mut();
        let id = state.graph.add(sources, pulls, sink, map);
        state.plans.invalidate();
        id
    }

    /// Forwards every emission of `source` into `sink`.
    pub fn link<T: 'static>(&self, source: Node<T>, sink: Node<T>) -> ProjectionId {
        self.connect(
            Connection::new(sink, |args, emit| {
                if let Some(value) = args.raw(0) {
                    emit.forward(value);
                }
            })
            .source(source),
        )
    }

    /// Folds every emission of `signal` into `cell` with `f(current, signal)`.
    pub fn change_with<T, S, F>(&self, cell: Node<T>, signal: Node<S>, f: F) -> ProjectionId
    where
        T: 'static,
        S: 'static,
        F: Fn(&T, &S) -> T + 'static,
    {
        self.connect(
            Connection::new(cell, move |args, emit| {
                if let (Some(signal), Some(current)) = (args.get::<S>(0), args.get::<T>(1)) {
                    emit.emit(f(current, signal));
                }
            })
            .source(signal)
            .pull(cell),
        )
    }

    /// Applies an operator (or a tuple of operators, left to right).
    pub fn pipe<In, O>(&self, input: Node<In>, operator: O) -> Node<O::Out>
    where
        O: Operator<In>,
    {
        operator.apply(self, input)
    }

    /// Returns the number of projections.
    pub fn projection_count(&self) -> usize {
        self.inner.state.borrow().graph.len()
    }

    // ==================== Values ====================

    /// Returns a clone of a cell's value; `None` for event nodes.
    pub fn get<T: Clone + 'static>(&self, node: Node<T>) -> Option<T> {
        let value = self.get_raw(node.id())?;
        downcast::<T>(&value).cloned()
    }

    /// Returns the erased value of a cell.
    pub fn get_raw(&self, id: NodeId) -> Option<AnyValue> {
        self.inner.state.borrow().nodes.value(id)
    }

    /// Returns the erased values of several nodes.
    pub fn get_values(&self, ids: &[NodeId]) -> Vec<Option<AnyValue>> {
        let state = self.inner.state.borrow();
        let values = ids.iter().map(|&id| state.nodes.value(id)).collect();
        values
    }

    // ==================== Execution plans ====================

    /// Returns the (cached) execution plan for a root set.
    pub fn plan_for(&self, roots: &[NodeId]) -> Rc<ExecutionPlan> {
        let mut state = self.inner.state.borrow_mut();
        let state = &mut *state;
        state
            .plans
            .get_or_build(&state.graph, plan_key(roots.iter().copied()))
    }

    /// Returns how many plans have been built so far.
    pub fn plan_builds(&self) -> u64 {
        self.inner.state.borrow().plans.builds()
    }

    // ==================== Publish ====================

    /// Publishes one value into one node.
    pub fn publish<T: 'static>(&self, node: Node<T>, value: T) {
        self.publish_all(PubBatch::new().with(node, value));
    }

    /// Publishes several root values in one atomic pass.
    pub fn publish_all(&self, batch: PubBatch) {
        if batch.is_empty() {
            return;
        }
        let mut direct: HashMap<NodeId, AnyValue> = batch.entries.into_iter().collect();

        let (plan, snapshot) = {
            let mut state = self.inner.state.borrow_mut();
            let state = &mut *state;
            let plan = state
                .plans
                .get_or_build(&state.graph, plan_key(direct.keys().copied()));
            let snapshot: HashMap<NodeId, AnyValue> = plan
                .sampled()
                .iter()
                .filter_map(|&id| state.nodes.value(id).map(|v| (id, v)))
                .collect();
            (plan, snapshot)
        };
        trace!(
            roots = plan.roots().len(),
            nodes = plan.order().len(),
            "publish"
        );

        let mut pass = Pass::new(&plan, snapshot);
        for &id in plan.order() {
            if !pass.begin(id) {
                continue;
            }
            let value = match direct.remove(&id) {
                Some(value) => Some(value),
                None => pass.evaluate(id),
            };
            match value.filter(|v| !self.is_redundant(id, v)) {
                Some(value) => {
                    self.inner.state.borrow_mut().nodes.write(id, value.clone());
                    pass.emit(id, value);
                }
                None => pass.decline(id),
            }
        }

        let notifications = pass.into_notifications();
        trace!(notified = notifications.len(), "publish complete");
        for (id, value) in &notifications {
            let callbacks = self.inner.state.borrow().subscriptions.callbacks(*id);
            for callback in callbacks {
                callback(value);
            }
        }

        let emitted: HashMap<NodeId, AnyValue> = notifications.into_iter().collect();
        let combined = self
            .inner
            .state
            .borrow()
            .subscriptions
            .combined_for(|id| emitted.contains_key(&id));
        for (nodes, callback) in combined {
            let values = self.combined_values(&nodes, &emitted);
            callback(&Args::new(&values));
        }
    }

    /// Current values for a combined subscription: the persisted value of
    /// cells, the value emitted in this pass for event nodes.
    fn combined_values(
        &self,
        nodes: &[NodeId],
        emitted: &HashMap<NodeId, AnyValue>,
    ) -> Vec<Option<AnyValue>> {
        let state = self.inner.state.borrow();
        let values = nodes
            .iter()
            .map(|id| state.nodes.value(*id).or_else(|| emitted.get(id).cloned()))
            .collect();
        values
    }

    fn is_redundant(&self, id: NodeId, next: &AnyValue) -> bool {
        let distinct = self.inner.state.borrow().nodes.distinct_state(id);
        match distinct {
            Some((comparator, current)) => comparator(&current, next),
            None => false,
        }
    }

    // ==================== Subscriptions ====================

    /// Subscribes to every emission of `node`.
    pub fn subscribe<T, F>(&self, node: Node<T>, f: F) -> Unsubscribe
    where
        T: 'static,
        F: Fn(&T) + 'static,
    {
        self.subscribe_raw(node.id(), typed_callback(f))
    }

    /// Subscribes an erased callback to `id`.
    pub fn subscribe_raw(&self, id: NodeId, callback: ValueCallback) -> Unsubscribe {
        let sub = self
            .inner
            .state
            .borrow_mut()
            .subscriptions
            .subscribe(id, callback);
        Unsubscribe {
            realm: self.downgrade(),
            target: Target::Multicast(id),
            id: sub,
        }
    }

    /// Installs the single exclusive subscriber of `node`, replacing any
    /// previous one.
    pub fn singleton_subscribe<T, F>(&self, node: Node<T>, f: F) -> Unsubscribe
    where
        T: 'static,
        F: Fn(&T) + 'static,
    {
        self.singleton_subscribe_raw(node.id(), typed_callback(f))
    }

    pub fn singleton_subscribe_raw(&self, id: NodeId, callback: ValueCallback) -> Unsubscribe {
        let sub = self
            .inner
            .state
            .borrow_mut()
            .subscriptions
            .subscribe_singleton(id, callback);
        Unsubscribe {
            realm: self.downgrade(),
            target: Target::Singleton(id),
            id: sub,
        }
    }

    /// Subscribes to the combination of several nodes: once per publish in
    /// which any of them emitted, `f` receives the current value of each (in
    /// `ids` order), after the per-node subscribers.
    ///
    /// The graph is left untouched, so this is cheap to call repeatedly.
    pub fn subscribe_many<F>(&self, ids: &[NodeId], f: F) -> Unsubscribe
    where
        F: Fn(&Args<'_>) + 'static,
    {
        let sub = self
            .inner
            .state
            .borrow_mut()
            .subscriptions
            .subscribe_combined(ids.to_vec(), Rc::new(f));
        Unsubscribe {
            realm: self.downgrade(),
            target: Target::Combined,
            id: sub,
        }
    }

    /// Returns the number of subscriptions on a node.
    pub fn subscription_count(&self, id: NodeId) -> usize {
        self.inner.state.borrow().subscriptions.count(id)
    }
}

fn typed_callback<T, F>(f: F) -> ValueCallback
where
    T: 'static,
    F: Fn(&T) + 'static,
{
    Rc::new(move |value: &AnyValue| {
        if let Some(value) = downcast::<T>(value) {
            f(value);
        }
    })
}

#[derive(Clone, Copy, Debug)]
enum Target {
    Multicast(NodeId),
    Singleton(NodeId),
    Combined,
}

/// Handle returned by the subscribe methods.
///
/// Dropping the handle keeps the subscription; call `unsubscribe` to end it.
pub struct Unsubscribe {
    realm: WeakRealm,
    target: Target,
    id: SubscriptionId,
}

impl Unsubscribe {
    /// Returns the subscription ID.
    #[inline]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns the subscribed node; `None` for `subscribe_many`.
    #[inline]
    pub fn node(&self) -> Option<NodeId> {
        match self.target {
            Target::Multicast(node) | Target::Singleton(node) => Some(node),
            Target::Combined => None,
        }
    }

    /// Removes the subscription.
    ///
    /// Returns false if it was already removed, was replaced (singletons),
    /// or the realm is gone.
    pub fn unsubscribe(self) -> bool {
        let Some(realm) = self.realm.upgrade() else {
            return false;
        };
        let mut state = realm.inner.state.borrow_mut();
        match self.target {
            Target::Multicast(node) => state.subscriptions.unsubscribe(node, self.id),
            Target::Singleton(node) => state.subscriptions.unsubscribe_singleton(node, self.id),
            Target::Combined => state.subscriptions.unsubscribe_combined(self.id),
        }
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("target", &self.target)
            .field("id", &self.id)
            .finish()
    }
}

/// Root values for one atomic publish.
///
/// A node given twice keeps the last value.
#[derive(Clone, Default)]
pub struct PubBatch {
    entries: Vec<(NodeId, AnyValue)>,
}

impl PubBatch {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds a value, builder style.
    pub fn with<T: 'static>(mut self, node: Node<T>, value: T) -> Self {
        self.insert(node, value);
        self
    }

    /// Adds a value.
    pub fn insert<T: 'static>(&mut self, node: Node<T>, value: T) {
        self.entries.push((node.id(), erase(value)));
    }

    /// Adds an erased value. Returns false, leaving the batch unchanged, when
    /// the value's type differs from the node's.
    pub fn insert_erased(&mut self, node: AnyNode, value: AnyValue) -> bool {
        if value_type_id(&value) != node.type_id() {
            return false;
        }
        self.entries.push((node.id(), value));
        true
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the root ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }
}

/// Working state of a single publish.
struct Pass<'p> {
    plan: &'p ExecutionPlan,
    /// Remaining upstream source edges per node
    ref_counts: HashMap<NodeId, u32>,
    /// Values visible to projections in this pass
    transient: HashMap<NodeId, AnyValue>,
    /// Nodes evaluated or pruned in this pass
    settled: HashSet<NodeId>,
    notifications: Vec<(NodeId, AnyValue)>,
}

impl<'p> Pass<'p> {
    fn new(plan: &'p ExecutionPlan, transient: HashMap<NodeId, AnyValue>) -> Self {
        Self {
            plan,
            ref_counts: plan.ref_counts().clone(),
            transient,
            settled: HashSet::new(),
            notifications: Vec::new(),
        }
    }

    /// Marks `id` as settled; false if it already was (pruned or evaluated).
    fn begin(&mut self, id: NodeId) -> bool {
        self.settled.insert(id)
    }

    /// Runs every planned projection of `id` in registration order. Inputs
    /// read from the transient values, so a source that declined in this
    /// pass shows its persisted value (cells) or nothing (events). The last
    /// emission wins.
    fn evaluate(&self, id: NodeId) -> Option<AnyValue> {
        let mut output = None;
        for projection in self.plan.projections(id) {
            let values: Vec<Option<AnyValue>> = projection
                .inputs()
                .map(|input| self.transient.get(&input).cloned())
                .collect();
            if let Some(value) = projection.run(&values) {
                output = Some(value);
            }
        }
        output
    }

    fn emit(&mut self, id: NodeId, value: AnyValue) {
        self.transient.insert(id, value.clone());
        self.notifications.push((id, value));
    }

    /// Propagates a non-emission: every downstream sink loses one live input,
    /// and sinks left with none are pruned in turn.
    fn decline(&mut self, id: NodeId) {
        let mut stack = alloc::vec![id];
        while let Some(node) = stack.pop() {
            for &sink in self.plan.downstream(node) {
                let Some(count) = self.ref_counts.get_mut(&sink) else {
                    continue;
                };
                if *count == 0 {
                    continue;
                }
                *count -= 1;
                if *count == 0 && self.settled.insert(sink) {
                    stack.push(sink);
                }
            }
        }
    }

    fn into_notifications(self) -> Vec<(NodeId, AnyValue)> {
        self.notifications
    }
}
