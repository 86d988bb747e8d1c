//! Subscription management for realm nodes.
//!
//! The registry holds, for every node, its multicast subscriptions in
//! registration order and at most one singleton subscription. Combined
//! subscriptions watch several nodes at once and fire once per publish in
//! which any of them emitted.

use crate::graph::Args;
use alloc::rc::Rc;
use alloc::vec::Vec;
use hashbrown::HashMap;
use realm_core::{AnyValue, NodeId};

/// Unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Erased callback invoked with each value a node emits.
pub type ValueCallback = Rc<dyn Fn(&AnyValue)>;

/// Erased callback invoked with the values of several nodes.
pub type ArgsCallback = Rc<dyn Fn(&Args<'_>)>;

struct Subscription {
    id: SubscriptionId,
    callback: ValueCallback,
}

/// Manages the multicast subscriptions of a single node.
///
/// Subscriptions are kept in registration order, which is the order in
/// which they are notified.
#[derive(Default)]
struct SubscriptionManager {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionManager {
    fn subscribe(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    /// Returns true if the subscription was found and removed.
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        self.subscriptions.len() != before
    }

    fn callbacks(&self) -> impl Iterator<Item = ValueCallback> + '_ {
        self.subscriptions.iter().map(|s| s.callback.clone())
    }

    #[inline]
    fn len(&self) -> usize {
        self.subscriptions.len()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

struct CombinedSubscription {
    id: SubscriptionId,
    nodes: Vec<NodeId>,
    callback: ArgsCallback,
}

/// Multicast, singleton and combined subscriptions of a realm.
pub(crate) struct SubscriptionRegistry {
    multicast: HashMap<NodeId, SubscriptionManager>,
    singletons: HashMap<NodeId, Subscription>,
    combined: Vec<CombinedSubscription>,
    next_id: SubscriptionId,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            multicast: HashMap::new(),
            singletons: HashMap::new(),
            combined: Vec::new(),
            next_id: 1,
        }
    }

    fn next_id(&mut self) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Adds a multicast subscription to `node`.
    pub fn subscribe(&mut self, node: NodeId, callback: ValueCallback) -> SubscriptionId {
        let id = self.next_id();
        self.multicast
            .entry(node)
            .or_default()
            .subscribe(Subscription { id, callback });
        id
    }

    /// Replaces the singleton subscription of `node`.
    pub fn subscribe_singleton(&mut self, node: NodeId, callback: ValueCallback) -> SubscriptionId {
        let id = self.next_id();
        self.singletons.insert(node, Subscription { id, callback });
        id
    }

    /// Adds a subscription watching every node in `nodes`.
    pub fn subscribe_combined(&mut self, nodes: Vec<NodeId>, callback: ArgsCallback) -> SubscriptionId {
        let id = self.next_id();
        self.combined.push(CombinedSubscription {
            id,
            nodes,
            callback,
        });
        id
    }

    pub fn unsubscribe(&mut self, node: NodeId, id: SubscriptionId) -> bool {
        let Some(manager) = self.multicast.get_mut(&node) else {
            return false;
        };
        let removed = manager.unsubscribe(id);
        if manager.is_empty() {
            self.multicast.remove(&node);
        }
        removed
    }

    /// Removes the singleton of `node` only if it is still subscription `id`.
    pub fn unsubscribe_singleton(&mut self, node: NodeId, id: SubscriptionId) -> bool {
        match self.singletons.get(&node) {
            Some(current) if current.id == id => {
                self.singletons.remove(&node);
                true
            }
            _ => false,
        }
    }

    pub fn unsubscribe_combined(&mut self, id: SubscriptionId) -> bool {
        let before = self.combined.len();
        self.combined.retain(|c| c.id != id);
        self.combined.len() != before
    }

    /// Returns every callback for `node`: multicast first, singleton last.
    pub fn callbacks(&self, node: NodeId) -> Vec<ValueCallback> {
        let mut callbacks: Vec<ValueCallback> = self
            .multicast
            .get(&node)
            .map(|m| m.callbacks().collect())
            .unwrap_or_default();
        if let Some(singleton) = self.singletons.get(&node) {
            callbacks.push(singleton.callback.clone());
        }
        callbacks
    }

    /// Returns the combined subscriptions watching at least one node for
    /// which `emitted` holds, in registration order.
    pub fn combined_for(&self, emitted: impl Fn(NodeId) -> bool) -> Vec<(Vec<NodeId>, ArgsCallback)> {
        self.combined
            .iter()
            .filter(|c| c.nodes.iter().any(|&node| emitted(node)))
            .map(|c| (c.nodes.clone(), c.callback.clone()))
            .collect()
    }

    /// Returns the number of subscriptions watching `node`.
    pub fn count(&self, node: NodeId) -> usize {
        self.multicast.get(&node).map(|m| m.len()).unwrap_or(0)
            + usize::from(self.singletons.contains_key(&node))
            + self
                .combined
                .iter()
                .filter(|c| c.nodes.contains(&node))
                .count()
    }
}
