//! Execution planning.
//!
//! Publishing a set of root nodes walks a linear evaluation order computed
//! once per distinct root set and memoized until the graph changes. The plan
//! also records, per node, how many upstream source edges can still make it
//! run (its reference count), which lets the runtime prune branches whose
//! inputs declined to emit.

use crate::graph::{Graph, Projection};
use alloc::collections::BinaryHeap;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cmp::Reverse;
use hashbrown::{HashMap, HashSet};
use realm_core::NodeId;
use tracing::debug;

/// Cache key of a plan: the sorted, deduplicated root ids.
pub type PlanKey = Vec<NodeId>;

/// Builds a plan key from root ids in any order.
pub(crate) fn plan_key(roots: impl IntoIterator<Item = NodeId>) -> PlanKey {
    let mut key: Vec<NodeId> = roots.into_iter().collect();
    key.sort_unstable();
    key.dedup();
    key
}

/// The memoized evaluation plan for one root set.
pub struct ExecutionPlan {
    /// Root ids, sorted
    roots: PlanKey,
    /// Linear evaluation order
    order: Vec<NodeId>,
    /// Sink -> planned nodes it pulls from
    pull_constraints: HashMap<NodeId, Vec<NodeId>>,
    /// Sink -> projections reached through a planned source
    projections: HashMap<NodeId, Vec<Rc<Projection>>>,
    /// Source -> sinks, one entry per source edge
    downstream: HashMap<NodeId, Vec<NodeId>>,
    /// Initial reference counts
    ref_counts: HashMap<NodeId, u32>,
    /// Nodes read by any planned projection
    sampled: Vec<NodeId>,
}

impl ExecutionPlan {
    /// Computes the plan for `roots` over `graph`.
    pub(crate) fn build(graph: &Graph, roots: PlanKey) -> Self {
        let mut planner = Planner::new(graph);
        let mut visited = HashSet::new();
        for &root in &roots {
            planner.visit(root, 0, &mut visited);
        }
        planner.settle();
        planner.finish(roots)
    }

    #[inline]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Returns the evaluation order.
    #[inline]
    pub fn order(&self) -> &[NodeId] {
        &self.order
    }

    /// Returns the position of a node in the order.
    pub fn position(&self, id: NodeId) -> Option<usize> {
        self.order.iter().position(|&n| n == id)
    }

    /// Returns true if the node takes part in this plan.
    pub fn contains(&self, id: NodeId) -> bool {
        self.ref_counts.contains_key(&id)
    }

    /// Returns the planned nodes `sink` pulls from.
    pub fn pull_constraints(&self, sink: NodeId) -> &[NodeId] {
        self.pull_constraints
            .get(&sink)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the planned projections feeding `sink`, in registration order.
    pub fn projections(&self, sink: NodeId) -> &[Rc<Projection>] {
        self.projections
            .get(&sink)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the sinks fed by `source`, one entry per source edge.
    pub fn downstream(&self, source: NodeId) -> &[NodeId] {
        self.downstream
            .get(&source)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Returns the initial reference count of a node.
    pub fn ref_count(&self, id: NodeId) -> u32 {
        self.ref_counts.get(&id).copied().unwrap_or(0)
    }

    pub(crate) fn ref_counts(&self) -> &HashMap<NodeId, u32> {
        &self.ref_counts
    }

    /// Returns the nodes whose values planned projections read.
    #[inline]
    pub fn sampled(&self) -> &[NodeId] {
        &self.sampled
    }
}

/// Depth-first plan builder.
struct Planner<'g> {
    graph: &'g Graph,
    order: Vec<NodeId>,
    pending_pulls: HashMap<NodeId, Vec<NodeId>>,
    projections: HashMap<NodeId, Vec<Rc<Projection>>>,
    downstream: HashMap<NodeId, Vec<NodeId>>,
    ref_counts: HashMap<NodeId, u32>,
}

impl<'g> Planner<'g> {
    fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            order: Vec::new(),
            pending_pulls: HashMap::new(),
            projections: HashMap::new(),
            downstream: HashMap::new(),
            ref_counts: HashMap::new(),
        }
    }

    /// Visits `id`, descending into the sinks it is a source of.
    ///
    /// Every call counts one more path into `id`; only the first call
    /// descends, so a node reachable through several paths, or through a
    /// cycle, is planned once.
    fn visit(&mut self, id: NodeId, insert_at: usize, visited: &mut HashSet<NodeId>) {
        *self.ref_counts.entry(id).or_insert(0) += 1;
        if !visited.insert(id) {
            return;
        }

        let mut insert_at = insert_at;
        if let Some(pulls) = self.pending_pulls.get(&id) {
            let after = pulls
                .iter()
                .filter_map(|p| self.order.iter().position(|n| n == p))
                .max();
            if let Some(after) = after {
                insert_at = after + 1;
            }
        }

        let graph = self.graph;
        for &pid in graph.consumers(id) {
            let Some(projection) = graph.projection(pid) else {
                continue;
            };
            let sink = projection.sink();
            if projection.has_source(id) {
                let planned = self.projections.entry(sink).or_default();
                if !planned.iter().any(|p| p.id() == pid) {
                    planned.push(projection.clone());
                }
                self.downstream.entry(id).or_default().push(sink);
                self.visit(sink, insert_at, visited);
            } else {
                let pulls = self.pending_pulls.entry(sink).or_default();
                if !pulls.contains(&id) {
                    pulls.push(id);
                }
            }
        }

        let at = insert_at.min(self.order.len());
        self.order.insert(at, id);
    }

    /// Stable topological re-sort of the traversal order.
    ///
    /// Edges run from every planned source and pull to its sink; among ready
    /// nodes the one earliest in traversal order goes first. Nodes left over
    /// by a true cycle keep their traversal order at the end.
    fn settle(&mut self) {
        let rank: HashMap<NodeId, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();
        let n = self.order.len();
        let mut edges: Vec<Vec<usize>> = (0..n).map(|_| Vec::new()).collect();
        let mut indegree = alloc::vec![0usize; n];

        let mut add_edge = |from: NodeId, to: NodeId| {
            if let (Some(&from), Some(&to)) = (rank.get(&from), rank.get(&to)) {
                if from != to {
                    edges[from].push(to);
                    indegree[to] += 1;
                }
            }
        };
        for (&sink, projections) in &self.projections {
            for projection in projections {
                for input in projection.inputs() {
                    add_edge(input, sink);
                }
            }
        }
        for (&sink, pulls) in &self.pending_pulls {
            for &pull in pulls {
                add_edge(pull, sink);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| indegree[i] == 0)
            .map(Reverse)
            .collect();
        let mut placed = alloc::vec![false; n];
        let mut settled = Vec::with_capacity(n);
        while let Some(Reverse(i)) = ready.pop() {
            placed[i] = true;
            settled.push(self.order[i]);
            for &to in &edges[i] {
                indegree[to] -= 1;
                if indegree[to] == 0 {
                    ready.push(Reverse(to));
                }
            }
        }
        if settled.len() < n {
            debug!(
                unresolved = n - settled.len(),
                "execution plan contains a cycle; keeping traversal order"
            );
            settled.extend((0..n).filter(|&i| !placed[i]).map(|i| self.order[i]));
        }
        self.order = settled;
    }

    fn finish(mut self, roots: PlanKey) -> ExecutionPlan {
        for projections in self.projections.values_mut() {
            projections.sort_by_key(|p| p.id());
        }
        let pull_constraints: HashMap<NodeId, Vec<NodeId>> = self
            .pending_pulls
            .into_iter()
            .filter(|(sink, _)| self.ref_counts.contains_key(sink))
            .collect();

        let mut sampled = Vec::new();
        for projections in self.projections.values() {
            for projection in projections {
                sampled.extend(projection.inputs());
            }
        }
        sampled.sort_unstable();
        sampled.dedup();

        ExecutionPlan {
            roots,
            order: self.order,
            pull_constraints,
            projections: self.projections,
            downstream: self.downstream,
            ref_counts: self.ref_counts,
            sampled,
        }
    }
}

/// Memoized plans keyed by root set.
#[derive(Default)]
pub(crate) struct PlanCache {
    plans: HashMap<PlanKey, Rc<ExecutionPlan>>,
    builds: u64,
}

impl PlanCache {
    pub fn new() -> Self {
        Self {
            plans: HashMap::new(),
            builds: 0,
        }
    }

    /// Returns the cached plan for `key`, building it on first use.
    pub fn get_or_build(&mut self, graph: &Graph, key: PlanKey) -> Rc<ExecutionPlan> {
        if let Some(plan) = self.plans.get(&key) {
            return plan.clone();
        }
        let plan = Rc::new(ExecutionPlan::build(graph, key.clone()));
        self.builds += 1;
        debug!(
            roots = ?plan.roots(),
            nodes = plan.order().len(),
            "built execution plan"
        );
        self.plans.insert(key, plan.clone());
        plan
    }

    /// Drops every cached plan.
    pub fn invalidate(&mut self) {
        self.plans.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// Total number of plans built since creation.
    #[inline]
    pub fn builds(&self) -> u64 {
        self.builds
    }
}
