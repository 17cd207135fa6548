//! # Undirected model graphs
//!
//! Identifier newtypes, the undirected working graph used by triangulation and
//! the per-node domain sizes that weigh elimination steps.
//!
//! ## Design
//!
//! - Adjacency is stored as sorted `SmallVec`s keyed by a `BTreeMap`, so every
//!   traversal is deterministic without extra sorting.
//! - Edges are symmetric and self-loops are rejected.
//! - Chordality is checked with maximum cardinality search, which is what the
//!   triangulation tests rely on.

use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::engine::errors::InferenceError;

/// Maximum number of neighbours stored inline before spilling to the heap.
const INLINE_NEIGHBOURS: usize = 8;

/// Sorted neighbour list of a single node.
pub type Neighbours = SmallVec<[NodeId; INLINE_NEIGHBOURS]>;

/// A unique identifier for a variable (node) of the model graph.
///
/// NodeId implements Ord/PartialOrd for stable, deterministic iteration and
/// for the lowest-id tie-break used by the elimination heuristics.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u32);

/// A unique identifier for a clique of the elimination or junction tree.
///
/// Clique ids are assigned in elimination order: the clique created when the
/// `k`-th node is eliminated has id `k`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CliqueId(pub u32);

impl CliqueId {
    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// An undirected graph without self-loops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UndiGraph {
    adjacency: BTreeMap<NodeId, Neighbours>,
}

impl UndiGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a graph containing the given isolated nodes.
    pub fn with_nodes(nodes: impl IntoIterator<Item = NodeId>) -> Self {
        let mut graph = Self::new();
        for node in nodes {
            graph.add_node(node);
        }
        graph
    }

    /// Adds a node. Returns `false` if it was already present.
    pub fn add_node(&mut self, node: NodeId) -> bool {
        if self.adjacency.contains_key(&node) {
            return false;
        }
        self.adjacency.insert(node, Neighbours::new());
        true
    }

    /// Adds the undirected edge `a - b`, inserting missing endpoints.
    ///
    /// Returns `Ok(false)` if the edge already existed.
    pub fn add_edge(&mut self, a: NodeId, b: NodeId) -> Result<bool, InferenceError> {
        if a == b {
            return Err(InferenceError::GraphConsistency(format!(
                "self-loop on node {:?}",
                a
            )));
        }
        let inserted = insert_sorted(self.adjacency.entry(a).or_default(), b);
        insert_sorted(self.adjacency.entry(b).or_default(), a);
        Ok(inserted)
    }

    /// Removes the edge `a - b`. Returns `false` if it did not exist.
    pub fn remove_edge(&mut self, a: NodeId, b: NodeId) -> bool {
        let removed = self
            .adjacency
            .get_mut(&a)
            .map(|adj| remove_sorted(adj, b))
            .unwrap_or(false);
        if removed {
            if let Some(adj) = self.adjacency.get_mut(&b) {
                remove_sorted(adj, a);
            }
        }
        removed
    }

    /// Removes a node with all its incident edges and returns its former neighbours.
    pub fn remove_node(&mut self, node: NodeId) -> Option<Neighbours> {
        let neighbours = self.adjacency.remove(&node)?;
        for other in &neighbours {
            if let Some(adj) = self.adjacency.get_mut(other) {
                remove_sorted(adj, node);
            }
        }
        Some(neighbours)
    }

    pub fn has_node(&self, node: NodeId) -> bool {
        self.adjacency.contains_key(&node)
    }

    pub fn has_edge(&self, a: NodeId, b: NodeId) -> bool {
        self.adjacency
            .get(&a)
            .map(|adj| adj.binary_search(&b).is_ok())
            .unwrap_or(false)
    }

    /// Sorted neighbours of `node` (empty if the node is absent).
    pub fn neighbours(&self, node: NodeId) -> &[NodeId] {
        self.adjacency
            .get(&node)
            .map(|adj| adj.as_slice())
            .unwrap_or(&[])
    }

    pub fn degree(&self, node: NodeId) -> usize {
        self.neighbours(node).len()
    }

    /// Nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(|adj| adj.len()).sum::<usize>() / 2
    }

    /// All edges as `(low, high)` pairs in lexicographic order.
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        let mut edges = Vec::with_capacity(self.edge_count());
        for (&a, adj) in &self.adjacency {
            for &b in adj.iter().filter(|&&b| b > a) {
                edges.push((a, b));
            }
        }
        edges
    }

    /// Nodes adjacent to both `a` and `b`, sorted.
    pub fn common_neighbours(&self, a: NodeId, b: NodeId) -> Vec<NodeId> {
        let (lhs, rhs) = (self.neighbours(a), self.neighbours(b));
        let (mut i, mut j) = (0, 0);
        let mut out = Vec::new();
        while i < lhs.len() && j < rhs.len() {
            match lhs[i].cmp(&rhs[j]) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    out.push(lhs[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        out
    }

    /// Whether every pair of `nodes` is adjacent.
    pub fn is_clique(&self, nodes: &[NodeId]) -> bool {
        nodes.iter().enumerate().all(|(offset, &a)| {
            nodes[offset + 1..].iter().all(|&b| self.has_edge(a, b))
        })
    }

    /// Connected components, each sorted, ordered by their smallest node.
    pub fn connected_components(&self) -> Vec<Vec<NodeId>> {
        let mut seen: FxHashSet<NodeId> = FxHashSet::default();
        let mut components = Vec::new();
        for start in self.nodes() {
            if !seen.insert(start) {
                continue;
            }
            let mut component = vec![start];
            let mut queue = VecDeque::from([start]);
            while let Some(node) = queue.pop_front() {
                for &next in self.neighbours(node) {
                    if seen.insert(next) {
                        component.push(next);
                        queue.push_back(next);
                    }
                }
            }
            component.sort_unstable();
            components.push(component);
        }
        components
    }

    /// Whether `order` is a perfect elimination order of this graph: it lists
    /// every node exactly once and the later neighbours of each node form a clique.
    pub fn is_perfect_elimination_order(&self, order: &[NodeId]) -> bool {
        if order.len() != self.node_count() {
            return false;
        }
        let mut position: FxHashMap<NodeId, usize> = FxHashMap::default();
        for (idx, &node) in order.iter().enumerate() {
            if !self.has_node(node) || position.insert(node, idx).is_some() {
                return false;
            }
        }
        order.iter().enumerate().all(|(idx, &node)| {
            let later: Vec<NodeId> = self
                .neighbours(node)
                .iter()
                .copied()
                .filter(|n| position[n] > idx)
                .collect();
            self.is_clique(&later)
        })
    }

    /// Whether the graph is chordal (triangulated).
    ///
    /// Runs maximum cardinality search; the reverse visit order is a perfect
    /// elimination order exactly when the graph is chordal.
    pub fn is_chordal(&self) -> bool {
        let mut order = self.maximum_cardinality_order();
        order.reverse();
        self.is_perfect_elimination_order(&order)
    }

    /// Visit order of maximum cardinality search, ties broken by lowest id.
    fn maximum_cardinality_order(&self) -> Vec<NodeId> {
        let mut weight: BTreeMap<NodeId, usize> = self.nodes().map(|n| (n, 0)).collect();
        let mut order = Vec::with_capacity(weight.len());
        while let Some((&next, _)) = weight
            .iter()
            .max_by(|(a_id, a_w), (b_id, b_w)| a_w.cmp(b_w).then(b_id.cmp(a_id)))
        {
            weight.remove(&next);
            for neighbour in self.neighbours(next) {
                if let Some(w) = weight.get_mut(neighbour) {
                    *w += 1;
                }
            }
            order.push(next);
        }
        order
    }
}

fn insert_sorted(list: &mut Neighbours, node: NodeId) -> bool {
    match list.binary_search(&node) {
        Ok(_) => false,
        Err(pos) => {
            list.insert(pos, node);
            true
        }
    }
}

fn remove_sorted(list: &mut Neighbours, node: NodeId) -> bool {
    match list.binary_search(&node) {
        Ok(pos) => {
            list.remove(pos);
            true
        }
        Err(_) => false,
    }
}

/// Mapping from node to its (positive) domain size.
///
/// Immutable for the duration of a triangulation run.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DomainSizes {
    sizes: FxHashMap<NodeId, usize>,
}

impl DomainSizes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the domain size of `node`. Zero-sized domains are rejected.
    pub fn insert(&mut self, node: NodeId, size: usize) -> Result<(), InferenceError> {
        if size == 0 {
            return Err(InferenceError::GraphConsistency(format!(
                "node {:?} has an empty domain",
                node
            )));
        }
        self.sizes.insert(node, size);
        Ok(())
    }

    pub fn get(&self, node: NodeId) -> Option<usize> {
        self.sizes.get(&node).copied()
    }

    /// Natural logarithm of the domain size of `node`.
    pub fn log_domain(&self, node: NodeId) -> Option<f64> {
        self.get(node).map(|size| (size as f64).ln())
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Checks that every node of `graph` has a positive domain size.
    pub fn covers(&self, graph: &UndiGraph) -> Result<(), InferenceError> {
        for node in graph.nodes() {
            match self.sizes.get(&node) {
                None => {
                    return Err(InferenceError::GraphConsistency(format!(
                        "no domain size for node {:?}",
                        node
                    )))
                }
                Some(0) => {
                    return Err(InferenceError::GraphConsistency(format!(
                        "node {:?} has an empty domain",
                        node
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

impl FromIterator<(NodeId, usize)> for DomainSizes {
    /// Builds domain sizes from pairs as given; [`DomainSizes::covers`]
    /// rejects zero sizes.
    fn from_iter<T: IntoIterator<Item = (NodeId, usize)>>(iter: T) -> Self {
        Self {
            sizes: iter.into_iter().collect(),
        }
    }
}
