//! Incremental simplicial-node bookkeeping for greedy elimination.
//!
//! [`SimplicialSet`] owns the shrinking working graph of a triangulation run
//! and classifies every remaining node as:
//! - **simplicial**: its neighbours already form a clique (no fill-in)
//! - **almost simplicial**: all neighbours but one form a clique
//! - **quasi simplicial**: `missing / present` neighbour pairs is below the
//!   configured ratio
//!
//! together with its elimination weight, the product of the domain sizes of
//! the node and its neighbours, kept as a sum of logarithms.
//!
//! After each [`SimplicialSet::eliminate`] only the nodes whose neighbourhood
//! changed are re-classified: the former neighbours of the eliminated node and
//! the common neighbours of every fill-in edge's endpoints.

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::engine::errors::InferenceError;
use crate::engine::graph::{DomainSizes, NodeId, UndiGraph};

/// Resolution at which log-weights are compared.
///
/// Weights equal up to this tolerance tie, and ties go to the lowest node id.
const WEIGHT_RESOLUTION: f64 = 1e-9;

/// Quantized log-weight used as a total-order key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct WeightKey(i64);

impl WeightKey {
    fn from_log(log_weight: f64) -> Self {
        WeightKey((log_weight / WEIGHT_RESOLUTION).round() as i64)
    }
}

/// Elimination class of a node, from cheapest to most expensive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Simplicial,
    AlmostSimplicial,
    QuasiSimplicial,
    Other,
}

#[derive(Debug, Clone, Copy)]
struct NodeInfo {
    log_weight: f64,
    key: WeightKey,
    /// Number of adjacent pairs among the node's neighbours.
    adjacent_pairs: usize,
    class: Classification,
}

/// Outcome of eliminating one node.
#[derive(Debug, Clone, PartialEq)]
pub struct EliminationStep {
    /// The eliminated node.
    pub node: NodeId,
    /// Its neighbours at elimination time, sorted.
    pub neighbours: Vec<NodeId>,
    /// Fill-in edges added among `neighbours`, each as `(low, high)`.
    pub fill_ins: Vec<(NodeId, NodeId)>,
    /// Log-weight of the clique `{node} ∪ neighbours`.
    pub log_weight: f64,
}

/// Simplicial classification of a graph under elimination.
#[derive(Debug, Clone)]
pub struct SimplicialSet {
    graph: UndiGraph,
    log_domains: FxHashMap<NodeId, f64>,
    info: FxHashMap<NodeId, NodeInfo>,
    by_weight: BTreeSet<(WeightKey, NodeId)>,
    simplicial: BTreeSet<(WeightKey, NodeId)>,
    almost_simplicial: BTreeSet<(WeightKey, NodeId)>,
    quasi_simplicial: BTreeSet<(WeightKey, NodeId)>,
    log_tree_width: f64,
    log_threshold: f64,
    quasi_ratio: f64,
}

impl SimplicialSet {
    /// Builds the classification for `graph`.
    ///
    /// `almost_simplicial_threshold` is the relative weight slack (see
    /// [`crate::engine::config::DEFAULT_WEIGHT_THRESHOLD`]) and
    /// `quasi_simplicial_ratio` the bound on missing/present neighbour pairs.
    pub fn new(
        graph: &UndiGraph,
        domains: &DomainSizes,
        almost_simplicial_threshold: f64,
        quasi_simplicial_ratio: f64,
    ) -> Result<Self, InferenceError> {
        domains.covers(graph)?;
        let mut log_domains = FxHashMap::default();
        let mut log_tree_width = 0.0_f64;
        for node in graph.nodes() {
            let log_domain = domains.log_domain(node).ok_or_else(|| {
                InferenceError::GraphConsistency(format!("no domain size for node {:?}", node))
            })?;
            log_tree_width = log_tree_width.max(log_domain);
            log_domains.insert(node, log_domain);
        }

        let mut set = Self {
            graph: graph.clone(),
            log_domains,
            info: FxHashMap::default(),
            by_weight: BTreeSet::new(),
            simplicial: BTreeSet::new(),
            almost_simplicial: BTreeSet::new(),
            quasi_simplicial: BTreeSet::new(),
            log_tree_width,
            log_threshold: (1.0 + almost_simplicial_threshold).ln(),
            quasi_ratio: quasi_simplicial_ratio,
        };
        let nodes: Vec<NodeId> = set.graph.nodes().collect();
        for node in nodes {
            set.refresh(node);
        }
        Ok(set)
    }

    /// The remaining (not yet eliminated) graph, including fill-in edges.
    pub fn graph(&self) -> &UndiGraph {
        &self.graph
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.info.contains_key(&node)
    }

    /// Log of the product of the domain sizes of `node` and its neighbours.
    pub fn log_weight(&self, node: NodeId) -> Option<f64> {
        self.info.get(&node).map(|info| info.log_weight)
    }

    /// Number of fill-in edges eliminating `node` now would add.
    pub fn fill_in_count(&self, node: NodeId) -> Option<usize> {
        let info = self.info.get(&node)?;
        Some(neighbour_pairs(self.graph.degree(node)) - info.adjacent_pairs)
    }

    pub fn classification(&self, node: NodeId) -> Option<Classification> {
        self.info.get(&node).map(|info| info.class)
    }

    pub fn is_simplicial(&self, node: NodeId) -> bool {
        self.classification(node) == Some(Classification::Simplicial)
    }

    pub fn is_almost_simplicial(&self, node: NodeId) -> bool {
        self.classification(node) == Some(Classification::AlmostSimplicial)
    }

    pub fn is_quasi_simplicial(&self, node: NodeId) -> bool {
        self.classification(node) == Some(Classification::QuasiSimplicial)
    }

    /// Largest clique log-weight created so far (initially the largest log-domain).
    pub fn log_tree_width(&self) -> f64 {
        self.log_tree_width
    }

    /// Log-weight limit for almost- and quasi-simplicial eliminations.
    fn weight_limit(&self) -> f64 {
        self.log_tree_width + self.log_threshold
    }

    /// Lightest simplicial node accepted by `allowed`.
    pub fn best_simplicial<F: Fn(NodeId) -> bool>(&self, allowed: &F) -> Option<NodeId> {
        first_allowed(&self.simplicial, allowed)
    }

    /// Lightest almost-simplicial node accepted by `allowed`, if within the weight limit.
    pub fn best_almost_simplicial<F: Fn(NodeId) -> bool>(&self, allowed: &F) -> Option<NodeId> {
        first_allowed(&self.almost_simplicial, allowed).filter(|node| self.within_limit(*node))
    }

    /// Lightest quasi-simplicial node accepted by `allowed`, if within the weight limit.
    pub fn best_quasi_simplicial<F: Fn(NodeId) -> bool>(&self, allowed: &F) -> Option<NodeId> {
        first_allowed(&self.quasi_simplicial, allowed).filter(|node| self.within_limit(*node))
    }

    /// Minimum-weight node accepted by `allowed`.
    pub fn min_weight<F: Fn(NodeId) -> bool>(&self, allowed: &F) -> Option<NodeId> {
        first_allowed(&self.by_weight, allowed)
    }

    /// Node with the fewest fill-ins accepted by `allowed`; ties go to the
    /// lighter node, then the lower id.
    pub fn min_fill<F: Fn(NodeId) -> bool>(&self, allowed: &F) -> Option<NodeId> {
        self.by_weight
            .iter()
            .filter(|(_, node)| allowed(*node))
            .filter_map(|&(key, node)| self.fill_in_count(node).map(|fill| (fill, key, node)))
            .min()
            .map(|(_, _, node)| node)
    }

    fn within_limit(&self, node: NodeId) -> bool {
        self.log_weight(node)
            .map(|w| w <= self.weight_limit() + WEIGHT_RESOLUTION)
            .unwrap_or(false)
    }

    /// Eliminates `node`: connects its neighbours pairwise, removes it from the
    /// graph and re-classifies the nodes whose neighbourhood changed.
    ///
    /// Eliminating a node that is not present is a programming error and is
    /// reported as [`InferenceError::Internal`].
    pub fn eliminate(&mut self, node: NodeId) -> Result<EliminationStep, InferenceError> {
        let info = self.info.get(&node).copied().ok_or_else(|| {
            InferenceError::Internal(format!("cannot eliminate absent node {:?}", node))
        })?;
        let neighbours: Vec<NodeId> = self.graph.neighbours(node).to_vec();

        let mut fill_ins = Vec::new();
        for (offset, &a) in neighbours.iter().enumerate() {
            for &b in &neighbours[offset + 1..] {
                if self.graph.add_edge(a, b)? {
                    fill_ins.push((a, b));
                }
            }
        }

        self.unindex(node, &info);
        self.info.remove(&node);
        self.graph.remove_node(node);
        self.log_tree_width = self.log_tree_width.max(info.log_weight);

        let mut changed: FxHashSet<NodeId> = neighbours.iter().copied().collect();
        for &(a, b) in &fill_ins {
            changed.extend(self.graph.common_neighbours(a, b));
        }
        let mut changed: Vec<NodeId> = changed.into_iter().collect();
        changed.sort_unstable();
        for other in changed {
            self.refresh(other);
        }

        Ok(EliminationStep {
            node,
            neighbours,
            fill_ins,
            log_weight: info.log_weight,
        })
    }

    /// Recomputes weight and class of `node` and re-files it in the ordered sets.
    fn refresh(&mut self, node: NodeId) {
        if let Some(old) = self.info.remove(&node) {
            self.unindex(node, &old);
        }
        let neighbours = self.graph.neighbours(node);

        let mut log_weight = self.log_domains.get(&node).copied().unwrap_or(0.0);
        for n in neighbours {
            log_weight += self.log_domains.get(n).copied().unwrap_or(0.0);
        }

        // adjacency count of each neighbour inside the neighbourhood
        let mut inner_degree = vec![0_usize; neighbours.len()];
        for i in 0..neighbours.len() {
            for j in i + 1..neighbours.len() {
                if self.graph.has_edge(neighbours[i], neighbours[j]) {
                    inner_degree[i] += 1;
                    inner_degree[j] += 1;
                }
            }
        }
        let adjacent_pairs = inner_degree.iter().sum::<usize>() / 2;
        let missing = neighbour_pairs(neighbours.len()) - adjacent_pairs;

        let class = if missing == 0 {
            Classification::Simplicial
        } else if inner_degree
            .iter()
            .any(|&d| neighbours.len() - 1 - d == missing)
        {
            Classification::AlmostSimplicial
        } else if adjacent_pairs > 0
            && (missing as f64) / (adjacent_pairs as f64) < self.quasi_ratio
        {
            Classification::QuasiSimplicial
        } else {
            Classification::Other
        };

        let info = NodeInfo {
            log_weight,
            key: WeightKey::from_log(log_weight),
            adjacent_pairs,
            class,
        };
        self.index(node, &info);
        self.info.insert(node, info);
    }

    fn class_set(&mut self, class: Classification) -> Option<&mut BTreeSet<(WeightKey, NodeId)>> {
        match class {
            Classification::Simplicial => Some(&mut self.simplicial),
            Classification::AlmostSimplicial => Some(&mut self.almost_simplicial),
            Classification::QuasiSimplicial => Some(&mut self.quasi_simplicial),
            Classification::Other => None,
        }
    }

    fn index(&mut self, node: NodeId, info: &NodeInfo) {
        self.by_weight.insert((info.key, node));
        if let Some(set) = self.class_set(info.class) {
            set.insert((info.key, node));
        }
    }

    fn unindex(&mut self, node: NodeId, info: &NodeInfo) {
        self.by_weight.remove(&(info.key, node));
        if let Some(set) = self.class_set(info.class) {
            set.remove(&(info.key, node));
        }
    }
}

#[inline]
fn neighbour_pairs(degree: usize) -> usize {
    degree * degree.saturating_sub(1) / 2
}

fn first_allowed<F: Fn(NodeId) -> bool>(
    set: &BTreeSet<(WeightKey, NodeId)>,
    allowed: &F,
) -> Option<NodeId> {
    set.iter().map(|&(_, node)| node).find(|&node| allowed(node))
}
