//! Elimination sequence strategies.
//!
//! A strategy only *chooses* the next node; the triangulation orchestrator is
//! the sole mutator of the working graph and applies the choice through
//! [`SimplicialSet::eliminate`], whose [`EliminationStep`] carries the fill-in
//! edges of that step.
//!
//! [`EliminationStep`]: crate::engine::simplicial_set::EliminationStep

use rustc_hash::{FxHashMap, FxHashSet};

use crate::engine::config::{EliminationStrategyKind, Heuristic};
use crate::engine::errors::InferenceError;
use crate::engine::graph::{NodeId, UndiGraph};
use crate::engine::simplicial_set::SimplicialSet;

/// Closed set of elimination strategies.
#[derive(Debug, Clone)]
pub enum EliminationStrategy {
    /// Greedy heuristic over all remaining nodes.
    Heuristic(Heuristic),
    /// Fixed total order, consumed front to back.
    Ordered { order: Vec<NodeId>, cursor: usize },
    /// Ordered blocks, free order inside the current block.
    PartialOrdered {
        blocks: Vec<Vec<NodeId>>,
        block_of: FxHashMap<NodeId, usize>,
        within: Heuristic,
        current: usize,
    },
}

impl EliminationStrategy {
    pub fn from_kind(kind: &EliminationStrategyKind) -> Self {
        match kind {
            EliminationStrategyKind::Default => Self::Heuristic(Heuristic::Default),
            EliminationStrategyKind::MinFill => Self::Heuristic(Heuristic::MinFill),
            EliminationStrategyKind::MinWeight => Self::Heuristic(Heuristic::MinWeight),
            EliminationStrategyKind::Ordered(order) => Self::Ordered {
                order: order.clone(),
                cursor: 0,
            },
            EliminationStrategyKind::PartialOrdered { blocks, within } => {
                let block_of = blocks
                    .iter()
                    .enumerate()
                    .flat_map(|(idx, block)| block.iter().map(move |&node| (node, idx)))
                    .collect();
                Self::PartialOrdered {
                    blocks: blocks.clone(),
                    block_of,
                    within: *within,
                    current: 0,
                }
            }
        }
    }

    /// Checks that a fixed (partial) order lists every node of `graph` exactly once.
    pub fn validate(&self, graph: &UndiGraph) -> Result<(), InferenceError> {
        match self {
            Self::Heuristic(_) => Ok(()),
            Self::Ordered { order, .. } => check_covers_once(order.iter().copied(), graph),
            Self::PartialOrdered { blocks, .. } => {
                check_covers_once(blocks.iter().flatten().copied(), graph)
            }
        }
    }

    /// Picks the next node to eliminate from the remaining graph of `set`.
    pub fn next_elimination(&mut self, set: &SimplicialSet) -> Result<NodeId, InferenceError> {
        match self {
            Self::Heuristic(heuristic) => {
                select(*heuristic, set, &|_: NodeId| true).ok_or_else(empty)
            }
            Self::Ordered { order, cursor } => {
                let node = *order.get(*cursor).ok_or_else(|| {
                    InferenceError::GraphConsistency(
                        "elimination order exhausted before the graph".into(),
                    )
                })?;
                if !set.contains(node) {
                    return Err(InferenceError::GraphConsistency(format!(
                        "ordered node {:?} is not in the remaining graph",
                        node
                    )));
                }
                *cursor += 1;
                Ok(node)
            }
            Self::PartialOrdered {
                blocks,
                block_of,
                within,
                current,
            } => {
                while *current < blocks.len()
                    && !blocks[*current].iter().any(|&node| set.contains(node))
                {
                    *current += 1;
                }
                let block = *current;
                let in_block = |node: NodeId| block_of.get(&node) == Some(&block);
                select(*within, set, &in_block).ok_or_else(|| {
                    InferenceError::GraphConsistency(
                        "partial order exhausted before the graph".into(),
                    )
                })
            }
        }
    }
}

/// Applies `heuristic` to the nodes accepted by `allowed`.
fn select<F: Fn(NodeId) -> bool>(
    heuristic: Heuristic,
    set: &SimplicialSet,
    allowed: &F,
) -> Option<NodeId> {
    match heuristic {
        Heuristic::Default => set
            .best_simplicial(allowed)
            .or_else(|| set.best_almost_simplicial(allowed))
            .or_else(|| set.best_quasi_simplicial(allowed))
            .or_else(|| set.min_weight(allowed)),
        Heuristic::MinFill => set.min_fill(allowed),
        Heuristic::MinWeight => set.min_weight(allowed),
    }
}

fn empty() -> InferenceError {
    InferenceError::Internal("no node left to eliminate".into())
}

fn check_covers_once(
    order: impl Iterator<Item = NodeId>,
    graph: &UndiGraph,
) -> Result<(), InferenceError> {
    let mut seen = FxHashSet::default();
    for node in order {
        if !graph.has_node(node) {
            return Err(InferenceError::GraphConsistency(format!(
                "elimination order names unknown node {:?}",
                node
            )));
        }
        if !seen.insert(node) {
            return Err(InferenceError::GraphConsistency(format!(
                "elimination order lists node {:?} twice",
                node
            )));
        }
    }
    if let Some(missing) = graph.nodes().find(|node| !seen.contains(node)) {
        return Err(InferenceError::GraphConsistency(format!(
            "elimination order omits node {:?}",
            missing
        )));
    }
    Ok(())
}
