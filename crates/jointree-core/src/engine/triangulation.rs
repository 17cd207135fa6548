//! Triangulation by greedy node elimination.
//!
//! [`Triangulation::run`] repeatedly asks an [`EliminationStrategy`] for the
//! next node, eliminates it through the [`SimplicialSet`], and records:
//! - the elimination order and the fill-in edges each step added
//! - one clique per eliminated node: the node plus its remaining neighbours
//! - the elimination tree, where a clique's parent is the clique of its
//!   neighbour eliminated next
//!
//! With `enforce_minimality` the fill-in set is thinned afterwards: a fill
//! edge is dropped when the common neighbours of its endpoints are pairwise
//! adjacent (it then lies in a single maximal clique, so removing it keeps the
//! graph chordal). A fixed order, or the block sequence of a partial order,
//! must still eliminate the thinned graph without fill; removals that break
//! it are undone. The order, cliques and tree are then rebuilt from the
//! thinned graph under the same ordering constraints.

use rustc_hash::FxHashMap;

use crate::engine::config::{EliminationStrategyKind, Heuristic, TriangulationConfig};
use crate::engine::elimination::EliminationStrategy;
use crate::engine::errors::InferenceError;
use crate::engine::graph::{CliqueId, DomainSizes, NodeId, UndiGraph};
use crate::engine::simplicial_set::{EliminationStep, SimplicialSet};

/// An edge added to make an eliminated node's neighbourhood a clique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FillEdge {
    /// Lower endpoint.
    pub a: NodeId,
    /// Higher endpoint.
    pub b: NodeId,
    /// Node whose elimination added the edge.
    pub cause: NodeId,
}

/// Clique created by eliminating one node.
#[derive(Debug, Clone, PartialEq)]
pub struct EliminationClique {
    /// Clique id, equal to the elimination position of `node`.
    pub id: CliqueId,
    /// The eliminated node.
    pub node: NodeId,
    /// `node` plus its neighbours at elimination time, sorted.
    pub scope: Vec<NodeId>,
    /// Log of the product of the scope's domain sizes.
    pub log_weight: f64,
    /// Clique of the neighbour eliminated next, `None` for a component root.
    pub parent: Option<CliqueId>,
    /// Cliques whose parent is this clique, sorted.
    pub children: Vec<CliqueId>,
}

/// Tree (forest, for disconnected graphs) of elimination cliques.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EliminationTree {
    cliques: Vec<EliminationClique>,
}

impl EliminationTree {
    /// Cliques in elimination order (children before their parent).
    pub fn cliques(&self) -> &[EliminationClique] {
        &self.cliques
    }

    pub fn clique(&self, id: CliqueId) -> Option<&EliminationClique> {
        self.cliques.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.cliques.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cliques.is_empty()
    }

    /// Cliques without a parent, one per connected component.
    pub fn roots(&self) -> impl Iterator<Item = CliqueId> + '_ {
        self.cliques
            .iter()
            .filter(|clique| clique.parent.is_none())
            .map(|clique| clique.id)
    }

    fn from_steps(steps: &[EliminationStep]) -> Self {
        let position: FxHashMap<NodeId, usize> = steps
            .iter()
            .enumerate()
            .map(|(idx, step)| (step.node, idx))
            .collect();

        let mut cliques: Vec<EliminationClique> = steps
            .iter()
            .enumerate()
            .map(|(idx, step)| {
                let mut scope = step.neighbours.clone();
                scope.push(step.node);
                scope.sort_unstable();
                let parent = step
                    .neighbours
                    .iter()
                    .filter_map(|n| position.get(n).copied())
                    .min()
                    .map(|p| CliqueId(p as u32));
                EliminationClique {
                    id: CliqueId(idx as u32),
                    node: step.node,
                    scope,
                    log_weight: step.log_weight,
                    parent,
                    children: Vec::new(),
                }
            })
            .collect();

        for idx in 0..cliques.len() {
            if let Some(parent) = cliques[idx].parent {
                cliques[parent.index()].children.push(CliqueId(idx as u32));
            }
        }
        Self { cliques }
    }
}

/// Result of triangulating a graph.
#[derive(Debug, Clone)]
pub struct Triangulation {
    original: UndiGraph,
    triangulated: UndiGraph,
    domains: DomainSizes,
    order: Vec<NodeId>,
    position: FxHashMap<NodeId, usize>,
    fill_ins: Vec<FillEdge>,
    tree: EliminationTree,
}

struct EliminationPass {
    steps: Vec<EliminationStep>,
    fill_ins: Vec<FillEdge>,
}

impl Triangulation {
    /// Triangulates `graph` with the strategy and parameters of `config`.
    pub fn run(
        graph: &UndiGraph,
        domains: &DomainSizes,
        config: &TriangulationConfig,
    ) -> Result<Self, InferenceError> {
        config.validate()?;
        domains.covers(graph)?;
        let mut strategy = EliminationStrategy::from_kind(&config.strategy);
        strategy.validate(graph)?;

        let mut pass = eliminate_all(graph, domains, &mut strategy, config)?;
        let mut triangulated = graph.clone();
        for fill in &pass.fill_ins {
            triangulated.add_edge(fill.a, fill.b)?;
        }

        if config.enforce_minimality {
            let before = pass.fill_ins.len();
            let rebuild = rebuild_kind(&config.strategy);
            let constrained = !matches!(rebuild, EliminationStrategyKind::Default);
            let fill_free = |g: &UndiGraph| -> Result<bool, InferenceError> {
                if !constrained {
                    return Ok(true);
                }
                let mut strategy = EliminationStrategy::from_kind(&rebuild);
                Ok(eliminate_all(g, domains, &mut strategy, config)?
                    .fill_ins
                    .is_empty())
            };
            let kept = thin_fill_ins(&mut triangulated, pass.fill_ins, fill_free)?;
            let mut strategy = EliminationStrategy::from_kind(&rebuild);
            let rebuilt = eliminate_all(&triangulated, domains, &mut strategy, config)?;
            if !rebuilt.fill_ins.is_empty() {
                return Err(InferenceError::Internal(
                    "thinned triangulation is no longer chordal".into(),
                ));
            }
            #[cfg(feature = "tracing")]
            tracing::debug!(
                dropped = before - kept.len(),
                kept = kept.len(),
                "minimality pass thinned fill-ins"
            );
            #[cfg(not(feature = "tracing"))]
            let _ = before;
            pass = EliminationPass {
                steps: rebuilt.steps,
                fill_ins: kept,
            };
        }

        let order: Vec<NodeId> = pass.steps.iter().map(|step| step.node).collect();
        let position = order
            .iter()
            .enumerate()
            .map(|(idx, &node)| (node, idx))
            .collect();
        let tree = EliminationTree::from_steps(&pass.steps);

        let triangulation = Self {
            original: graph.clone(),
            triangulated,
            domains: domains.clone(),
            order,
            position,
            fill_ins: pass.fill_ins,
            tree,
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            nodes = triangulation.order.len(),
            fill_ins = triangulation.fill_ins.len(),
            max_log10_clique = triangulation.max_log10_clique_domain_size(),
            "triangulation complete"
        );

        Ok(triangulation)
    }

    /// The input graph.
    pub fn original_graph(&self) -> &UndiGraph {
        &self.original
    }

    /// The input graph plus all fill-in edges.
    pub fn triangulated_graph(&self) -> &UndiGraph {
        &self.triangulated
    }

    pub fn domain_sizes(&self) -> &DomainSizes {
        &self.domains
    }

    pub fn elimination_order(&self) -> &[NodeId] {
        &self.order
    }

    /// Position of `node` in the elimination order.
    pub fn elimination_index(&self, node: NodeId) -> Option<usize> {
        self.position.get(&node).copied()
    }

    pub fn fill_ins(&self) -> &[FillEdge] {
        &self.fill_ins
    }

    pub fn elimination_tree(&self) -> &EliminationTree {
        &self.tree
    }

    /// One clique per eliminated node, in elimination order.
    pub fn cliques(&self) -> &[EliminationClique] {
        self.tree.cliques()
    }

    /// Clique created when `node` was eliminated.
    pub fn clique_of(&self, node: NodeId) -> Option<&EliminationClique> {
        self.elimination_index(node)
            .and_then(|idx| self.tree.clique(CliqueId(idx as u32)))
    }

    /// Cliques not contained in another elimination clique.
    ///
    /// An elimination clique can only be contained in one of its children's
    /// cliques, so only children are checked.
    pub fn maximal_cliques(&self) -> Vec<&EliminationClique> {
        self.tree
            .cliques()
            .iter()
            .filter(|clique| {
                !clique.children.iter().any(|&child| {
                    self.tree
                        .clique(child)
                        .map(|c| is_subset(&clique.scope, &c.scope))
                        .unwrap_or(false)
                })
            })
            .collect()
    }

    /// Largest clique log-weight (natural log).
    pub fn log_tree_width(&self) -> f64 {
        self.tree
            .cliques()
            .iter()
            .map(|clique| clique.log_weight)
            .fold(0.0, f64::max)
    }

    /// Base-10 logarithm of the largest clique domain size.
    pub fn max_log10_clique_domain_size(&self) -> f64 {
        self.log_tree_width() / std::f64::consts::LN_10
    }

    /// Log of the summed domain sizes of the maximal cliques, the table
    /// memory a junction tree over this triangulation needs.
    pub fn total_log_weight(&self) -> f64 {
        let weights: Vec<f64> = self
            .maximal_cliques()
            .iter()
            .map(|clique| clique.log_weight)
            .collect();
        let max = weights.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return 0.0;
        }
        max + weights.iter().map(|w| (w - max).exp()).sum::<f64>().ln()
    }
}

/// Eliminates every node of `graph`, in the order chosen by `strategy`.
fn eliminate_all(
    graph: &UndiGraph,
    domains: &DomainSizes,
    strategy: &mut EliminationStrategy,
    config: &TriangulationConfig,
) -> Result<EliminationPass, InferenceError> {
    let mut set = SimplicialSet::new(
        graph,
        domains,
        config.almost_simplicial_threshold,
        config.quasi_simplicial_ratio,
    )?;
    let mut steps = Vec::with_capacity(set.len());
    let mut fill_ins = Vec::new();
    while !set.is_empty() {
        let node = strategy.next_elimination(&set)?;
        let step = set.eliminate(node)?;
        fill_ins.extend(step.fill_ins.iter().map(|&(a, b)| FillEdge { a, b, cause: node }));
        steps.push(step);
    }
    Ok(EliminationPass { steps, fill_ins })
}

/// Strategy that re-derives the elimination over a thinned graph.
///
/// A fixed order is replayed as given. Blocks stay in sequence, with the
/// simplicial-first heuristic inside each block. Free heuristics fall back to
/// simplicial-first over the whole graph.
fn rebuild_kind(kind: &EliminationStrategyKind) -> EliminationStrategyKind {
    match kind {
        EliminationStrategyKind::Ordered(order) => EliminationStrategyKind::Ordered(order.clone()),
        EliminationStrategyKind::PartialOrdered { blocks, .. } => {
            EliminationStrategyKind::PartialOrdered {
                blocks: blocks.clone(),
                within: Heuristic::Default,
            }
        }
        _ => EliminationStrategyKind::Default,
    }
}

/// Removes fill edges that lie in a single maximal clique until none is left.
///
/// A removal is undone when `admits` rejects the thinned graph.
fn thin_fill_ins<F>(
    triangulated: &mut UndiGraph,
    fill_ins: Vec<FillEdge>,
    admits: F,
) -> Result<Vec<FillEdge>, InferenceError>
where
    F: Fn(&UndiGraph) -> Result<bool, InferenceError>,
{
    let mut kept = fill_ins;
    loop {
        let before = kept.len();
        let mut next = Vec::with_capacity(before);
        for fill in kept {
            let common = triangulated.common_neighbours(fill.a, fill.b);
            if triangulated.is_clique(&common) {
                triangulated.remove_edge(fill.a, fill.b);
                if admits(triangulated)? {
                    continue;
                }
                triangulated.add_edge(fill.a, fill.b)?;
            }
            next.push(fill);
        }
        kept = next;
        if kept.len() == before {
            return Ok(kept);
        }
    }
}

/// Whether sorted `small` is contained in sorted `large`.
pub(crate) fn is_subset(small: &[NodeId], large: &[NodeId]) -> bool {
    small.len() <= large.len() && small.iter().all(|n| large.binary_search(n).is_ok())
}
