//! # Jointree Core
//!
//! Exact inference over discrete graphical models by junction-tree
//! compilation and Shafer-Shenoy message passing.
//!
//! ## Architecture
//!
//! A model is compiled in stages, each usable on its own:
//!
//! - **triangulation**: greedy node elimination driven by a configurable
//!   strategy and an incrementally maintained simplicial set
//! - **junction tree**: the elimination tree compacted by clique absorption,
//!   with separators on every edge
//! - **message passing**: factors placed into covering cliques, evidence
//!   handling and lazily recomputed messages
//! - **inference**: a front-end that runs every stage from a model
//!
//! ## Usage
//!
//! ```rust,ignore
//! use jointree_core::{BayesNet, JunctionTreeInference, TriangulationConfig};
//!
//! let mut bn = BayesNet::new();
//! let rain = bn.add_variable("rain", 2)?;
//! let wet = bn.add_variable("wet", 2)?;
//! bn.add_arc(rain, wet)?;
//! bn.set_cpt(rain, vec![0.8, 0.2])?;
//! bn.set_cpt(wet, vec![0.9, 0.1, 0.2, 0.8])?;
//!
//! let mut inference = JunctionTreeInference::from_model(&bn, &TriangulationConfig::default())?;
//! inference.insert_hard_evidence(wet, 1)?;
//! let p_rain = inference.posterior(rain)?;
//! ```

#![forbid(unsafe_code)]

pub mod engine;
pub mod inference;

// Re-export commonly used types
pub use engine::config::{EliminationStrategyKind, Heuristic, TriangulationConfig};
pub use engine::errors::InferenceError;
pub use engine::graph::{CliqueId, DomainSizes, NodeId, UndiGraph};
pub use engine::junction_tree::{JunctionClique, JunctionTree, Separator};
pub use engine::model::{BayesNet, GraphicalModel, Variable};
pub use engine::potential::{Assignment, Potential};
pub use engine::shafer_shenoy::{EngineState, ShaferShenoy};
pub use engine::triangulation::{EliminationClique, EliminationTree, FillEdge, Triangulation};
pub use inference::JunctionTreeInference;

/// Triangulates `graph` under `config`.
///
/// # Errors
///
/// * `InferenceError::InvalidConfig` - out-of-range configuration
/// * `InferenceError::GraphConsistency` - a node without domain size, or a
///   fixed order that does not list every node exactly once
pub fn triangulate(
    graph: &UndiGraph,
    domains: &DomainSizes,
    config: &TriangulationConfig,
) -> Result<Triangulation, InferenceError> {
    Triangulation::run(graph, domains, config)
}

/// Builds the junction tree of a triangulation.
pub fn build_junction_tree(triangulation: &Triangulation) -> Result<JunctionTree, InferenceError> {
    JunctionTree::build(triangulation.elimination_tree())
}
