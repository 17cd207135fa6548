//! Error types for triangulation, junction-tree construction and inference.

use thiserror::Error;

use crate::engine::graph::NodeId;

/// Errors that can occur while triangulating a model graph, building its
/// junction tree or running message passing over it.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking changes.
///
/// All public APIs return `Result<T, InferenceError>`; none of the
/// algorithms retry or continue after reporting an error.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InferenceError {
    /// The graph, its domain sizes or a fixed elimination order disagree
    /// (missing domain size, unknown node, omitted or duplicated node, self-loop).
    #[error("graph consistency error: {0}")]
    GraphConsistency(String),

    /// No active clique contains the whole scope of a factor or query.
    ///
    /// For factor placement this means the triangulation did not cover the
    /// model, which is an internal invariant violation.
    #[error("no clique covers scope {scope:?}")]
    NoCoveringClique {
        /// The uncovered scope.
        scope: Vec<NodeId>,
    },

    /// Inference was requested before factors were placed into the junction tree.
    #[error("inference engine is not initialized: place factors first")]
    UninitializedEngine,

    /// The variable is not held by any clique of the junction tree.
    #[error("variable {0:?} not found in the junction tree")]
    VariableNotFound(NodeId),

    /// A potential table is malformed (size mismatch, negative entries, bad CPT rows).
    #[error("invalid potential: {0}")]
    InvalidPotential(String),

    /// Numerical failure such as normalizing a potential with zero total mass.
    #[error("numerical error: {0}")]
    Numerical(String),

    /// A configuration value is outside its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal error (programmer error, not user error).
    #[error("internal error: {0}")]
    Internal(String),
}
