//! The compilation and inference engine.
//!
//! This module provides:
//! - **errors**: Error type shared by every stage
//! - **config**: Triangulation configuration
//! - **graph**: Undirected working graph and domain sizes
//! - **potential**: Dense potentials and their algebra
//! - **model**: Model collaborator trait and a Bayesian network
//! - **simplicial_set**: Incremental node classification under elimination
//! - **elimination**: Elimination sequence strategies
//! - **triangulation**: Greedy triangulation and the elimination tree
//! - **junction_tree**: Junction tree construction by clique absorption
//! - **shafer_shenoy**: Lazy message passing with per-edge staleness

pub mod config;
pub mod elimination;
pub mod errors;
pub mod graph;
pub mod junction_tree;
pub mod model;
pub mod potential;
pub mod shafer_shenoy;
pub mod simplicial_set;
pub mod triangulation;
