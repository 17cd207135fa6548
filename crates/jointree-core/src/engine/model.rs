//! Model collaborator: the source of graph structure and factors.

use rustc_hash::FxHashMap;

use crate::engine::errors::InferenceError;
use crate::engine::graph::{DomainSizes, NodeId, UndiGraph};
use crate::engine::potential::{Assignment, Potential};

/// A discrete graphical model that can be compiled into a junction tree.
pub trait GraphicalModel {
    /// Variables of the model, ascending.
    fn nodes(&self) -> Vec<NodeId>;

    fn domain_size(&self, node: NodeId) -> Option<usize>;

    /// Parents of `node` (empty for undirected models and root variables).
    fn parents(&self, node: NodeId) -> &[NodeId];

    /// One potential per factor of the model.
    fn factors(&self) -> Result<Vec<Potential>, InferenceError>;

    fn domain_sizes(&self) -> DomainSizes {
        self.nodes()
            .into_iter()
            .filter_map(|node| self.domain_size(node).map(|size| (node, size)))
            .collect()
    }

    /// Undirected graph linking every node to its parents and every pair of
    /// co-parents.
    fn moral_graph(&self) -> Result<UndiGraph, InferenceError> {
        let mut graph = UndiGraph::with_nodes(self.nodes());
        for node in self.nodes() {
            let parents = self.parents(node);
            for (idx, &parent) in parents.iter().enumerate() {
                graph.add_edge(parent, node)?;
                for &other in &parents[idx + 1..] {
                    graph.add_edge(parent, other)?;
                }
            }
        }
        Ok(graph)
    }
}

/// A named discrete variable.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Variable {
    pub name: String,
    pub size: usize,
}

/// Bayesian network with one conditional table per variable.
///
/// Node ids are assigned densely in insertion order. The table of a node is
/// a [`Potential`] over `parents ++ [node]`, so each row (fixed parent
/// configuration) is a distribution over the node.
#[derive(Debug, Clone, Default)]
pub struct BayesNet {
    variables: Vec<Variable>,
    by_name: FxHashMap<String, NodeId>,
    parents: Vec<Vec<NodeId>>,
    children: Vec<Vec<NodeId>>,
    cpts: Vec<Option<Potential>>,
}

impl BayesNet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Adds a variable with `size` states.
    pub fn add_variable(&mut self, name: &str, size: usize) -> Result<NodeId, InferenceError> {
        if size == 0 {
            return Err(InferenceError::GraphConsistency(format!(
                "variable {} needs at least one state",
                name
            )));
        }
        if self.by_name.contains_key(name) {
            return Err(InferenceError::GraphConsistency(format!(
                "variable {} already exists",
                name
            )));
        }
        let id = NodeId(self.variables.len() as u32);
        self.variables.push(Variable {
            name: name.to_string(),
            size,
        });
        self.by_name.insert(name.to_string(), id);
        self.parents.push(Vec::new());
        self.children.push(Vec::new());
        self.cpts.push(None);
        Ok(id)
    }

    fn check(&self, node: NodeId) -> Result<usize, InferenceError> {
        let idx = node.0 as usize;
        if idx < self.variables.len() {
            Ok(idx)
        } else {
            Err(InferenceError::GraphConsistency(format!(
                "unknown variable {:?}",
                node
            )))
        }
    }

    /// Adds the arc `parent → child`.
    ///
    /// Rejects unknown variables, duplicate arcs and arcs closing a directed
    /// cycle. The child's table is dropped, as its scope changes.
    pub fn add_arc(&mut self, parent: NodeId, child: NodeId) -> Result<(), InferenceError> {
        let p = self.check(parent)?;
        let c = self.check(child)?;
        if self.parents[c].contains(&parent) {
            return Err(InferenceError::GraphConsistency(format!(
                "arc {:?} -> {:?} already exists",
                parent, child
            )));
        }
        if self.reaches(child, parent) {
            return Err(InferenceError::GraphConsistency(format!(
                "arc {:?} -> {:?} would close a cycle",
                parent, child
            )));
        }
        self.parents[c].push(parent);
        self.children[p].push(child);
        self.cpts[c] = None;
        Ok(())
    }

    /// Whether a directed path leads from `from` to `to` (a node reaches itself).
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut seen = vec![false; self.variables.len()];
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            let idx = node.0 as usize;
            if std::mem::replace(&mut seen[idx], true) {
                continue;
            }
            stack.extend(self.children[idx].iter().copied());
        }
        false
    }

    /// Sets the table of `node` from row-major values over `parents ++ [node]`.
    pub fn set_cpt(&mut self, node: NodeId, values: Vec<f64>) -> Result<(), InferenceError> {
        let idx = self.check(node)?;
        let scope: Vec<(NodeId, usize)> = self.parents[idx]
            .iter()
            .chain(std::iter::once(&node))
            .map(|&var| (var, self.variables[var.0 as usize].size))
            .collect();
        let cpt = Potential::new(scope, values)?;
        if !cpt.is_conditional_on_last() {
            return Err(InferenceError::InvalidPotential(format!(
                "table of {} has a row that does not sum to one",
                self.variables[idx].name
            )));
        }
        self.cpts[idx] = Some(cpt);
        Ok(())
    }

    pub fn cpt(&self, node: NodeId) -> Option<&Potential> {
        self.cpts.get(node.0 as usize).and_then(Option::as_ref)
    }

    pub fn variable(&self, node: NodeId) -> Option<&Variable> {
        self.variables.get(node.0 as usize)
    }

    pub fn variable_by_name(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.children
            .get(node.0 as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Probability of a complete assignment, as the product of all tables.
    pub fn joint_probability(&self, assignment: &Assignment) -> Result<f64, InferenceError> {
        self.factors()?
            .iter()
            .try_fold(1.0, |acc, cpt| -> Result<f64, InferenceError> {
                Ok(acc * cpt.evaluate(assignment)?)
            })
    }
}

impl GraphicalModel for BayesNet {
    fn nodes(&self) -> Vec<NodeId> {
        (0..self.variables.len() as u32).map(NodeId).collect()
    }

    fn domain_size(&self, node: NodeId) -> Option<usize> {
        self.variable(node).map(|var| var.size)
    }

    fn parents(&self, node: NodeId) -> &[NodeId] {
        self.parents
            .get(node.0 as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The conditional tables; fails if a variable has none.
    fn factors(&self) -> Result<Vec<Potential>, InferenceError> {
        self.cpts
            .iter()
            .zip(&self.variables)
            .map(|(cpt, var)| {
                cpt.clone().ok_or_else(|| {
                    InferenceError::InvalidPotential(format!("variable {} has no table", var.name))
                })
            })
            .collect()
    }
}
