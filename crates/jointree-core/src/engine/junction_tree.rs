//! Junction tree construction from an elimination tree.
//!
//! An elimination clique `{v} ∪ N(v)` never appears in a later clique, since
//! `v` is gone from the graph afterwards. A non-maximal clique is therefore
//! always included in one of its *children*. [`JunctionTree::build`] walks the
//! elimination tree bottom-up and merges every such clique into that child:
//! the child takes over the absorbed clique's parent link and its other
//! children. The surviving cliques are renumbered densely in elimination order
//! and every tree edge gets a separator, the sorted intersection of its two
//! endpoint scopes.
//!
//! Disconnected graphs give a forest; each tree is a *component* and no
//! separator links two components.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use crate::engine::errors::InferenceError;
use crate::engine::graph::{CliqueId, NodeId};
use crate::engine::triangulation::{is_subset, EliminationTree};

/// An active clique of the junction tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JunctionClique {
    pub id: CliqueId,
    /// Sorted clique scope.
    pub scope: Vec<NodeId>,
    /// Log of the product of the scope's domain sizes.
    pub log_weight: f64,
    /// Elimination clique this clique was taken from.
    pub origin: CliqueId,
    /// Elimination cliques merged into this one.
    pub absorbed: Vec<CliqueId>,
}

/// A tree edge, oriented towards the component root.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Separator {
    pub child: CliqueId,
    pub parent: CliqueId,
    /// `scope(child) ∩ scope(parent)`, sorted.
    pub scope: Vec<NodeId>,
}

/// Junction tree (forest) of active cliques and their separators.
#[derive(Debug, Clone, Default)]
pub struct JunctionTree {
    cliques: Vec<JunctionClique>,
    parent: Vec<Option<CliqueId>>,
    neighbours: Vec<Vec<CliqueId>>,
    edges: Vec<Separator>,
    edge_index: FxHashMap<(CliqueId, CliqueId), usize>,
    holders: FxHashMap<NodeId, Vec<CliqueId>>,
    components: Vec<Vec<CliqueId>>,
    component_of: Vec<usize>,
    absorbed_into: Vec<CliqueId>,
}

impl JunctionTree {
    /// Compacts `elimination` into a junction tree.
    pub fn build(elimination: &EliminationTree) -> Result<Self, InferenceError> {
        let source = elimination.cliques();
        let n = source.len();
        let mut parent: Vec<Option<usize>> = source
            .iter()
            .map(|clique| clique.parent.map(CliqueId::index))
            .collect();
        let mut children: Vec<Vec<usize>> = source
            .iter()
            .map(|clique| clique.children.iter().map(|c| c.index()).collect())
            .collect();
        let mut host: Vec<usize> = (0..n).collect();
        let mut active = vec![true; n];

        // children precede their parent in elimination order
        for i in 0..n {
            let Some(keeper) = children[i]
                .iter()
                .copied()
                .find(|&c| is_subset(&source[i].scope, &source[c].scope))
            else {
                continue;
            };
            active[i] = false;
            host[i] = keeper;
            let up = parent[i];
            parent[keeper] = up;
            let others: Vec<usize> = children[i].drain(..).filter(|&c| c != keeper).collect();
            for &other in &others {
                parent[other] = Some(keeper);
            }
            children[keeper].extend(others);
            if let Some(up) = up {
                for slot in children[up].iter_mut().filter(|slot| **slot == i) {
                    *slot = keeper;
                }
            }
        }

        let mut dense = vec![usize::MAX; n];
        let mut cliques = Vec::new();
        for i in (0..n).filter(|&i| active[i]) {
            dense[i] = cliques.len();
            cliques.push(JunctionClique {
                id: CliqueId(cliques.len() as u32),
                scope: source[i].scope.clone(),
                log_weight: source[i].log_weight,
                origin: source[i].id,
                absorbed: Vec::new(),
            });
        }
        let mut absorbed_into = Vec::with_capacity(n);
        for i in 0..n {
            let target = dense[host[i]];
            if target == usize::MAX {
                return Err(InferenceError::Internal(format!(
                    "elimination clique {} absorbed into an inactive clique",
                    i
                )));
            }
            if !active[i] {
                cliques[target].absorbed.push(source[i].id);
            }
            absorbed_into.push(CliqueId(target as u32));
        }

        let mut tree = Self {
            parent: vec![None; cliques.len()],
            neighbours: vec![Vec::new(); cliques.len()],
            absorbed_into,
            ..Self::default()
        };
        for i in (0..n).filter(|&i| active[i]) {
            let child = CliqueId(dense[i] as u32);
            if let Some(up) = parent[i] {
                let up = CliqueId(dense[up] as u32);
                let scope = intersect(&cliques[child.index()].scope, &cliques[up.index()].scope);
                tree.parent[child.index()] = Some(up);
                tree.neighbours[child.index()].push(up);
                tree.neighbours[up.index()].push(child);
                tree.edge_index.insert(edge_key(child, up), tree.edges.len());
                tree.edges.push(Separator {
                    child,
                    parent: up,
                    scope,
                });
            }
        }
        for list in &mut tree.neighbours {
            list.sort_unstable();
        }
        for clique in &cliques {
            for &node in &clique.scope {
                tree.holders.entry(node).or_default().push(clique.id);
            }
        }
        tree.cliques = cliques;
        tree.index_components();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            active = tree.cliques.len(),
            absorbed = n - tree.cliques.len(),
            components = tree.components.len(),
            "junction tree built"
        );

        Ok(tree)
    }

    /// Breadth-first from each root; the root leads its component list.
    fn index_components(&mut self) {
        self.component_of = vec![usize::MAX; self.cliques.len()];
        let roots: Vec<CliqueId> = self.roots().collect();
        for root in roots {
            let component = self.components.len();
            let mut members = Vec::new();
            let mut queue = VecDeque::from([root]);
            self.component_of[root.index()] = component;
            while let Some(clique) = queue.pop_front() {
                members.push(clique);
                for &next in &self.neighbours[clique.index()] {
                    if self.component_of[next.index()] == usize::MAX {
                        self.component_of[next.index()] = component;
                        queue.push_back(next);
                    }
                }
            }
            self.components.push(members);
        }
    }

    pub fn cliques(&self) -> &[JunctionClique] {
        &self.cliques
    }

    pub fn clique(&self, id: CliqueId) -> Option<&JunctionClique> {
        self.cliques.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.cliques.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cliques.is_empty()
    }

    /// Sorted tree neighbours of `id`; empty for an unknown clique.
    pub fn neighbours(&self, id: CliqueId) -> &[CliqueId] {
        self.neighbours.get(id.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Parent in the elimination orientation.
    pub fn parent(&self, id: CliqueId) -> Option<CliqueId> {
        self.parent.get(id.index()).copied().flatten()
    }

    /// Cliques without a parent, one per component.
    pub fn roots(&self) -> impl Iterator<Item = CliqueId> + '_ {
        self.cliques
            .iter()
            .filter(|clique| self.parent[clique.id.index()].is_none())
            .map(|clique| clique.id)
    }

    /// Separator scope of the edge between `a` and `b`, in either direction.
    pub fn separator(&self, a: CliqueId, b: CliqueId) -> Option<&[NodeId]> {
        self.edge_index
            .get(&edge_key(a, b))
            .map(|&idx| self.edges[idx].scope.as_slice())
    }

    pub fn edges(&self) -> &[Separator] {
        &self.edges
    }

    /// Sorted ids of the cliques whose scope holds `node`.
    pub fn cliques_containing(&self, node: NodeId) -> &[CliqueId] {
        self.holders.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.holders.contains_key(&node)
    }

    /// Lightest clique holding `node`, lowest id on ties.
    pub fn smallest_clique_containing(&self, node: NodeId) -> Option<CliqueId> {
        self.cliques_containing(node).iter().copied().min_by(|a, b| {
            self.cliques[a.index()]
                .log_weight
                .total_cmp(&self.cliques[b.index()].log_weight)
                .then(a.cmp(b))
        })
    }

    /// First clique covering `scope` found breadth-first from the lowest
    /// clique holding `scope[0]`.
    ///
    /// Only cliques holding `scope[0]` are visited: by running intersection
    /// they form a connected subtree that contains every covering clique.
    pub fn covering_clique(&self, scope: &[NodeId]) -> Result<CliqueId, InferenceError> {
        let uncovered = || InferenceError::NoCoveringClique {
            scope: scope.to_vec(),
        };
        let Some(&anchor) = scope.first() else {
            return self.cliques.first().map(|clique| clique.id).ok_or_else(uncovered);
        };
        let start = *self.cliques_containing(anchor).first().ok_or_else(uncovered)?;
        let mut seen = vec![false; self.cliques.len()];
        let mut queue = VecDeque::from([start]);
        seen[start.index()] = true;
        while let Some(clique) = queue.pop_front() {
            let held = &self.cliques[clique.index()].scope;
            if scope.iter().all(|n| held.binary_search(n).is_ok()) {
                return Ok(clique);
            }
            for &next in &self.neighbours[clique.index()] {
                if !seen[next.index()]
                    && self.cliques[next.index()].scope.binary_search(&anchor).is_ok()
                {
                    seen[next.index()] = true;
                    queue.push_back(next);
                }
            }
        }
        Err(uncovered())
    }

    /// Clique lists per component, each led by its root.
    pub fn components(&self) -> &[Vec<CliqueId>] {
        &self.components
    }

    pub fn component_of(&self, id: CliqueId) -> Option<usize> {
        self.component_of.get(id.index()).copied()
    }

    /// Junction clique that holds elimination clique `id` after absorption.
    pub fn absorbed_into(&self, id: CliqueId) -> Option<CliqueId> {
        self.absorbed_into.get(id.index()).copied()
    }

    /// Checks separators against their endpoints and the running
    /// intersection property.
    ///
    /// In a forest the cliques holding a node form one connected subtree iff
    /// their count exceeds the number of edges whose separator holds the node
    /// by exactly one.
    pub fn check_running_intersection(&self) -> Result<(), InferenceError> {
        if self.edges.len() + self.components.len() != self.cliques.len() {
            return Err(InferenceError::Internal(format!(
                "{} cliques, {} edges and {} components do not form a forest",
                self.cliques.len(),
                self.edges.len(),
                self.components.len()
            )));
        }
        let mut separator_count: FxHashMap<NodeId, usize> = FxHashMap::default();
        for edge in &self.edges {
            let expected = intersect(
                &self.cliques[edge.child.index()].scope,
                &self.cliques[edge.parent.index()].scope,
            );
            if expected != edge.scope {
                return Err(InferenceError::Internal(format!(
                    "separator {:?}-{:?} is {:?}, expected {:?}",
                    edge.child, edge.parent, edge.scope, expected
                )));
            }
            for &node in &edge.scope {
                *separator_count.entry(node).or_default() += 1;
            }
        }
        for (node, holders) in &self.holders {
            let linked = separator_count.get(node).copied().unwrap_or(0);
            if holders.len() != linked + 1 {
                return Err(InferenceError::Internal(format!(
                    "cliques holding {:?} are not connected ({} cliques, {} separators)",
                    node,
                    holders.len(),
                    linked
                )));
            }
        }
        Ok(())
    }
}

fn edge_key(a: CliqueId, b: CliqueId) -> (CliqueId, CliqueId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Intersection of two sorted scopes.
fn intersect(a: &[NodeId], b: &[NodeId]) -> Vec<NodeId> {
    a.iter()
        .copied()
        .filter(|n| b.binary_search(n).is_ok())
        .collect()
}
