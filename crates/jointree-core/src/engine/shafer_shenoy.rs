//! Shafer-Shenoy message passing over a junction tree.
//!
//! ## Messages
//!
//! Every tree edge carries two directed messages. The message `c → n` is the
//! potential of `c` combined with every message flowing into `c` except the
//! one from `n`, marginalized onto the separator of `c` and `n`. Clique
//! potentials are never divided, so messages stay valid independently of one
//! another and are cached per direction.
//!
//! ## Staleness
//!
//! Each cached message is [`Freshness::Fresh`] or [`Freshness::Stale`].
//! Changing the evidence held by clique `h` marks stale exactly the messages
//! directed *away* from `h` inside its component: those are the messages
//! whose inputs include the potential of `h`. Messages pointing towards `h`
//! do not depend on it and stay fresh. Stale messages are recomputed lazily,
//! only when a query needs them.
//!
//! ## Components
//!
//! A disconnected model yields a junction forest. Messages never cross
//! components and the probability of evidence is the product of the
//! per-component masses.

use std::collections::{BTreeMap, VecDeque};

use rustc_hash::FxHashMap;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::engine::errors::InferenceError;
use crate::engine::graph::{CliqueId, DomainSizes, NodeId};
use crate::engine::junction_tree::JunctionTree;
use crate::engine::potential::Potential;

/// Lifecycle of a [`ShaferShenoy`] engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EngineState {
    /// Junction tree ready, no factors placed.
    Built,
    /// Factors placed; some messages may be stale.
    Initialized,
    /// Every message of the root's component directed towards the root is fresh.
    Collected(CliqueId),
    /// Every message of the root's component is fresh.
    Diffused(CliqueId),
}

/// Validity of a cached message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

#[derive(Debug, Clone)]
struct MessageSlot {
    potential: Option<Potential>,
    freshness: Freshness,
}

impl MessageSlot {
    fn stale() -> Self {
        Self {
            potential: None,
            freshness: Freshness::Stale,
        }
    }
}

/// Lazy Shafer-Shenoy inference engine.
#[derive(Debug, Clone)]
pub struct ShaferShenoy {
    tree: JunctionTree,
    domains: DomainSizes,
    factors: Vec<Vec<Potential>>,
    clique_potentials: Vec<Potential>,
    evidence: BTreeMap<NodeId, Potential>,
    evidence_clique: FxHashMap<NodeId, CliqueId>,
    messages: FxHashMap<(CliqueId, CliqueId), MessageSlot>,
    state: EngineState,
    recomputations: usize,
}

impl ShaferShenoy {
    /// Creates an engine in the [`EngineState::Built`] state.
    pub fn new(tree: JunctionTree, domains: DomainSizes) -> Self {
        let messages = tree
            .edges()
            .iter()
            .flat_map(|edge| [(edge.child, edge.parent), (edge.parent, edge.child)])
            .map(|key| (key, MessageSlot::stale()))
            .collect();
        Self {
            factors: vec![Vec::new(); tree.len()],
            tree,
            domains,
            clique_potentials: Vec::new(),
            evidence: BTreeMap::new(),
            evidence_clique: FxHashMap::default(),
            messages,
            state: EngineState::Built,
            recomputations: 0,
        }
    }

    pub fn junction_tree(&self) -> &JunctionTree {
        &self.tree
    }

    pub fn domain_sizes(&self) -> &DomainSizes {
        &self.domains
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    fn is_initialized(&self) -> bool {
        self.state != EngineState::Built
    }

    fn require_initialized(&self) -> Result<(), InferenceError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(InferenceError::UninitializedEngine)
        }
    }

    /// Assigns each factor to a clique covering its scope and builds the
    /// clique potentials.
    ///
    /// Replaces previously placed factors; evidence is kept and folded in.
    pub fn place_factors<I>(&mut self, factors: I) -> Result<(), InferenceError>
    where
        I: IntoIterator<Item = Potential>,
    {
        let mut placed = vec![Vec::new(); self.tree.len()];
        let mut count = 0_usize;
        for factor in factors {
            for (var, size) in factor.variables() {
                match self.domains.get(var) {
                    Some(expected) if expected == size => {}
                    Some(expected) => {
                        return Err(InferenceError::InvalidPotential(format!(
                            "factor over {:?} gives {:?} {} states, expected {}",
                            factor.scope(),
                            var,
                            size,
                            expected
                        )))
                    }
                    None => return Err(InferenceError::VariableNotFound(var)),
                }
            }
            let clique = self.tree.covering_clique(factor.scope())?;
            placed[clique.index()].push(factor);
            count += 1;
        }
        self.factors = placed;

        self.clique_potentials = Vec::with_capacity(self.tree.len());
        for idx in 0..self.tree.len() {
            let potential = self.build_clique_potential(CliqueId(idx as u32))?;
            self.clique_potentials.push(potential);
        }
        for slot in self.messages.values_mut() {
            *slot = MessageSlot::stale();
        }
        self.state = EngineState::Initialized;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            factors = count,
            cliques = self.tree.len(),
            evidence = self.evidence.len(),
            "factors placed"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = count;

        Ok(())
    }

    /// Unit potential over the clique scope times its factors and evidence.
    fn build_clique_potential(&self, id: CliqueId) -> Result<Potential, InferenceError> {
        let clique = self
            .tree
            .clique(id)
            .ok_or_else(|| InferenceError::Internal(format!("unknown clique {:?}", id)))?;
        let scope = clique
            .scope
            .iter()
            .map(|&var| {
                self.domains
                    .get(var)
                    .map(|size| (var, size))
                    .ok_or(InferenceError::VariableNotFound(var))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut potential = Potential::ones(&scope);
        for factor in &self.factors[id.index()] {
            potential = potential.combine(factor)?;
        }
        for (var, evidence) in &self.evidence {
            if self.evidence_clique.get(var) == Some(&id) {
                potential = potential.combine(evidence)?;
            }
        }
        Ok(potential)
    }

    /// Sets (or replaces) the evidence on `var`.
    ///
    /// `evidence` must be a potential over `var` alone. Inserting evidence
    /// equal to the current one is a no-op.
    pub fn insert_evidence(
        &mut self,
        var: NodeId,
        evidence: Potential,
    ) -> Result<(), InferenceError> {
        let holder = self
            .tree
            .smallest_clique_containing(var)
            .ok_or(InferenceError::VariableNotFound(var))?;
        let size = self.domains.get(var).ok_or(InferenceError::VariableNotFound(var))?;
        if evidence.scope() != [var] || evidence.sizes() != [size] {
            return Err(InferenceError::InvalidPotential(format!(
                "evidence on {:?} must range over it alone with {} states, got scope {:?}",
                var,
                size,
                evidence.scope()
            )));
        }
        if evidence.sum() <= 0.0 {
            return Err(InferenceError::InvalidPotential(format!(
                "evidence on {:?} has no positive entry",
                var
            )));
        }
        if self.evidence.get(&var) == Some(&evidence) {
            return Ok(());
        }
        self.evidence.insert(var, evidence);
        self.evidence_clique.insert(var, holder);
        self.evidence_changed(var, holder)
    }

    /// Observes `var` at `value`.
    pub fn insert_hard_evidence(
        &mut self,
        var: NodeId,
        value: usize,
    ) -> Result<(), InferenceError> {
        let size = self.domains.get(var).ok_or(InferenceError::VariableNotFound(var))?;
        self.insert_evidence(var, Potential::indicator(var, size, value)?)
    }

    /// Removes the evidence on `var`; returns whether there was any.
    pub fn erase_evidence(&mut self, var: NodeId) -> Result<bool, InferenceError> {
        if !self.tree.contains_node(var) {
            return Err(InferenceError::VariableNotFound(var));
        }
        if self.evidence.remove(&var).is_none() {
            return Ok(false);
        }
        let holder = self.evidence_clique.remove(&var).ok_or_else(|| {
            InferenceError::Internal(format!("evidence on {:?} had no clique", var))
        })?;
        self.evidence_changed(var, holder)?;
        Ok(true)
    }

    /// Removes all evidence.
    pub fn erase_all_evidence(&mut self) -> Result<(), InferenceError> {
        let vars: Vec<NodeId> = self.evidence.keys().copied().collect();
        for var in vars {
            self.erase_evidence(var)?;
        }
        Ok(())
    }

    pub fn has_evidence(&self, var: NodeId) -> bool {
        self.evidence.contains_key(&var)
    }

    /// Evidence currently set, by variable.
    pub fn evidence(&self) -> &BTreeMap<NodeId, Potential> {
        &self.evidence
    }

    fn evidence_changed(&mut self, var: NodeId, holder: CliqueId) -> Result<(), InferenceError> {
        if !self.is_initialized() {
            return Ok(());
        }
        self.clique_potentials[holder.index()] = self.build_clique_potential(holder)?;
        let staled = self.invalidate_from(holder);
        self.state = EngineState::Initialized;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            var = ?var,
            clique = ?holder,
            staled,
            "evidence changed"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = (var, staled);

        Ok(())
    }

    /// Marks stale every message directed away from `origin`; returns how
    /// many were fresh before.
    fn invalidate_from(&mut self, origin: CliqueId) -> usize {
        let mut staled = 0;
        let mut queue = VecDeque::from([(origin, None)]);
        while let Some((clique, from)) = queue.pop_front() {
            for &next in self.tree.neighbours(clique) {
                if Some(next) == from {
                    continue;
                }
                if let Some(slot) = self.messages.get_mut(&(clique, next)) {
                    if slot.freshness == Freshness::Fresh {
                        staled += 1;
                    }
                    slot.freshness = Freshness::Stale;
                }
                queue.push_back((next, Some(clique)));
            }
        }
        staled
    }

    /// Makes the message `from → to` fresh, recomputing stale messages on
    /// the `from` side of the edge first.
    fn ensure_message(&mut self, from: CliqueId, to: CliqueId) -> Result<(), InferenceError> {
        // pre-order over the edges feeding `from → to`; a fresh message only
        // depends on fresh messages, so fresh edges cut the walk
        let mut pending = Vec::new();
        let mut stack = vec![(from, to)];
        while let Some((source, target)) = stack.pop() {
            if self.is_fresh(source, target) {
                continue;
            }
            pending.push((source, target));
            for &next in self.tree.neighbours(source) {
                if next != target {
                    stack.push((next, source));
                }
            }
        }
        for (source, target) in pending.into_iter().rev() {
            self.recompute_message(source, target)?;
        }
        Ok(())
    }

    fn is_fresh(&self, from: CliqueId, to: CliqueId) -> bool {
        self.messages
            .get(&(from, to))
            .map(|slot| slot.freshness == Freshness::Fresh)
            .unwrap_or(false)
    }

    fn recompute_message(&mut self, from: CliqueId, to: CliqueId) -> Result<(), InferenceError> {
        let separator = self
            .tree
            .separator(from, to)
            .ok_or_else(|| {
                InferenceError::Internal(format!("no edge between {:?} and {:?}", from, to))
            })?
            .to_vec();
        let mut product = self.clique_potentials[from.index()].clone();
        for &next in self.tree.neighbours(from) {
            if next != to {
                product = product.combine(self.fresh_message(next, from)?)?;
            }
        }
        let message = product.marginalize_onto(&separator);

        #[cfg(feature = "tracing")]
        tracing::trace!(
            from = ?from,
            to = ?to,
            entries = message.num_entries(),
            "message recomputed"
        );

        let slot = self.messages.get_mut(&(from, to)).ok_or_else(|| {
            InferenceError::Internal(format!("no message slot for {:?} -> {:?}", from, to))
        })?;
        slot.potential = Some(message);
        slot.freshness = Freshness::Fresh;
        self.recomputations += 1;
        Ok(())
    }

    fn fresh_message(&self, from: CliqueId, to: CliqueId) -> Result<&Potential, InferenceError> {
        match self.messages.get(&(from, to)) {
            Some(MessageSlot {
                potential: Some(potential),
                freshness: Freshness::Fresh,
            }) => Ok(potential),
            _ => Err(InferenceError::Internal(format!(
                "message {:?} -> {:?} is not up to date",
                from, to
            ))),
        }
    }

    /// The cached message `from → to`, if it is fresh.
    pub fn message(&self, from: CliqueId, to: CliqueId) -> Option<&Potential> {
        self.fresh_message(from, to).ok()
    }

    fn check_clique(&self, id: CliqueId) -> Result<(), InferenceError> {
        if self.tree.clique(id).is_some() {
            Ok(())
        } else {
            Err(InferenceError::Internal(format!("unknown clique {:?}", id)))
        }
    }

    /// Brings every message of the root's component directed towards `root`
    /// up to date.
    ///
    /// The state becomes [`EngineState::Diffused`] when the outward messages
    /// of that component are already fresh, for instance after an earlier
    /// diffusion from another root.
    pub fn collect(&mut self, root: CliqueId) -> Result<(), InferenceError> {
        self.require_initialized()?;
        self.check_clique(root)?;
        self.ensure_incoming(root)?;
        self.state = if self.component_is_fresh(root) {
            EngineState::Diffused(root)
        } else {
            EngineState::Collected(root)
        };
        Ok(())
    }

    /// Whether both directions of every edge in `root`'s component are fresh.
    fn component_is_fresh(&self, root: CliqueId) -> bool {
        let component = self.tree.component_of(root);
        self.tree
            .edges()
            .iter()
            .filter(|sep| self.tree.component_of(sep.child) == component)
            .all(|sep| {
                self.is_fresh(sep.child, sep.parent) && self.is_fresh(sep.parent, sep.child)
            })
    }

    /// Collects towards `root`, then brings the messages directed away from
    /// it up to date, parents before children.
    pub fn diffuse(&mut self, root: CliqueId) -> Result<(), InferenceError> {
        self.collect(root)?;
        let mut queue = VecDeque::from([(root, None)]);
        while let Some((clique, from)) = queue.pop_front() {
            let neighbours = self.tree.neighbours(clique).to_vec();
            for next in neighbours {
                if Some(next) != from {
                    self.ensure_message(clique, next)?;
                    queue.push_back((next, Some(clique)));
                }
            }
        }
        self.state = EngineState::Diffused(root);
        Ok(())
    }

    fn ensure_incoming(&mut self, clique: CliqueId) -> Result<(), InferenceError> {
        let neighbours = self.tree.neighbours(clique).to_vec();
        for next in neighbours {
            self.ensure_message(next, clique)?;
        }
        Ok(())
    }

    /// Clique potential times all incoming messages, which must be fresh.
    fn assemble_belief(&self, clique: CliqueId) -> Result<Potential, InferenceError> {
        let mut belief = self.clique_potentials[clique.index()].clone();
        for &next in self.tree.neighbours(clique) {
            belief = belief.combine(self.fresh_message(next, clique)?)?;
        }
        Ok(belief)
    }

    /// Unnormalized joint of the clique's scope and the evidence of its component.
    pub fn belief(&mut self, clique: CliqueId) -> Result<Potential, InferenceError> {
        self.require_initialized()?;
        self.check_clique(clique)?;
        self.ensure_incoming(clique)?;
        self.assemble_belief(clique)
    }

    fn holder(&self, var: NodeId) -> Result<CliqueId, InferenceError> {
        self.tree
            .smallest_clique_containing(var)
            .ok_or(InferenceError::VariableNotFound(var))
    }

    /// Posterior marginal of `var` given the current evidence.
    pub fn posterior(&mut self, var: NodeId) -> Result<Potential, InferenceError> {
        self.require_initialized()?;
        let clique = self.holder(var)?;
        self.belief(clique)?.marginalize_onto(&[var]).normalized()
    }

    /// Joint posterior of `vars`, which one clique must cover. The result's
    /// scope is sorted.
    pub fn joint_posterior(&mut self, vars: &[NodeId]) -> Result<Potential, InferenceError> {
        self.require_initialized()?;
        if let Some(&missing) = vars.iter().find(|v| !self.tree.contains_node(**v)) {
            return Err(InferenceError::VariableNotFound(missing));
        }
        let clique = self.tree.covering_clique(vars)?;
        self.belief(clique)?.marginalize_onto(vars).normalized()
    }

    /// Posterior marginals of several variables, in the order given.
    ///
    /// Messages are brought up to date first; with the `rayon` feature the
    /// marginals are then computed in parallel.
    pub fn posteriors(&mut self, vars: &[NodeId]) -> Result<Vec<Potential>, InferenceError> {
        self.require_initialized()?;
        let holders = vars
            .iter()
            .map(|&var| self.holder(var).map(|clique| (var, clique)))
            .collect::<Result<Vec<_>, _>>()?;
        for &(_, clique) in &holders {
            self.ensure_incoming(clique)?;
        }

        let this = &*self;
        let marginal = |&(var, clique): &(NodeId, CliqueId)| {
            this.assemble_belief(clique)?
                .marginalize_onto(&[var])
                .normalized()
        };

        #[cfg(feature = "rayon")]
        let result = holders.par_iter().map(marginal).collect();
        #[cfg(not(feature = "rayon"))]
        let result = holders.iter().map(marginal).collect();

        result
    }

    /// Probability (likelihood, for soft evidence) of the current evidence.
    pub fn evidence_probability(&mut self) -> Result<f64, InferenceError> {
        self.require_initialized()?;
        let roots: Vec<CliqueId> = self
            .tree
            .components()
            .iter()
            .filter_map(|members| members.first().copied())
            .collect();
        let mut probability = 1.0;
        for root in roots {
            probability *= self.belief(root)?.sum();
        }
        Ok(probability)
    }

    /// Number of messages currently stale.
    pub fn stale_message_count(&self) -> usize {
        self.messages
            .values()
            .filter(|slot| slot.freshness == Freshness::Stale)
            .count()
    }

    /// Number of message computations since the engine was built or cleared.
    pub fn recomputation_count(&self) -> usize {
        self.recomputations
    }

    /// Drops factors, evidence and messages; the engine returns to
    /// [`EngineState::Built`].
    pub fn clear(&mut self) {
        for list in &mut self.factors {
            list.clear();
        }
        self.clique_potentials.clear();
        self.evidence.clear();
        self.evidence_clique.clear();
        for slot in self.messages.values_mut() {
            *slot = MessageSlot::stale();
        }
        self.recomputations = 0;
        self.state = EngineState::Built;
    }
}
