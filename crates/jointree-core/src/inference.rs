//! Junction-tree inference front-end.
//!
//! [`JunctionTreeInference`] compiles a [`GraphicalModel`] in one call:
//! moralization, triangulation, junction-tree construction and factor
//! placement. Queries and evidence then go through the wrapped
//! [`ShaferShenoy`] engine.

use crate::engine::config::TriangulationConfig;
use crate::engine::errors::InferenceError;
use crate::engine::graph::NodeId;
use crate::engine::junction_tree::JunctionTree;
use crate::engine::model::GraphicalModel;
use crate::engine::potential::Potential;
use crate::engine::shafer_shenoy::ShaferShenoy;
use crate::engine::triangulation::Triangulation;

/// A compiled model ready for queries.
#[derive(Debug, Clone)]
pub struct JunctionTreeInference {
    triangulation: Triangulation,
    engine: ShaferShenoy,
}

impl JunctionTreeInference {
    /// Compiles `model` and places its factors.
    pub fn from_model<M: GraphicalModel + ?Sized>(
        model: &M,
        config: &TriangulationConfig,
    ) -> Result<Self, InferenceError> {
        let graph = model.moral_graph()?;
        let domains = model.domain_sizes();
        let triangulation = Triangulation::run(&graph, &domains, config)?;
        let tree = JunctionTree::build(triangulation.elimination_tree())?;
        tree.check_running_intersection()?;

        let mut engine = ShaferShenoy::new(tree, domains);
        engine.place_factors(model.factors()?)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            nodes = graph.node_count(),
            cliques = engine.junction_tree().len(),
            max_log10_clique = triangulation.max_log10_clique_domain_size(),
            "model compiled"
        );

        Ok(Self {
            triangulation,
            engine,
        })
    }

    pub fn triangulation(&self) -> &Triangulation {
        &self.triangulation
    }

    pub fn junction_tree(&self) -> &JunctionTree {
        self.engine.junction_tree()
    }

    pub fn engine(&self) -> &ShaferShenoy {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ShaferShenoy {
        &mut self.engine
    }

    pub fn insert_evidence(
        &mut self,
        var: NodeId,
        evidence: Potential,
    ) -> Result<(), InferenceError> {
        self.engine.insert_evidence(var, evidence)
    }

    pub fn insert_hard_evidence(
        &mut self,
        var: NodeId,
        value: usize,
    ) -> Result<(), InferenceError> {
        self.engine.insert_hard_evidence(var, value)
    }

    pub fn erase_evidence(&mut self, var: NodeId) -> Result<bool, InferenceError> {
        self.engine.erase_evidence(var)
    }

    pub fn erase_all_evidence(&mut self) -> Result<(), InferenceError> {
        self.engine.erase_all_evidence()
    }

    pub fn posterior(&mut self, var: NodeId) -> Result<Potential, InferenceError> {
        self.engine.posterior(var)
    }

    pub fn posteriors(&mut self, vars: &[NodeId]) -> Result<Vec<Potential>, InferenceError> {
        self.engine.posteriors(vars)
    }

    pub fn joint_posterior(&mut self, vars: &[NodeId]) -> Result<Potential, InferenceError> {
        self.engine.joint_posterior(vars)
    }

    pub fn evidence_probability(&mut self) -> Result<f64, InferenceError> {
        self.engine.evidence_probability()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::BayesNet;

    #[test]
    fn compiles_and_answers_a_two_node_network() {
        let mut bn = BayesNet::new();
        let rain = bn.add_variable("rain", 2).expect("rain");
        let wet = bn.add_variable("wet", 2).expect("wet");
        bn.add_arc(rain, wet).expect("arc");
        bn.set_cpt(rain, vec![0.8, 0.2]).expect("rain cpt");
        bn.set_cpt(wet, vec![0.9, 0.1, 0.2, 0.8]).expect("wet cpt");

        let mut inference = JunctionTreeInference::from_model(&bn, &TriangulationConfig::default())
            .expect("compile");
        assert_eq!(inference.junction_tree().len(), 1);
        inference.insert_hard_evidence(wet, 1).expect("evidence");
        let posterior = inference.posterior(rain).expect("posterior");
        // P(rain | wet) = 0.2 * 0.8 / (0.8 * 0.1 + 0.2 * 0.8)
        let expected = 0.16 / 0.24;
        assert!((posterior.values()[1] - expected).abs() < 1e-12);
        assert!((inference.evidence_probability().expect("p(e)") - 0.24).abs() < 1e-12);
    }

    #[test]
    fn missing_tables_fail_compilation() {
        let mut bn = BayesNet::new();
        bn.add_variable("a", 2).expect("a");
        assert!(matches!(
            JunctionTreeInference::from_model(&bn, &TriangulationConfig::default()),
            Err(InferenceError::InvalidPotential(_))
        ));
    }
}
