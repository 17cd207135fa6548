use jointree_core::{
    BayesNet, CliqueId, EngineState, GraphicalModel, InferenceError, JunctionTreeInference,
    NodeId, Potential, TriangulationConfig,
};

fn assert_close(actual: f64, expected: f64, tol: f64, label: &str) {
    assert!(
        (actual - expected).abs() <= tol,
        "{}: expected {}, got {}",
        label,
        expected,
        actual
    );
}

/// Star: a root with four binary children.
fn star() -> BayesNet {
    let mut bn = BayesNet::new();
    let root = bn.add_variable("root", 2).unwrap();
    bn.set_cpt(root, vec![0.35, 0.65]).unwrap();
    for idx in 0..4 {
        let leaf = bn.add_variable(&format!("leaf{idx}"), 2).unwrap();
        bn.add_arc(root, leaf).unwrap();
        let p = 0.1 + 0.2 * idx as f64;
        bn.set_cpt(leaf, vec![p, 1.0 - p, 1.0 - p, p]).unwrap();
    }
    bn
}

/// Brute-force posterior of `var` given hard evidence.
fn brute_force(bn: &BayesNet, var: NodeId, evidence: &[(NodeId, usize)]) -> Potential {
    let mut joint = Potential::scalar(1.0);
    for factor in bn.factors().unwrap() {
        joint = joint.combine(&factor).unwrap();
    }
    for &(node, value) in evidence {
        let size = bn.domain_size(node).unwrap();
        joint = joint.combine(&Potential::indicator(node, size, value).unwrap()).unwrap();
    }
    joint.marginalize_onto(&[var]).normalized().unwrap()
}

fn compile(bn: &BayesNet) -> JunctionTreeInference {
    JunctionTreeInference::from_model(bn, &TriangulationConfig::default()).unwrap()
}

#[test]
fn engine_walks_through_its_states() {
    let bn = star();
    let mut inference = compile(&bn);
    let engine = inference.engine_mut();
    assert_eq!(engine.state(), EngineState::Initialized);
    let root = CliqueId(0);
    engine.collect(root).unwrap();
    assert_eq!(engine.state(), EngineState::Collected(root));
    engine.diffuse(root).unwrap();
    assert_eq!(engine.state(), EngineState::Diffused(root));
    engine.insert_hard_evidence(NodeId(2), 0).unwrap();
    assert_eq!(engine.state(), EngineState::Initialized);
}

#[test]
fn evidence_at_a_leaf_keeps_messages_towards_it() {
    let bn = star();
    let mut inference = compile(&bn);
    let engine = inference.engine_mut();
    engine.diffuse(CliqueId(0)).unwrap();
    let edges = engine.junction_tree().edges().len();
    assert_eq!(engine.stale_message_count(), 0);

    let leaf = NodeId(3);
    let holder = engine.junction_tree().smallest_clique_containing(leaf).unwrap();
    engine.insert_hard_evidence(leaf, 1).unwrap();
    assert_eq!(engine.stale_message_count(), edges);
    for &next in engine.junction_tree().neighbours(holder) {
        assert!(engine.message(next, holder).is_some());
        assert!(engine.message(holder, next).is_none());
    }

    // answering a query at the holder itself needs no recomputation
    let before = engine.recomputation_count();
    engine.posterior(leaf).unwrap();
    assert_eq!(engine.recomputation_count(), before);
}

#[test]
fn soft_evidence_matches_likelihood_weighting() {
    let bn = star();
    let mut inference = compile(&bn);
    let likelihood = vec![0.3, 0.9];
    inference
        .insert_evidence(NodeId(1), Potential::likelihood(NodeId(1), likelihood.clone()).unwrap())
        .unwrap();

    let mut joint = Potential::scalar(1.0);
    for factor in bn.factors().unwrap() {
        joint = joint.combine(&factor).unwrap();
    }
    joint = joint.combine(&Potential::likelihood(NodeId(1), likelihood).unwrap()).unwrap();
    let expected = joint.marginalize_onto(&[NodeId(0)]).normalized().unwrap();
    let actual = inference.posterior(NodeId(0)).unwrap();
    assert_close(actual.max_abs_diff(&expected).unwrap(), 0.0, 1e-12, "soft evidence");
    assert_close(inference.evidence_probability().unwrap(), joint.sum(), 1e-12, "likelihood");
}

#[test]
fn multiple_observations_match_brute_force() {
    let bn = star();
    let mut inference = compile(&bn);
    let evidence = [(NodeId(1), 0), (NodeId(4), 1)];
    for &(node, value) in &evidence {
        inference.insert_hard_evidence(node, value).unwrap();
    }
    for node in bn.nodes() {
        let expected = brute_force(&bn, node, &evidence);
        let actual = inference.posterior(node).unwrap();
        assert_close(actual.max_abs_diff(&expected).unwrap(), 0.0, 1e-9, "posterior");
    }
    inference.erase_all_evidence().unwrap();
    assert!(!inference.engine().has_evidence(NodeId(1)));
}

#[test]
fn components_are_independent() {
    let mut bn = star();
    let x = bn.add_variable("x", 3).unwrap();
    let y = bn.add_variable("y", 2).unwrap();
    bn.add_arc(x, y).unwrap();
    bn.set_cpt(x, vec![0.2, 0.5, 0.3]).unwrap();
    bn.set_cpt(y, vec![0.9, 0.1, 0.5, 0.5, 0.25, 0.75]).unwrap();

    let mut inference = compile(&bn);
    assert_eq!(inference.junction_tree().components().len(), 2);
    let prior_root = inference.posterior(NodeId(0)).unwrap();

    inference.insert_hard_evidence(y, 1).unwrap();
    let after = inference.posterior(NodeId(0)).unwrap();
    assert_close(after.max_abs_diff(&prior_root).unwrap(), 0.0, 1e-12, "other component");

    inference.insert_hard_evidence(NodeId(2), 0).unwrap();
    let p_y = 0.2 * 0.1 + 0.5 * 0.5 + 0.3 * 0.75;
    let p_leaf = 0.35 * 0.3 + 0.65 * 0.7;
    assert_close(inference.evidence_probability().unwrap(), p_y * p_leaf, 1e-12, "P(e)");

    let expected = brute_force(&bn, x, &[(y, 1), (NodeId(2), 0)]);
    let actual = inference.posterior(x).unwrap();
    assert_close(actual.max_abs_diff(&expected).unwrap(), 0.0, 1e-12, "posterior of x");
}

#[test]
fn impossible_evidence_is_a_numerical_error() {
    let mut bn = BayesNet::new();
    let a = bn.add_variable("a", 2).unwrap();
    let b = bn.add_variable("b", 2).unwrap();
    bn.add_arc(a, b).unwrap();
    bn.set_cpt(a, vec![0.5, 0.5]).unwrap();
    // b copies a
    bn.set_cpt(b, vec![1.0, 0.0, 0.0, 1.0]).unwrap();
    let mut inference = compile(&bn);
    inference.insert_hard_evidence(a, 0).unwrap();
    inference.insert_hard_evidence(b, 1).unwrap();
    assert_eq!(inference.evidence_probability().unwrap(), 0.0);
    assert!(matches!(inference.posterior(a), Err(InferenceError::Numerical(_))));
}

#[test]
fn joint_posterior_requires_a_covering_clique() {
    let bn = star();
    let mut inference = compile(&bn);
    let joint = inference.joint_posterior(&[NodeId(0), NodeId(1)]).unwrap();
    assert_eq!(joint.scope(), &[NodeId(0), NodeId(1)]);
    assert_close(joint.sum(), 1.0, 1e-12, "normalized");
    assert!(matches!(
        inference.joint_posterior(&[NodeId(1), NodeId(2)]),
        Err(InferenceError::NoCoveringClique { .. })
    ));
    assert_eq!(
        inference.joint_posterior(&[NodeId(1), NodeId(99)]),
        Err(InferenceError::VariableNotFound(NodeId(99)))
    );
}
