use jointree_core::{
    build_junction_tree, triangulate, BayesNet, CliqueId, GraphicalModel, NodeId, Triangulation,
    TriangulationConfig,
};

fn moral_triangulation(bn: &BayesNet) -> Triangulation {
    let moral = bn.moral_graph().unwrap();
    triangulate(&moral, &bn.domain_sizes(), &TriangulationConfig::default()).unwrap()
}

/// A -> B -> C, binary.
fn chain() -> BayesNet {
    let mut bn = BayesNet::new();
    let a = bn.add_variable("A", 2).unwrap();
    let b = bn.add_variable("B", 2).unwrap();
    let c = bn.add_variable("C", 2).unwrap();
    bn.add_arc(a, b).unwrap();
    bn.add_arc(b, c).unwrap();
    bn.set_cpt(a, vec![0.6, 0.4]).unwrap();
    bn.set_cpt(b, vec![0.7, 0.3, 0.2, 0.8]).unwrap();
    bn.set_cpt(c, vec![0.9, 0.1, 0.4, 0.6]).unwrap();
    bn
}

/// Eight binary variables; every node has the two previous nodes as parents.
fn ladder() -> BayesNet {
    let mut bn = BayesNet::new();
    for idx in 0..8 {
        let node = bn.add_variable(&format!("x{idx}"), 2).unwrap();
        for back in 1..=2 {
            if idx >= back {
                bn.add_arc(NodeId((idx - back) as u32), node).unwrap();
            }
        }
    }
    bn
}

#[test]
fn chain_yields_two_cliques_joined_by_b() {
    let bn = chain();
    let tri = moral_triangulation(&bn);
    let jt = build_junction_tree(&tri).unwrap();
    let scopes: Vec<Vec<NodeId>> = jt.cliques().iter().map(|c| c.scope.clone()).collect();
    assert_eq!(scopes.len(), 2);
    assert!(scopes.contains(&vec![NodeId(0), NodeId(1)]));
    assert!(scopes.contains(&vec![NodeId(1), NodeId(2)]));
    assert_eq!(jt.edges().len(), 1);
    assert_eq!(jt.edges()[0].scope, vec![NodeId(1)]);
    jt.check_running_intersection().unwrap();
}

#[test]
fn separators_are_scope_intersections() {
    let bn = ladder();
    let tri = moral_triangulation(&bn);
    let jt = build_junction_tree(&tri).unwrap();
    for edge in jt.edges() {
        let child = &jt.clique(edge.child).unwrap().scope;
        let parent = &jt.clique(edge.parent).unwrap().scope;
        let expected: Vec<NodeId> = child.iter().copied().filter(|n| parent.contains(n)).collect();
        assert_eq!(edge.scope, expected);
        assert!(!edge.scope.is_empty());
        assert_eq!(jt.separator(edge.parent, edge.child), Some(expected.as_slice()));
    }
    jt.check_running_intersection().unwrap();
}

#[test]
fn active_cliques_are_exactly_the_maximal_ones() {
    let bn = ladder();
    let tri = moral_triangulation(&bn);
    let jt = build_junction_tree(&tri).unwrap();
    let mut maximal: Vec<Vec<NodeId>> =
        tri.maximal_cliques().iter().map(|c| c.scope.clone()).collect();
    let mut active: Vec<Vec<NodeId>> = jt.cliques().iter().map(|c| c.scope.clone()).collect();
    maximal.sort();
    active.sort();
    assert_eq!(maximal, active);

    // every elimination clique maps onto an active clique that contains it
    for clique in tri.cliques() {
        let host = jt.absorbed_into(clique.id).unwrap();
        let scope = &jt.clique(host).unwrap().scope;
        assert!(clique.scope.iter().all(|n| scope.contains(n)));
    }
}

#[test]
fn every_factor_scope_is_covered() {
    let bn = ladder();
    let tri = moral_triangulation(&bn);
    let jt = build_junction_tree(&tri).unwrap();
    for node in bn.nodes() {
        let mut scope = bn.parents(node).to_vec();
        scope.push(node);
        let id = jt.covering_clique(&scope).unwrap();
        let held = &jt.clique(id).unwrap().scope;
        assert!(scope.iter().all(|n| held.contains(n)));
    }
}

#[test]
fn disconnected_models_become_a_forest() {
    let mut bn = chain();
    let d = bn.add_variable("D", 3).unwrap();
    let e = bn.add_variable("E", 2).unwrap();
    bn.add_arc(d, e).unwrap();
    let tri = moral_triangulation(&bn);
    let jt = build_junction_tree(&tri).unwrap();
    assert_eq!(jt.components().len(), 2);
    assert_eq!(jt.roots().count(), 2);
    for component in jt.components() {
        let root = component[0];
        assert_eq!(jt.parent(root), None);
    }
    let left = jt.component_of(jt.cliques_containing(NodeId(0))[0]);
    let right = jt.component_of(jt.cliques_containing(d)[0]);
    assert_ne!(left, right);
    assert!(jt.covering_clique(&[NodeId(0), d]).is_err());
    jt.check_running_intersection().unwrap();
}

#[test]
fn clique_ids_are_dense() {
    let bn = ladder();
    let tri = moral_triangulation(&bn);
    let jt = build_junction_tree(&tri).unwrap();
    for (idx, clique) in jt.cliques().iter().enumerate() {
        assert_eq!(clique.id, CliqueId(idx as u32));
    }
}
