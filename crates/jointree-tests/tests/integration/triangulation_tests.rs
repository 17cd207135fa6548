use jointree_core::{
    triangulate, DomainSizes, EliminationStrategyKind, FillEdge, Heuristic, InferenceError,
    NodeId, TriangulationConfig, UndiGraph,
};

fn graph(edges: &[(u32, u32)]) -> UndiGraph {
    let mut g = UndiGraph::new();
    for &(a, b) in edges {
        g.add_edge(NodeId(a), NodeId(b)).unwrap();
    }
    g
}

fn sizes(pairs: &[(u32, usize)]) -> DomainSizes {
    pairs.iter().map(|&(n, s)| (NodeId(n), s)).collect()
}

/// Undirected diamond A - B, A - C, B - D, C - D with A = 0, B = 1, C = 2, D = 3.
fn diamond() -> UndiGraph {
    graph(&[(0, 1), (0, 2), (1, 3), (2, 3)])
}

#[test]
fn diamond_fill_edge_follows_minimum_weight() {
    // weights: A = 2*2*2 = 8, B = C = D = 16, so A goes first and marries B, C
    let domains = sizes(&[(0, 2), (1, 2), (2, 2), (3, 4)]);
    for strategy in [EliminationStrategyKind::Default, EliminationStrategyKind::MinWeight] {
        let config = TriangulationConfig::with_strategy(strategy);
        let tri = triangulate(&diamond(), &domains, &config).unwrap();
        assert_eq!(tri.elimination_order()[0], NodeId(0));
        assert_eq!(
            tri.fill_ins(),
            &[FillEdge {
                a: NodeId(1),
                b: NodeId(2),
                cause: NodeId(0)
            }]
        );
    }
}

#[test]
fn diamond_fill_edge_moves_with_domain_sizes() {
    // weights: A = D = 2*3*3 = 18, B = C = 3*2*2 = 12, so B goes first and marries A, D
    let domains = sizes(&[(0, 2), (1, 3), (2, 3), (3, 2)]);
    let tri = triangulate(&diamond(), &domains, &TriangulationConfig::default()).unwrap();
    assert_eq!(tri.elimination_order()[0], NodeId(1));
    assert_eq!(
        tri.fill_ins(),
        &[FillEdge {
            a: NodeId(0),
            b: NodeId(3),
            cause: NodeId(1)
        }]
    );
    assert!(tri.triangulated_graph().has_edge(NodeId(0), NodeId(3)));
}

#[test]
fn triangulated_graph_is_original_plus_fill_ins() {
    let g = graph(&[(0, 1), (1, 2), (2, 3), (3, 4), (4, 0), (1, 5), (5, 3)]);
    let domains: DomainSizes = g.nodes().map(|n| (n, 2)).collect();
    let tri = triangulate(&g, &domains, &TriangulationConfig::default()).unwrap();
    let triangulated = tri.triangulated_graph();
    assert!(triangulated.is_chordal());
    assert!(triangulated.is_perfect_elimination_order(tri.elimination_order()));
    assert_eq!(triangulated.edge_count(), g.edge_count() + tri.fill_ins().len());
    for fill in tri.fill_ins() {
        assert!(!g.has_edge(fill.a, fill.b));
        assert!(triangulated.has_edge(fill.a, fill.b));
        let cause = tri.elimination_index(fill.cause).unwrap();
        assert!(cause < tri.elimination_index(fill.a).unwrap());
        assert!(cause < tri.elimination_index(fill.b).unwrap());
    }
    assert_eq!(tri.original_graph(), &g);
}

#[test]
fn min_fill_avoids_the_hub_of_a_wheel() {
    // hub 4 adjacent to the rim cycle 0-1-2-3
    let g = graph(&[(0, 1), (1, 2), (2, 3), (3, 0), (4, 0), (4, 1), (4, 2), (4, 3)]);
    let domains: DomainSizes = g.nodes().map(|n| (n, 2)).collect();
    let min_fill = TriangulationConfig::with_strategy(Heuristic::MinFill.into());
    let tri = triangulate(&g, &domains, &min_fill).unwrap();
    assert_eq!(tri.fill_ins().len(), 1);

    let hub_first = TriangulationConfig::with_strategy(EliminationStrategyKind::Ordered(
        [4, 0, 1, 2, 3].into_iter().map(NodeId).collect(),
    ));
    assert_eq!(triangulate(&g, &domains, &hub_first).unwrap().fill_ins().len(), 2);
}

#[test]
fn minimality_keeps_the_graph_chordal_and_never_adds_fill() {
    let g = graph(&[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 0), (0, 3)]);
    let domains: DomainSizes = g.nodes().map(|n| (n, 2)).collect();
    let order: Vec<NodeId> = [1, 4, 0, 2, 3, 5].into_iter().map(NodeId).collect();
    let plain = triangulate(
        &g,
        &domains,
        &TriangulationConfig::with_strategy(EliminationStrategyKind::Ordered(order.clone())),
    )
    .unwrap();
    let minimal = triangulate(
        &g,
        &domains,
        &TriangulationConfig::with_strategy(EliminationStrategyKind::Ordered(order.clone()))
            .minimal(true),
    )
    .unwrap();
    assert_eq!(minimal.elimination_order(), order.as_slice());
    assert!(minimal.fill_ins().len() <= plain.fill_ins().len());
    assert!(minimal.triangulated_graph().is_chordal());
    for fill in minimal.fill_ins() {
        assert!(plain.fill_ins().iter().any(|p| p.a == fill.a && p.b == fill.b));
    }
}

#[test]
fn partial_order_eliminates_blocks_in_sequence() {
    let g = graph(&[(0, 1), (1, 2), (2, 3), (3, 0), (1, 3)]);
    let domains: DomainSizes = g.nodes().map(|n| (n, 2)).collect();
    let config = TriangulationConfig::with_strategy(EliminationStrategyKind::PartialOrdered {
        blocks: vec![vec![NodeId(1), NodeId(3)], vec![NodeId(0), NodeId(2)]],
        within: Heuristic::Default,
    });
    let tri = triangulate(&g, &domains, &config).unwrap();
    let order = tri.elimination_order();
    let block_one: Vec<NodeId> = order[..2].to_vec();
    assert!(block_one.contains(&NodeId(1)) && block_one.contains(&NodeId(3)));
    assert!(tri.triangulated_graph().is_chordal());
}

#[test]
fn minimality_keeps_partial_order_blocks_in_sequence() {
    // hub 0 adjacent to the rim cycle 1-2-3-4
    let g = graph(&[(0, 1), (0, 2), (0, 3), (0, 4), (1, 2), (2, 3), (3, 4), (4, 1)]);
    let domains: DomainSizes = g.nodes().map(|n| (n, 2)).collect();
    let rim: Vec<NodeId> = [1, 2, 3, 4].into_iter().map(NodeId).collect();
    let config = TriangulationConfig::with_strategy(EliminationStrategyKind::PartialOrdered {
        blocks: vec![vec![NodeId(0)], rim.clone()],
        within: Heuristic::Default,
    })
    .minimal(true);
    let tri = triangulate(&g, &domains, &config).unwrap();
    let order = tri.elimination_order();
    assert_eq!(order[0], NodeId(0));
    assert!(order[1..].iter().all(|node| rim.contains(node)));
    // the hub's neighbourhood must stay a clique, so both rim chords survive
    assert_eq!(tri.fill_ins().len(), 2);
    assert!(tri.triangulated_graph().is_chordal());
    assert!(tri.triangulated_graph().is_perfect_elimination_order(order));

    let fixed: Vec<NodeId> = [0, 1, 2, 3, 4].into_iter().map(NodeId).collect();
    let ordered =
        TriangulationConfig::with_strategy(EliminationStrategyKind::Ordered(fixed.clone()))
            .minimal(true);
    let tri = triangulate(&g, &domains, &ordered).unwrap();
    assert_eq!(tri.elimination_order(), fixed.as_slice());
}

#[test]
fn zero_domain_size_is_rejected() {
    let g = graph(&[(0, 1)]);
    let domains: DomainSizes = [(NodeId(0), 0), (NodeId(1), 2)].into_iter().collect();
    assert_eq!(domains.get(NodeId(0)), Some(0));
    assert!(matches!(
        triangulate(&g, &domains, &TriangulationConfig::default()),
        Err(InferenceError::GraphConsistency(_))
    ));
}

#[test]
fn rejects_inconsistent_inputs() {
    let g = diamond();
    let partial = sizes(&[(0, 2), (1, 2), (2, 2)]);
    assert!(matches!(
        triangulate(&g, &partial, &TriangulationConfig::default()),
        Err(InferenceError::GraphConsistency(_))
    ));

    let domains: DomainSizes = g.nodes().map(|n| (n, 2)).collect();
    let omitted = TriangulationConfig::with_strategy(EliminationStrategyKind::Ordered(vec![
        NodeId(0),
        NodeId(1),
    ]));
    assert!(matches!(
        triangulate(&g, &domains, &omitted),
        Err(InferenceError::GraphConsistency(_))
    ));

    let mut bad = TriangulationConfig::default();
    bad.quasi_simplicial_ratio = -0.5;
    assert!(matches!(
        triangulate(&g, &domains, &bad),
        Err(InferenceError::InvalidConfig(_))
    ));
}

#[test]
fn empty_graph_triangulates_to_nothing() {
    let tri =
        triangulate(&UndiGraph::new(), &DomainSizes::new(), &TriangulationConfig::default())
            .unwrap();
    assert!(tri.elimination_order().is_empty());
    assert!(tri.elimination_tree().is_empty());
    assert_eq!(tri.max_log10_clique_domain_size(), 0.0);
}
