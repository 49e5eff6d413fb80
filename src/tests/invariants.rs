//! Graph/simulator invariants that must hold for any valid input (§8
//! "Invariants", "Round-trip / idempotence").

use crate::graph::build_graph;
use crate::model::{Initiator, NetworkRequestBuilder, Priority, ResourceType};
use crate::simulator::{SimulatorConfig, Simulator};

fn waterfall_graph() -> crate::graph::Graph {
    let root = NetworkRequestBuilder::new("root", "https://a.com/")
        .resource_type(ResourceType::Document)
        .priority(Priority::VeryHigh)
        .start_time(0.0)
        .end_time(0.1)
        .build();
    let child = NetworkRequestBuilder::new("child", "https://a.com/x.js")
        .resource_type(ResourceType::Script)
        .priority(Priority::High)
        .start_time(0.1)
        .end_time(0.2)
        .initiator(Initiator::Parser { url: "https://a.com/".to_string() })
        .build();
    build_graph(&[root, child], &[]).unwrap()
}

#[test]
fn building_the_same_graph_twice_is_isomorphic() {
    let a = waterfall_graph();
    let b = waterfall_graph();
    assert_eq!(a.len(), b.len());
    for (idx, node) in a.iter() {
        let other_idx = b.index_of(&node.id).expect("same id exists in both builds");
        let other = b.node(other_idx);
        let deps: std::collections::HashSet<&str> = node.dependencies.iter().map(|&d| a.node(d).id.as_str()).collect();
        let other_deps: std::collections::HashSet<&str> = other.dependencies.iter().map(|&d| b.node(d).id.as_str()).collect();
        assert_eq!(deps, other_deps, "dependency sets differ for node {}", node.id);
    }
}

#[test]
fn clone_with_relationships_true_preserves_every_edge() {
    let graph = waterfall_graph();
    let clone = graph.clone_with_relationships(|_| true).unwrap();
    assert_eq!(clone.len(), graph.len());
    let root = clone.root();
    let child_idx = clone.index_of("child").unwrap();
    assert!(clone.node(child_idx).dependencies.contains(&root));
}

#[test]
fn dependency_edges_respect_start_after_end() {
    let graph = waterfall_graph();
    let config = SimulatorConfig::new(0.0, f64::INFINITY, 1.0);
    let sim = Simulator::new(&graph, config);
    let result = sim.simulate(false).unwrap();

    for (idx, node) in graph.iter() {
        let timing = result.node_timings[&idx];
        assert!((timing.duration_ms - (timing.end_time_ms - timing.start_time_ms)).abs() < 1e-9);
        assert!(timing.duration_ms >= 0.0);
        for &dep in &node.dependencies {
            let dep_timing = result.node_timings[&dep];
            assert!(
                timing.start_time_ms >= dep_timing.end_time_ms - 1e-6,
                "{} started before its dependency finished",
                node.id
            );
        }
    }
}

#[test]
fn simulate_is_deterministic_across_runs() {
    let graph = waterfall_graph();
    let config = SimulatorConfig::new(150.0, 1_000_000.0, 4.0);
    let sim = Simulator::new(&graph, config);
    let first = sim.simulate(false).unwrap();
    let second = sim.simulate(false).unwrap();
    assert_eq!(first.time_in_ms, second.time_in_ms);
    for (idx, timing) in &first.node_timings {
        assert_eq!(*timing, second.node_timings[idx]);
    }
}

/// A tight concurrency cap must make parallel siblings take noticeably
/// longer than an effectively unbounded one, since only one can be
/// in-flight at a time (§8 "`max_concurrent_requests` is never exceeded").
#[test]
fn tight_concurrency_cap_serializes_parallel_siblings() {
    fn graph_with_parallel_children() -> crate::graph::Graph {
        let root = NetworkRequestBuilder::new("root", "https://a.com/")
            .resource_type(ResourceType::Document)
            .priority(Priority::VeryHigh)
            .start_time(0.0)
            .end_time(0.001)
            .build();
        let mut records = vec![root];
        for i in 0..5 {
            records.push(
                NetworkRequestBuilder::new(i.to_string(), format!("https://a.com/{i}.js"))
                    .resource_type(ResourceType::Script)
                    .priority(Priority::Medium)
                    .transfer_size(5_000)
                    .start_time(0.0)
                    .end_time(0.05)
                    .initiator(Initiator::Parser { url: "https://a.com/".to_string() })
                    .build(),
            );
        }
        build_graph(&records, &[]).unwrap()
    }

    let graph = graph_with_parallel_children();
    let mut capped = SimulatorConfig::new(20.0, 10_000_000.0, 1.0);
    capped.max_concurrent_requests = 1;
    let capped_result = Simulator::new(&graph, capped).simulate(false).unwrap();

    let mut generous = SimulatorConfig::new(20.0, 10_000_000.0, 1.0);
    generous.max_concurrent_requests = 10;
    let generous_result = Simulator::new(&graph, generous).simulate(false).unwrap();

    assert!(
        capped_result.time_in_ms > generous_result.time_in_ms,
        "capped {} should exceed generous {}",
        capped_result.time_in_ms,
        generous_result.time_in_ms
    );
}
