//! Lamport mutual exclusion on a simulated network.
//!
//! Every run is checked against the full invariant registry.

use std::time::Duration;

use parley_harness::{InvariantRegistry, MutexSimulation};

fn run_and_check(simulation: &MutexSimulation, context: &str) {
    let snapshot = simulation.run().expect("simulation completes");

    let expected = simulation.size as usize * simulation.workload.rounds as usize * 2;
    assert_eq!(snapshot.cs_events.len(), expected, "{context}: every round finished");

    InvariantRegistry::mutex().assert_holds(&snapshot, context);
}

#[test]
fn single_node_enters_alone() {
    run_and_check(&MutexSimulation::new(1, 3), "single node");
}

#[test]
fn three_nodes_two_rounds() {
    run_and_check(&MutexSimulation::new(3, 2), "3 nodes x 2 rounds");
}

#[test]
fn five_nodes_across_seeds() {
    for seed in 0..8 {
        let simulation = MutexSimulation::new(5, 1).with_seed(seed);
        run_and_check(&simulation, &format!("5 nodes, seed {seed}"));
    }
}

#[test]
fn slow_network_keeps_exclusion() {
    for seed in [3, 17, 42] {
        let simulation = MutexSimulation::new(4, 2)
            .with_seed(seed)
            .with_latency(Duration::from_millis(200));
        run_and_check(&simulation, &format!("4 nodes, 200ms latency, seed {seed}"));
    }
}

#[test]
fn every_node_enters_each_round() {
    let snapshot = MutexSimulation::new(4, 3).with_seed(9).run().expect("simulation completes");

    for (node, clocks) in snapshot.clock_history() {
        assert_eq!(clocks.len(), 6, "node {node} entered and exited three times");
    }
}
