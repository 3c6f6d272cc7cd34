//! Clusters of nodes talking over real TCP sockets on localhost.

use parley_core::Behavior;
use parley_node::{
    ClusterConfig, CsEventKind, EventLog, MutexWorkload, NodeConfig, SystemEnv, launch,
};
use parley_proto::{NodeId, Order};
use tokio::{net::TcpListener, task::JoinSet};

/// Bind one listener per node on an ephemeral port and describe the cluster.
async fn cluster(size: u32) -> (ClusterConfig, Vec<TcpListener>) {
    let mut nodes = Vec::new();
    let mut listeners = Vec::new();
    for id in 0..size {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        nodes.push(NodeConfig { id, addr, behavior: Behavior::Loyal });
        listeners.push(listener);
    }
    (ClusterConfig { nodes, commander: 0, fault_bound: 0 }, listeners)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mutex_over_tcp_is_exclusive() {
    let (config, listeners) = cluster(3).await;
    let log = EventLog::new();

    let mut drivers = JoinSet::new();
    for (id, listener) in (0..).zip(listeners) {
        let running = launch::start_mutex_node_on(listener, &config, id, log.clone())
            .expect("start node");
        drivers.spawn(async move {
            let done = MutexWorkload::quick(2)
                .run(running.node.as_ref(), &SystemEnv::new())
                .await
                .expect("workload");
            (running, done)
        });
    }

    let mut running = Vec::new();
    while let Some(joined) = drivers.join_next().await {
        let (node, done) = joined.expect("driver task");
        assert_eq!(done, 2);
        running.push(node);
    }

    assert_eq!(log.first_overlap(), None);
    let entries: Vec<(u64, NodeId)> = log
        .events()
        .iter()
        .filter(|e| e.kind == CsEventKind::Enter)
        .map(|e| (e.timestamp, e.node))
        .collect();
    assert_eq!(entries.len(), 6);
    assert!(entries.windows(2).all(|w| w[0] < w[1]), "grants out of order: {entries:?}");

    for node in &running {
        node.shutdown();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn agreement_over_tcp_survives_split_brain_lieutenant() {
    let (mut config, mut listeners) = cluster(4).await;
    config.fault_bound = 1;
    // Node 3 relays ATTACK to Lieutenant 1 and RETREAT to Lieutenant 2.
    config.nodes[3].behavior = Behavior::SplitBrain;

    // The Commander only sends.
    drop(listeners.remove(0));

    let mut lieutenants = Vec::new();
    for (id, listener) in (1..).zip(listeners) {
        lieutenants.push(launch::start_lieutenant_on(listener, &config, id).expect("start"));
    }

    launch::run_commander(&config, Order::Attack).await.expect("issue order");

    for running in &lieutenants {
        let value = running.node.decision().await;
        if running.node.id() != 3 {
            assert_eq!(value, Order::Attack, "loyal lieutenant {} diverged", running.node.id());
        }
        running.shutdown();
    }
}
