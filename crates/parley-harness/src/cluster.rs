//! Turmoil cluster runners.
//!
//! Each node runs on its own turmoil host with the production node actors
//! and [`PeerTransport`](parley_node::PeerTransport); only the sockets,
//! the clock and the RNG are simulated. A client host watches for
//! completion, so a run ends as soon as the outcome is known. The result is
//! a [`SystemSnapshot`] for the invariant registry.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use parley_core::{Behavior, Commander, Lieutenant, RelayPolicy};
use parley_node::{EventLog, LieutenantNode, MutexNode, MutexWorkload, issue_order};
use parley_proto::{NodeId, Order};

use crate::{
    SimEnv,
    invariants::{AgreementSnapshot, SystemSnapshot},
    model::ModelCluster,
    sim_transport::{bind, host_name, serve_sim_listener, sim_transport},
};

const POLL: Duration = Duration::from_millis(10);

fn network(
    seed: u64,
    max_latency: Duration,
    duration: Duration,
) -> turmoil::Sim<'static> {
    turmoil::Builder::new()
        .simulation_duration(duration)
        .min_message_latency(Duration::from_millis(1))
        .max_message_latency(max_latency.max(Duration::from_millis(1)))
        .rng_seed(seed)
        .build()
}

/// Lamport mutual exclusion on a simulated network.
#[derive(Debug, Clone)]
pub struct MutexSimulation {
    /// Number of nodes
    pub size: u32,
    /// What every node does
    pub workload: MutexWorkload,
    /// Seed for the network and the environment
    pub seed: u64,
    /// Upper bound on one-way message latency
    pub max_latency: Duration,
}

impl MutexSimulation {
    /// `size` nodes, each completing `rounds` critical sections.
    pub fn new(size: u32, rounds: u32) -> Self {
        Self {
            size,
            workload: MutexWorkload::quick(rounds),
            seed: 0,
            max_latency: Duration::from_millis(10),
        }
    }

    /// Use `seed` for the network and every node's environment.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Allow one-way latency up to `max_latency`.
    #[must_use]
    pub fn with_latency(mut self, max_latency: Duration) -> Self {
        self.max_latency = max_latency;
        self
    }

    /// Run until every node finished its workload.
    pub fn run(&self) -> turmoil::Result<SystemSnapshot> {
        let mut sim = network(self.seed, self.max_latency, Duration::from_secs(600));
        let members: Vec<NodeId> = (0..self.size).collect();
        let log = EventLog::new();
        let env = SimEnv::with_seed(self.seed);
        let workload = self.workload;

        for &id in &members {
            let (members, log, env) = (members.clone(), log.clone(), env.clone());
            sim.host(host_name(id), move || {
                let (members, log, env) = (members.clone(), log.clone(), env.clone());
                async move {
                    let listener = bind().await?;
                    let node = Arc::new(MutexNode::new(
                        members.iter().copied(),
                        sim_transport(id, &members),
                        log,
                    ));
                    let server = tokio::spawn(serve_sim_listener(listener, Arc::clone(&node)));

                    workload.run(node.as_ref(), &env).await?;
                    server.await??;
                    Ok(())
                }
            });
        }

        let expected = members.len() * workload.rounds as usize * 2;
        let observed = log.clone();
        sim.client("observer", async move {
            while observed.len() < expected {
                tokio::time::sleep(POLL).await;
            }
            Ok(())
        });

        sim.run()?;
        tracing::debug!(seed = self.seed, events = log.len(), "mutex simulation finished");
        Ok(SystemSnapshot::from_events(log.events()))
    }
}

/// One OM(f) execution on a simulated network.
#[derive(Debug, Clone)]
pub struct AgreementSimulation {
    /// Cluster shape and faulty policies
    pub cluster: ModelCluster,
    /// Order given to the Commander
    pub order: Order,
    /// Seed for the network
    pub seed: u64,
    /// Upper bound on one-way message latency
    pub max_latency: Duration,
}

impl AgreementSimulation {
    /// Execution of `cluster` with the Commander ordering `order`.
    pub fn new(cluster: ModelCluster, order: Order) -> Self {
        Self { cluster, order, seed: 0, max_latency: Duration::from_millis(10) }
    }

    /// Use `seed` for the network.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Allow one-way latency up to `max_latency`.
    #[must_use]
    pub fn with_latency(mut self, max_latency: Duration) -> Self {
        self.max_latency = max_latency;
        self
    }

    /// Run until every Lieutenant decided.
    pub fn run(&self) -> turmoil::Result<SystemSnapshot> {
        let mut sim = network(self.seed, self.max_latency, Duration::from_secs(120));
        let cluster = &self.cluster;
        let members = cluster.members();
        let lieutenants = cluster.lieutenants();
        let decisions: Arc<Mutex<BTreeMap<NodeId, Order>>> = Arc::default();

        for &id in &lieutenants {
            let (members, decisions) = (members.clone(), Arc::clone(&decisions));
            let (commander, fault_bound, behavior) =
                (cluster.commander, cluster.fault_bound, cluster.behavior(id));

            sim.host(host_name(id), move || {
                let (members, decisions) = (members.clone(), Arc::clone(&decisions));
                async move {
                    let listener = bind().await?;
                    let lieutenant = Lieutenant::new(
                        id,
                        commander,
                        members.iter().copied(),
                        fault_bound,
                        behavior,
                    )?;
                    let node =
                        Arc::new(LieutenantNode::new(lieutenant, sim_transport(id, &members)));
                    let server = tokio::spawn(serve_sim_listener(listener, Arc::clone(&node)));

                    let value = node.decision().await;
                    decisions.lock().unwrap_or_else(PoisonError::into_inner).insert(id, value);

                    server.await??;
                    Ok(())
                }
            });
        }

        let commander = Commander::new(
            cluster.commander,
            members.iter().copied(),
            cluster.fault_bound,
            cluster.behavior(cluster.commander),
        );
        let transport = sim_transport(cluster.commander, &members);
        let (order, expected, observed) = (self.order, lieutenants.len(), Arc::clone(&decisions));
        sim.client(host_name(cluster.commander), async move {
            issue_order(&commander, &transport, order).await?;
            while observed.lock().unwrap_or_else(PoisonError::into_inner).len() < expected {
                tokio::time::sleep(POLL).await;
            }
            Ok(())
        });

        sim.run()?;

        let decisions = decisions.lock().unwrap_or_else(PoisonError::into_inner).clone();
        Ok(SystemSnapshot::from_agreement(AgreementSnapshot {
            commander: cluster.commander,
            order: self.order,
            faulty: faulty_ids(cluster),
            lieutenants: lieutenants.into_iter().collect(),
            decisions,
        }))
    }
}

/// Nodes whose policy is not loyal.
pub fn faulty_ids(cluster: &ModelCluster) -> BTreeSet<NodeId> {
    cluster
        .faulty
        .iter()
        .filter(|(_, behavior)| !behavior.is_loyal())
        .map(|(id, _)| *id)
        .collect()
}

/// Agreement cluster with the highest `traitors` ids split-brained.
pub fn split_brain_cluster(size: u32, traitors: u32) -> ModelCluster {
    parley_node::simulate::traitor_ids(size, traitors)
        .into_iter()
        .fold(ModelCluster::loyal(size, traitors), |cluster, id| {
            cluster.with_faulty(id, Behavior::SplitBrain)
        })
}
