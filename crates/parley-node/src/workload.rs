//! Mutual exclusion workload: think, request, hold, release.

use std::time::Duration;

use parley_core::Environment;
use serde::{Deserialize, Serialize};

use crate::{error::NodeError, mutex_node::MutexNode, transport::Transport};

/// Inclusive range of random pause lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pause {
    /// Shortest pause
    pub min: Duration,
    /// Longest pause
    pub max: Duration,
}

impl Pause {
    /// Pause between `min_ms` and `max_ms` milliseconds.
    #[must_use]
    pub const fn millis(min_ms: u64, max_ms: u64) -> Self {
        Self { min: Duration::from_millis(min_ms), max: Duration::from_millis(max_ms) }
    }

    /// Draw one pause length from `env`.
    pub fn sample<E: Environment>(&self, env: &E) -> Duration {
        env.random_duration(self.min, self.max)
    }
}

/// Repeated critical section use by one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutexWorkload {
    /// Critical sections to complete
    pub rounds: u32,
    /// Wait before each request
    pub think: Pause,
    /// Time spent inside
    pub hold: Pause,
}

impl Default for MutexWorkload {
    fn default() -> Self {
        Self { rounds: 1, think: Pause::millis(1_000, 5_000), hold: Pause::millis(3_000, 5_000) }
    }
}

impl MutexWorkload {
    /// Short pauses for in-process and simulated clusters.
    #[must_use]
    pub fn quick(rounds: u32) -> Self {
        Self { rounds, think: Pause::millis(0, 50), hold: Pause::millis(1, 20) }
    }

    /// Run every round on `node`. Returns the number completed.
    ///
    /// # Errors
    ///
    /// - Any error from [`MutexNode::acquire`] or [`MutexNode::release`]
    pub async fn run<T, E>(&self, node: &MutexNode<T>, env: &E) -> Result<u32, NodeError>
    where
        T: Transport,
        E: Environment,
    {
        for round in 1..=self.rounds {
            env.sleep(self.think.sample(env)).await;

            let timestamp = node.acquire().await?;
            tracing::debug!(node = node.id(), round, timestamp, "working in critical section");
            env.sleep(self.hold.sample(env)).await;

            node.release().await?;
        }
        tracing::info!(node = node.id(), rounds = self.rounds, "workload finished");
        Ok(self.rounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SystemEnv, mutex_node::EventLog, transport::LocalNetwork};

    #[test]
    fn pause_stays_in_range() {
        let env = SystemEnv::new();
        let pause = Pause::millis(5, 9);
        for _ in 0..100 {
            let d = pause.sample(&env);
            assert!(d >= pause.min && d <= pause.max);
        }
    }

    #[tokio::test]
    async fn lone_node_completes_all_rounds() {
        let mut parts = LocalNetwork::new([4]).into_parts();
        let (transport, _inbox) = parts.remove(&4).expect("node 4");
        let node = MutexNode::new([4], transport, EventLog::new());

        let done = MutexWorkload::quick(3).run(&node, &SystemEnv::new()).await.expect("run");
        assert_eq!(done, 3);
        assert_eq!(node.log().len(), 6);
    }
}
