//! Cluster configuration.
//!
//! A cluster is described by one JSON file shared by every node:
//!
//! ```json
//! {
//!   "nodes": [
//!     { "id": 0, "addr": "127.0.0.1:9000" },
//!     { "id": 1, "addr": "127.0.0.1:9001" },
//!     { "id": 2, "addr": "127.0.0.1:9002", "behavior": "split-brain" },
//!     { "id": 3, "addr": "127.0.0.1:9003" }
//!   ],
//!   "commander": 0,
//!   "fault_bound": 1
//! }
//! ```
//!
//! `commander` and `fault_bound` only matter for agreement; `behavior`
//! defaults to `loyal`.

use std::{collections::BTreeMap, path::Path};

use parley_core::{AgreementError, Behavior, agreement::check_fault_bound};
use parley_proto::NodeId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating a cluster file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// File that failed
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// File is not valid cluster JSON
    #[error("invalid cluster file: {0}")]
    Parse(#[from] serde_json::Error),

    /// Cluster has no nodes
    #[error("cluster has no nodes")]
    Empty,

    /// Two nodes share an id
    #[error("duplicate node id {0}")]
    DuplicateId(NodeId),

    /// Referenced node is not in the cluster
    #[error("node {0} is not in the cluster")]
    UnknownNode(NodeId),

    /// Cluster cannot run agreement with this fault bound
    #[error(transparent)]
    FaultBound(#[from] AgreementError),

    /// Node would be assigned a port above 65535
    #[error("node {id} has no port: {base_port} + {id} exceeds {}", u16::MAX)]
    PortOverflow {
        /// First port of the range
        base_port: u16,
        /// Node that ran out of ports
        id: NodeId,
    },
}

/// One cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique node id
    pub id: NodeId,
    /// Address the node listens on
    pub addr: String,
    /// Relay policy when taking part in agreement
    #[serde(default)]
    pub behavior: Behavior,
}

/// Whole-cluster configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Every member, including the reading node
    pub nodes: Vec<NodeConfig>,
    /// Agreement Commander
    #[serde(default)]
    pub commander: NodeId,
    /// Number of faulty nodes agreement must tolerate
    #[serde(default)]
    pub fault_bound: u32,
}

impl ClusterConfig {
    /// Load and validate a cluster file.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Io` if the file cannot be read
    /// - Any error from [`Self::from_json`]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        Self::from_json(&text)
    }

    /// Parse and validate cluster JSON.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Parse` for malformed JSON
    /// - Any error from [`Self::validate`]
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Cluster of `size` nodes on consecutive localhost ports.
    ///
    /// # Errors
    ///
    /// - `ConfigError::PortOverflow` if `base_port + size - 1` exceeds 65535
    pub fn localhost(size: u32, base_port: u16) -> Result<Self, ConfigError> {
        let nodes = (0..size)
            .map(|id| {
                let port = u16::try_from(id)
                    .ok()
                    .and_then(|offset| base_port.checked_add(offset))
                    .ok_or(ConfigError::PortOverflow { base_port, id })?;
                Ok(NodeConfig {
                    id,
                    addr: format!("127.0.0.1:{port}"),
                    behavior: Behavior::Loyal,
                })
            })
            .collect::<Result<_, ConfigError>>()?;
        Ok(Self { nodes, commander: 0, fault_bound: 0 })
    }

    /// Check membership rules shared by both protocols.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Empty` with no nodes
    /// - `ConfigError::DuplicateId` if ids repeat
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes.is_empty() {
            return Err(ConfigError::Empty);
        }
        let mut seen = std::collections::BTreeSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id) {
                return Err(ConfigError::DuplicateId(node.id));
            }
        }
        Ok(())
    }

    /// Check the additional rules for agreement.
    ///
    /// # Errors
    ///
    /// - `ConfigError::UnknownNode` if the Commander is not a member
    /// - `ConfigError::FaultBound` unless `nodes >= 3f + 1`
    pub fn validate_agreement(&self) -> Result<(), ConfigError> {
        self.node(self.commander)?;
        check_fault_bound(self.nodes.len(), self.fault_bound)?;
        Ok(())
    }

    /// Member with `id`.
    ///
    /// # Errors
    ///
    /// - `ConfigError::UnknownNode` if there is none
    pub fn node(&self, id: NodeId) -> Result<&NodeConfig, ConfigError> {
        self.nodes.iter().find(|n| n.id == id).ok_or(ConfigError::UnknownNode(id))
    }

    /// All member ids in ascending order.
    #[must_use]
    pub fn member_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.iter().map(|n| n.id).collect();
        ids.sort_unstable();
        ids
    }

    /// Addresses of every member except `id`.
    #[must_use]
    pub fn peer_addrs(&self, id: NodeId) -> BTreeMap<NodeId, String> {
        self.nodes.iter().filter(|n| n.id != id).map(|n| (n.id, n.addr.clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use parley_proto::Order;

    use super::*;

    const FOUR_NODES: &str = r#"{
        "nodes": [
            { "id": 0, "addr": "127.0.0.1:9000" },
            { "id": 1, "addr": "127.0.0.1:9001" },
            { "id": 2, "addr": "127.0.0.1:9002", "behavior": "split-brain" },
            { "id": 3, "addr": "127.0.0.1:9003", "behavior": { "fixed": "ATTACK" } }
        ],
        "commander": 0,
        "fault_bound": 1
    }"#;

    #[test]
    fn parses_behaviors_and_defaults() {
        let config = ClusterConfig::from_json(FOUR_NODES).expect("valid config");

        assert_eq!(config.node(0).expect("member").behavior, Behavior::Loyal);
        assert_eq!(config.node(2).expect("member").behavior, Behavior::SplitBrain);
        assert_eq!(config.node(3).expect("member").behavior, Behavior::Fixed(Order::Attack));
        assert!(config.validate_agreement().is_ok());
        assert_eq!(config.peer_addrs(1).keys().copied().collect::<Vec<_>>(), vec![0, 2, 3]);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let text = r#"{ "nodes": [
            { "id": 1, "addr": "a:1" },
            { "id": 1, "addr": "a:2" }
        ] }"#;
        assert!(matches!(ClusterConfig::from_json(text), Err(ConfigError::DuplicateId(1))));
    }

    #[test]
    fn rejects_small_cluster_for_agreement() {
        let mut config = ClusterConfig::localhost(3, 9000).expect("ports");
        config.fault_bound = 1;
        assert!(config.validate().is_ok());
        assert!(matches!(config.validate_agreement(), Err(ConfigError::FaultBound(_))));
    }

    #[test]
    fn rejects_unknown_commander() {
        let mut config = ClusterConfig::localhost(4, 9000).expect("ports");
        config.commander = 7;
        assert!(matches!(config.validate_agreement(), Err(ConfigError::UnknownNode(7))));
    }

    #[test]
    fn localhost_ports_stop_at_u16_max() {
        let config = ClusterConfig::localhost(2, u16::MAX - 1).expect("last two ports");
        assert_eq!(config.nodes[1].addr, "127.0.0.1:65535");

        assert!(matches!(
            ClusterConfig::localhost(3, u16::MAX - 1),
            Err(ConfigError::PortOverflow { base_port: 65534, id: 2 })
        ));
        assert!(matches!(
            ClusterConfig::localhost(70_000, 0),
            Err(ConfigError::PortOverflow { base_port: 0, id: 65536 })
        ));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cluster.json");
        std::fs::write(&path, FOUR_NODES).expect("write config");

        let config = ClusterConfig::load(&path).expect("load");
        assert_eq!(config.member_ids(), vec![0, 1, 2, 3]);

        let missing = ClusterConfig::load(dir.path().join("missing.json"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
