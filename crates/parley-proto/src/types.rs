//! Identity and value types shared by both protocols.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Node identifier, unique within a cluster.
pub type NodeId = u32;

/// Lamport timestamp.
pub type Timestamp = u64;

/// Value under Byzantine agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Order {
    /// Attack
    Attack,
    /// Retreat
    Retreat,
}

impl Order {
    /// The other value.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Attack => Self::Retreat,
            Self::Retreat => Self::Attack,
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attack => f.write_str("ATTACK"),
            Self::Retreat => f.write_str("RETREAT"),
        }
    }
}

/// Error returned when a string is not a known [`Order`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOrderError(pub String);

impl fmt::Display for ParseOrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown order {:?}, expected ATTACK or RETREAT", self.0)
    }
}

impl std::error::Error for ParseOrderError {}

impl FromStr for Order {
    type Err = ParseOrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ATTACK" => Ok(Self::Attack),
            "RETREAT" => Ok(Self::Retreat),
            _ => Err(ParseOrderError(s.to_string())),
        }
    }
}

/// Chain of nodes a value travelled through, Commander first.
///
/// The last element is the node that sent the value. A path of length `k + 1`
/// carries a value that has been relayed `k` times.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<NodeId>);

impl Path {
    /// Path of a value sent directly by the Commander.
    #[must_use]
    pub fn root(commander: NodeId) -> Self {
        Self(vec![commander])
    }

    /// Path from raw ids.
    #[must_use]
    pub fn from_ids(ids: Vec<NodeId>) -> Self {
        Self(ids)
    }

    /// New path with `node` appended.
    #[must_use]
    pub fn extend(&self, node: NodeId) -> Self {
        let mut ids = Vec::with_capacity(self.0.len() + 1);
        ids.extend_from_slice(&self.0);
        ids.push(node);
        Self(ids)
    }

    /// Whether `node` appears anywhere in the path.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.0.contains(&node)
    }

    /// Origin of the path. `None` for an empty path.
    #[must_use]
    pub fn first(&self) -> Option<NodeId> {
        self.0.first().copied()
    }

    /// Node that sent the value. `None` for an empty path.
    #[must_use]
    pub fn last(&self) -> Option<NodeId> {
        self.0.last().copied()
    }

    /// Number of nodes in the path.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the path has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Path ids in order.
    #[must_use]
    pub fn as_slice(&self) -> &[NodeId] {
        &self.0
    }

    /// Whether every id in the path is distinct.
    #[must_use]
    pub fn is_simple(&self) -> bool {
        self.0.iter().enumerate().all(|(i, id)| !self.0[..i].contains(id))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("->")?;
            }
            write!(f, "{id}")?;
        }
        Ok(())
    }
}
