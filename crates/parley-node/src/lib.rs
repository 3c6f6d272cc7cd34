//! Parley node runtime.
//!
//! Runs the sans-IO state machines of [`parley_core`] against real I/O: TCP
//! connections between processes, or in-process channels for whole-cluster
//! simulations.
//!
//! # Architecture
//!
//! A node actor owns one state machine behind an async mutex. Inbound frames
//! are decoded by the server loop and passed to the actor through
//! [`Inbound`]; the actor applies them, then executes the resulting actions
//! over a [`Transport`]. A driver (a [`MutexWorkload`], or a task waiting
//! for a decision) runs concurrently on the same actor.
//!
//! # Components
//!
//! - [`MutexNode`]: Lamport mutual exclusion actor
//! - [`LieutenantNode`] and [`issue_order`]: OM(f) agreement actors
//! - [`Transport`]: [`PeerTransport`] over TCP, [`LocalTransport`] in process
//! - [`serve_connection`], [`serve_listener`], [`serve_channel`]: inbound
//!   loops
//! - [`ClusterConfig`]: JSON cluster file
//! - [`SystemEnv`]: production environment (real time, OS RNG)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod agreement_node;
pub mod config;
mod error;
pub mod launch;
pub mod mutex_node;
pub mod server;
pub mod simulate;
mod system_env;
pub mod transport;
pub mod workload;

pub use agreement_node::{LieutenantNode, issue_order};
pub use config::{ClusterConfig, ConfigError, NodeConfig};
pub use error::NodeError;
pub use launch::{Running, TcpTransport};
pub use mutex_node::{CsEvent, CsEventKind, EventLog, MutexNode};
pub use server::{Inbound, serve_channel, serve_connection, serve_listener};
pub use system_env::SystemEnv;
pub use transport::{
    ConnectPolicy, Connector, Envelope, LocalNetwork, LocalTransport, PeerTransport,
    TokioConnector, Transport, TransportError,
};
pub use workload::{MutexWorkload, Pause};
