//! # Peer Discovery
//!
//! Three disjoint discovery modes, chosen once at shell start:
//!
//! | Mode | Source of peers |
//! |------|-----------------|
//! | [`PeerDiscovery::Manual`] | Only `GossipControl::introduce` |
//! | [`PeerDiscovery::Cluster`] | Cluster membership events, filtered by status floor and resolved to shell handles |
//! | [`PeerDiscovery::Receptionist`] | Listings for a shared key; every shell registered under the key discovers all others |
//!
//! Whatever the mode, every discovered handle funnels through the shell's
//! single introduce gate, which rejects self, watches the peer, and arms
//! the round timer on the first insert.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::peer::PeerRef;
use crate::receptionist::Receptionist;

/// Node identity as the cluster membership service knows it.
///
/// Distinct from a shell address: one node hosts many shells, and mapping a
/// member to a concrete shell is the resolver's job.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberNode(String);

impl MemberNode {
    pub fn new(node: impl Into<String>) -> Self {
        Self(node.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberNode {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Ordinal membership status. The discovery filter compares against a
/// configured floor: only members at-or-above it become gossip peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemberStatus {
    Joining,
    WeaklyUp,
    Up,
    Leaving,
    Exiting,
    Down,
    Removed,
}

/// A single member of the cluster as seen by the membership service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub node: MemberNode,
    pub status: MemberStatus,
}

impl Member {
    pub fn new(node: impl Into<MemberNode>, status: MemberStatus) -> Self {
        Self {
            node: node.into(),
            status,
        }
    }
}

/// Events emitted by the cluster membership service.
///
/// The gossip core reacts to snapshots and membership changes; leadership
/// and reachability events are delivered but ignored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ClusterEvent {
    /// Full membership view, emitted on subscription and on topology
    /// convergence.
    Snapshot(Vec<Member>),
    /// Incremental change to a single member's status.
    MemberChange(Member),
    /// Leadership moved; not a discovery signal.
    LeaderChanged(MemberNode),
    /// Reachability observation; not a discovery signal.
    ReachabilityChanged { node: MemberNode, reachable: bool },
}

/// Maps a cluster member to a shell handle, if the member hosts one.
///
/// Returning `None` means the member does not resolve to a gossip shell of
/// the expected type; the shell logs this and inserts nothing.
pub type MemberResolver<E> = Box<dyn Fn(&Member) -> Option<PeerRef<E>> + Send>;

/// Peer discovery mode, chosen once from settings at shell start.
pub enum PeerDiscovery<E> {
    /// Peers arrive only through explicit introduction.
    Manual,
    /// Subscribe to cluster membership events; members at-or-above
    /// `status_floor` whose node is not `self_node` are resolved and
    /// introduced.
    Cluster {
        events: mpsc::Receiver<ClusterEvent>,
        resolve: MemberResolver<E>,
        status_floor: MemberStatus,
        self_node: MemberNode,
    },
    /// Register under `key` and subscribe to its listings; every listed
    /// shell is introduced (self filtered by the gate). Symmetric: all
    /// shells registered under one key discover each other.
    Receptionist {
        key: String,
        receptionist: Receptionist<E>,
    },
}

impl<E> Default for PeerDiscovery<E> {
    fn default() -> Self {
        Self::Manual
    }
}

impl<E> fmt::Debug for PeerDiscovery<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => f.write_str("Manual"),
            Self::Cluster { status_floor, self_node, .. } => f
                .debug_struct("Cluster")
                .field("status_floor", status_floor)
                .field("self_node", self_node)
                .finish_non_exhaustive(),
            Self::Receptionist { key, .. } => {
                f.debug_struct("Receptionist").field("key", key).finish_non_exhaustive()
            }
        }
    }
}
