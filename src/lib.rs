//! # Rumorium - Convergent Gossip Engine
//!
//! Rumorium equalizes per-node state across a set of cluster peers by
//! periodically exchanging payloads with randomly scheduled rounds. The
//! choice of *what* to gossip, *to whom*, and *when convergence is reached*
//! is delegated to caller-supplied gossip logics; the engine owns peer
//! discovery, round scheduling, delivery acknowledgement, and lifecycle.
//!
//! ## Architecture
//!
//! The codebase uses the **Actor Pattern** for safe concurrent state:
//! - Each gossip shell is a private actor with a public, cheap-to-clone
//!   [`GossipControl`] handle
//! - Handles communicate with the shell via async channels
//! - The shell owns all mutable state and processes messages sequentially,
//!   so logics never need internal synchronization
//!
//! One shell hosts many independent gossip streams, keyed by
//! [`GossipIdentifier`]; each stream gets its own [`GossipLogic`] instance,
//! created lazily by the factory supplied at start.
//!
//! ## Quick Start
//!
//! ```ignore
//! // Start a shell gossiping integer sets
//! let control = Gossiper::start("node-a", GossiperSettings::default(), make_logic);
//!
//! // Wire up a peer and feed the local state
//! control.introduce(other.peer_ref()).await?;
//! control.update("membership", local_view).await?;
//!
//! // Out-of-band signal to one stream
//! control.side_channel_tell("membership", Box::new(Prune)).await?;
//! ```
//!
//! ## Module Overview
//!
//! | Module | Purpose |
//! |--------|--------|
//! | `shell` | The gossip shell actor, its control handle, the round driver |
//! | `ident` | String-backed identifiers partitioning gossip streams |
//! | `logic` | Pluggable per-stream policy trait and its factory |
//! | `peer` | Shell addresses, peer handles, the watched peer set |
//! | `settings` | Round interval, jitter, ACK timeout, discovery mode |
//! | `messages` | Shell message protocol, ACK reply, wire forms |
//! | `discovery` | Cluster membership events and peer resolvers |
//! | `receptionist` | Key-based registry for symmetric discovery |

mod discovery;
mod ident;
mod logic;
mod messages;
mod peer;
mod receptionist;
mod settings;
mod shell;

pub use discovery::{ClusterEvent, Member, MemberNode, MemberResolver, MemberStatus, PeerDiscovery};
pub use ident::{GossipIdentified, GossipIdentifier};
pub use logic::{GossipLogic, LogicContext, LogicFactory};
pub use messages::{
    deserialize_bounded, GossipAck, ShellMessage, SideChannelReply, WireAck, WireGossip,
    MAX_WIRE_DESERIALIZE, MAX_WIRE_PAYLOAD,
};
pub use peer::{PeerRef, ShellAddr};
pub use receptionist::Receptionist;
pub use settings::{
    GossiperSettings, DEFAULT_ACK_TIMEOUT, DEFAULT_GOSSIP_INTERVAL, DEFAULT_INTERVAL_JITTER,
};
pub use shell::{GossipControl, Gossiper};
