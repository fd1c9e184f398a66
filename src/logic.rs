//! # Pluggable Gossip Logic
//!
//! A [`GossipLogic`] decides *what* to gossip, *to whom*, and how to merge
//! what arrives; the shell owns everything else (peer discovery, round
//! scheduling, ACK coordination, lifecycle). One logic instance exists per
//! active identifier within a shell, created lazily by the factory supplied
//! at shell start.
//!
//! All trait methods run synchronously on the shell's own task and must be
//! bounded and non-blocking.

use std::any::Any;
use std::fmt;

use crate::ident::GossipIdentifier;
use crate::peer::{PeerRef, ShellAddr};

/// Per-identifier context handed to the factory when a logic is created.
///
/// Gives the logic its identifier and the owning shell's address for
/// logging and diagnostics.
#[derive(Clone, Debug)]
pub struct LogicContext {
    pub identifier: GossipIdentifier,
    pub shell: ShellAddr,
}

impl fmt::Display for LogicContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.shell, self.identifier)
    }
}

/// Caller-supplied policy for one gossip stream.
///
/// The engine guarantees these calls are serialized with each other and
/// with every other shell operation; no internal synchronization is needed.
/// `receive_gossip` must be idempotent under retransmission — the engine
/// confirms delivery but does not deduplicate.
pub trait GossipLogic<E>: Send + 'static {
    /// Choose this round's targets from the currently known peers. May
    /// return any subset, including none; ordering is the logic's concern.
    fn select_peers(&mut self, peers: &[PeerRef<E>]) -> Vec<PeerRef<E>>;

    /// Materialize the envelope to send to a specific target. `None` skips
    /// this target for this round.
    fn make_payload(&mut self, target: &PeerRef<E>) -> Option<E>;

    /// Merge an inbound envelope from `origin`.
    fn receive_gossip(&mut self, origin: &PeerRef<E>, payload: E);

    /// An in-flight gossip was acknowledged by `target`. Delta state for
    /// `confirmed` may be pruned once safely delivered.
    fn receive_payload_ack(&mut self, target: &PeerRef<E>, confirmed: E);

    /// Absorb an update supplied by the local application.
    fn local_update(&mut self, payload: E);

    /// Dynamically-typed side channel. A rejection is logged by the shell
    /// but does not kill it; the message still counts as delivered.
    fn receive_side_channel(&mut self, msg: Box<dyn Any + Send>) -> anyhow::Result<()>;
}

/// Factory building a logic instance for each identifier that becomes
/// active within the shell.
pub type LogicFactory<E> = Box<dyn FnMut(LogicContext) -> Box<dyn GossipLogic<E>> + Send>;
