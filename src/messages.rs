//! # Shell Message Protocol
//!
//! This module defines the messages a gossip shell accepts in its mailbox,
//! the ACK reply type, and the envelope-agnostic wire forms used between
//! shells across a byte transport.
//!
//! | Direction | Type | Purpose |
//! |-----------|------|---------|
//! | peer → shell | `ShellMessage::Gossip` | Gossip arrival, carries ACK reply channel |
//! | caller → shell | `UpdatePayload` / `RemovePayload` / `IntroducePeer` / `SideChannel` | Control plane |
//! | internal | `PeerTerminated` / `GossipAcked` / `Cluster` / `PeerListing` | Watch notices, ACK completions, discovery funnels |
//! | shell → peer | `GossipAck` | Delivery confirmation, sent unconditionally |
//!
//! Wire forms are serialized with bincode under a hard size limit; all
//! deserialization goes through [`deserialize_bounded`].

use std::any::Any;

use bincode::Options;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::discovery::ClusterEvent;
use crate::ident::GossipIdentifier;
use crate::peer::{PeerRef, ShellAddr};

/// Maximum serialized envelope size on the wire (64 KiB).
pub const MAX_WIRE_PAYLOAD: usize = 64 * 1024;

/// Maximum buffer size for wire deserialization. Slightly larger than
/// [`MAX_WIRE_PAYLOAD`] to allow for framing overhead.
pub const MAX_WIRE_DESERIALIZE: u64 = (MAX_WIRE_PAYLOAD as u64) + 4096;

/// Returns bincode options with the deserialization limit enforced.
fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_WIRE_DESERIALIZE)
        .with_fixint_encoding()
}

/// Deserialize with size bounds enforced. Use this instead of raw
/// `bincode::deserialize` for anything that crossed a transport.
pub fn deserialize_bounded<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, bincode::Error> {
    bincode_options().deserialize(bytes)
}

/// Empty acknowledgement confirming a gossip message was delivered.
///
/// This is at-least-once delivery confirmation, not application-level
/// acceptance: the receiving shell replies before any merge outcome is
/// known to the sender.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GossipAck;

/// Outcome of routing a side-channel message to a specific logic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SideChannelReply {
    /// A logic for the identifier exists and the message reached it, even
    /// if the logic itself rejected it (the rejection is logged).
    Received,
    /// No logic for the identifier; the caller's dead-letter policy applies.
    Unhandled,
}

/// Messages a gossip shell accepts in its mailbox.
///
/// Everything the shell does — gossip arrival, control operations,
/// discovery funnels, ACK completions, termination notices — flows through
/// this one enumeration, so all state mutation is serialized on the
/// shell's own task.
pub enum ShellMessage<E> {
    /// Peer-to-peer gossip arrival. The shell gets/creates the logic for
    /// `id`, delivers the payload, then unconditionally replies on
    /// `ack_reply`.
    Gossip {
        id: GossipIdentifier,
        origin: PeerRef<E>,
        payload: E,
        ack_reply: oneshot::Sender<GossipAck>,
    },
    /// Local application update, routed to the logic's `local_update`.
    UpdatePayload { id: GossipIdentifier, payload: E },
    /// Drop the logic for the identifier.
    RemovePayload { id: GossipIdentifier },
    /// External peer hint; goes through the single introduce gate.
    IntroducePeer { peer: PeerRef<E> },
    /// Dynamically-typed application signal for a specific logic.
    SideChannel {
        id: GossipIdentifier,
        msg: Box<dyn Any + Send>,
        reply: oneshot::Sender<SideChannelReply>,
    },
    /// Watch notice: the peer at `addr` has terminated.
    PeerTerminated { addr: ShellAddr },
    /// An in-flight gossip was acknowledged by `target`; the completion is
    /// re-queued here so logic mutation stays on the shell task.
    GossipAcked {
        id: GossipIdentifier,
        target: PeerRef<E>,
        payload: E,
    },
    /// Cluster membership event funneled in by the discovery adapter.
    Cluster(ClusterEvent),
    /// Receptionist listing refresh funneled in by the discovery adapter.
    PeerListing(Vec<PeerRef<E>>),
    /// Diagnostic snapshot of the current peer set.
    GetPeers(oneshot::Sender<Vec<ShellAddr>>),
    /// Orderly teardown.
    Stop,
}

/// Envelope-agnostic gossip request as it crosses a byte transport.
///
/// Identity is the identifier's string form; the payload is an opaque
/// bincode-encoded envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireGossip {
    pub identifier: String,
    pub origin: String,
    pub payload: Vec<u8>,
}

/// Wire form of [`GossipAck`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct WireAck;

impl WireGossip {
    /// Encode a typed envelope for a gossip stream into its wire form.
    pub fn encode<E: Serialize>(
        id: &GossipIdentifier,
        origin: &ShellAddr,
        envelope: &E,
    ) -> Result<Self, bincode::Error> {
        Ok(Self {
            identifier: id.as_str().to_string(),
            origin: origin.as_str().to_string(),
            payload: bincode::serialize(envelope)?,
        })
    }

    /// Decode the opaque payload back into a typed envelope, bounds
    /// enforced.
    pub fn decode_payload<E: DeserializeOwned>(&self) -> Result<E, bincode::Error> {
        deserialize_bounded(&self.payload)
    }

    pub fn identifier(&self) -> GossipIdentifier {
        GossipIdentifier::from(self.identifier.as_str())
    }
}
