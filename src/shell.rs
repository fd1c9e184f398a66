//! # The Gossip Shell
//!
//! One long-lived actor per gossiper, owning the peer set, the logic
//! registry, and the round timer. The public [`GossipControl`] handle is
//! cheap to clone and communicates with the shell only through its
//! mailbox, so all state mutation is serialized on the shell's own task.
//!
//! ## Round driver
//!
//! A single logical timer is armed iff the peer set is non-empty. After
//! every handled message and after every round the shell re-checks that
//! condition; when the last peer terminates the timer is dropped. Each
//! armed delay is sampled with the configured jitter, so rounds are not
//! synchronized across shells.
//!
//! ## ACK coordination
//!
//! Outbound gossip uses the ask pattern: the message carries a one-shot
//! reply channel, and a detached task waits on it under the ACK timeout.
//! Successful completions are re-queued into the shell mailbox as
//! `GossipAcked`, which is what keeps logic mutation on the shell task.
//! Timeouts are logged and not retried; the next round makes its own
//! decisions.

use indexmap::IndexMap;
use std::any::Any;

use anyhow::anyhow;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::discovery::{ClusterEvent, Member, MemberNode, MemberResolver, MemberStatus, PeerDiscovery};
use crate::ident::GossipIdentifier;
use crate::logic::{GossipLogic, LogicContext, LogicFactory};
use crate::messages::{GossipAck, ShellMessage, SideChannelReply};
use crate::peer::{PeerRef, PeerSet, ShellAddr};
use crate::receptionist::Receptionist;
use crate::settings::{sample_interval, GossiperSettings, SHELL_MAILBOX};

/// Entry point for starting gossip shells.
pub struct Gossiper;

impl Gossiper {
    /// Spawn a gossip shell named `name` and return its control handle.
    ///
    /// `factory` builds one logic instance per identifier that becomes
    /// active, whether through a local update or inbound gossip. Must be
    /// called within a tokio runtime.
    pub fn start<E, F>(name: &str, settings: GossiperSettings<E>, factory: F) -> GossipControl<E>
    where
        E: Clone + Send + 'static,
        F: FnMut(LogicContext) -> Box<dyn GossipLogic<E>> + Send + 'static,
    {
        let GossiperSettings {
            gossip_interval,
            interval_jitter,
            ack_timeout,
            discovery,
        } = settings;

        let addr = ShellAddr::fresh(name);
        let (cmd_tx, cmd_rx) = mpsc::channel(SHELL_MAILBOX);
        let self_ref = PeerRef::new(addr, cmd_tx.clone());

        let cluster = match discovery {
            PeerDiscovery::Manual => None,
            PeerDiscovery::Cluster {
                events,
                resolve,
                status_floor,
                self_node,
            } => {
                spawn_cluster_funnel(events, self_ref.clone());
                Some(ClusterConfig {
                    resolve,
                    status_floor,
                    self_node,
                })
            }
            PeerDiscovery::Receptionist { key, receptionist } => {
                spawn_receptionist_funnel(key, receptionist, self_ref.clone());
                None
            }
        };

        let actor = GossiperActor {
            self_ref: self_ref.clone(),
            gossip_interval,
            interval_jitter,
            ack_timeout,
            peers: PeerSet::new(),
            registry: IndexMap::new(),
            factory: Box::new(factory),
            cluster,
            next_round: None,
            cmd_tx,
        };
        tokio::spawn(actor.run(cmd_rx));

        info!(shell = %self_ref.addr(), "gossip shell started");
        GossipControl { shell: self_ref }
    }
}

/// Funnel cluster membership events into the shell mailbox.
fn spawn_cluster_funnel<E: Send + 'static>(
    mut events: mpsc::Receiver<ClusterEvent>,
    shell: PeerRef<E>,
) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if shell.tell(ShellMessage::Cluster(event)).await.is_err() {
                break;
            }
        }
    });
}

/// Register with the receptionist and funnel listing refreshes into the
/// shell mailbox.
fn spawn_receptionist_funnel<E: Send + 'static>(
    key: String,
    receptionist: Receptionist<E>,
    shell: PeerRef<E>,
) {
    tokio::spawn(async move {
        receptionist.register(key.clone(), shell.clone()).await;
        let mut listings = receptionist.subscribe(key).await;
        while let Some(listing) = listings.recv().await {
            if shell.tell(ShellMessage::PeerListing(listing)).await.is_err() {
                break;
            }
        }
    });
}

// ============================================================================
// Control handle (public API - cheap to clone)
// ============================================================================

/// Send-only façade bound to a single shell.
///
/// Performs no state management of its own; it exists so callers need not
/// know the shell's message enumeration.
pub struct GossipControl<E> {
    shell: PeerRef<E>,
}

impl<E> Clone for GossipControl<E> {
    fn clone(&self) -> Self {
        Self {
            shell: self.shell.clone(),
        }
    }
}

impl<E: Send + 'static> GossipControl<E> {
    /// This shell's unique address.
    pub fn addr(&self) -> &ShellAddr {
        self.shell.addr()
    }

    /// A peer handle to this shell, for introducing it to other shells.
    pub fn peer_ref(&self) -> PeerRef<E> {
        self.shell.clone()
    }

    /// Introduce a peer to the shell's peer set.
    pub async fn introduce(&self, peer: PeerRef<E>) -> anyhow::Result<()> {
        self.shell
            .tell(ShellMessage::IntroducePeer { peer })
            .await
            .map_err(|_| anyhow!("gossip shell terminated"))
    }

    /// Hand a locally produced payload to the logic for `id`, creating the
    /// logic if this is the identifier's first reference.
    pub async fn update(&self, id: impl Into<GossipIdentifier>, payload: E) -> anyhow::Result<()> {
        self.shell
            .tell(ShellMessage::UpdatePayload {
                id: id.into(),
                payload,
            })
            .await
            .map_err(|_| anyhow!("gossip shell terminated"))
    }

    /// Drop the logic for `id`. Subsequent gossip for the identifier
    /// re-creates a fresh logic.
    pub async fn remove(&self, id: impl Into<GossipIdentifier>) -> anyhow::Result<()> {
        self.shell
            .tell(ShellMessage::RemovePayload { id: id.into() })
            .await
            .map_err(|_| anyhow!("gossip shell terminated"))
    }

    /// Push a dynamically-typed message to the logic for `id`.
    ///
    /// Replies [`SideChannelReply::Received`] if a logic for the identifier
    /// exists — even if the logic rejected the message (the rejection is
    /// logged) — and [`SideChannelReply::Unhandled`] otherwise.
    pub async fn side_channel_tell(
        &self,
        id: impl Into<GossipIdentifier>,
        msg: Box<dyn Any + Send>,
    ) -> anyhow::Result<SideChannelReply> {
        let (reply, rx) = oneshot::channel();
        self.shell
            .tell(ShellMessage::SideChannel {
                id: id.into(),
                msg,
                reply,
            })
            .await
            .map_err(|_| anyhow!("gossip shell terminated"))?;
        rx.await.map_err(|_| anyhow!("gossip shell terminated"))
    }

    /// Diagnostic snapshot of the current peer set, in insertion order.
    pub async fn peers(&self) -> anyhow::Result<Vec<ShellAddr>> {
        let (reply, rx) = oneshot::channel();
        self.shell
            .tell(ShellMessage::GetPeers(reply))
            .await
            .map_err(|_| anyhow!("gossip shell terminated"))?;
        rx.await.map_err(|_| anyhow!("gossip shell terminated"))
    }

    /// Tear the shell down. Outstanding ACK waits are abandoned and all
    /// watchers of this shell observe its termination.
    pub async fn stop(&self) {
        let _ = self.shell.tell(ShellMessage::Stop).await;
    }
}

// ============================================================================
// Shell actor (owns state)
// ============================================================================

struct ClusterConfig<E> {
    resolve: MemberResolver<E>,
    status_floor: MemberStatus,
    self_node: MemberNode,
}

struct GossiperActor<E> {
    self_ref: PeerRef<E>,
    gossip_interval: std::time::Duration,
    interval_jitter: f64,
    ack_timeout: std::time::Duration,
    peers: PeerSet<E>,
    registry: IndexMap<GossipIdentifier, Box<dyn GossipLogic<E>>>,
    factory: LogicFactory<E>,
    cluster: Option<ClusterConfig<E>>,
    /// Deadline of the armed round timer. `Some` iff the peer set is
    /// non-empty.
    next_round: Option<Instant>,
    /// Own mailbox sender, cloned into watch and ACK completion tasks.
    cmd_tx: mpsc::Sender<ShellMessage<E>>,
}

impl<E: Clone + Send + 'static> GossiperActor<E> {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<ShellMessage<E>>) {
        loop {
            let deadline = self.next_round;
            tokio::select! {
                msg = cmd_rx.recv() => {
                    match msg {
                        Some(ShellMessage::Stop) | None => break,
                        Some(msg) => self.handle(msg),
                    }
                }
                _ = round_tick(deadline), if deadline.is_some() => {
                    self.next_round = None;
                    self.run_round();
                }
            }
            self.ensure_next_round();
        }
        debug!(shell = %self.self_ref.addr(), "gossip shell terminated");
    }

    fn handle(&mut self, msg: ShellMessage<E>) {
        match msg {
            ShellMessage::Gossip {
                id,
                origin,
                payload,
                ack_reply,
            } => {
                self.get_or_create(&id).receive_gossip(&origin, payload);
                // Delivery confirmation, independent of any merge outcome.
                let _ = ack_reply.send(GossipAck);
            }
            ShellMessage::UpdatePayload { id, payload } => {
                self.get_or_create(&id).local_update(payload);
            }
            ShellMessage::RemovePayload { id } => {
                if self.registry.shift_remove(&id).is_some() {
                    debug!(shell = %self.self_ref.addr(), identifier = %id, "gossip logic removed");
                }
            }
            ShellMessage::IntroducePeer { peer } => self.introduce_peer(peer),
            ShellMessage::SideChannel { id, msg, reply } => {
                let outcome = match self.registry.get_mut(&id) {
                    Some(logic) => {
                        if let Err(err) = logic.receive_side_channel(msg) {
                            error!(
                                shell = %self.self_ref.addr(),
                                identifier = %id,
                                error = %err,
                                "side channel message rejected by logic"
                            );
                        }
                        SideChannelReply::Received
                    }
                    None => SideChannelReply::Unhandled,
                };
                let _ = reply.send(outcome);
            }
            ShellMessage::PeerTerminated { addr } => {
                if self.peers.remove(&addr) {
                    debug!(shell = %self.self_ref.addr(), peer = %addr, "peer terminated");
                    if self.peers.is_empty() {
                        self.next_round = None;
                        debug!(shell = %self.self_ref.addr(), "no peers remain, round timer cancelled");
                    }
                }
            }
            ShellMessage::GossipAcked {
                id,
                target,
                payload,
            } => match self.registry.get_mut(&id) {
                Some(logic) => logic.receive_payload_ack(&target, payload),
                // Logic removed while the ACK was in flight.
                None => debug!(shell = %self.self_ref.addr(), identifier = %id, "ack for removed logic dropped"),
            },
            ShellMessage::Cluster(event) => match event {
                ClusterEvent::Snapshot(members) => {
                    for member in members {
                        self.consider_member(member);
                    }
                }
                ClusterEvent::MemberChange(member) => self.consider_member(member),
                ClusterEvent::LeaderChanged(_) | ClusterEvent::ReachabilityChanged { .. } => {}
            },
            ShellMessage::PeerListing(listing) => {
                for peer in listing {
                    self.introduce_peer(peer);
                }
            }
            ShellMessage::GetPeers(reply) => {
                let _ = reply.send(self.peers.addrs());
            }
            // Stop is intercepted in the run loop.
            ShellMessage::Stop => {}
        }
    }

    /// The single narrow gate every discovered or introduced peer passes
    /// through: rejects self, inserts, watches.
    fn introduce_peer(&mut self, peer: PeerRef<E>) {
        if peer.addr() == self.self_ref.addr() {
            // Self-introduction is silently ignored.
            return;
        }
        if self.peers.contains(peer.addr()) {
            return;
        }
        self.peers.insert(peer.clone());
        debug!(shell = %self.self_ref.addr(), peer = %peer.addr(), "peer introduced");

        // Watch: a termination notice arrives when the peer's mailbox
        // closes, whether it is already closed or closes later.
        let cmd_tx = self.cmd_tx.clone();
        let addr = peer.addr().clone();
        tokio::spawn(async move {
            peer.closed().await;
            let _ = cmd_tx.send(ShellMessage::PeerTerminated { addr }).await;
        });
    }

    fn consider_member(&mut self, member: Member) {
        let peer = {
            let Some(cfg) = &self.cluster else { return };
            if member.node == cfg.self_node || member.status < cfg.status_floor {
                return;
            }
            match (cfg.resolve)(&member) {
                Some(peer) => peer,
                None => {
                    warn!(
                        shell = %self.self_ref.addr(),
                        node = %member.node,
                        "cluster member did not resolve to a gossip shell"
                    );
                    return;
                }
            }
        };
        self.introduce_peer(peer);
    }

    fn get_or_create(&mut self, id: &GossipIdentifier) -> &mut Box<dyn GossipLogic<E>> {
        let shell = self.self_ref.addr().clone();
        let Self {
            registry, factory, ..
        } = self;
        registry.entry(id.clone()).or_insert_with(|| {
            debug!(shell = %shell, identifier = %id, "gossip logic created");
            factory(LogicContext {
                identifier: id.clone(),
                shell,
            })
        })
    }

    /// Arm the round timer if peers exist and it is not already armed.
    fn ensure_next_round(&mut self) {
        if self.peers.is_empty() || self.next_round.is_some() {
            return;
        }
        let delay = sample_interval(self.gossip_interval, self.interval_jitter);
        self.next_round = Some(Instant::now() + delay);
    }

    /// One gossip round: every logic selects targets from the current peer
    /// snapshot and may emit one payload per target.
    fn run_round(&mut self) {
        if self.peers.is_empty() {
            return;
        }
        let known = self.peers.snapshot();
        debug!(
            shell = %self.self_ref.addr(),
            peers = self.peers.len(),
            logics = self.registry.len(),
            "gossip round"
        );
        for i in 0..self.registry.len() {
            let Some((id, logic)) = self.registry.get_index_mut(i) else {
                break;
            };
            let id = id.clone();
            let targets = logic.select_peers(&known);
            let mut sends = Vec::with_capacity(targets.len());
            for target in targets {
                if let Some(payload) = logic.make_payload(&target) {
                    sends.push((target, payload));
                }
            }
            for (target, payload) in sends {
                self.send_gossip(id.clone(), target, payload);
            }
        }
    }

    /// Ask-pattern send: gossip out, detached wait for the ACK, completion
    /// re-queued onto our own mailbox.
    fn send_gossip(&self, id: GossipIdentifier, target: PeerRef<E>, payload: E) {
        let (ack_reply, ack_rx) = oneshot::channel();
        let msg = ShellMessage::Gossip {
            id: id.clone(),
            origin: self.self_ref.clone(),
            payload: payload.clone(),
            ack_reply,
        };
        if target.try_tell(msg).is_err() {
            warn!(
                shell = %self.self_ref.addr(),
                peer = %target.addr(),
                "gossip target unreachable, skipping"
            );
            return;
        }

        let cmd_tx = self.cmd_tx.clone();
        let ack_timeout = self.ack_timeout;
        tokio::spawn(async move {
            match timeout(ack_timeout, ack_rx).await {
                Ok(Ok(GossipAck)) => {
                    let _ = cmd_tx
                        .send(ShellMessage::GossipAcked {
                            id,
                            target,
                            payload,
                        })
                        .await;
                }
                Ok(Err(_)) | Err(_) => {
                    warn!(
                        identifier = %id,
                        peer = %target.addr(),
                        "gossip was not acknowledged within timeout"
                    );
                }
            }
        });
    }
}

async fn round_tick(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
