//! Integration tests for the gossip shell.
//!
//! These tests validate end-to-end convergence between shells, discovery
//! through the receptionist, identifier isolation, termination handling,
//! and side channel routing.

use std::any::Any;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{sleep, timeout};

use rumorium::{
    ClusterEvent, GossipControl, GossipLogic, Gossiper, GossiperSettings, LogicContext, Member,
    MemberNode, MemberStatus, PeerDiscovery, PeerRef, Receptionist, SideChannelReply,
};

const CONVERGENCE_WAIT: Duration = Duration::from_millis(400);
const SETTLE_WAIT: Duration = Duration::from_millis(150);

// =============================================================================
// Helper: grow-only integer set logic with observable state
// =============================================================================

type Envelope = Vec<u64>;

/// Everything the tests observe about one shell's logics.
#[derive(Default)]
struct Observed {
    /// Merged set state, across all identifiers (tests use one stream per
    /// assertion).
    state: BTreeSet<u64>,
    /// Identifiers for which the factory created a logic.
    created: Vec<String>,
    /// Side channel strings the logic accepted.
    side_msgs: Vec<String>,
}

struct SetLogic {
    observed: Arc<Mutex<Observed>>,
}

impl GossipLogic<Envelope> for SetLogic {
    fn select_peers(&mut self, peers: &[PeerRef<Envelope>]) -> Vec<PeerRef<Envelope>> {
        peers.to_vec()
    }

    fn make_payload(&mut self, _target: &PeerRef<Envelope>) -> Option<Envelope> {
        let observed = self.observed.lock().unwrap();
        Some(observed.state.iter().copied().collect())
    }

    fn receive_gossip(&mut self, _origin: &PeerRef<Envelope>, payload: Envelope) {
        self.observed.lock().unwrap().state.extend(payload);
    }

    fn receive_payload_ack(&mut self, _target: &PeerRef<Envelope>, _confirmed: Envelope) {}

    fn local_update(&mut self, payload: Envelope) {
        self.observed.lock().unwrap().state.extend(payload);
    }

    fn receive_side_channel(&mut self, msg: Box<dyn Any + Send>) -> anyhow::Result<()> {
        match msg.downcast::<&'static str>() {
            Ok(s) => {
                self.observed.lock().unwrap().side_msgs.push(s.to_string());
                Ok(())
            }
            Err(_) => anyhow::bail!("unsupported side channel message"),
        }
    }
}

fn fast_settings() -> GossiperSettings<Envelope> {
    GossiperSettings {
        gossip_interval: Duration::from_millis(40),
        interval_jitter: 0.25,
        ..GossiperSettings::default()
    }
}

fn set_shell(
    name: &str,
    settings: GossiperSettings<Envelope>,
) -> (GossipControl<Envelope>, Arc<Mutex<Observed>>) {
    let observed: Arc<Mutex<Observed>> = Arc::default();
    let factory_observed = observed.clone();
    let control = Gossiper::start(name, settings, move |ctx: LogicContext| {
        factory_observed
            .lock()
            .unwrap()
            .created
            .push(ctx.identifier.to_string());
        Box::new(SetLogic {
            observed: factory_observed.clone(),
        }) as Box<dyn GossipLogic<Envelope>>
    });
    (control, observed)
}

fn state_of(observed: &Arc<Mutex<Observed>>) -> BTreeSet<u64> {
    observed.lock().unwrap().state.clone()
}

// =============================================================================
// Test: two-node convergence
// =============================================================================

/// Shells A and B each hold part of the set; after mutual introduction
/// both converge to the union.
#[tokio::test]
async fn two_node_convergence() {
    let (a, a_observed) = set_shell("conv-a", fast_settings());
    let (b, b_observed) = set_shell("conv-b", fast_settings());

    a.update("x", vec![1]).await.unwrap();
    b.update("x", vec![2]).await.unwrap();

    a.introduce(b.peer_ref()).await.unwrap();
    b.introduce(a.peer_ref()).await.unwrap();

    sleep(CONVERGENCE_WAIT).await;

    let expected = BTreeSet::from([1, 2]);
    assert_eq!(state_of(&a_observed), expected);
    assert_eq!(state_of(&b_observed), expected);

    a.stop().await;
    b.stop().await;
}

// =============================================================================
// Test: identifier isolation
// =============================================================================

/// Updates to identifier "x" never surface on the peer under any other
/// identifier: the peer only ever creates a logic for "x".
#[tokio::test]
async fn identifier_isolation() {
    let (a, _a_observed) = set_shell("iso-a", fast_settings());
    let (b, b_observed) = set_shell("iso-b", fast_settings());

    a.introduce(b.peer_ref()).await.unwrap();
    a.update("x", vec![7]).await.unwrap();

    sleep(CONVERGENCE_WAIT).await;

    let created = b_observed.lock().unwrap().created.clone();
    assert_eq!(created, vec!["x".to_string()]);

    a.stop().await;
    b.stop().await;
}

// =============================================================================
// Test: idempotent introduction
// =============================================================================

#[tokio::test]
async fn repeated_introduction_yields_one_membership() {
    let (a, _) = set_shell("idem-a", fast_settings());
    let (b, _) = set_shell("idem-b", fast_settings());

    a.introduce(b.peer_ref()).await.unwrap();
    a.introduce(b.peer_ref()).await.unwrap();
    a.introduce(b.peer_ref()).await.unwrap();

    sleep(SETTLE_WAIT).await;
    assert_eq!(a.peers().await.unwrap(), vec![b.addr().clone()]);

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn self_introduction_has_no_effect() {
    let (a, _) = set_shell("self-a", fast_settings());

    a.introduce(a.peer_ref()).await.unwrap();

    sleep(SETTLE_WAIT).await;
    assert!(a.peers().await.unwrap().is_empty());

    a.stop().await;
}

// =============================================================================
// Test: termination cascade
// =============================================================================

/// Three peers; C terminates and is pruned everywhere; after B also
/// terminates, A is left with an empty peer set.
#[tokio::test]
async fn termination_cascade() {
    let (a, _) = set_shell("casc-a", fast_settings());
    let (b, _) = set_shell("casc-b", fast_settings());
    let (c, _) = set_shell("casc-c", fast_settings());

    for (from, to) in [(&a, &b), (&a, &c), (&b, &a), (&b, &c), (&c, &a), (&c, &b)] {
        from.introduce(to.peer_ref()).await.unwrap();
    }
    sleep(SETTLE_WAIT).await;
    assert_eq!(a.peers().await.unwrap().len(), 2);

    c.stop().await;
    sleep(SETTLE_WAIT).await;
    assert_eq!(a.peers().await.unwrap(), vec![b.addr().clone()]);
    assert_eq!(b.peers().await.unwrap(), vec![a.addr().clone()]);

    b.stop().await;
    sleep(SETTLE_WAIT).await;
    assert!(a.peers().await.unwrap().is_empty());

    a.stop().await;
}

// =============================================================================
// Test: receptionist discovery
// =============================================================================

/// Four shells register under one key; each discovers the other three and
/// never itself.
#[tokio::test]
async fn receptionist_discovery_is_symmetric() {
    let registry: Receptionist<Envelope> = Receptionist::spawn();
    let mut shells = Vec::new();
    for i in 0..4 {
        let settings = GossiperSettings {
            discovery: PeerDiscovery::Receptionist {
                key: "gossip/test".to_string(),
                receptionist: registry.clone(),
            },
            ..fast_settings()
        };
        shells.push(set_shell(&format!("recep-{i}"), settings));
    }

    sleep(CONVERGENCE_WAIT).await;

    for (control, _) in &shells {
        let peers = control.peers().await.unwrap();
        assert_eq!(peers.len(), 3, "{} sees {:?}", control.addr(), peers);
        assert!(!peers.contains(control.addr()));
    }

    // Convergence also works across the discovered mesh.
    shells[0].0.update("x", vec![10]).await.unwrap();
    shells[3].0.update("x", vec![11]).await.unwrap();
    sleep(CONVERGENCE_WAIT).await;
    for (_, observed) in &shells {
        assert_eq!(state_of(observed), BTreeSet::from([10, 11]));
    }

    for (control, _) in &shells {
        control.stop().await;
    }
}

// =============================================================================
// Test: cluster-event discovery
// =============================================================================

/// Members at-or-above the status floor resolve to peers; members below
/// the floor and the local node are ignored.
#[tokio::test]
async fn cluster_discovery_filters_by_status_and_self() {
    let (b, _) = set_shell("clus-b", fast_settings());
    let (c, _) = set_shell("clus-c", fast_settings());
    let b_peer = b.peer_ref();
    let c_peer = c.peer_ref();

    let (events_tx, events_rx) = tokio::sync::mpsc::channel(16);
    let settings = GossiperSettings {
        discovery: PeerDiscovery::Cluster {
            events: events_rx,
            resolve: Box::new(move |member: &Member| match member.node.as_str() {
                "node-b" => Some(b_peer.clone()),
                "node-c" => Some(c_peer.clone()),
                _ => None,
            }),
            status_floor: MemberStatus::Up,
            self_node: MemberNode::new("node-a"),
        },
        ..fast_settings()
    };
    let (a, _) = set_shell("clus-a", settings);

    events_tx
        .send(ClusterEvent::Snapshot(vec![
            Member::new("node-a", MemberStatus::Up),
            Member::new("node-b", MemberStatus::Up),
            Member::new("node-c", MemberStatus::Joining),
            Member::new("node-d", MemberStatus::Up),
        ]))
        .await
        .unwrap();
    sleep(SETTLE_WAIT).await;
    // Only node-b qualifies: self is skipped, node-c is below the floor,
    // node-d does not resolve.
    assert_eq!(a.peers().await.unwrap(), vec![b.addr().clone()]);

    // node-c comes up later through an incremental change.
    events_tx
        .send(ClusterEvent::MemberChange(Member::new(
            "node-c",
            MemberStatus::Up,
        )))
        .await
        .unwrap();
    // Leadership and reachability events are ignored.
    events_tx
        .send(ClusterEvent::LeaderChanged(MemberNode::new("node-d")))
        .await
        .unwrap();
    events_tx
        .send(ClusterEvent::ReachabilityChanged {
            node: MemberNode::new("node-d"),
            reachable: true,
        })
        .await
        .unwrap();

    sleep(SETTLE_WAIT).await;
    assert_eq!(
        a.peers().await.unwrap(),
        vec![b.addr().clone(), c.addr().clone()]
    );

    a.stop().await;
    b.stop().await;
    c.stop().await;
}

// =============================================================================
// Test: side channel routing
// =============================================================================

#[tokio::test]
async fn side_channel_routing() {
    let (a, observed) = set_shell("side-a", fast_settings());

    // No logic for "x" yet.
    let reply = a
        .side_channel_tell("x", Box::new("ping"))
        .await
        .unwrap();
    assert_eq!(reply, SideChannelReply::Unhandled);

    // After a local update the logic exists and observes the message.
    a.update("x", vec![1]).await.unwrap();
    let reply = a
        .side_channel_tell("x", Box::new("ping"))
        .await
        .unwrap();
    assert_eq!(reply, SideChannelReply::Received);
    assert_eq!(observed.lock().unwrap().side_msgs, vec!["ping".to_string()]);

    // A rejected message still counts as delivered.
    let reply = a
        .side_channel_tell("x", Box::new(42u32))
        .await
        .unwrap();
    assert_eq!(reply, SideChannelReply::Received);
    assert_eq!(observed.lock().unwrap().side_msgs.len(), 1);

    a.stop().await;
}

// =============================================================================
// Test: control handle after teardown
// =============================================================================

#[tokio::test]
async fn control_surfaces_shell_termination() {
    let (a, _) = set_shell("dead-a", fast_settings());
    a.stop().await;
    sleep(Duration::from_millis(50)).await;

    assert!(a.update("x", vec![1]).await.is_err());
    assert!(a.peers().await.is_err());
}

// =============================================================================
// Test: convergence through an intermediate node
// =============================================================================

/// A ring A→B→C→A still converges: gossip flows one hop per round.
#[tokio::test]
async fn ring_topology_converges() {
    let (a, a_observed) = set_shell("ring-a", fast_settings());
    let (b, b_observed) = set_shell("ring-b", fast_settings());
    let (c, c_observed) = set_shell("ring-c", fast_settings());

    a.introduce(b.peer_ref()).await.unwrap();
    b.introduce(c.peer_ref()).await.unwrap();
    c.introduce(a.peer_ref()).await.unwrap();

    a.update("x", vec![1]).await.unwrap();
    b.update("x", vec![2]).await.unwrap();
    c.update("x", vec![3]).await.unwrap();

    let expected = BTreeSet::from([1, 2, 3]);
    let deadline = timeout(Duration::from_secs(5), async {
        loop {
            if state_of(&a_observed) == expected
                && state_of(&b_observed) == expected
                && state_of(&c_observed) == expected
            {
                break;
            }
            sleep(Duration::from_millis(40)).await;
        }
    })
    .await;
    assert!(deadline.is_ok(), "ring did not converge within 5s");

    a.stop().await;
    b.stop().await;
    c.stop().await;
}
