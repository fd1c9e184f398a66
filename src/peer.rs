//! # Shell Addresses, Peer Handles, and the Peer Set
//!
//! A [`PeerRef`] is an addressable handle to another gossip shell of the same
//! envelope type. Handles compare by address only: two handles to the same
//! shell are equal regardless of how they were obtained.
//!
//! Termination is observable through the handle: when a shell's mailbox
//! closes, `closed()` resolves, which is what drives watch-based removal
//! from the [`PeerSet`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::mpsc;

use crate::messages::ShellMessage;

/// Monotonic suffix making every spawned shell address unique within the
/// process, even when shells share a name.
static ADDR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique address of a gossip shell.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShellAddr(Arc<str>);

impl ShellAddr {
    /// Mint a fresh address for a shell spawned under `name`.
    pub(crate) fn fresh(name: &str) -> Self {
        let n = ADDR_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(Arc::from(format!("{name}#{n}").as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShellAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ShellAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShellAddr({})", self.0)
    }
}

/// Handle to a gossip shell reachable by address.
///
/// Cloning is cheap. Equality and hashing use the address only, so a peer
/// set never holds two handles to the same shell.
pub struct PeerRef<E> {
    addr: ShellAddr,
    mailbox: mpsc::Sender<ShellMessage<E>>,
}

impl<E> PeerRef<E> {
    pub(crate) fn new(addr: ShellAddr, mailbox: mpsc::Sender<ShellMessage<E>>) -> Self {
        Self { addr, mailbox }
    }

    pub fn addr(&self) -> &ShellAddr {
        &self.addr
    }

    /// Best-effort send into the peer's mailbox. Gossip is intentionally
    /// lossy: a full or closed mailbox drops the message.
    pub(crate) fn try_tell(&self, msg: ShellMessage<E>) -> Result<(), ()> {
        self.mailbox.try_send(msg).map_err(|_| ())
    }

    /// Send into the peer's mailbox, waiting for capacity.
    pub(crate) async fn tell(&self, msg: ShellMessage<E>) -> Result<(), ()> {
        self.mailbox.send(msg).await.map_err(|_| ())
    }

    /// Resolves once the peer's shell has terminated (mailbox closed).
    pub(crate) async fn closed(&self) {
        self.mailbox.closed().await;
    }
}

impl<E> Clone for PeerRef<E> {
    fn clone(&self) -> Self {
        Self {
            addr: self.addr.clone(),
            mailbox: self.mailbox.clone(),
        }
    }
}

impl<E> PartialEq for PeerRef<E> {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl<E> Eq for PeerRef<E> {}

impl<E> Hash for PeerRef<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

impl<E> fmt::Debug for PeerRef<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerRef({})", self.addr)
    }
}

/// Deduplicated, insertion-ordered collection of peer handles.
///
/// Membership changes are driven by the introduce gate (insert) and by
/// termination notices (remove); there is no explicit leave operation.
pub(crate) struct PeerSet<E> {
    peers: IndexMap<ShellAddr, PeerRef<E>>,
}

impl<E> PeerSet<E> {
    pub(crate) fn new() -> Self {
        Self {
            peers: IndexMap::new(),
        }
    }

    /// Insert a peer, returning whether it was newly added.
    pub(crate) fn insert(&mut self, peer: PeerRef<E>) -> bool {
        self.peers.insert(peer.addr().clone(), peer).is_none()
    }

    /// Remove a peer by address, returning whether it was present.
    pub(crate) fn remove(&mut self, addr: &ShellAddr) -> bool {
        self.peers.shift_remove(addr).is_some()
    }

    pub(crate) fn contains(&self, addr: &ShellAddr) -> bool {
        self.peers.contains_key(addr)
    }

    pub(crate) fn len(&self) -> usize {
        self.peers.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Addressable snapshot of the current membership, in insertion order.
    pub(crate) fn snapshot(&self) -> Vec<PeerRef<E>> {
        self.peers.values().cloned().collect()
    }

    pub(crate) fn addrs(&self) -> Vec<ShellAddr> {
        self.peers.keys().cloned().collect()
    }
}
